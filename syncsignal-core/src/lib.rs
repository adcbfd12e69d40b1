//! Cross-context value synchronization
//!
//! Keeps observable values consistent across independent execution contexts
//! that share an [`Origin`]: a broadcast hub for live delivery and a durable
//! key-value store for persistence and fallback delivery. Conflicts resolve
//! last-writer-wins on envelope timestamps.
//!
//! ```no_run
//! use syncsignal_core::{Origin, ScalarOptions, SyncResult};
//!
//! # async fn demo() -> SyncResult<()> {
//! let origin = Origin::in_memory();
//! let tab = origin.context();
//! let theme = tab.create_synced_scalar("light", Some(ScalarOptions::new("theme").auto_sync(true)))?;
//! theme.set("dark");
//! # Ok(())
//! # }
//! ```

pub mod cell;
pub mod codec;
pub mod config;
pub mod context;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod registry;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod transport;
pub mod types;
pub mod unit;

#[cfg(test)]
mod tests;

pub use cell::{Observable, PathSegment, Subscription};
pub use codec::{Envelope, SyncValue};
pub use config::Config;
pub use context::{Origin, SyncContext};
pub use error::{SyncError, SyncResult};
pub use logging::{init_logging, LogLevel};
pub use registry::SyncTrigger;
pub use transport::TransportMode;
pub use types::{ContextId, Flavor, Timestamp};
pub use unit::{Lifecycle, ScalarOptions, StructureOptions, SyncedScalar, SyncedStructure};
