/*
    Sync units - One per (flavor, key) per context

    - machine: lifecycle, load, apply-incoming, sync, teardown
    - scalar: single value, optional throttled auto-sync
    - structure: nested document with path patches, manual sync only
    - options: construction options for both flavors
*/

mod machine;
pub mod options;
pub mod scalar;
pub mod structure;

pub(crate) use machine::UnitEnv;
pub use machine::{ApplyOutcome, Lifecycle};
pub use options::{ScalarOptions, StructureOptions, DEFAULT_SCALAR_KEY, DEFAULT_THROTTLE};
pub use scalar::SyncedScalar;
pub use structure::SyncedStructure;
