/*
    Transport subsystem - How envelopes move between contexts

    Two delivery paths:
    - channel: ephemeral broadcast to other live contexts (optional per origin)
    - durable: persistent key-value store with foreign-change notifications,
      plus polling as a last resort

    Both carry the identical envelope text.
*/

pub mod backend;
pub mod channel;
pub mod durable;
pub mod polling;
pub mod sqlite;

pub use backend::{MemoryBackend, StorageBackend};
pub use channel::{BroadcastHub, ChannelHandle, ChannelMessages};
pub use durable::{DurableStore, StorageChange, StorageEvents, StorageMedium, PROBE_KEY};
pub use polling::Poller;
pub use sqlite::SqliteBackend;

use serde::{Deserialize, Serialize};

/// Which transports a unit uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransportMode {
    /// Broadcast channel when the origin has one, else durable store events
    #[default]
    BroadcastPreferred,
    /// Always the durable store, even if a channel is available
    DurableOnly,
}

impl std::str::FromStr for TransportMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "broadcast-preferred" | "broadcast" => Ok(TransportMode::BroadcastPreferred),
            "durable-only" | "durable" | "storage" => Ok(TransportMode::DurableOnly),
            other => Err(format!("unknown transport mode: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_mode_parse() {
        assert_eq!("broadcast".parse(), Ok(TransportMode::BroadcastPreferred));
        assert_eq!("Durable-Only".parse(), Ok(TransportMode::DurableOnly));
        assert!("carrier-pigeon".parse::<TransportMode>().is_err());
        assert_eq!(TransportMode::default(), TransportMode::BroadcastPreferred);
    }
}
