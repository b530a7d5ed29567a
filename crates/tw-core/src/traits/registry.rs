//! Connection registry trait

use crate::error::PersistenceError;
use crate::types::{ClusterId, TunnelInfo};

/// Durable mapping from cluster ID to tunnel record.
///
/// At most one entry exists per cluster. `set` is an upsert and `remove` of a
/// missing entry is a no-op.
pub trait ConnectionRegistry: Send + Sync {
    /// Look up an entry; malformed entries read as absent
    fn get(&self, cluster_id: &ClusterId) -> Option<TunnelInfo>;

    /// Insert or overwrite the entry and flush it
    fn set(&mut self, cluster_id: &ClusterId, info: &TunnelInfo) -> Result<(), PersistenceError>;

    /// Delete the entry if present and flush
    fn remove(&mut self, cluster_id: &ClusterId) -> Result<(), PersistenceError>;
}
