//! Process-local registry

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::PersistenceError;
use crate::traits::ConnectionRegistry;
use crate::types::{ClusterId, TunnelInfo};

/// In-memory registry; clones share the same entries
#[derive(Debug, Clone, Default)]
pub struct MemoryRegistry {
    entries: Arc<Mutex<HashMap<ClusterId, TunnelInfo>>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ClusterId, TunnelInfo>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl ConnectionRegistry for MemoryRegistry {
    fn get(&self, cluster_id: &ClusterId) -> Option<TunnelInfo> {
        self.lock().get(cluster_id).cloned()
    }

    fn set(&mut self, cluster_id: &ClusterId, info: &TunnelInfo) -> Result<(), PersistenceError> {
        self.lock().insert(cluster_id.clone(), info.clone());
        Ok(())
    }

    fn remove(&mut self, cluster_id: &ClusterId) -> Result<(), PersistenceError> {
        self.lock().remove(cluster_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_entries() {
        let mut registry = MemoryRegistry::new();
        let observer = registry.clone();
        let id = ClusterId::new("c1");
        let info = TunnelInfo::new("h", 1, "/k").unwrap();

        registry.set(&id, &info).unwrap();
        registry.set(&id, &info).unwrap();
        assert_eq!(observer.get(&id), Some(info));
        assert_eq!(observer.len(), 1);

        registry.remove(&id).unwrap();
        registry.remove(&id).unwrap();
        assert!(observer.is_empty());
    }
}
