//! Connection registry implementations
//!
//! The durable registry is the user's SSH client configuration: every managed
//! cluster appears as one `Host <cluster_id>` block, so `ssh <cluster_id>`
//! works as soon as a tunnel is up.

mod memory;
mod ssh_config;

pub use memory::MemoryRegistry;
pub use ssh_config::{HostBlock, SshConfigFile, SshConfigRegistry};

use crate::error::WatchdogError;
use crate::keys::KeyStore;
use crate::traits::ConnectionRegistry;
use crate::types::ClusterId;

/// Drop a cluster's registry entry, then its private key
pub fn forget_tunnel(
    registry: &mut dyn ConnectionRegistry,
    key_store: &KeyStore,
    cluster_id: &ClusterId,
) -> Result<(), WatchdogError> {
    registry.remove(cluster_id)?;
    key_store.forget(cluster_id)?;
    tracing::info!("Forgot tunnel for {}", cluster_id);
    Ok(())
}
