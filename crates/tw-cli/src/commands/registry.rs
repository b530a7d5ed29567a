//! Registry inspection commands

use anyhow::{Context, Result};

use crate::output::{format_tunnel, print_info, print_success};
use tw_core::config::WatchdogConfig;
use tw_core::keys::KeyStore;
use tw_core::registry::{forget_tunnel, SshConfigRegistry};
use tw_core::traits::ConnectionRegistry;
use tw_core::ClusterId;

fn open_registry(config: &WatchdogConfig) -> Result<SshConfigRegistry> {
    let path = config.resolved_ssh_config_path();
    let registry = SshConfigRegistry::open(&path)
        .with_context(|| format!("Failed to open registry {:?}", path))?;
    Ok(registry.with_login_user(&config.login_user))
}

/// Print the recorded tunnel for a cluster
pub fn show(config: &WatchdogConfig, cluster_id: &ClusterId) -> Result<()> {
    let registry = open_registry(config)?;

    match registry.get(cluster_id) {
        Some(info) => println!("{}", format_tunnel(cluster_id, &info, &config.login_user)),
        None => print_info(&format!(
            "No tunnel recorded for {} in {:?}",
            cluster_id,
            registry.path()
        )),
    }

    Ok(())
}

/// Remove a cluster's registry entry and its local private key
pub fn forget(config: &WatchdogConfig, cluster_id: &ClusterId) -> Result<()> {
    let mut registry = open_registry(config)?;
    let key_store = KeyStore::new(config.resolved_ssh_dir());
    forget_tunnel(&mut registry, &key_store, cluster_id)
        .with_context(|| format!("Failed to forget tunnel for {}", cluster_id))?;

    print_success(&format!("Forgot tunnel for {}", cluster_id));
    Ok(())
}
