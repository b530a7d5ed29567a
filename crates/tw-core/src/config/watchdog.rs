//! Watchdog configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::expand_home;
use super::serde_utils::duration_secs;

/// Login name written into every registry entry
pub const DEFAULT_LOGIN_USER: &str = "root";

/// Configuration for the tunnel watchdog
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchdogConfig {
    /// Base URL of the remote command-execution service
    pub workspace_url: String,

    /// Environment variable holding the execution service API token
    pub api_token_env: String,

    /// Environment variable holding the tunneling-service token
    pub tunnel_token_env: String,

    /// Directory holding one private key file per cluster
    pub ssh_dir: PathBuf,

    /// SSH client config file used as the connection registry
    pub ssh_config_path: PathBuf,

    /// Login user for tunnel connections
    pub login_user: String,

    /// Sleep between reconciliation cycles
    #[serde(with = "duration_secs")]
    pub check_interval: Duration,

    /// Sleep while the execution context is not running
    #[serde(with = "duration_secs")]
    pub context_wait_interval: Duration,

    /// Extra sleep after a failed establishment
    #[serde(with = "duration_secs")]
    pub failure_backoff: Duration,

    /// Upper bound for a single remote command
    #[serde(with = "duration_secs")]
    pub remote_timeout: Duration,

    /// Upper bound for the tunnel liveness probe
    #[serde(with = "duration_secs")]
    pub probe_timeout: Duration,

    /// Log output of non-sensitive remote commands
    pub verbose_remote: bool,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            workspace_url: String::new(),
            api_token_env: "DATABRICKS_TOKEN".to_string(),
            tunnel_token_env: "DBX_NGROK_TOKEN".to_string(),
            ssh_dir: PathBuf::from("~/.ssh"),
            ssh_config_path: PathBuf::from("~/.ssh/config"),
            login_user: DEFAULT_LOGIN_USER.to_string(),
            check_interval: Duration::from_secs(5),
            context_wait_interval: Duration::from_secs(5),
            failure_backoff: Duration::from_secs(2),
            remote_timeout: Duration::from_secs(600),
            probe_timeout: Duration::from_secs(30),
            verbose_remote: false,
        }
    }
}

impl WatchdogConfig {
    /// Key directory with `~` expanded
    pub fn resolved_ssh_dir(&self) -> PathBuf {
        expand_home(&self.ssh_dir)
    }

    /// Registry file with `~` expanded
    pub fn resolved_ssh_config_path(&self) -> PathBuf {
        expand_home(&self.ssh_config_path)
    }

    /// Settings consumed by the reconciliation loop
    pub fn reconciler_settings(&self) -> ReconcilerSettings {
        ReconcilerSettings {
            check_interval: self.check_interval,
            context_wait_interval: self.context_wait_interval,
            failure_backoff: self.failure_backoff,
            remote_timeout: self.remote_timeout,
            probe_timeout: self.probe_timeout,
            tunnel_token_env: self.tunnel_token_env.clone(),
            verbose_remote: self.verbose_remote,
        }
    }
}

/// Timing and environment knobs for one reconciler
#[derive(Debug, Clone)]
pub struct ReconcilerSettings {
    pub check_interval: Duration,
    pub context_wait_interval: Duration,
    pub failure_backoff: Duration,
    pub remote_timeout: Duration,
    pub probe_timeout: Duration,
    pub tunnel_token_env: String,
    pub verbose_remote: bool,
}

impl Default for ReconcilerSettings {
    fn default() -> Self {
        WatchdogConfig::default().reconciler_settings()
    }
}
