//! Core domain types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::InvalidTunnelInfo;

/// Identifier of a remote compute target
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClusterId(pub String);

impl ClusterId {
    /// Create a new cluster ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the raw ID string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClusterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ClusterId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ClusterId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// How to reach a cluster's tunnel right now.
///
/// Instances are validated on construction and never mutated; a new tunnel
/// produces a new value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TunnelInfo {
    host: String,
    port: u16,
    private_key_file: PathBuf,
}

impl TunnelInfo {
    /// Create a tunnel record, rejecting an empty host or port 0
    pub fn new(
        host: impl Into<String>,
        port: u16,
        private_key_file: impl Into<PathBuf>,
    ) -> Result<Self, InvalidTunnelInfo> {
        let host = host.into();
        if host.trim().is_empty() {
            return Err(InvalidTunnelInfo::EmptyHost);
        }
        if port == 0 {
            return Err(InvalidTunnelInfo::InvalidPort(port.to_string()));
        }
        Ok(Self {
            host,
            port,
            private_key_file: private_key_file.into(),
        })
    }

    /// Relay host name or address
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Relay port
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Path of the private key that authenticates against this tunnel
    pub fn private_key_file(&self) -> &Path {
        &self.private_key_file
    }

    /// `host:port` form used for connecting
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for TunnelInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} (key {})",
            self.host,
            self.port,
            self.private_key_file.display()
        )
    }
}

/// Observable phase of the tunnel reconciler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcilerStatus {
    /// Constructed, loop not started yet
    Initializing,
    /// Remote execution context is not running
    WaitingForContext,
    /// Probing a known tunnel
    CheckingCachedTunnel,
    /// No known tunnel, establishing a fresh one
    EstablishingPlain,
    /// Last probe succeeded
    Running,
    /// Probe failed, establishing a replacement
    TunnelUnreachableReinitializing,
}

impl ReconcilerStatus {
    /// Stable string form polled by monitoring
    pub fn as_str(&self) -> &'static str {
        match self {
            ReconcilerStatus::Initializing => "initializing",
            ReconcilerStatus::WaitingForContext => "waiting_for_context",
            ReconcilerStatus::CheckingCachedTunnel => "checking_cached_tunnel",
            ReconcilerStatus::EstablishingPlain => "establishing_plain",
            ReconcilerStatus::Running => "running",
            ReconcilerStatus::TunnelUnreachableReinitializing => {
                "tunnel_unreachable_reinitializing"
            }
        }
    }
}

impl ReconcilerStatus {
    /// Whether moving to `self` is worth announcing after `last_announced`
    ///
    /// A healthy tunnel is re-probed every cycle; the resulting
    /// `running -> checking_cached_tunnel -> running` round-trip is routine.
    pub fn is_news_after(self, last_announced: ReconcilerStatus) -> bool {
        self != last_announced
            && !(last_announced == ReconcilerStatus::Running
                && self == ReconcilerStatus::CheckingCachedTunnel)
    }
}

impl fmt::Display for ReconcilerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Steps of the establishment procedure, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EstablishStep {
    InstallDependencies,
    StopTunnel,
    GenerateKeys,
    WriteLocalKey,
    InstallRemoteKeys,
    StartTunnel,
    ReadTunnelUrl,
    Persist,
    PrepareSshd,
}

impl EstablishStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            EstablishStep::InstallDependencies => "install_dependencies",
            EstablishStep::StopTunnel => "stop_tunnel",
            EstablishStep::GenerateKeys => "generate_keys",
            EstablishStep::WriteLocalKey => "write_local_key",
            EstablishStep::InstallRemoteKeys => "install_remote_keys",
            EstablishStep::StartTunnel => "start_tunnel",
            EstablishStep::ReadTunnelUrl => "read_tunnel_url",
            EstablishStep::Persist => "persist",
            EstablishStep::PrepareSshd => "prepare_sshd",
        }
    }
}

impl fmt::Display for EstablishStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
