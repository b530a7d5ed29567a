//! Core error types for tunnel-watchdog

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::types::EstablishStep;

/// Top-level error type for the tunnel-watchdog ecosystem
#[derive(Error, Debug)]
pub enum WatchdogError {
    /// Establishment error
    #[error("Establishment error: {0}")]
    Establish(#[from] EstablishError),

    /// Probe error
    #[error("Probe error: {0}")]
    Probe(#[from] ProbeError),

    /// Persistence error
    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure reported by the remote command executor
#[derive(Error, Debug)]
pub enum RemoteExecutionError {
    /// The command ran and failed on the remote side
    #[error("Remote command failed: {0}")]
    Failed(String),

    /// The command was cancelled before finishing
    #[error("Remote command was cancelled")]
    Cancelled,

    /// No execution context is available yet
    #[error("No execution context for cluster {0}")]
    NoContext(String),

    /// Request to the execution service failed
    #[error("Execution service error: {0}")]
    Service(String),
}

/// Failure of the SSH transport
#[derive(Error, Debug)]
pub enum TransportError {
    /// Private key could not be loaded
    #[error("Failed to load private key {path}: {message}")]
    Key { path: PathBuf, message: String },

    /// TCP or SSH handshake failed
    #[error("Failed to connect to {address}: {message}")]
    Connect { address: String, message: String },

    /// Public key authentication was rejected
    #[error("Authentication rejected for user {0}")]
    AuthRejected(String),

    /// Command exited with a non-zero status
    #[error("Command `{command}` exited with status {status}")]
    CommandFailed { command: String, status: u32 },

    /// Channel-level failure
    #[error("Channel error: {0}")]
    Channel(String),
}

/// Key generation failure
#[derive(Error, Debug)]
#[error("Key generation failed: {0}")]
pub struct CryptoError(pub String);

/// Tunnel URL did not have the `tcp://host:port` shape
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UrlParseError {
    #[error("Tunnel URL has no tcp:// scheme: {0:?}")]
    MissingScheme(String),

    #[error("Tunnel URL has no port: {0:?}")]
    MissingPort(String),

    #[error("Tunnel URL has an empty host: {0:?}")]
    EmptyHost(String),

    #[error("Tunnel URL has an invalid port: {0:?}")]
    InvalidPort(String),
}

/// Rejected tunnel record fields
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvalidTunnelInfo {
    #[error("Tunnel host is empty")]
    EmptyHost,

    #[error("Tunnel port is out of range: {0}")]
    InvalidPort(String),
}

/// Registry backing file could not be read or written
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Failed to read {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failure of the establishment procedure.
///
/// Every variant aborts the current attempt and triggers cleanup of both the
/// in-memory tunnel record and its registry entry.
#[derive(Error, Debug)]
pub enum EstablishError {
    /// A remote command failed
    #[error("Step {step} failed: {source}")]
    Remote {
        step: EstablishStep,
        #[source]
        source: RemoteExecutionError,
    },

    /// A remote call did not return in time
    #[error("Step {step} timed out after {after:?}")]
    Timeout { step: EstablishStep, after: Duration },

    /// Key pair generation failed
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// Local private key file could not be replaced
    #[error("Failed to write private key {path:?}: {source}")]
    KeyFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Tunneling-service token is not set
    #[error("Environment variable {0} is not set")]
    MissingToken(String),

    /// Tunnel URL was not understood
    #[error(transparent)]
    Parse(#[from] UrlParseError),

    /// Parsed URL did not form a valid tunnel record
    #[error(transparent)]
    InvalidTunnel(#[from] InvalidTunnelInfo),
}

impl EstablishError {
    /// Step at which the procedure stopped
    pub fn step(&self) -> EstablishStep {
        match self {
            EstablishError::Remote { step, .. } | EstablishError::Timeout { step, .. } => *step,
            EstablishError::Crypto(_) => EstablishStep::GenerateKeys,
            EstablishError::KeyFile { .. } => EstablishStep::WriteLocalKey,
            EstablishError::MissingToken(_) => EstablishStep::StartTunnel,
            EstablishError::Parse(_) | EstablishError::InvalidTunnel(_) => {
                EstablishStep::ReadTunnelUrl
            }
        }
    }
}

/// Liveness probe failure
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Probe timed out after {0:?}")]
    Timeout(Duration),
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialize error
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}
