//! Transport client traits

use async_trait::async_trait;

use crate::error::TransportError;
use crate::types::TunnelInfo;

/// Opens sessions through a tunnel
#[async_trait]
pub trait Transport: Send + Sync {
    /// Connect and authenticate using the tunnel's key file
    async fn open(&self, info: &TunnelInfo) -> Result<Box<dyn TransportSession>, TransportError>;
}

/// An authenticated session on the far end of a tunnel
#[async_trait]
pub trait TransportSession: Send {
    /// Run a command and return its stdout
    async fn exec_command(&mut self, command: &str) -> Result<String, TransportError>;

    /// Close the session gracefully
    async fn close(self: Box<Self>) -> Result<(), TransportError>;
}
