//! SSH transport over the tunnel
//!
//! Connects to the relay endpoint with the tunnel's key and runs one command
//! per channel.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use russh::client::{self, Config, Handle};
use russh::{ChannelMsg, Disconnect};
use russh_keys::key::{KeyPair, PublicKey};

use tw_core::config::DEFAULT_LOGIN_USER;
use tw_core::error::TransportError;
use tw_core::traits::{Transport, TransportSession};
use tw_core::TunnelInfo;

/// Command whose success proves the tunnel works end to end
pub const PROBE_COMMAND: &str = "ls -la";

/// Default time allowed for the TCP connect and SSH handshake
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Transport that opens russh client sessions
#[derive(Debug, Clone)]
pub struct SshTransport {
    login_user: String,
    connect_timeout: Duration,
}

impl Default for SshTransport {
    fn default() -> Self {
        Self::new(DEFAULT_LOGIN_USER)
    }
}

impl SshTransport {
    pub fn new(login_user: impl Into<String>) -> Self {
        Self {
            login_user: login_user.into(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn login_user(&self) -> &str {
        &self.login_user
    }

    fn load_key(info: &TunnelInfo) -> Result<Arc<KeyPair>, TransportError> {
        let path = info.private_key_file();
        russh_keys::load_secret_key(path, None)
            .map(Arc::new)
            .map_err(|e| TransportError::Key {
                path: path.to_path_buf(),
                message: e.to_string(),
            })
    }
}

#[async_trait]
impl Transport for SshTransport {
    async fn open(&self, info: &TunnelInfo) -> Result<Box<dyn TransportSession>, TransportError> {
        let key = Self::load_key(info)?;
        let address = info.address();
        let connect_err = |message: String| TransportError::Connect {
            address: address.clone(),
            message,
        };

        tracing::debug!("Connecting to {}", address);
        let mut handle = tokio::time::timeout(
            self.connect_timeout,
            client::connect(Arc::new(Config::default()), address.as_str(), ClientHandler),
        )
        .await
        .map_err(|_| connect_err("connection timed out".to_string()))?
        .map_err(|e| connect_err(e.to_string()))?;

        tracing::debug!("Authenticating as user '{}'", self.login_user);
        let authenticated = handle
            .authenticate_publickey(&self.login_user, key)
            .await
            .map_err(|e| connect_err(format!("authentication error: {}", e)))?;

        if !authenticated {
            return Err(TransportError::AuthRejected(self.login_user.clone()));
        }

        Ok(Box::new(SshSession { handle }))
    }
}

/// An authenticated russh session
pub struct SshSession {
    handle: Handle<ClientHandler>,
}

#[async_trait]
impl TransportSession for SshSession {
    async fn exec_command(&mut self, command: &str) -> Result<String, TransportError> {
        let mut channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(|e| TransportError::Channel(format!("failed to open session channel: {}", e)))?;

        channel
            .exec(true, command)
            .await
            .map_err(|e| TransportError::Channel(format!("failed to start command: {}", e)))?;

        let mut stdout = Vec::new();
        let mut exit_status = None;
        while let Some(msg) = channel.wait().await {
            match msg {
                ChannelMsg::Data { ref data } => stdout.extend_from_slice(data),
                ChannelMsg::ExitStatus { exit_status: status } => exit_status = Some(status),
                _ => {}
            }
        }

        match exit_status {
            Some(0) => Ok(String::from_utf8_lossy(&stdout).into_owned()),
            Some(status) => Err(TransportError::CommandFailed {
                command: command.to_string(),
                status,
            }),
            None => Err(TransportError::Channel(format!(
                "channel closed before `{}` reported an exit status",
                command
            ))),
        }
    }

    async fn close(self: Box<Self>) -> Result<(), TransportError> {
        self.handle
            .disconnect(Disconnect::ByApplication, "closing", "en")
            .await
            .map_err(|e| TransportError::Channel(format!("failed to disconnect: {}", e)))
    }
}

/// Client handler for tunnel sessions
///
/// The relay endpoint changes with every new tunnel, so there is no stable
/// host key to pin against. Any server key is accepted.
pub struct ClientHandler;

#[async_trait]
impl client::Handler for ClientHandler {
    type Error = anyhow::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        tracing::debug!("Server host key: {}", server_public_key.fingerprint());
        Ok(true)
    }
}
