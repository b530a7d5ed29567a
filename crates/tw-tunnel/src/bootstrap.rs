//! Remote bootstrap command catalog
//!
//! Every command is a Python snippet run in the cluster's execution context.
//! Parameters are never spliced in raw: key material travels base64-encoded
//! and the auth token as an escaped string literal.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use tw_core::error::{EstablishError, RemoteExecutionError};
use tw_core::traits::{RemoteContext, RemoteExecutor};
use tw_core::{ClusterId, EstablishStep};

/// Remote variable holding the public tunnel URL between commands
pub const TUNNEL_URL_VAR: &str = "ssh_url";

/// Port the tunnel forwards to on the remote node
pub const REMOTE_SSH_PORT: u16 = 22;

/// A catalog command together with its parameters
#[derive(Clone, PartialEq, Eq)]
pub enum RemoteCommand {
    /// Ensure the tunneling client library is installed
    InstallDependencies,
    /// Kill any tunnel process left from an earlier run
    StopTunnelProcess,
    /// Write the key pair into `~/.ssh` and authorize the public key
    InstallSshKeys {
        private_key: Vec<u8>,
        public_key: Vec<u8>,
    },
    /// Open a TCP tunnel to the SSH port and keep its URL
    StartTunnel { auth_token: String },
    /// Print the URL captured by `StartTunnel`
    PrintTunnelUrl,
    /// Make the SFTP subsystem available and restart sshd
    PrepareSshd,
}

impl RemoteCommand {
    /// Catalog name
    pub fn name(&self) -> &'static str {
        match self {
            RemoteCommand::InstallDependencies => "install_dependencies",
            RemoteCommand::StopTunnelProcess => "stop_tunnel_process",
            RemoteCommand::InstallSshKeys { .. } => "install_ssh_keys",
            RemoteCommand::StartTunnel { .. } => "start_tunnel",
            RemoteCommand::PrintTunnelUrl => "print_tunnel_url",
            RemoteCommand::PrepareSshd => "prepare_sshd",
        }
    }

    /// Establishment step this command implements
    pub fn step(&self) -> EstablishStep {
        match self {
            RemoteCommand::InstallDependencies => EstablishStep::InstallDependencies,
            RemoteCommand::StopTunnelProcess => EstablishStep::StopTunnel,
            RemoteCommand::InstallSshKeys { .. } => EstablishStep::InstallRemoteKeys,
            RemoteCommand::StartTunnel { .. } => EstablishStep::StartTunnel,
            RemoteCommand::PrintTunnelUrl => EstablishStep::ReadTunnelUrl,
            RemoteCommand::PrepareSshd => EstablishStep::PrepareSshd,
        }
    }

    /// Whether the rendered body carries secrets
    pub fn is_sensitive(&self) -> bool {
        matches!(
            self,
            RemoteCommand::InstallSshKeys { .. } | RemoteCommand::StartTunnel { .. }
        )
    }

    /// Script body handed to the remote executor
    pub fn render(&self) -> String {
        match self {
            RemoteCommand::InstallDependencies => "%pip install pyngrok".to_string(),

            RemoteCommand::StopTunnelProcess => [
                "import subprocess",
                r#"subprocess.run(["pkill", "-f", "ngrok"], check=False)"#,
            ]
            .join("\n"),

            RemoteCommand::InstallSshKeys {
                private_key,
                public_key,
            } => format!(
                r#"import base64
from pathlib import Path
private_key = base64.b64decode("{private}")
public_key = base64.b64decode("{public}")
ssh_dir = Path("~/.ssh").expanduser()
ssh_dir.mkdir(mode=0o700, exist_ok=True)
(ssh_dir / "id_rsa").write_bytes(private_key)
(ssh_dir / "id_rsa").chmod(0o600)
(ssh_dir / "id_rsa.pub").write_bytes(public_key)
(ssh_dir / "authorized_keys").write_bytes(public_key)
(ssh_dir / "authorized_keys").chmod(0o600)"#,
                private = BASE64.encode(private_key),
                public = BASE64.encode(public_key),
            ),

            RemoteCommand::StartTunnel { auth_token } => format!(
                r#"from pyngrok import ngrok
ngrok.set_auth_token({token})
{var} = ngrok.connect({port}, "tcp").public_url"#,
                token = serde_json::Value::String(auth_token.clone()),
                var = TUNNEL_URL_VAR,
                port = REMOTE_SSH_PORT,
            ),

            RemoteCommand::PrintTunnelUrl => format!("print({})", TUNNEL_URL_VAR),

            RemoteCommand::PrepareSshd => [
                "import os",
                "import subprocess",
                r#"os.makedirs("/usr/lib/ssh", exist_ok=True)"#,
                r#"if not os.path.lexists("/usr/lib/ssh/sftp-server"):"#,
                r#"    os.symlink("/usr/lib/openssh/sftp-server", "/usr/lib/ssh/sftp-server")"#,
                r#"subprocess.run(["systemctl", "restart", "ssh.service"], check=True)"#,
            ]
            .join("\n"),
        }
    }
}

impl fmt::Debug for RemoteCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Runs catalog commands for one cluster through the remote executor
#[derive(Clone)]
pub struct RemoteBootstrapper {
    executor: Arc<dyn RemoteExecutor>,
    context: Arc<dyn RemoteContext>,
    cluster_id: ClusterId,
    timeout: Duration,
    verbose: bool,
}

impl RemoteBootstrapper {
    pub fn new(
        executor: Arc<dyn RemoteExecutor>,
        context: Arc<dyn RemoteContext>,
        cluster_id: ClusterId,
        timeout: Duration,
    ) -> Self {
        Self {
            executor,
            context,
            cluster_id,
            timeout,
            verbose: false,
        }
    }

    /// Ask the executor to echo output of non-sensitive commands
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Render and execute `command`, returning its captured output
    pub async fn run(&self, command: &RemoteCommand) -> Result<String, EstablishError> {
        let step = command.step();
        let context_id = self.context.context_id().ok_or_else(|| EstablishError::Remote {
            step,
            source: RemoteExecutionError::NoContext(self.cluster_id.to_string()),
        })?;

        let verbose = self.verbose && !command.is_sensitive();
        let body = command.render();
        if command.is_sensitive() {
            tracing::debug!("Running {} on {}", command.name(), self.cluster_id);
        } else {
            tracing::debug!("Running {} on {}:\n{}", command.name(), self.cluster_id, body);
        }

        tokio::time::timeout(
            self.timeout,
            self.executor
                .execute(&self.cluster_id, &context_id, &body, verbose),
        )
        .await
        .map_err(|_| EstablishError::Timeout {
            step,
            after: self.timeout,
        })?
        .map_err(|source| EstablishError::Remote { step, source })
    }
}
