//! Tunnel reconciliation loop
//!
//! One `TunnelReconciler` owns one cluster's tunnel. Each iteration observes
//! the context and the cached tunnel, then either waits, confirms the tunnel
//! is alive, or provisions a new one. Failures never leave the loop; they are
//! logged and folded into the next status and delay.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use tw_core::config::ReconcilerSettings;
use tw_core::error::{EstablishError, ProbeError, TransportError};
use tw_core::keys::KeyStore;
use tw_core::traits::{
    context_is_running, ConnectionRegistry, KeyPairGenerator, RemoteContext, RemoteExecutor,
    Transport,
};
use tw_core::{ClusterId, EstablishStep, ReconcilerStatus, TunnelInfo};

use crate::bootstrap::{RemoteBootstrapper, RemoteCommand};
use crate::transport::PROBE_COMMAND;
use crate::url::parse_tunnel_url;

/// Supplies the tunneling-service auth token at establishment time
pub type TokenSource = Arc<dyn Fn() -> Option<String> + Send + Sync>;

/// External collaborators the reconciler drives
pub struct Collaborators {
    pub executor: Arc<dyn RemoteExecutor>,
    pub context: Arc<dyn RemoteContext>,
    pub transport: Arc<dyn Transport>,
    pub keygen: Arc<dyn KeyPairGenerator>,
    pub registry: Box<dyn ConnectionRegistry>,
}

/// Self-healing tunnel state machine for a single cluster
pub struct TunnelReconciler {
    cluster_id: ClusterId,
    context: Arc<dyn RemoteContext>,
    bootstrapper: RemoteBootstrapper,
    transport: Arc<dyn Transport>,
    keygen: Arc<dyn KeyPairGenerator>,
    registry: Box<dyn ConnectionRegistry>,
    key_store: KeyStore,
    settings: ReconcilerSettings,
    token_source: TokenSource,
    /// Live tunnel record; `None` whenever the registry entry was cleared
    tunnel_info: Option<TunnelInfo>,
    /// The live record could not be written to the registry yet
    pending_persist: bool,
    status_tx: watch::Sender<ReconcilerStatus>,
    /// Last status logged at info
    announced: ReconcilerStatus,
}

impl TunnelReconciler {
    /// Create a reconciler, seeding the tunnel record from the registry
    pub fn new(
        cluster_id: ClusterId,
        collaborators: Collaborators,
        key_store: KeyStore,
        settings: ReconcilerSettings,
    ) -> Self {
        let Collaborators {
            executor,
            context,
            transport,
            keygen,
            registry,
        } = collaborators;

        let bootstrapper = RemoteBootstrapper::new(
            executor,
            Arc::clone(&context),
            cluster_id.clone(),
            settings.remote_timeout,
        )
        .with_verbose(settings.verbose_remote);

        let tunnel_info = registry.get(&cluster_id);
        match &tunnel_info {
            Some(info) => tracing::info!("Loaded cached tunnel for {}: {}", cluster_id, info),
            None => tracing::debug!("No cached tunnel for {}", cluster_id),
        }

        let token_var = settings.tunnel_token_env.clone();
        let token_source: TokenSource =
            Arc::new(move || std::env::var(&token_var).ok().filter(|t| !t.is_empty()));

        let (status_tx, _) = watch::channel(ReconcilerStatus::Initializing);

        Self {
            cluster_id,
            context,
            bootstrapper,
            transport,
            keygen,
            registry,
            key_store,
            settings,
            token_source,
            tunnel_info,
            pending_persist: false,
            status_tx,
            announced: ReconcilerStatus::Initializing,
        }
    }

    /// Replace where the auth token comes from (the environment by default)
    pub fn with_token_source(
        mut self,
        source: impl Fn() -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        self.token_source = Arc::new(source);
        self
    }

    pub fn cluster_id(&self) -> &ClusterId {
        &self.cluster_id
    }

    /// Current phase
    pub fn status(&self) -> ReconcilerStatus {
        *self.status_tx.borrow()
    }

    /// Receiver that observes every phase change
    pub fn subscribe(&self) -> watch::Receiver<ReconcilerStatus> {
        self.status_tx.subscribe()
    }

    /// Tunnel currently believed to be live
    pub fn tunnel_info(&self) -> Option<&TunnelInfo> {
        self.tunnel_info.as_ref()
    }

    /// Whether the live tunnel still has to be written to the registry
    pub fn has_unpersisted_tunnel(&self) -> bool {
        self.pending_persist
    }

    /// Drive the loop until `cancel` fires
    pub async fn run(&mut self, cancel: CancellationToken) {
        tracing::info!("Watching tunnel for cluster {}", self.cluster_id);

        loop {
            let delay = tokio::select! {
                _ = cancel.cancelled() => break,
                delay = self.reconcile_once() => delay,
            };

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        tracing::info!("Stopped watching tunnel for cluster {}", self.cluster_id);
    }

    /// Run one iteration and return how long to sleep before the next
    pub async fn reconcile_once(&mut self) -> Duration {
        if !context_is_running(self.context.as_ref()) {
            self.set_status(ReconcilerStatus::WaitingForContext);
            return self.settings.context_wait_interval;
        }

        let backoff = match self.tunnel_info.clone() {
            Some(info) => {
                self.set_status(ReconcilerStatus::CheckingCachedTunnel);
                match self.probe(&info).await {
                    Ok(()) => {
                        self.set_status(ReconcilerStatus::Running);
                        if self.pending_persist {
                            self.persist(&info);
                        }
                        // Healthy cycles sleep one extra interval
                        self.settings.check_interval
                    }
                    Err(e) => {
                        tracing::warn!("Tunnel {} for {} is unreachable: {}", info, self.cluster_id, e);
                        self.set_status(ReconcilerStatus::TunnelUnreachableReinitializing);
                        self.establish_or_reset().await
                    }
                }
            }
            None => {
                self.set_status(ReconcilerStatus::EstablishingPlain);
                self.establish_or_reset().await
            }
        };

        backoff + self.settings.check_interval
    }

    fn set_status(&mut self, status: ReconcilerStatus) {
        let previous = self.status_tx.send_replace(status);
        if status.is_news_after(self.announced) {
            tracing::info!("[{}] {} -> {}", self.cluster_id, previous, status);
            self.announced = status;
        } else if previous != status {
            tracing::debug!("[{}] {} -> {}", self.cluster_id, previous, status);
        }
    }

    /// Open a session through the tunnel and run the probe command
    async fn probe(&self, info: &TunnelInfo) -> Result<(), ProbeError> {
        let timeout = self.settings.probe_timeout;
        tokio::time::timeout(timeout, self.probe_session(info))
            .await
            .map_err(|_| ProbeError::Timeout(timeout))?
            .map_err(ProbeError::from)
    }

    async fn probe_session(&self, info: &TunnelInfo) -> Result<(), TransportError> {
        let mut session = self.transport.open(info).await?;
        let result = session.exec_command(PROBE_COMMAND).await;
        if let Err(e) = session.close().await {
            tracing::debug!("Closing probe session for {} failed: {}", self.cluster_id, e);
        }
        result.map(|_| ())
    }

    /// Establish a tunnel; on failure clear both records and return the
    /// extra backoff
    async fn establish_or_reset(&mut self) -> Duration {
        match self.establish().await {
            Ok(info) => {
                tracing::info!("Tunnel for {} is up at {}", self.cluster_id, info.address());
                Duration::ZERO
            }
            Err(e) => {
                tracing::error!(
                    "Establishing tunnel for {} failed at {}: {}",
                    self.cluster_id,
                    e.step(),
                    e
                );
                self.reset();
                self.settings.failure_backoff
            }
        }
    }

    async fn establish(&mut self) -> Result<TunnelInfo, EstablishError> {
        self.begin(EstablishStep::InstallDependencies);
        self.bootstrapper
            .run(&RemoteCommand::InstallDependencies)
            .await?;

        self.begin(EstablishStep::StopTunnel);
        self.bootstrapper.run(&RemoteCommand::StopTunnelProcess).await?;

        self.begin(EstablishStep::GenerateKeys);
        let keys = self.keygen.generate().await?;

        self.begin(EstablishStep::WriteLocalKey);
        let key_path = self
            .key_store
            .replace(&self.cluster_id, keys.private_pem.as_bytes())
            .map_err(|source| EstablishError::KeyFile {
                path: self.key_store.dir().join(self.cluster_id.as_str()),
                source,
            })?;

        self.begin(EstablishStep::InstallRemoteKeys);
        self.bootstrapper
            .run(&RemoteCommand::InstallSshKeys {
                private_key: keys.private_pem.into_bytes(),
                public_key: keys.public_openssh.into_bytes(),
            })
            .await?;

        self.begin(EstablishStep::StartTunnel);
        let auth_token = (self.token_source)()
            .ok_or_else(|| EstablishError::MissingToken(self.settings.tunnel_token_env.clone()))?;
        self.bootstrapper
            .run(&RemoteCommand::StartTunnel { auth_token })
            .await?;

        self.begin(EstablishStep::ReadTunnelUrl);
        let output = self.bootstrapper.run(&RemoteCommand::PrintTunnelUrl).await?;
        let (host, port) = parse_tunnel_url(&output)?;
        let info = TunnelInfo::new(host, port, key_path)?;

        self.begin(EstablishStep::Persist);
        self.tunnel_info = Some(info.clone());
        self.persist(&info);

        self.begin(EstablishStep::PrepareSshd);
        if let Err(e) = self.bootstrapper.run(&RemoteCommand::PrepareSshd).await {
            tracing::warn!(
                "Tunnel for {} is up but sshd preparation failed: {}",
                self.cluster_id,
                e
            );
        }

        Ok(info)
    }

    fn begin(&self, step: EstablishStep) {
        tracing::info!("[{}] {}", self.cluster_id, step);
    }

    /// Write the record; failure leaves the in-memory tunnel authoritative
    fn persist(&mut self, info: &TunnelInfo) {
        match self.registry.set(&self.cluster_id, info) {
            Ok(()) => {
                if self.pending_persist {
                    tracing::info!("Recorded tunnel for {} after earlier failure", self.cluster_id);
                }
                self.pending_persist = false;
            }
            Err(e) => {
                tracing::warn!(
                    "Failed to record tunnel for {}, retrying after the next successful probe: {}",
                    self.cluster_id,
                    e
                );
                self.pending_persist = true;
            }
        }
    }

    /// Forget the tunnel in memory and in the registry together
    fn reset(&mut self) {
        self.tunnel_info = None;
        self.pending_persist = false;
        if let Err(e) = self.registry.remove(&self.cluster_id) {
            tracing::error!("Failed to remove registry entry for {}: {}", self.cluster_id, e);
        }
    }
}
