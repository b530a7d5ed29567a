//! Execution context lifecycle
//!
//! A background monitor keeps one execution context alive per cluster and
//! mirrors its status so the reconciler can read it without awaiting.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use tw_core::traits::RemoteContext;
use tw_core::ClusterId;

use crate::api::{ApiClient, ApiError};

/// Delay between context status polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Status shown before the service has been asked
pub const STATUS_UNKNOWN: &str = "Unknown";

/// Status shown while the service cannot be reached
pub const STATUS_UNREACHABLE: &str = "Unreachable";

#[derive(Debug, Clone)]
struct ContextState {
    id: Option<String>,
    status: String,
}

/// Owns the cluster's execution context; clones share state
#[derive(Debug, Clone)]
pub struct ContextManager {
    api: ApiClient,
    cluster_id: ClusterId,
    state: Arc<RwLock<ContextState>>,
    poll_interval: Duration,
}

impl ContextManager {
    pub fn new(api: ApiClient, cluster_id: ClusterId) -> Self {
        Self {
            api,
            cluster_id,
            state: Arc::new(RwLock::new(ContextState {
                id: None,
                status: STATUS_UNKNOWN.to_string(),
            })),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Start the monitor task
    pub fn spawn_monitor(&self, cancel: CancellationToken) -> JoinHandle<()> {
        let manager = self.clone();
        tokio::spawn(async move { manager.monitor(cancel).await })
    }

    /// Poll until cancelled
    pub async fn monitor(&self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.poll_interval);

        tracing::info!(
            "Starting context monitor for {} (interval: {:?})",
            self.cluster_id,
            self.poll_interval
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.refresh().await {
                        tracing::warn!("Context refresh for {} failed: {}", self.cluster_id, e);
                        self.write().status = STATUS_UNREACHABLE.to_string();
                    }
                }
                _ = cancel.cancelled() => {
                    tracing::info!("Context monitor for {} shutting down", self.cluster_id);
                    break;
                }
            }
        }
    }

    /// Create the context if missing, otherwise update its status
    pub async fn refresh(&self) -> Result<(), ApiError> {
        let current = self.read().id.clone();

        let Some(context_id) = current else {
            let context_id = self.api.create_context(&self.cluster_id).await?;
            tracing::info!("Created execution context {} on {}", context_id, self.cluster_id);
            let mut state = self.write();
            state.id = Some(context_id);
            state.status = STATUS_UNKNOWN.to_string();
            return Ok(());
        };

        match self.api.context_status(&self.cluster_id, &context_id).await {
            Ok(reported) if reported.status.eq_ignore_ascii_case("error") => {
                tracing::warn!(
                    "Execution context {} on {} failed, recreating",
                    context_id,
                    self.cluster_id
                );
                self.reset(reported.status);
                Ok(())
            }
            Ok(reported) => {
                let mut state = self.write();
                if state.status != reported.status {
                    tracing::info!(
                        "Execution context {} on {}: {} -> {}",
                        context_id,
                        self.cluster_id,
                        state.status,
                        reported.status
                    );
                    state.status = reported.status;
                }
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                tracing::warn!(
                    "Execution context {} on {} is gone, recreating",
                    context_id,
                    self.cluster_id
                );
                self.reset(STATUS_UNKNOWN.to_string());
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Destroy the context, if one was created
    pub async fn shutdown(&self) -> Result<(), ApiError> {
        let context_id = self.write().id.take();
        if let Some(context_id) = context_id {
            tracing::info!("Destroying execution context {} on {}", context_id, self.cluster_id);
            self.api.destroy_context(&self.cluster_id, &context_id).await?;
        }
        Ok(())
    }

    fn reset(&self, status: String) {
        let mut state = self.write();
        state.id = None;
        state.status = status;
    }

    fn read(&self) -> RwLockReadGuard<'_, ContextState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, ContextState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl RemoteContext for ContextManager {
    fn current_status(&self) -> String {
        self.read().status.clone()
    }

    fn context_id(&self) -> Option<String> {
        self.read().id.clone()
    }
}
