//! The `watch` command: run the reconciler until interrupted

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::output::{describe_status, print_info, print_warning};
use tw_core::config::WatchdogConfig;
use tw_core::keys::{KeyStore, RsaKeyPairGenerator};
use tw_core::registry::SshConfigRegistry;
use tw_core::{ClusterId, ReconcilerStatus};
use tw_remote::{ApiClient, CommandExecutor, ContextManager};
use tw_tunnel::{Collaborators, SshTransport, TunnelReconciler};

/// Keep `cluster_id`'s tunnel healthy until Ctrl+C or SIGTERM
pub async fn watch(config: &WatchdogConfig, cluster_id: ClusterId) -> Result<()> {
    if config.workspace_url.trim().is_empty() {
        bail!("workspace_url is not set; run 'tunnel-watchdog init' and edit the config");
    }
    let api_token = std::env::var(&config.api_token_env)
        .with_context(|| format!("Environment variable {} is not set", config.api_token_env))?;
    if std::env::var_os(&config.tunnel_token_env).is_none() {
        print_warning(&format!(
            "{} is not set; tunnel establishment will fail until it is",
            config.tunnel_token_env
        ));
    }

    let api = ApiClient::new(config.workspace_url.as_str(), api_token)
        .context("Failed to build HTTP client")?;
    let context = ContextManager::new(api.clone(), cluster_id.clone())
        .with_poll_interval(config.context_wait_interval);

    let ssh_config_path = config.resolved_ssh_config_path();
    let registry = SshConfigRegistry::open(&ssh_config_path)
        .with_context(|| format!("Failed to open registry {:?}", ssh_config_path))?
        .with_login_user(&config.login_user);

    let collaborators = Collaborators {
        executor: Arc::new(CommandExecutor::new(api)),
        context: Arc::new(context.clone()),
        transport: Arc::new(SshTransport::new(&config.login_user)),
        keygen: Arc::new(RsaKeyPairGenerator::new()),
        registry: Box::new(registry),
    };

    let mut reconciler = TunnelReconciler::new(
        cluster_id.clone(),
        collaborators,
        KeyStore::new(config.resolved_ssh_dir()),
        config.reconciler_settings(),
    );

    let cancel = CancellationToken::new();
    spawn_signal_handler(cancel.clone());
    let monitor = context.spawn_monitor(cancel.clone());
    let reporter = spawn_status_reporter(cluster_id.clone(), reconciler.subscribe(), cancel.clone());

    print_info(&format!("Watching tunnel for {} (Ctrl+C to stop)", cluster_id));
    reconciler.run(cancel.clone()).await;

    cancel.cancel();
    if let Err(e) = monitor.await {
        tracing::warn!("Context monitor ended abnormally: {}", e);
    }
    if let Err(e) = reporter.await {
        tracing::warn!("Status reporter ended abnormally: {}", e);
    }
    if let Err(e) = context.shutdown().await {
        tracing::warn!("Failed to destroy execution context: {}", e);
    }

    Ok(())
}

/// Cancel `cancel` on Ctrl+C or SIGTERM
fn spawn_signal_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        let terminate = async {
            use tokio::signal::unix::{signal, SignalKind};
            match signal(SignalKind::terminate()) {
                Ok(mut stream) => {
                    stream.recv().await;
                }
                Err(e) => {
                    tracing::warn!("Failed to install SIGTERM handler: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                tracing::info!("Received Ctrl+C, initiating shutdown...");
            }
            _ = terminate => {
                tracing::info!("Received SIGTERM, initiating shutdown...");
            }
            _ = cancel.cancelled() => return,
        }

        cancel.cancel();
    });
}

/// Print phase changes until cancelled, skipping routine re-probes
fn spawn_status_reporter(
    cluster_id: ClusterId,
    mut status: watch::Receiver<ReconcilerStatus>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut printed = *status.borrow_and_update();
        loop {
            tokio::select! {
                changed = status.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let current = *status.borrow_and_update();
                    if current.is_news_after(printed) {
                        print_info(&format!("{}: {}", cluster_id, describe_status(current)));
                        printed = current;
                    }
                }
                _ = cancel.cancelled() => break,
            }
        }
    })
}
