//! Remote execution traits

use async_trait::async_trait;

use crate::error::RemoteExecutionError;
use crate::types::ClusterId;

/// Context status that allows remote commands to run
pub const CONTEXT_RUNNING: &str = "running";

/// Runs a command body on the remote node and returns its captured output
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    async fn execute(
        &self,
        cluster_id: &ClusterId,
        context_id: &str,
        command: &str,
        verbose: bool,
    ) -> Result<String, RemoteExecutionError>;
}

/// Readiness of the remote execution context
pub trait RemoteContext: Send + Sync {
    /// Current status as reported by the service
    fn current_status(&self) -> String;

    /// Context commands should be executed in, once one exists
    fn context_id(&self) -> Option<String>;
}

/// Whether `context` reports the running sentinel and has an id
pub fn context_is_running(context: &dyn RemoteContext) -> bool {
    context.current_status().eq_ignore_ascii_case(CONTEXT_RUNNING) && context.context_id().is_some()
}
