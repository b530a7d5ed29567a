//! Command submission and polling

use std::time::Duration;

use async_trait::async_trait;

use tw_core::error::RemoteExecutionError;
use tw_core::traits::RemoteExecutor;
use tw_core::ClusterId;

use crate::api::{ApiClient, CommandResults, CommandStatus};

/// Delay between command status polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Runs commands through the execution API and waits for their results
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    api: ApiClient,
    poll_interval: Duration,
}

impl CommandExecutor {
    pub fn new(api: ApiClient) -> Self {
        Self {
            api,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

#[async_trait]
impl RemoteExecutor for CommandExecutor {
    async fn execute(
        &self,
        cluster_id: &ClusterId,
        context_id: &str,
        command: &str,
        verbose: bool,
    ) -> Result<String, RemoteExecutionError> {
        let command_id = self.api.execute(cluster_id, context_id, command).await?;
        tracing::debug!("Submitted command {} to {}/{}", command_id, cluster_id, context_id);

        loop {
            let status = self
                .api
                .command_status(cluster_id, context_id, &command_id)
                .await?;

            if let Some(outcome) = outcome(&status) {
                let output = outcome?;
                if verbose && !output.is_empty() {
                    tracing::info!("[{}] {}", cluster_id, output.trim_end());
                }
                return Ok(output);
            }

            tracing::trace!("Command {} is {}", command_id, status.status);
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

/// Final result of a command, or `None` while it is still in flight
pub fn outcome(status: &CommandStatus) -> Option<Result<String, RemoteExecutionError>> {
    match status.status.as_str() {
        "Finished" => Some(output_of(status.results.as_ref())),
        "Error" => Some(match output_of(status.results.as_ref()) {
            Ok(_) => Err(RemoteExecutionError::Failed(format!(
                "command {} ended in Error state",
                status.id
            ))),
            err => err,
        }),
        "Cancelled" => Some(Err(RemoteExecutionError::Cancelled)),
        _ => None,
    }
}

fn output_of(results: Option<&CommandResults>) -> Result<String, RemoteExecutionError> {
    let Some(results) = results else {
        return Ok(String::new());
    };

    if results.result_type == "error" {
        let message = results
            .cause
            .clone()
            .or_else(|| results.summary.clone())
            .unwrap_or_else(|| "unknown remote error".to_string());
        return Err(RemoteExecutionError::Failed(message));
    }

    Ok(match &results.data {
        None | Some(serde_json::Value::Null) => String::new(),
        Some(serde_json::Value::String(text)) => text.clone(),
        Some(other) => other.to_string(),
    })
}
