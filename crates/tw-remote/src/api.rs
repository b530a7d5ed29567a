//! REST client for the command-execution API

use std::fmt;
use std::time::Duration;

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use tw_core::error::RemoteExecutionError;
use tw_core::ClusterId;

/// Path prefix of the supported API version
pub const API_PREFIX: &str = "api/1.2";

/// Interpreter commands are executed with
pub const LANGUAGE: &str = "python";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Errors from the execution service
#[derive(Debug, Error)]
pub enum ApiError {
    /// Request could not be sent or the response not decoded
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Service answered with a non-success status
    #[error("{endpoint} returned {status}: {body}")]
    Status {
        endpoint: String,
        status: StatusCode,
        body: String,
    },
}

impl ApiError {
    /// Whether the service reported the resource as missing
    pub fn is_not_found(&self) -> bool {
        match self {
            ApiError::Status { status, body, .. } => {
                *status == StatusCode::NOT_FOUND || body.contains("ContextNotFound")
            }
            ApiError::Http(_) => false,
        }
    }
}

impl From<ApiError> for RemoteExecutionError {
    fn from(e: ApiError) -> Self {
        RemoteExecutionError::Service(e.to_string())
    }
}

#[derive(Debug, Deserialize)]
struct IdResponse {
    id: String,
}

/// Execution context as reported by the service
#[derive(Debug, Clone, Deserialize)]
pub struct ContextStatus {
    pub id: String,
    pub status: String,
}

/// Command state as reported by the service
#[derive(Debug, Clone, Deserialize)]
pub struct CommandStatus {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub results: Option<CommandResults>,
}

/// Result payload of a finished command
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResults {
    pub result_type: String,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
    #[serde(default)]
    pub cause: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateContext<'a> {
    language: &'a str,
    cluster_id: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DestroyContext<'a> {
    cluster_id: &'a str,
    context_id: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ExecuteCommand<'a> {
    language: &'a str,
    cluster_id: &'a str,
    context_id: &'a str,
    command: &'a str,
}

/// Authenticated client bound to one workspace
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .field("token", &"<redacted>")
            .finish()
    }
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(format!("tunnel-watchdog/{}", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Create an execution context and return its id
    pub async fn create_context(&self, cluster_id: &ClusterId) -> Result<String, ApiError> {
        let body = CreateContext {
            language: LANGUAGE,
            cluster_id: cluster_id.as_str(),
        };
        let created: IdResponse = self.post("contexts/create", &body).await?;
        Ok(created.id)
    }

    pub async fn context_status(
        &self,
        cluster_id: &ClusterId,
        context_id: &str,
    ) -> Result<ContextStatus, ApiError> {
        self.get(
            "contexts/status",
            &[("clusterId", cluster_id.as_str()), ("contextId", context_id)],
        )
        .await
    }

    pub async fn destroy_context(
        &self,
        cluster_id: &ClusterId,
        context_id: &str,
    ) -> Result<(), ApiError> {
        let body = DestroyContext {
            cluster_id: cluster_id.as_str(),
            context_id,
        };
        let _: serde_json::Value = self.post("contexts/destroy", &body).await?;
        Ok(())
    }

    /// Submit a command and return its id
    pub async fn execute(
        &self,
        cluster_id: &ClusterId,
        context_id: &str,
        command: &str,
    ) -> Result<String, ApiError> {
        let body = ExecuteCommand {
            language: LANGUAGE,
            cluster_id: cluster_id.as_str(),
            context_id,
            command,
        };
        let submitted: IdResponse = self.post("commands/execute", &body).await?;
        Ok(submitted.id)
    }

    pub async fn command_status(
        &self,
        cluster_id: &ClusterId,
        context_id: &str,
        command_id: &str,
    ) -> Result<CommandStatus, ApiError> {
        self.get(
            "commands/status",
            &[
                ("clusterId", cluster_id.as_str()),
                ("contextId", context_id),
                ("commandId", command_id),
            ],
        )
        .await
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{}/{}", self.base_url, API_PREFIX, endpoint)
    }

    async fn get<R: DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &[(&str, &str)],
    ) -> Result<R, ApiError> {
        let response = self
            .http
            .get(self.url(endpoint))
            .bearer_auth(&self.token)
            .query(query)
            .send()
            .await?;
        Self::decode(endpoint, response).await
    }

    async fn post<B: Serialize, R: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<R, ApiError> {
        let response = self
            .http
            .post(self.url(endpoint))
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await?;
        Self::decode(endpoint, response).await
    }

    async fn decode<R: DeserializeOwned>(
        endpoint: &str,
        response: reqwest::Response,
    ) -> Result<R, ApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Status {
                endpoint: endpoint.to_string(),
                status,
                body,
            });
        }
        Ok(response.json().await?)
    }
}
