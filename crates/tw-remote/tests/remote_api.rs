//! Execution API integration tests
//!
//! Runs the client against an in-process mock of the service.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

use tw_core::error::RemoteExecutionError;
use tw_core::traits::{context_is_running, RemoteContext, RemoteExecutor};
use tw_core::ClusterId;
use tw_remote::{ApiClient, CommandExecutor, ContextManager};

const TOKEN: &str = "dapi-test";

#[derive(Default)]
struct Mock {
    created: Mutex<u32>,
    destroyed: Mutex<Vec<String>>,
    /// Statuses handed out by contexts/status, last one repeats
    context_statuses: Mutex<Vec<&'static str>>,
    /// Polls a command stays Running before finishing
    running_polls: Mutex<u32>,
    /// Result for commands/status once finished
    result: Mutex<Value>,
    commands: Mutex<Vec<Value>>,
}

type Shared = Arc<Mock>;

fn authorized(headers: &HeaderMap) -> Result<(), StatusCode> {
    let expected = format!("Bearer {}", TOKEN);
    match headers.get("authorization").and_then(|v| v.to_str().ok()) {
        Some(value) if value == expected => Ok(()),
        _ => Err(StatusCode::UNAUTHORIZED),
    }
}

async fn create_context(
    State(mock): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Json<Value>, StatusCode> {
    authorized(&headers)?;
    assert_eq!(body["language"], "python");
    assert_eq!(body["clusterId"], "cluster-1");
    let mut created = mock.created.lock().unwrap();
    *created += 1;
    Ok(Json(json!({ "id": format!("ctx-{}", created) })))
}

async fn context_status(
    State(mock): State<Shared>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Result<(StatusCode, Json<Value>), StatusCode> {
    authorized(&headers)?;
    let mut statuses = mock.context_statuses.lock().unwrap();
    let status = if statuses.len() > 1 {
        statuses.remove(0)
    } else {
        statuses.first().copied().unwrap_or("Running")
    };
    if status == "missing" {
        return Ok((
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "ContextNotFound: no such context" })),
        ));
    }
    Ok((
        StatusCode::OK,
        Json(json!({ "id": query["contextId"], "status": status })),
    ))
}

async fn destroy_context(
    State(mock): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Json<Value>, StatusCode> {
    authorized(&headers)?;
    let id = body["contextId"].as_str().unwrap_or_default().to_string();
    mock.destroyed.lock().unwrap().push(id.clone());
    Ok(Json(json!({ "id": id })))
}

async fn execute(
    State(mock): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Json<Value>, StatusCode> {
    authorized(&headers)?;
    mock.commands.lock().unwrap().push(body);
    Ok(Json(json!({ "id": "cmd-1" })))
}

async fn command_status(
    State(mock): State<Shared>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<Value>, StatusCode> {
    authorized(&headers)?;
    assert_eq!(query["commandId"], "cmd-1");
    let mut running = mock.running_polls.lock().unwrap();
    if *running > 0 {
        *running -= 1;
        return Ok(Json(json!({ "id": "cmd-1", "status": "Running" })));
    }
    let result = mock.result.lock().unwrap().clone();
    Ok(Json(json!({ "id": "cmd-1", "status": "Finished", "results": result })))
}

/// Serve the mock on an ephemeral port and return its base URL
async fn serve(mock: Shared) -> String {
    let app = Router::new()
        .route("/api/1.2/contexts/create", post(create_context))
        .route("/api/1.2/contexts/status", get(context_status))
        .route("/api/1.2/contexts/destroy", post(destroy_context))
        .route("/api/1.2/commands/execute", post(execute))
        .route("/api/1.2/commands/status", get(command_status))
        .with_state(mock);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", address)
}

fn cluster() -> ClusterId {
    ClusterId::new("cluster-1")
}

#[tokio::test]
async fn test_execute_polls_until_finished() {
    let mock = Arc::new(Mock::default());
    *mock.running_polls.lock().unwrap() = 2;
    *mock.result.lock().unwrap() = json!({ "resultType": "text", "data": "tcp://4.tcp.ngrok.io:1234\n" });
    let base = serve(Arc::clone(&mock)).await;

    let executor = CommandExecutor::new(ApiClient::new(base, TOKEN).unwrap())
        .with_poll_interval(Duration::from_millis(10));
    let output = executor
        .execute(&cluster(), "ctx-1", "print(ssh_url)", false)
        .await
        .unwrap();

    assert_eq!(output, "tcp://4.tcp.ngrok.io:1234\n");
    let commands = mock.commands.lock().unwrap();
    assert_eq!(commands.len(), 1);
    assert_eq!(commands[0]["command"], "print(ssh_url)");
    assert_eq!(commands[0]["contextId"], "ctx-1");
    assert_eq!(*mock.running_polls.lock().unwrap(), 0);
}

#[tokio::test]
async fn test_execute_error_result_fails() {
    let mock = Arc::new(Mock::default());
    *mock.result.lock().unwrap() = json!({ "resultType": "error", "cause": "NameError: name 'ssh_url' is not defined" });
    let base = serve(mock).await;

    let executor = CommandExecutor::new(ApiClient::new(base, TOKEN).unwrap());
    let err = executor
        .execute(&cluster(), "ctx-1", "print(ssh_url)", true)
        .await
        .unwrap_err();

    match err {
        RemoteExecutionError::Failed(message) => assert!(message.contains("NameError")),
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test]
async fn test_rejected_token_is_service_error() {
    let base = serve(Arc::new(Mock::default())).await;

    let executor = CommandExecutor::new(ApiClient::new(base, "wrong").unwrap());
    let err = executor
        .execute(&cluster(), "ctx-1", "1", false)
        .await
        .unwrap_err();

    assert!(matches!(err, RemoteExecutionError::Service(ref m) if m.contains("401")));
}

#[tokio::test]
async fn test_context_created_then_running() {
    let mock = Arc::new(Mock::default());
    *mock.context_statuses.lock().unwrap() = vec!["Pending", "Running"];
    let base = serve(Arc::clone(&mock)).await;
    let manager = ContextManager::new(ApiClient::new(base, TOKEN).unwrap(), cluster());

    manager.refresh().await.unwrap();
    assert_eq!(manager.context_id().as_deref(), Some("ctx-1"));
    assert!(!context_is_running(&manager));

    manager.refresh().await.unwrap();
    assert_eq!(manager.current_status(), "Pending");

    manager.refresh().await.unwrap();
    assert!(context_is_running(&manager));
    assert_eq!(*mock.created.lock().unwrap(), 1);
}

#[tokio::test]
async fn test_failed_context_is_recreated() {
    let mock = Arc::new(Mock::default());
    *mock.context_statuses.lock().unwrap() = vec!["Error", "Running"];
    let base = serve(Arc::clone(&mock)).await;
    let manager = ContextManager::new(ApiClient::new(base, TOKEN).unwrap(), cluster());

    manager.refresh().await.unwrap();
    manager.refresh().await.unwrap();
    assert!(manager.context_id().is_none());
    assert!(!context_is_running(&manager));

    manager.refresh().await.unwrap();
    assert_eq!(manager.context_id().as_deref(), Some("ctx-2"));
}

#[tokio::test]
async fn test_vanished_context_is_recreated() {
    let mock = Arc::new(Mock::default());
    *mock.context_statuses.lock().unwrap() = vec!["missing", "Running"];
    let base = serve(Arc::clone(&mock)).await;
    let manager = ContextManager::new(ApiClient::new(base, TOKEN).unwrap(), cluster());

    manager.refresh().await.unwrap();
    manager.refresh().await.unwrap();
    assert!(manager.context_id().is_none());

    manager.refresh().await.unwrap();
    manager.refresh().await.unwrap();
    assert!(context_is_running(&manager));
    assert_eq!(*mock.created.lock().unwrap(), 2);
}

#[tokio::test]
async fn test_monitor_and_shutdown() {
    let mock = Arc::new(Mock::default());
    let base = serve(Arc::clone(&mock)).await;
    let manager = ContextManager::new(ApiClient::new(base, TOKEN).unwrap(), cluster())
        .with_poll_interval(Duration::from_millis(10));

    let cancel = tokio_util::sync::CancellationToken::new();
    let handle = manager.spawn_monitor(cancel.clone());

    tokio::time::timeout(Duration::from_secs(5), async {
        while !context_is_running(&manager) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    cancel.cancel();
    handle.await.unwrap();

    manager.shutdown().await.unwrap();
    assert_eq!(mock.destroyed.lock().unwrap().as_slice(), ["ctx-1"]);
    assert!(manager.context_id().is_none());
}
