//! tw-remote: Client for the remote command-execution service
//!
//! Speaks the service's 1.2 REST API: execution contexts are created per
//! cluster, commands are submitted into a context and polled until they
//! reach a terminal state.

pub mod api;
pub mod context;
pub mod executor;

pub use api::{ApiClient, ApiError};
pub use context::ContextManager;
pub use executor::CommandExecutor;
