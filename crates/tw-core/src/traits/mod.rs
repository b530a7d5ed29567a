//! Collaborator trait definitions

mod keys;
mod registry;
mod remote;
mod transport;

pub use keys::{GeneratedKeyPair, KeyPairGenerator};
pub use registry::ConnectionRegistry;
pub use remote::{context_is_running, RemoteContext, RemoteExecutor, CONTEXT_RUNNING};
pub use transport::{Transport, TransportSession};
