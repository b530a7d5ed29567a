//! tw-tunnel: Self-healing SSH tunnel to a remote compute node
//!
//! The reconciler keeps exactly one tunnel healthy per cluster. It probes the
//! known tunnel over SSH and, when the probe fails, provisions a new one by
//! running bootstrap commands on the node through the remote executor.

pub mod bootstrap;
pub mod reconciler;
pub mod transport;
pub mod url;

pub use bootstrap::{RemoteBootstrapper, RemoteCommand};
pub use reconciler::{Collaborators, TunnelReconciler};
pub use transport::SshTransport;
pub use url::parse_tunnel_url;
