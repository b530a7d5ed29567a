//! Command implementations for the tunnel-watchdog CLI

mod config;
mod registry;
mod watch;

pub use config::{config_init, load_or_default};
pub use registry::{forget, show};
pub use watch::watch;
