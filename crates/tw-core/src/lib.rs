//! tw-core: Core abstractions and configuration for tunnel-watchdog
//!
//! This crate provides the shared types, error taxonomy, configuration,
//! collaborator traits and local persistence (connection registry and
//! private key storage) used by the reconciler and the CLI.

pub mod config;
pub mod error;
pub mod keys;
pub mod registry;
pub mod traits;
pub mod types;

pub use error::WatchdogError;
pub use types::{ClusterId, EstablishStep, ReconcilerStatus, TunnelInfo};
