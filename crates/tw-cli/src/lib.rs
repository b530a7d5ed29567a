//! tw-cli: Command-line interface for tunnel-watchdog
//!
//! Provides the `tunnel-watchdog` binary that runs the reconciler for one
//! cluster and inspects or clears its recorded tunnel.

pub mod commands;
pub mod output;
