//! Terminal output for the CLI
//!
//! Tables for recorded tunnels and colored one-line status messages.

use std::io::Write;

use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};
use tabled::{settings::Style, Table, Tabled};

use tw_core::{ClusterId, ReconcilerStatus, TunnelInfo};

/// Format a registry entry as a one-row table
pub fn format_tunnel(cluster_id: &ClusterId, info: &TunnelInfo, login_user: &str) -> String {
    #[derive(Tabled)]
    struct TunnelRow {
        #[tabled(rename = "CLUSTER")]
        cluster: String,
        #[tabled(rename = "HOST")]
        host: String,
        #[tabled(rename = "PORT")]
        port: u16,
        #[tabled(rename = "USER")]
        user: String,
        #[tabled(rename = "IDENTITY FILE")]
        identity_file: String,
    }

    let row = TunnelRow {
        cluster: cluster_id.to_string(),
        host: info.host().to_string(),
        port: info.port(),
        user: login_user.to_string(),
        identity_file: info.private_key_file().display().to_string(),
    };

    Table::new([row]).with(Style::rounded()).to_string()
}

/// One-line description of a reconciler phase
pub fn describe_status(status: ReconcilerStatus) -> &'static str {
    match status {
        ReconcilerStatus::Initializing => "starting up",
        ReconcilerStatus::WaitingForContext => "waiting for the execution context",
        ReconcilerStatus::CheckingCachedTunnel => "checking the recorded tunnel",
        ReconcilerStatus::EstablishingPlain => "establishing a new tunnel",
        ReconcilerStatus::Running => "tunnel is healthy",
        ReconcilerStatus::TunnelUnreachableReinitializing => {
            "tunnel unreachable, establishing a replacement"
        }
    }
}

fn print_prefixed(mut out: impl Write, color: Color, prefix: &str, msg: &str) {
    let _ = crossterm::execute!(
        out,
        SetForegroundColor(color),
        Print(prefix),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print a success message in green with a checkmark prefix
pub fn print_success(msg: &str) {
    print_prefixed(std::io::stdout(), Color::Green, "✓ ", msg);
}

/// Print a warning message to stderr in yellow
pub fn print_warning(msg: &str) {
    print_prefixed(std::io::stderr(), Color::Yellow, "⚠ ", msg);
}

/// Print an informational message in cyan
pub fn print_info(msg: &str) {
    print_prefixed(std::io::stdout(), Color::Cyan, "ℹ ", msg);
}
