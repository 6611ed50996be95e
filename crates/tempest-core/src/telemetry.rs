//! Installs the workspace's `tracing` subscriber. Every connection-carrying
//! crate (`tempest-frame`, `tempest-session`, `tempest-client`,
//! `tempest-server`) emits `tracing::{debug,warn,error}` spans tagged with
//! `connection_id`; this module is the single place that wires those spans
//! to an output.

use tracing_subscriber::EnvFilter;

/// Installs a global `tracing` subscriber driven by `RUST_LOG` (defaulting
/// to `info` when unset). Safe to call more than once per process; later
/// calls are no-ops.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
