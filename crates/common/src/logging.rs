//! `tracing` bootstrap shared by every binary. No `println!`/`eprintln!`
//! anywhere else in the workspace's non-test code.

use tracing_subscriber::EnvFilter;

/// Installs a compact, env-filterable subscriber. Call once at the start
/// of `main`. `RUST_LOG` defaults to `info` if unset.
pub fn init(default_directive: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .compact()
        .try_init();
}
