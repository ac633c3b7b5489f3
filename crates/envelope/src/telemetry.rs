//! Tracing subscriber setup for binaries embedding the SDK.
//!
//! The library itself only emits `tracing` events; it never installs a
//! subscriber. No key material, plaintext, or signature is ever logged.

use anyhow::Result;
use tracing_subscriber::EnvFilter;

/// Initialise a JSON tracing subscriber at `log_level`.
///
/// `RUST_LOG`, when set, takes precedence over `log_level`.
///
/// # Errors
///
/// Returns an error if a global subscriber has already been set.
pub fn init(log_level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialise tracing subscriber: {e}"))
}
