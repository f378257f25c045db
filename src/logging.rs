//! # Tracing Module
//!
//! Environment-aware console logging using the tracing ecosystem.
//! Designed for containerized applications where logs should go to
//! stdout/stderr.
//!
//! Log levels come from `RUST_LOG` when set, falling back to `CACHE_LOG`
//! and finally to `info`. Structured fields (key, provider, latency_ms)
//! are emitted on every cache operation so downstream collectors can
//! correlate degradation events with the operations around them.

use std::sync::OnceLock;
use tracing_subscriber::{fmt, EnvFilter};

static INIT: OnceLock<()> = OnceLock::new();

/// Initialize console logging once for the process
///
/// Safe to call multiple times; later calls are no-ops. Intended for
/// binaries and integration tests - library consumers that already install
/// their own subscriber should simply not call this.
pub fn init_logging() {
    INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_from_env("CACHE_LOG"))
            .unwrap_or_else(|_| EnvFilter::new("info"));

        let result = fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_ansi(std::io::IsTerminal::is_terminal(&std::io::stdout()))
            .try_init();

        // A pre-existing global subscriber is fine; keep whatever the host
        // application installed
        if result.is_err() {
            tracing::debug!("Global tracing subscriber already installed, skipping init");
        }
    });
}
