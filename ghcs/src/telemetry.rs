// Copyright (c) 2024 Botho Foundation

//! Log output configuration.
//!
//! The filter is taken from `RUST_LOG` when set, otherwise from the
//! configured level:
//!
//! ```toml
//! [logging]
//! level = "info"   # trace | debug | info | warn | error, or a full directive
//! ```

use anyhow::{anyhow, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Build the filter: `RUST_LOG`, else `level`, else `info`. `verbose` raises
/// the configured level to `debug`.
pub fn build_filter(level: &str, verbose: bool) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }

    let directive = match (verbose, level.trim()) {
        (true, _) => "debug",
        (false, "") => "info",
        (false, level) => level,
    };
    EnvFilter::try_new(directive).map_err(|e| anyhow!("Invalid log level '{}': {}", directive, e))
}

/// Install the global subscriber. Logs go to stderr so command output on
/// stdout stays clean.
pub fn init_tracing(level: &str, verbose: bool) -> Result<()> {
    let filter = build_filter(level, verbose)?;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(filter);

    tracing_subscriber::registry()
        .with(fmt_layer)
        .try_init()
        .map_err(|e| anyhow!("Failed to install tracing subscriber: {}", e))
}
