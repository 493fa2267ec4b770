use std::io::{self, IsTerminal};

use anyhow::{Context, Result};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_FILTER: &str = "info";

/// `RUST_LOG` wins when set and valid, otherwise [`DEFAULT_FILTER`].
fn make_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Installs the global subscriber. Events go to stderr so that JSON written to
/// stdout by the CLI stays machine readable.
pub fn init_logging() -> Result<()> {
    let stderr_layer = fmt::layer()
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .with_target(false);

    tracing_subscriber::registry()
        .with(make_filter())
        .with(stderr_layer)
        .try_init()
        .context("failed to install tracing subscriber")
}
