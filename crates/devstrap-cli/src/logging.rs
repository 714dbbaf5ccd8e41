use std::io;

use anyhow::{anyhow, Result};
use tracing_subscriber::{filter::EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

// Step progress is already on stdout; only contained failures are logged by default.
const DEFAULT_FILTER: &str = "warn";

/// Diagnostics go to stderr so stdout carries only the run report.
pub(crate) fn init_tracing() -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(DEFAULT_FILTER))
        .map_err(|err| anyhow!("invalid log filter: {err}"))?;

    let layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_writer(io::stderr)
        .with_target(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(layer)
        .try_init()
        .map_err(|err| anyhow!("failed to initialise logging: {err}"))
}
