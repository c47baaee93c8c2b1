use std::io::IsTerminal;

use anyhow::{Context, Result};
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// `EnvFilter` directive overriding the level picked from `--verbose`/`--quiet`.
pub const LOG_ENV: &str = "GQLSCOPE_LOG";

pub fn level_for(verbose: bool, quiet: bool) -> Level {
    if quiet {
        Level::ERROR
    } else if verbose {
        Level::DEBUG
    } else {
        Level::WARN
    }
}

fn filter(verbose: bool, quiet: bool) -> Result<EnvFilter> {
    match std::env::var(LOG_ENV) {
        Ok(directive) if !directive.trim().is_empty() => {
            EnvFilter::try_new(directive.trim()).with_context(|| format!("invalid {LOG_ENV}"))
        }
        _ => Ok(EnvFilter::new(format!(
            "{}={}",
            env!("CARGO_CRATE_NAME"),
            level_for(verbose, quiet).as_str().to_ascii_lowercase()
        ))),
    }
}

/// Installs the stderr subscriber. Call once, before any scan work.
pub fn init(verbose: bool, quiet: bool) -> Result<()> {
    let filter = filter(verbose, quiet)?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialize logging: {e}"))
}
