//! Tracing subscriber setup.
//!
//! Logs go to stderr so `gfind find --json` output on stdout stays clean.
//! `RUST_LOG` overrides the configured level.

use anyhow::{anyhow, Result};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;

/// Installs the global subscriber.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let registry = tracing_subscriber::registry().with(build_env_filter(config));
    let result = if config.json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init()
    };
    result.map_err(|e| anyhow!("failed to install tracing subscriber: {}", e))
}

fn build_env_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives(&config.level)))
}

fn default_directives(level: &str) -> String {
    format!(
        "graphfind={level},graphfind_core={level},tower_http=debug,sqlx=warn",
        level = level
    )
}
