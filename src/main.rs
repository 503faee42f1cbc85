//! # graphfind CLI (`gfind`)
//!
//! ## Usage
//!
//! ```bash
//! gfind --config ./config/gfind.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `gfind init` | Create the class and relationship registry in every source |
//! | `gfind classes` | List registered classes and relationship classes |
//! | `gfind find "<keyword>"` | Search the configured inventory |
//! | `gfind serve` | Start the HTTP service |
//!
//! ## Examples
//!
//! ```bash
//! # Search poles and everything related to them for "123"
//! gfind find 123
//!
//! # Exact matches on one inventory entry, as JSON
//! gfind find SN-123-A --item PoleUnit --operator equals --json
//!
//! # Only features inside the configured view extent
//! gfind find 123 --extent within
//! ```

use clap::{Parser, Subcommand};
use graphfind::config::{self, Config};
use graphfind::search::FindOptions;
use graphfind::{logging, migrate, search, server};
use graphfind_core::models::{ComparisonOperator, ExtentMode, LogicalOperator};
use std::path::PathBuf;

/// graphfind: keyword search across geodatabase tables, layers, and
/// relationship graphs.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/gfind.example.toml` for a full example.
#[derive(Parser)]
#[command(name = "gfind", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/gfind.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the class and relationship registry in every configured source.
    ///
    /// Idempotent.
    Init,

    /// List registered classes and relationship classes.
    Classes {
        /// Source to inspect (default: the default source).
        #[arg(long)]
        source: Option<String>,
    },

    /// Search for a keyword.
    Find {
        keyword: String,

        /// Restrict to an inventory entry (repeatable).
        #[arg(long = "item")]
        items: Vec<String>,

        /// Comparison: contains, starts-with, ends-with, equals.
        #[arg(long, value_parser = parse_comparison)]
        operator: Option<ComparisonOperator>,

        /// Combinator between keyword fields: and, or.
        #[arg(long, value_parser = parse_logical)]
        logical: Option<LogicalOperator>,

        /// Stop after this many matches (0 = unlimited).
        #[arg(long)]
        threshold: Option<usize>,

        /// Extent filter: any, within, overlapping.
        #[arg(long, value_parser = parse_extent)]
        extent: Option<ExtentMode>,

        /// Source to search (default: the default source).
        #[arg(long)]
        source: Option<String>,

        /// Search inventory entries on concurrent tasks.
        #[arg(long)]
        parallel: bool,

        /// Print the response as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Start the HTTP service.
    Serve {
        /// Overrides `[server].bind`.
        #[arg(long)]
        bind: Option<String>,
    },
}

fn parse_comparison(s: &str) -> Result<ComparisonOperator, String> {
    match s.to_ascii_lowercase().replace('_', "-").as_str() {
        "contains" => Ok(ComparisonOperator::Contains),
        "starts-with" | "startswith" => Ok(ComparisonOperator::StartsWith),
        "ends-with" | "endswith" => Ok(ComparisonOperator::EndsWith),
        "equals" => Ok(ComparisonOperator::Equals),
        _ => Err(format!(
            "unknown operator '{}' (contains, starts-with, ends-with, equals)",
            s
        )),
    }
}

fn parse_logical(s: &str) -> Result<LogicalOperator, String> {
    match s.to_ascii_lowercase().as_str() {
        "and" => Ok(LogicalOperator::And),
        "or" => Ok(LogicalOperator::Or),
        _ => Err(format!("unknown logical operator '{}' (and, or)", s)),
    }
}

fn parse_extent(s: &str) -> Result<ExtentMode, String> {
    match s.to_ascii_lowercase().as_str() {
        "any" => Ok(ExtentMode::WithinAnyExtent),
        "within" | "current" => Ok(ExtentMode::WithinCurrentExtent),
        "overlapping" => Ok(ExtentMode::WithinCurrentOrOverlappingExtent),
        _ => Err(format!("unknown extent '{}' (any, within, overlapping)", s)),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut cfg: Config = config::load_config(&cli.config)?;
    logging::init_logging(&cfg.logging)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Classes { source } => {
            search::run_classes(&cfg, source.as_deref()).await?;
        }
        Commands::Find {
            keyword,
            items,
            operator,
            logical,
            threshold,
            extent,
            source,
            parallel,
            json,
        } => {
            let options = FindOptions {
                items,
                comparison: operator,
                logical,
                threshold,
                extent,
                source,
                parallel,
                json,
            };
            search::run_find(&cfg, &keyword, options).await?;
        }
        Commands::Serve { bind } => {
            if let Some(bind) = bind {
                cfg.server.bind = bind;
            }
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
