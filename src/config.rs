//! TOML configuration.
//!
//! ```toml
//! [logging]
//! level = "info"
//!
//! [server]
//! bind = "127.0.0.1:7341"
//!
//! [search]
//! threshold = 200
//!
//! [sources.electric]
//! path = "./data/electric.sqlite"
//! default = true
//!
//! [session]
//! extent = [0.0, 0.0, 1000.0, 1000.0]
//!
//! [[session.layers]]
//! name = "Poles"
//! class = "Pole"
//!
//! [[inventory]]
//! name = "Pole"
//! is_feature_class = true
//! fields = [{ name = "FACILITYID" }]
//! ```
//!
//! See `config/gfind.example.toml` for every option.

use anyhow::{bail, Context, Result};
use graphfind_core::models::{ComparisonOperator, ExtentMode, LogicalOperator, SearchableTable};
use graphfind_core::{SearchError, SearchRequest};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub search: SearchDefaults,
    pub sources: BTreeMap<String, SourceConfig>,
    #[serde(default)]
    pub session: SessionConfig,
    /// Searchable tables used when a request names none.
    #[serde(default)]
    pub inventory: Vec<SearchableTable>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            json: false,
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7341".to_string()
}

/// Defaults applied to searches started from the CLI.
#[derive(Debug, Deserialize, Clone)]
pub struct SearchDefaults {
    #[serde(default = "default_threshold")]
    pub threshold: usize,
    #[serde(default)]
    pub comparison_operator: ComparisonOperator,
    #[serde(default)]
    pub logical_operator: LogicalOperator,
    #[serde(default)]
    pub extent: ExtentMode,
}

impl Default for SearchDefaults {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            comparison_operator: ComparisonOperator::default(),
            logical_operator: LogicalOperator::default(),
            extent: ExtentMode::default(),
        }
    }
}

fn default_threshold() -> usize {
    200
}

/// A SQLite geodatabase.
#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    pub path: PathBuf,
    #[serde(default)]
    pub default: bool,
}

/// The layers and tables a search runs against.
///
/// When no layers and no tables are listed, every registered class joins
/// the session: spatial classes as layers, the rest as tables.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct SessionConfig {
    /// Current view extent as `[xmin, ymin, xmax, ymax]`.
    #[serde(default)]
    pub extent: Option<[f64; 4]>,
    #[serde(default)]
    pub layers: Vec<LayerConfig>,
    #[serde(default)]
    pub tables: Vec<TableConfig>,
}

impl SessionConfig {
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty() && self.tables.is_empty()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LayerConfig {
    pub name: String,
    /// Physical name of the feature class the layer draws.
    pub class: String,
    #[serde(default = "default_true", alias = "visible")]
    pub valid: bool,
    #[serde(default)]
    pub definition: Option<String>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct TableConfig {
    pub name: String,
    /// Physical name of the table; defaults to `name`.
    #[serde(default)]
    pub class: Option<String>,
}

impl TableConfig {
    pub fn class_name(&self) -> &str {
        self.class.as_deref().unwrap_or(&self.name)
    }
}

impl Config {
    /// The source marked `default = true`, or the first one by name.
    pub fn default_source(&self) -> Result<(&str, &SourceConfig)> {
        self.sources
            .iter()
            .find(|(_, s)| s.default)
            .or_else(|| self.sources.iter().next())
            .map(|(name, source)| (name.as_str(), source))
            .context("no sources configured")
    }

    pub fn source(&self, name: &str) -> Result<&SourceConfig> {
        self.sources
            .get(name)
            .ok_or_else(|| SearchError::UnknownSource(name.to_string()).into())
    }

    /// A request seeded with the configured search defaults and inventory.
    pub fn request(&self, keyword: &str) -> SearchRequest {
        SearchRequest {
            keyword: keyword.to_string(),
            comparison_operator: self.search.comparison_operator,
            logical_operator: self.search.logical_operator,
            threshold: self.search.threshold,
            extent: self.search.extent,
            items: self.inventory.clone(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.sources.is_empty() {
        bail!("at least one [sources.<name>] entry is required");
    }

    let defaults: Vec<&str> = config
        .sources
        .iter()
        .filter(|(_, s)| s.default)
        .map(|(name, _)| name.as_str())
        .collect();
    if defaults.len() > 1 {
        bail!(
            "only one source may be marked default (found: {})",
            defaults.join(", ")
        );
    }

    for layer in &config.session.layers {
        if layer.class.trim().is_empty() {
            bail!("session layer '{}' must name a class", layer.name);
        }
    }

    // Same checks a live request goes through.
    let mut request = config.request("");
    request
        .prepare()
        .with_context(|| "invalid [[inventory]] configuration")?;

    Ok(())
}
