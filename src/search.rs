//! Search commands: `gfind find` and `gfind classes`.
//!
//! [`find`] and [`find_in`] are the library entry points shared by the CLI
//! and the HTTP server. They open the source, build the session, run the
//! core engine, and close the pool again.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use graphfind_core::models::{ComparisonOperator, ExtentMode, LogicalOperator, SearchableTable};
use graphfind_core::search::Session;
use graphfind_core::{SearchRequest, SearchableResponse};

use crate::config::Config;
use crate::parallel;
use crate::session::build_session;
use crate::sqlite_store::SqliteStore;

/// Overrides for a CLI search. `None` keeps the configured default.
#[derive(Debug, Default, Clone)]
pub struct FindOptions {
    /// Restricts the search to these inventory entries.
    pub items: Vec<String>,
    pub comparison: Option<ComparisonOperator>,
    pub logical: Option<LogicalOperator>,
    pub threshold: Option<usize>,
    pub extent: Option<ExtentMode>,
    pub source: Option<String>,
    /// Search items on concurrent tasks.
    pub parallel: bool,
    pub json: bool,
}

/// Runs `request` against the default source.
pub async fn find(config: &Config, request: &SearchRequest) -> Result<SearchableResponse> {
    let (name, _) = config.default_source()?;
    find_in(config, request, name).await
}

/// Runs `request` against the named source.
///
/// A request without items searches the configured inventory.
pub async fn find_in(
    config: &Config,
    request: &SearchRequest,
    source: &str,
) -> Result<SearchableResponse> {
    run(config, request, source, false).await
}

async fn run(
    config: &Config,
    request: &SearchRequest,
    source: &str,
    concurrent: bool,
) -> Result<SearchableResponse> {
    let mut request = request.clone();
    if request.items.is_empty() {
        request.items = config.inventory.clone();
    }

    let (store, session) = open_source(config, source).await?;
    let result = if concurrent {
        let store = Arc::new(store);
        let result =
            parallel::find_concurrent(Arc::clone(&store), Arc::new(session), &request).await;
        store.close().await;
        result
    } else {
        let result = graphfind_core::search::find(&store, &session, &request).await;
        store.close().await;
        result
    };
    result.with_context(|| format!("search in source '{}' failed", source))
}

async fn open_source(config: &Config, name: &str) -> Result<(SqliteStore, Session)> {
    let source = config.source(name)?;
    let store = SqliteStore::open(source).await?;
    let session = match build_session(&store, &config.session).await {
        Ok(session) => session,
        Err(e) => {
            store.close().await;
            return Err(e);
        }
    };
    Ok((store, session))
}

/// Handler for `gfind find`.
pub async fn run_find(config: &Config, keyword: &str, options: FindOptions) -> Result<()> {
    let mut request = config.request(keyword);
    if let Some(comparison) = options.comparison {
        request.comparison_operator = comparison;
    }
    if let Some(logical) = options.logical {
        request.logical_operator = logical;
    }
    if let Some(threshold) = options.threshold {
        request.threshold = threshold;
    }
    if let Some(extent) = options.extent {
        request.extent = extent;
    }
    if !options.items.is_empty() {
        request.items = select_items(&config.inventory, &options.items)?;
    }
    if request.items.is_empty() {
        bail!("nothing to search: add [[inventory]] entries to the config");
    }

    let source = match options.source.as_deref() {
        Some(name) => name.to_string(),
        None => config.default_source()?.0.to_string(),
    };
    let response = run(config, &request, &source, options.parallel).await?;

    if options.json {
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    if response.is_empty() {
        println!("No matches.");
        return Ok(());
    }
    for (name, oids) in response.iter() {
        let ids: Vec<String> = oids.iter().map(i64::to_string).collect();
        println!("{} ({}): {}", name, oids.len(), ids.join(", "));
    }
    println!();
    println!(
        "{} matches in {} classes.",
        response.count(),
        response.len()
    );
    if request.threshold > 0 && response.count() >= request.threshold {
        println!(
            "Stopped at the threshold of {}; narrow the keyword or raise --threshold.",
            request.threshold
        );
    }
    Ok(())
}

fn select_items(inventory: &[SearchableTable], names: &[String]) -> Result<Vec<SearchableTable>> {
    names
        .iter()
        .map(|name| {
            inventory
                .iter()
                .find(|item| item.name.eq_ignore_ascii_case(name))
                .cloned()
                .with_context(|| format!("'{}' is not in the [[inventory]]", name))
        })
        .collect()
}

/// Handler for `gfind classes`: lists registered classes and relationships.
pub async fn run_classes(config: &Config, source: Option<&str>) -> Result<()> {
    let name = match source {
        Some(name) => name,
        None => config.default_source()?.0,
    };
    let store = SqliteStore::open(config.source(name)?).await?;
    let classes = store.classes().await;
    let relationships = store.relationships().await;
    store.close().await;
    let (classes, relationships) = (classes?, relationships?);

    if classes.is_empty() {
        println!("No classes registered in '{}'.", name);
        return Ok(());
    }

    println!("Classes in '{}':", name);
    for class in &classes {
        let kind = if class.spatial { "feature" } else { "table" };
        print!("  {:<4} {:<24} {:<8}", class.id.0, class.name, kind);
        if !class.model_names.is_empty() {
            print!(" models: {}", class.model_names.join(", "));
        }
        println!();
    }

    if !relationships.is_empty() {
        println!();
        println!("Relationships:");
        for rel in &relationships {
            let origin = class_name(&classes, rel.origin.0);
            let destination = class_name(&classes, rel.destination.0);
            println!("  {:<4} {:<24} {} -> {}", rel.id, rel.name, origin, destination);
        }
    }
    Ok(())
}

fn class_name(classes: &[graphfind_core::store::ObjectClass], id: i64) -> String {
    classes
        .iter()
        .find(|c| c.id.0 == id)
        .map(|c| c.name.clone())
        .unwrap_or_else(|| format!("#{}", id))
}
