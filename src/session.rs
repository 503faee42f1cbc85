//! Builds a [`Session`] from the `[session]` config table.

use anyhow::Result;
use graphfind_core::geometry::Envelope;
use graphfind_core::search::{Layer, Session, StandaloneTable};
use graphfind_core::store::Store;
use tracing::{debug, warn};

use crate::config::SessionConfig;
use crate::sqlite_store::SqliteStore;

/// Resolves configured layer and table class names against `store`.
///
/// Entries naming an unregistered class are skipped with a warning. An
/// empty config puts every registered class in the session: spatial classes
/// as layers, the rest as tables.
pub async fn build_session(store: &SqliteStore, config: &SessionConfig) -> Result<Session> {
    let extent = config.extent.map(Envelope::from);

    if config.is_empty() {
        let mut session = Session {
            extent,
            ..Session::default()
        };
        for class in store.classes().await? {
            if class.spatial {
                session.layers.push(Layer::new(class.name.clone(), class.id));
            } else {
                session
                    .tables
                    .push(StandaloneTable::new(class.name.clone(), class.id));
            }
        }
        debug!(
            layers = session.layers.len(),
            tables = session.tables.len(),
            "session discovered from registered classes"
        );
        return Ok(session);
    }

    let mut layers = Vec::with_capacity(config.layers.len());
    for layer in &config.layers {
        let Some(class) = store.find_class(&layer.class).await? else {
            warn!(layer = %layer.name, class = %layer.class, "layer class not registered, skipping");
            continue;
        };
        layers.push(Layer {
            name: layer.name.clone(),
            class: class.id,
            valid: layer.valid,
            definition: layer.definition.clone(),
        });
    }

    let mut tables = Vec::with_capacity(config.tables.len());
    for table in &config.tables {
        let Some(class) = store.find_class(table.class_name()).await? else {
            warn!(table = %table.name, class = %table.class_name(), "table class not registered, skipping");
            continue;
        };
        tables.push(StandaloneTable::new(table.name.clone(), class.id));
    }

    Ok(Session {
        layers,
        tables,
        extent,
    })
}
