//! Keyword search across layers, tables, and relationship graphs.
//!
//! The engine operates entirely through the [`Store`] trait. The calling
//! application describes the active map with a [`Session`], passes a
//! [`SearchRequest`], and receives a [`SearchableResponse`] keyed by class
//! name.
//!
//! # Algorithm
//!
//! 1. Resolve the session once into a [`Catalog`]: valid layers deduplicated
//!    by class identity, standalone tables deduplicated by name.
//! 2. For every feature-class item, query each matching layer with the
//!    compiled expression (conjoined with the layer definition) and record
//!    the matches, then traverse the item's relationships.
//! 3. For every table item, query each matching table and attach each match
//!    to the layers its relationship paths lead to, then traverse.
//! 4. Traversal searches the related class with the relationship's own
//!    fields and walks each match back up its path (`attach`) until it
//!    reaches a row of a layer's class, which is recorded under that layer.
//!
//! The walk is depth-first and bounded by the depth of the request's
//! relationship tree, which [`SearchRequest::prepare`] caps.
//!
//! # Cancellation
//!
//! The [`Cancellation`] token is polled before every query, after every
//! related record, and before every recursive descent. The engine trips it
//! itself once the recorder reaches the request threshold; callers may trip
//! it externally. An in-flight store call is never interrupted.

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::expression;
use crate::geometry::Envelope;
use crate::models::{
    ExtentMode, SearchRequest, SearchableField, SearchableRelationship, SearchableResponse,
    SearchableTable, Selector,
};
use crate::recorder::{Admission, Cancellation, Recorder, ResponseRecorder};
use crate::store::{ClassId, ObjectClass, RelationshipClass, Row, Store};

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A feature layer in the active map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    /// Display name.
    pub name: String,
    pub class: ClassId,
    /// Invalid layers (broken data source) are ignored.
    #[serde(default = "default_true")]
    pub valid: bool,
    /// Definition query restricting the features the layer shows.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub definition: Option<String>,
}

impl Layer {
    pub fn new(name: impl Into<String>, class: ClassId) -> Self {
        Self {
            name: name.into(),
            class,
            valid: true,
            definition: None,
        }
    }

    pub fn with_definition(mut self, definition: impl Into<String>) -> Self {
        self.definition = Some(definition.into());
        self
    }
}

fn default_true() -> bool {
    true
}

/// A non-spatial table in the active map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StandaloneTable {
    pub name: String,
    pub class: ClassId,
}

impl StandaloneTable {
    pub fn new(name: impl Into<String>, class: ClassId) -> Self {
        Self {
            name: name.into(),
            class,
        }
    }
}

/// The display context a search runs against.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Session {
    #[serde(default)]
    pub layers: Vec<Layer>,
    #[serde(default)]
    pub tables: Vec<StandaloneTable>,
    /// Current view extent, used by the extent modes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extent: Option<Envelope>,
}

#[derive(Debug, Clone)]
pub struct LayerEntry {
    pub layer: Layer,
    pub class: ObjectClass,
}

#[derive(Debug, Clone)]
pub struct TableEntry {
    pub table: StandaloneTable,
    pub class: ObjectClass,
}

/// A session with every layer and table resolved to its class.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    pub layers: Vec<LayerEntry>,
    pub tables: Vec<TableEntry>,
    pub extent: Option<Envelope>,
}

impl Catalog {
    /// Resolves the session against the store.
    ///
    /// Layers and tables whose class no longer exists are skipped.
    pub async fn load<S: Store + ?Sized>(store: &S, session: &Session) -> Result<Self> {
        let mut layers = Vec::new();
        let mut seen_classes = HashSet::new();
        for layer in session.layers.iter().filter(|l| l.valid) {
            if !seen_classes.insert(layer.class) {
                continue;
            }
            match store.object_class(layer.class).await? {
                Some(class) => layers.push(LayerEntry {
                    layer: layer.clone(),
                    class,
                }),
                None => debug!(layer = %layer.name, class = layer.class.0, "layer class missing, skipping"),
            }
        }

        let mut tables = Vec::new();
        let mut seen_names = HashSet::new();
        for table in &session.tables {
            if !seen_names.insert(table.name.as_str()) {
                continue;
            }
            match store.object_class(table.class).await? {
                Some(class) => tables.push(TableEntry {
                    table: table.clone(),
                    class,
                }),
                None => debug!(table = %table.name, class = table.class.0, "table class missing, skipping"),
            }
        }

        Ok(Self {
            layers,
            tables,
            extent: session.extent,
        })
    }

    /// The layer showing the far side of `relationship`, as seen from `class`,
    /// stored in the same database as the relationship class.
    async fn relationship_layer<S: Store + ?Sized>(
        &self,
        store: &S,
        class: &ObjectClass,
        relationship: &RelationshipClass,
    ) -> Result<Option<&LayerEntry>> {
        let Some(other) = store.object_class(relationship.other_side(class.id)).await? else {
            return Ok(None);
        };
        Ok(self.layers.iter().find(|entry| {
            entry.class.name.eq_ignore_ascii_case(&other.name)
                && store.is_same_database(&relationship.workspace, &entry.class.workspace)
        }))
    }
}

fn item_matches(item: &SearchableTable, class: &ObjectClass) -> bool {
    if item.name_as_class_model_name && class.has_model_name(&item.name) {
        return true;
    }
    class.name.eq_ignore_ascii_case(&item.name)
}

/// Runs one search over a resolved [`Catalog`].
///
/// The request must already be [prepared](SearchRequest::prepare).
pub struct Searcher<'a, S: Store + ?Sized, R: Recorder> {
    store: &'a S,
    catalog: &'a Catalog,
    request: &'a SearchRequest,
    recorder: &'a mut R,
    token: &'a Cancellation,
}

impl<'a, S: Store + ?Sized, R: Recorder> Searcher<'a, S, R> {
    pub fn new(
        store: &'a S,
        catalog: &'a Catalog,
        request: &'a SearchRequest,
        recorder: &'a mut R,
        token: &'a Cancellation,
    ) -> Self {
        Self {
            store,
            catalog,
            request,
            recorder,
            token,
        }
    }

    /// Searches every item: feature classes first, then tables.
    pub async fn run(&mut self) -> Result<()> {
        let request = self.request;
        let features = request.items.iter().filter(|i| i.is_feature_class);
        let tables = request.items.iter().filter(|i| !i.is_feature_class);
        for item in features.chain(tables) {
            if self.cancelled() {
                break;
            }
            self.search_item(item).await?;
        }
        Ok(())
    }

    pub async fn search_item(&mut self, item: &'a SearchableTable) -> Result<()> {
        if item.is_feature_class {
            self.search_layers(item).await
        } else {
            self.search_tables(item).await
        }
    }

    fn cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    fn compile(&self, class: &ObjectClass, fields: &[SearchableField]) -> Result<String> {
        expression::compile(
            class,
            &self.request.keyword,
            self.request.comparison_operator,
            self.request.logical_operator,
            fields,
        )
    }

    async fn search_layers(&mut self, item: &'a SearchableTable) -> Result<()> {
        let catalog = self.catalog;
        for entry in catalog.layers.iter().filter(|e| item_matches(item, &e.class)) {
            if self.cancelled() {
                return Ok(());
            }

            let mut clause = self.compile(&entry.class, &item.fields)?;
            if !clause.trim().is_empty() {
                if item.layer_definition {
                    if let Some(definition) = entry
                        .layer
                        .definition
                        .as_deref()
                        .filter(|d| !d.trim().is_empty())
                    {
                        clause = format!("({}) AND ({})", clause, definition);
                    }
                }
                let rows = self.store.query(&entry.class, &clause).await?;
                for row in &rows {
                    if self.cancelled() {
                        return Ok(());
                    }
                    self.add(&entry.class.name, row, Some(entry));
                }
            }

            if self.cancelled() {
                return Ok(());
            }
            self.traverse(&entry.class, Some(entry), &item.relationships)
                .await?;
        }
        Ok(())
    }

    async fn search_tables(&mut self, item: &'a SearchableTable) -> Result<()> {
        let catalog = self.catalog;
        let paths = item.attach_paths();
        for entry in catalog.tables.iter().filter(|e| item_matches(item, &e.class)) {
            if self.cancelled() {
                return Ok(());
            }

            let clause = self.compile(&entry.class, &item.fields)?;
            if !clause.trim().is_empty() {
                let rows = self.store.query(&entry.class, &clause).await?;
                for row in rows {
                    if self.cancelled() {
                        return Ok(());
                    }
                    for &path in &paths {
                        if path.is_empty() {
                            self.add(&entry.class.name, &row, None);
                        } else {
                            self.attach(row.clone(), None, path, path.len() as isize - 1, None)
                                .await?;
                        }
                    }
                }
            }

            if self.cancelled() {
                return Ok(());
            }
            self.traverse(&entry.class, None, &item.relationships).await?;
        }
        Ok(())
    }

    /// Searches each configured relationship reachable from `class`, then
    /// descends into its nested relationships.
    fn traverse<'s>(
        &'s mut self,
        class: &'s ObjectClass,
        anchor: Option<&'s LayerEntry>,
        relationships: &'s [SearchableRelationship],
    ) -> BoxFuture<'s, Result<()>> {
        Box::pin(async move {
            if relationships.is_empty() {
                return Ok(());
            }
            let candidates = self.store.relationship_classes(class).await?;

            for config in relationships {
                for relationship in &candidates {
                    if self.cancelled() {
                        return Ok(());
                    }
                    if !relationship.is_valid() || !config.name.matches(&relationship.name) {
                        continue;
                    }
                    let other_id = relationship.other_side(class.id);
                    let Some(other) = self.store.object_class(other_id).await? else {
                        debug!(relationship = %relationship.name, class = other_id.0, "related class missing, skipping");
                        continue;
                    };

                    self.search_relationship(&other, anchor, config).await?;
                    if self.cancelled() {
                        return Ok(());
                    }
                    self.traverse(&other, anchor, &config.relationships).await?;
                }
            }
            Ok(())
        })
    }

    async fn search_relationship(
        &mut self,
        class: &ObjectClass,
        anchor: Option<&LayerEntry>,
        config: &SearchableRelationship,
    ) -> Result<()> {
        let clause = self.compile(class, &config.fields)?;
        if clause.trim().is_empty() {
            return Ok(());
        }

        let fallback;
        let path: &[Selector] = if config.path.is_empty() {
            fallback = [config.name.clone()];
            &fallback
        } else {
            &config.path
        };

        let rows = self.store.query(class, &clause).await?;
        for row in rows {
            if self.cancelled() {
                return Ok(());
            }
            self.attach(row, None, path, path.len() as isize - 1, anchor)
                .await?;
        }
        Ok(())
    }

    /// Walks `row` up `path` from `index` towards the root, recording the
    /// first rows that belong to a layer's class.
    ///
    /// Without a `layer`, the layer showing the far side of each matching
    /// relationship class is looked up; failing that, `anchor` is used.
    fn attach<'s>(
        &'s mut self,
        row: Row,
        layer: Option<&'s LayerEntry>,
        path: &'s [Selector],
        index: isize,
        anchor: Option<&'s LayerEntry>,
    ) -> BoxFuture<'s, Result<()>> {
        Box::pin(async move {
            if path.is_empty() || index < 0 || index as usize >= path.len() {
                return Ok(());
            }
            let selector = &path[index as usize];

            let Some(class) = self.store.object_class(row.class).await? else {
                return Ok(());
            };
            let candidates = self.store.relationship_classes(&class).await?;

            for relationship in &candidates {
                if self.cancelled() {
                    return Ok(());
                }
                if !relationship.is_valid() || !selector.matches(&relationship.name) {
                    continue;
                }

                let related = self.store.related_rows(relationship, &row).await?;
                if related.is_empty() {
                    continue;
                }

                let target = match layer {
                    Some(layer) => Some(layer),
                    None => {
                        let catalog = self.catalog;
                        catalog
                            .relationship_layer(self.store, &class, relationship)
                            .await?
                            .or(anchor)
                    }
                };
                let Some(target) = target else {
                    debug!(relationship = %relationship.name, class = %class.name, "no layer for relationship, skipping");
                    continue;
                };

                for obj in related {
                    if obj.class == target.class.id {
                        self.add(&target.class.name, &obj, Some(target));
                    } else {
                        self.attach(obj, Some(target), path, index - 1, anchor)
                            .await?;
                    }
                    if self.cancelled() {
                        return Ok(());
                    }
                }
            }
            Ok(())
        })
    }

    /// Records `row` under `name`. Rows added with a layer context are
    /// subject to the request's extent mode.
    fn add(&mut self, name: &str, row: &Row, layer: Option<&LayerEntry>) {
        if self.cancelled() {
            return;
        }
        if layer.is_some() && !self.in_extent(row) {
            return;
        }
        let admission = self.recorder.add(name, row.oid);
        if admission == Admission::Full || self.recorder.is_full() {
            self.token.cancel();
        }
    }

    fn in_extent(&self, row: &Row) -> bool {
        let Some(extent) = self.catalog.extent.as_ref() else {
            return true;
        };
        match self.request.extent {
            ExtentMode::WithinAnyExtent => true,
            ExtentMode::WithinCurrentExtent => {
                row.shape.map_or(false, |shape| shape.within(extent))
            }
            ExtentMode::WithinCurrentOrOverlappingExtent => row
                .shape
                .map_or(false, |shape| shape.within(extent) || shape.overlaps(extent)),
        }
    }
}

/// Searches `session` for `request`.
pub async fn find<S: Store + ?Sized>(
    store: &S,
    session: &Session,
    request: &SearchRequest,
) -> Result<SearchableResponse> {
    find_with(store, session, request, &Cancellation::new()).await
}

/// Like [`find`], but stops early once `token` is cancelled by the caller.
pub async fn find_with<S: Store + ?Sized>(
    store: &S,
    session: &Session,
    request: &SearchRequest,
    token: &Cancellation,
) -> Result<SearchableResponse> {
    let mut request = request.clone();
    request.prepare()?;

    let catalog = Catalog::load(store, session).await?;
    let mut recorder = ResponseRecorder::new(request.threshold);
    Searcher::new(store, &catalog, &request, &mut recorder, token)
        .run()
        .await?;

    let response = recorder.into_response();
    log_completion(&request, &response);
    Ok(response)
}

pub(crate) fn log_completion(request: &SearchRequest, response: &SearchableResponse) {
    if request.threshold > 0 && response.count() >= request.threshold {
        warn!(
            keyword = %request.keyword,
            threshold = request.threshold,
            "search stopped at threshold, results truncated"
        );
    }
    info!(
        keyword = %request.keyword,
        items = request.items.len(),
        classes = response.len(),
        matches = response.count(),
        "search complete"
    );
}
