//! In-memory [`Store`] implementation for testing and embedding.
//!
//! Classes, rows, and relationship pairs live behind `parking_lot::RwLock`s.
//! Where clauses are parsed with [`predicate::parse`] and evaluated row by
//! row; a clause naming a field the class does not have is rejected the
//! way a database would reject an unknown column.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use parking_lot::RwLock;

use crate::geometry::Envelope;

use super::predicate::{self, Value};
use super::{ClassId, ObjectClass, RelationshipClass, Row, Store};

struct StoredRow {
    oid: i64,
    shape: Option<Envelope>,
    attributes: HashMap<String, Value>,
}

struct StoredClass {
    class: ObjectClass,
    rows: Vec<StoredRow>,
}

struct StoredRelationship {
    relationship: RelationshipClass,
    /// (origin oid, destination oid)
    pairs: Vec<(i64, i64)>,
}

/// In-memory store for tests and embedded use.
pub struct InMemoryStore {
    classes: RwLock<BTreeMap<ClassId, StoredClass>>,
    relationships: RwLock<Vec<StoredRelationship>>,
    queries: AtomicUsize,
    offline: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            classes: RwLock::new(BTreeMap::new()),
            relationships: RwLock::new(Vec::new()),
            queries: AtomicUsize::new(0),
            offline: AtomicBool::new(false),
        }
    }

    pub fn add_class(&self, class: ObjectClass) {
        self.classes
            .write()
            .insert(class.id, StoredClass { class, rows: Vec::new() });
    }

    /// Inserts a row. Attribute names are matched case-insensitively.
    pub fn insert_row(
        &self,
        class: ClassId,
        oid: i64,
        attributes: Vec<(&str, Value)>,
        shape: Option<Envelope>,
    ) -> Result<()> {
        let mut classes = self.classes.write();
        let stored = classes
            .get_mut(&class)
            .ok_or_else(|| anyhow!("unknown class id {}", class.0))?;
        if stored.rows.iter().any(|r| r.oid == oid) {
            bail!("duplicate object id {} in '{}'", oid, stored.class.name);
        }
        let attributes = attributes
            .into_iter()
            .map(|(k, v)| (k.to_ascii_uppercase(), v))
            .collect();
        stored.rows.push(StoredRow {
            oid,
            shape,
            attributes,
        });
        Ok(())
    }

    pub fn add_relationship(&self, relationship: RelationshipClass) {
        self.relationships.write().push(StoredRelationship {
            relationship,
            pairs: Vec::new(),
        });
    }

    /// Relates an origin row to a destination row through the named relationship class.
    pub fn relate(&self, relationship: &str, origin_oid: i64, destination_oid: i64) -> Result<()> {
        let mut rels = self.relationships.write();
        let stored = rels
            .iter_mut()
            .find(|r| r.relationship.name == relationship)
            .ok_or_else(|| anyhow!("unknown relationship class '{}'", relationship))?;
        stored.pairs.push((origin_oid, destination_oid));
        Ok(())
    }

    /// Number of `query` calls served so far.
    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::Relaxed)
    }

    /// Simulates a lost connection: every subsequent call fails.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::Relaxed);
    }

    fn ensure_online(&self) -> Result<()> {
        if self.offline.load(Ordering::Relaxed) {
            bail!("store unavailable: connection lost");
        }
        Ok(())
    }

    fn rows_by_oid(&self, class: ClassId, oids: &[i64]) -> Vec<Row> {
        let classes = self.classes.read();
        let Some(stored) = classes.get(&class) else {
            return Vec::new();
        };
        stored
            .rows
            .iter()
            .filter(|r| oids.contains(&r.oid))
            .map(|r| Row {
                oid: r.oid,
                class,
                shape: r.shape,
            })
            .collect()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn object_class(&self, id: ClassId) -> Result<Option<ObjectClass>> {
        self.ensure_online()?;
        Ok(self.classes.read().get(&id).map(|s| s.class.clone()))
    }

    async fn find_class(&self, name: &str) -> Result<Option<ObjectClass>> {
        self.ensure_online()?;
        Ok(self
            .classes
            .read()
            .values()
            .find(|s| s.class.name.eq_ignore_ascii_case(name))
            .map(|s| s.class.clone()))
    }

    async fn query(&self, class: &ObjectClass, where_clause: &str) -> Result<Vec<Row>> {
        self.ensure_online()?;
        self.queries.fetch_add(1, Ordering::Relaxed);

        let expr = predicate::parse(where_clause)?;
        for field in expr.fields() {
            if class.find_field(field).is_none() {
                bail!("no such column: {} (in '{}')", field, class.name);
            }
        }

        let classes = self.classes.read();
        let stored = classes
            .get(&class.id)
            .ok_or_else(|| anyhow!("no such table: {}", class.name))?;
        let mut rows: Vec<Row> = stored
            .rows
            .iter()
            .filter(|r| expr.matches(&r.attributes))
            .map(|r| Row {
                oid: r.oid,
                class: class.id,
                shape: r.shape,
            })
            .collect();
        rows.sort_by_key(|r| r.oid);
        Ok(rows)
    }

    async fn relationship_classes(&self, class: &ObjectClass) -> Result<Vec<RelationshipClass>> {
        self.ensure_online()?;
        Ok(self
            .relationships
            .read()
            .iter()
            .filter(|r| r.relationship.origin == class.id || r.relationship.destination == class.id)
            .map(|r| r.relationship.clone())
            .collect())
    }

    async fn related_rows(&self, relationship: &RelationshipClass, row: &Row) -> Result<Vec<Row>> {
        self.ensure_online()?;
        let (target, oids): (ClassId, Vec<i64>) = {
            let rels = self.relationships.read();
            let Some(stored) = rels.iter().find(|r| r.relationship.id == relationship.id) else {
                return Ok(Vec::new());
            };
            if row.class == relationship.origin {
                (
                    relationship.destination,
                    stored
                        .pairs
                        .iter()
                        .filter(|(o, _)| *o == row.oid)
                        .map(|(_, d)| *d)
                        .collect(),
                )
            } else if row.class == relationship.destination {
                (
                    relationship.origin,
                    stored
                        .pairs
                        .iter()
                        .filter(|(_, d)| *d == row.oid)
                        .map(|(o, _)| *o)
                        .collect(),
                )
            } else {
                return Ok(Vec::new());
            }
        };
        Ok(self.rows_by_oid(target, &oids))
    }
}
