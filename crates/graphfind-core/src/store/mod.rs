//! Data source abstraction for graphfind.
//!
//! The [`Store`] trait is everything the search engine needs from a
//! geodatabase: class metadata, predicate queries, relationship classes, and
//! related-row navigation. Implementations:
//!
//! - [`memory::InMemoryStore`]: evaluates the predicate dialect in
//!   [`predicate`] over rows held in memory (tests, embedding).
//! - `SqliteStore` in the `graphfind` crate: runs predicates natively.
//!
//! Query results are materialized before they are returned, so no cursor
//! or statement handle outlives a single call regardless of how the caller
//! exits (completion, cancellation, or error).

pub mod memory;
pub mod predicate;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::geometry::Envelope;

/// Identity of an object class (table or feature class).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClassId(pub i64);

/// Storage kind of a field, which decides how predicates are built for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Text,
    Integer,
    Double,
    Date,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub kind: FieldKind,
}

impl Field {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// Schema-level description of a table or feature class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectClass {
    pub id: ClassId,
    /// Physical (dataset) name.
    pub name: String,
    /// Identity of the database the class lives in.
    pub workspace: String,
    /// Logical class model names assigned to the class.
    #[serde(default)]
    pub model_names: Vec<String>,
    pub fields: Vec<Field>,
    /// Whether rows carry a shape.
    #[serde(default)]
    pub spatial: bool,
}

impl ObjectClass {
    /// Case-insensitive field lookup.
    pub fn find_field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name.eq_ignore_ascii_case(name))
    }

    pub fn has_model_name(&self, name: &str) -> bool {
        self.model_names.iter().any(|m| m.eq_ignore_ascii_case(name))
    }
}

/// A single record returned by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub oid: i64,
    pub class: ClassId,
    pub shape: Option<Envelope>,
}

/// A named association between an origin and a destination class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipClass {
    /// Negative identifiers mark placeholder relationship classes.
    pub id: i64,
    pub name: String,
    pub origin: ClassId,
    pub destination: ClassId,
    pub workspace: String,
}

impl RelationshipClass {
    pub fn is_valid(&self) -> bool {
        self.id >= 0
    }

    /// The class on the far side of the relationship from `class`.
    pub fn other_side(&self, class: ClassId) -> ClassId {
        if class == self.origin {
            self.destination
        } else {
            self.origin
        }
    }
}

/// Abstract geodatabase backend.
///
/// All operations are async (via `async-trait`) so SQL-backed stores can
/// run on a tokio pool; in-memory implementations return immediately.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`object_class`](Store::object_class) | Class metadata by identity |
/// | [`find_class`](Store::find_class) | Class metadata by physical name |
/// | [`query`](Store::query) | Rows of a class matching a where clause |
/// | [`relationship_classes`](Store::relationship_classes) | Relationship classes in either role |
/// | [`related_rows`](Store::related_rows) | Rows related to a row through a relationship class |
/// | [`is_same_database`](Store::is_same_database) | Workspace equivalence |
#[async_trait]
pub trait Store: Send + Sync {
    async fn object_class(&self, id: ClassId) -> Result<Option<ObjectClass>>;

    async fn find_class(&self, name: &str) -> Result<Option<ObjectClass>>;

    /// Rows of `class` satisfying `where_clause`, in identifier order.
    async fn query(&self, class: &ObjectClass, where_clause: &str) -> Result<Vec<Row>>;

    /// Relationship classes `class` participates in, as origin or destination.
    async fn relationship_classes(&self, class: &ObjectClass) -> Result<Vec<RelationshipClass>>;

    async fn related_rows(&self, relationship: &RelationshipClass, row: &Row) -> Result<Vec<Row>>;

    /// Whether two workspace identities point at the same physical database.
    fn is_same_database(&self, a: &str, b: &str) -> bool {
        a == b
    }
}
