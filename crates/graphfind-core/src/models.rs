//! Search request and response types.
//!
//! A [`SearchRequest`] is built by a caller (CLI, HTTP client, or the
//! configured inventory) per search invocation and is never mutated by the
//! engine. The [`SearchableResponse`] is created fresh for each invocation
//! and filled by a [`Recorder`](crate::recorder::Recorder).
//!
//! Requests serialize to JSON as:
//!
//! ```json
//! {
//!   "keyword": "123",
//!   "comparison_operator": "Contains",
//!   "logical_operator": "Or",
//!   "threshold": 200,
//!   "extent": "WithinAnyExtent",
//!   "items": [
//!     {
//!       "name": "Transformer",
//!       "is_feature_class": true,
//!       "fields": [{ "name": "FACILITYID" }],
//!       "relationships": [
//!         { "name": "TransformerUnit", "fields": [{ "name": "SERIALNUMBER" }] }
//!       ]
//!     }
//!   ]
//! }
//! ```

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::SearchError;

/// The literal that selects every field or every relationship class.
pub const ANY: &str = "Any";

/// Deepest relationship nesting a request may declare.
pub const MAX_RELATIONSHIP_DEPTH: usize = 8;

/// Names a field or relationship class, or selects all of them.
///
/// Serialized as a plain string; the exact literal `"Any"` maps to
/// [`Selector::Any`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Selector {
    Any,
    Named(String),
}

impl Selector {
    pub fn named(name: impl Into<String>) -> Self {
        Selector::from(name.into())
    }

    /// Case-insensitive match against a physical name. `Any` matches everything.
    pub fn matches(&self, name: &str) -> bool {
        match self {
            Selector::Any => true,
            Selector::Named(n) => n.eq_ignore_ascii_case(name),
        }
    }

    pub fn is_any(&self) -> bool {
        matches!(self, Selector::Any)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Selector::Any => ANY,
            Selector::Named(n) => n,
        }
    }
}

impl From<String> for Selector {
    fn from(s: String) -> Self {
        if s == ANY {
            Selector::Any
        } else {
            Selector::Named(s)
        }
    }
}

impl From<&str> for Selector {
    fn from(s: &str) -> Self {
        Selector::from(s.to_string())
    }
}

impl From<Selector> for String {
    fn from(s: Selector) -> Self {
        match s {
            Selector::Any => ANY.to_string(),
            Selector::Named(n) => n,
        }
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a field value is compared with the search value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComparisonOperator {
    #[default]
    Contains,
    StartsWith,
    EndsWith,
    Equals,
}

/// Combinator between field predicates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogicalOperator {
    And,
    #[default]
    Or,
}

impl fmt::Display for LogicalOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogicalOperator::And => f.write_str("AND"),
            LogicalOperator::Or => f.write_str("OR"),
        }
    }
}

/// Spatial restriction applied to features added with a layer context.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExtentMode {
    /// No spatial filter.
    #[default]
    WithinAnyExtent,
    /// The feature's shape must lie fully inside the current view extent.
    WithinCurrentExtent,
    /// The feature's shape must lie inside or overlap the current view extent.
    WithinCurrentOrOverlappingExtent,
}

/// A field tested against the keyword (or against its own value).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchableField {
    pub name: Selector,
    /// Shown to the end user, who supplies [`value`](Self::value) directly.
    #[serde(default)]
    pub visible: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl SearchableField {
    /// A field that falls back to the request keyword.
    pub fn keyword(name: impl Into<String>) -> Self {
        Self {
            name: Selector::named(name),
            visible: false,
            value: None,
        }
    }

    /// A field shown to the user with the value they entered.
    pub fn visible(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: Selector::named(name),
            visible: true,
            value: Some(value.into()),
        }
    }

    /// A hidden field pinned to a default value.
    pub fn with_default(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: Selector::named(name),
            visible: false,
            value: Some(value.into()),
        }
    }

    pub fn any() -> Self {
        Self {
            name: Selector::Any,
            visible: false,
            value: None,
        }
    }

    /// The hidden default value, when one is configured and non-empty.
    pub fn default_value(&self) -> Option<&str> {
        match self.value.as_deref() {
            Some(v) if !self.visible && !v.is_empty() => Some(v),
            _ => None,
        }
    }
}

/// A relationship hop, possibly nested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchableRelationship {
    pub name: Selector,
    /// Fields on the related class tested against the keyword.
    #[serde(default)]
    pub fields: Vec<SearchableField>,
    /// Relationship names from the root table down to this hop, inclusive.
    /// Filled by [`SearchRequest::prepare`] when left empty.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub path: Vec<Selector>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub relationships: Vec<SearchableRelationship>,
}

impl SearchableRelationship {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: Selector::named(name),
            fields: Vec::new(),
            path: Vec::new(),
            relationships: Vec::new(),
        }
    }

    pub fn with_field(mut self, field: SearchableField) -> Self {
        self.fields.push(field);
        self
    }

    pub fn with_relationship(mut self, relationship: SearchableRelationship) -> Self {
        self.relationships.push(relationship);
        self
    }

    fn depth(&self) -> usize {
        1 + self
            .relationships
            .iter()
            .map(SearchableRelationship::depth)
            .max()
            .unwrap_or(0)
    }
}

/// A table or feature class to search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchableTable {
    pub name: String,
    #[serde(default)]
    pub is_feature_class: bool,
    /// Match classes carrying `name` as a class model name instead of by
    /// physical name.
    #[serde(default)]
    pub name_as_class_model_name: bool,
    /// Conjoin the layer's definition expression with the compiled predicate.
    #[serde(default = "default_true")]
    pub layer_definition: bool,
    #[serde(default)]
    pub fields: Vec<SearchableField>,
    #[serde(default)]
    pub relationships: Vec<SearchableRelationship>,
}

fn default_true() -> bool {
    true
}

impl SearchableTable {
    pub fn table(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_feature_class: false,
            name_as_class_model_name: false,
            layer_definition: true,
            fields: Vec::new(),
            relationships: Vec::new(),
        }
    }

    pub fn feature_class(name: impl Into<String>) -> Self {
        Self {
            is_feature_class: true,
            ..Self::table(name)
        }
    }

    pub fn with_field(mut self, field: SearchableField) -> Self {
        self.fields.push(field);
        self
    }

    pub fn with_relationship(mut self, relationship: SearchableRelationship) -> Self {
        self.relationships.push(relationship);
        self
    }

    /// The relationship paths used to attach direct matches of this table.
    ///
    /// A table with no relationships yields a single empty path, so its
    /// direct matches are still attached (at depth zero).
    pub fn attach_paths(&self) -> Vec<&[Selector]> {
        if self.relationships.is_empty() {
            return vec![&[]];
        }
        self.relationships.iter().map(|r| r.path.as_slice()).collect()
    }
}

/// What to search for, and where.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub keyword: String,
    #[serde(default)]
    pub comparison_operator: ComparisonOperator,
    #[serde(default)]
    pub logical_operator: LogicalOperator,
    /// Maximum number of distinct matches; `0` means unlimited.
    #[serde(default)]
    pub threshold: usize,
    #[serde(default)]
    pub extent: ExtentMode,
    #[serde(default)]
    pub items: Vec<SearchableTable>,
}

impl SearchRequest {
    pub fn new(keyword: impl Into<String>) -> Self {
        Self {
            keyword: keyword.into(),
            comparison_operator: ComparisonOperator::default(),
            logical_operator: LogicalOperator::default(),
            threshold: 0,
            extent: ExtentMode::default(),
            items: Vec::new(),
        }
    }

    pub fn with_item(mut self, item: SearchableTable) -> Self {
        self.items.push(item);
        self
    }

    /// Validates the request and fills every relationship's root-to-node path.
    ///
    /// Explicit paths supplied by the caller are kept as-is.
    pub fn prepare(&mut self) -> Result<(), SearchError> {
        for item in &mut self.items {
            if item.name.trim().is_empty() {
                return Err(SearchError::InvalidRequest(
                    "searchable table name must not be empty".to_string(),
                ));
            }
            let depth = item
                .relationships
                .iter()
                .map(SearchableRelationship::depth)
                .max()
                .unwrap_or(0);
            if depth > MAX_RELATIONSHIP_DEPTH {
                return Err(SearchError::InvalidRequest(format!(
                    "relationships of '{}' nest {} levels deep (max {})",
                    item.name, depth, MAX_RELATIONSHIP_DEPTH
                )));
            }
            assign_paths(&mut item.relationships, &[]);
        }
        Ok(())
    }
}

fn assign_paths(relationships: &mut [SearchableRelationship], parent: &[Selector]) {
    for rel in relationships {
        if rel.path.is_empty() {
            rel.path = parent.to_vec();
            rel.path.push(rel.name.clone());
        }
        let path = rel.path.clone();
        assign_paths(&mut rel.relationships, &path);
    }
}

/// Matched record identifiers keyed by table or layer class name.
///
/// Keys and per-key identifiers keep discovery order; identifiers are unique
/// per key. Serializes as a JSON object `{ "name": [oid, ...] }`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchableResponse {
    entries: Vec<ResultSet>,
    positions: HashMap<String, usize>,
    total: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct ResultSet {
    name: String,
    oids: Vec<i64>,
    seen: HashSet<i64>,
}

impl SearchableResponse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `oid` under `name`. Returns `false` when it was already present.
    pub fn add(&mut self, name: &str, oid: i64) -> bool {
        let idx = match self.positions.get(name) {
            Some(&idx) => idx,
            None => {
                self.entries.push(ResultSet {
                    name: name.to_string(),
                    ..ResultSet::default()
                });
                self.positions
                    .insert(name.to_string(), self.entries.len() - 1);
                self.entries.len() - 1
            }
        };
        let set = &mut self.entries[idx];
        if !set.seen.insert(oid) {
            return false;
        }
        set.oids.push(oid);
        self.total += 1;
        true
    }

    pub fn contains(&self, name: &str, oid: i64) -> bool {
        self.positions
            .get(name)
            .map(|&idx| self.entries[idx].seen.contains(&oid))
            .unwrap_or(false)
    }

    pub fn get(&self, name: &str) -> Option<&[i64]> {
        self.positions
            .get(name)
            .map(|&idx| self.entries[idx].oids.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[i64])> {
        self.entries
            .iter()
            .map(|s| (s.name.as_str(), s.oids.as_slice()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|s| s.name.as_str())
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of identifiers across all keys.
    pub fn count(&self) -> usize {
        self.total
    }

    /// Order-insensitive view, for comparing responses.
    pub fn to_sets(&self) -> BTreeMap<String, BTreeSet<i64>> {
        self.entries
            .iter()
            .map(|s| (s.name.clone(), s.oids.iter().copied().collect()))
            .collect()
    }
}

impl Serialize for SearchableResponse {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for set in &self.entries {
            map.serialize_entry(&set.name, &set.oids)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for SearchableResponse {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ResponseVisitor;

        impl<'de> Visitor<'de> for ResponseVisitor {
            type Value = SearchableResponse;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of names to record identifier lists")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut response = SearchableResponse::new();
                while let Some((name, oids)) = access.next_entry::<String, Vec<i64>>()? {
                    for oid in oids {
                        response.add(&name, oid);
                    }
                }
                Ok(response)
            }
        }

        deserializer.deserialize_map(ResponseVisitor)
    }
}
