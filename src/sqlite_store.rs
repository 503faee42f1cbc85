//! SQLite-backed [`Store`] implementation.
//!
//! Classes and relationship classes are registered in the `gdb_classes` and
//! `gdb_relationships` tables created by [`migrate::apply`](crate::migrate::apply).
//! Compiled where clauses run natively; the predicate dialect is plain
//! SQLite SQL.

use std::collections::HashMap;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row as _, SqlitePool};

use graphfind_core::expression::quote_ident;
use graphfind_core::geometry::Envelope;
use graphfind_core::store::{
    ClassId, Field, FieldKind, ObjectClass, RelationshipClass, Row, Store,
};

use tracing::debug;

use crate::config::SourceConfig;
use crate::db;

const SHAPE_COLUMNS: [&str; 4] = ["SHAPE_XMIN", "SHAPE_YMIN", "SHAPE_XMAX", "SHAPE_YMAX"];

/// SQLite implementation of the [`Store`] trait.
///
/// Column lists are read once per table and kept for the life of the store,
/// so schema changes made while a store is open are not picked up.
pub struct SqliteStore {
    pool: SqlitePool,
    workspace: String,
    /// Fields per table, keyed by lowercased table name.
    fields: RwLock<HashMap<String, Vec<Field>>>,
}

/// A relationship class to register.
#[derive(Debug, Clone)]
pub struct NewRelationship<'a> {
    pub id: Option<i64>,
    pub name: &'a str,
    pub origin: ClassId,
    pub destination: ClassId,
    pub origin_primary_key: &'a str,
    pub origin_foreign_key: &'a str,
}

impl SqliteStore {
    /// `workspace` identifies the database for same-database checks.
    pub fn new(pool: SqlitePool, workspace: impl Into<String>) -> Self {
        Self {
            pool,
            workspace: workspace.into(),
            fields: RwLock::new(HashMap::new()),
        }
    }

    pub async fn open(source: &SourceConfig) -> Result<Self> {
        let pool = db::connect(&source.path).await?;
        Ok(Self::new(pool, source.path.display().to_string()))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Every registered class, by id.
    pub async fn classes(&self) -> Result<Vec<ObjectClass>> {
        let rows = sqlx::query("SELECT id, name, spatial, model_names FROM gdb_classes ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        let mut classes = Vec::with_capacity(rows.len());
        for row in &rows {
            classes.push(self.class_from_row(row).await?);
        }
        Ok(classes)
    }

    /// Every registered relationship class, by id.
    pub async fn relationships(&self) -> Result<Vec<RelationshipClass>> {
        let rows = sqlx::query(
            "SELECT id, name, origin_class, destination_class FROM gdb_relationships ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(|r| self.relationship_from_row(r)).collect())
    }

    /// Registers an existing table as a class.
    pub async fn register_class(
        &self,
        name: &str,
        spatial: bool,
        model_names: &[&str],
    ) -> Result<ClassId> {
        let result = sqlx::query(
            "INSERT INTO gdb_classes (name, spatial, model_names) VALUES (?, ?, ?)",
        )
        .bind(name)
        .bind(spatial as i64)
        .bind(model_names.join(","))
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to register class '{}'", name))?;
        Ok(ClassId(result.last_insert_rowid()))
    }

    pub async fn register_relationship(&self, rel: &NewRelationship<'_>) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO gdb_relationships
                (id, name, origin_class, destination_class, origin_primary_key, origin_foreign_key)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(rel.id)
        .bind(rel.name)
        .bind(rel.origin.0)
        .bind(rel.destination.0)
        .bind(rel.origin_primary_key)
        .bind(rel.origin_foreign_key)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to register relationship '{}'", rel.name))?;
        Ok(result.last_insert_rowid())
    }

    async fn class_from_row(&self, row: &SqliteRow) -> Result<ObjectClass> {
        let name: String = row.get("name");
        let model_names: String = row.get("model_names");
        let fields = self.load_fields(&name).await?;
        Ok(ObjectClass {
            id: ClassId(row.get("id")),
            workspace: self.workspace.clone(),
            model_names: model_names
                .split(',')
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .map(String::from)
                .collect(),
            fields,
            spatial: row.get::<i64, _>("spatial") != 0,
            name,
        })
    }

    fn relationship_from_row(&self, row: &SqliteRow) -> RelationshipClass {
        RelationshipClass {
            id: row.get("id"),
            name: row.get("name"),
            origin: ClassId(row.get("origin_class")),
            destination: ClassId(row.get("destination_class")),
            workspace: self.workspace.clone(),
        }
    }

    async fn load_fields(&self, table: &str) -> Result<Vec<Field>> {
        let key = table.to_ascii_lowercase();
        let cached = self.fields.read().get(&key).cloned();
        if let Some(fields) = cached {
            return Ok(fields);
        }

        let rows = sqlx::query(&format!("PRAGMA table_info({})", quote_ident(table)))
            .fetch_all(&self.pool)
            .await?;
        if rows.is_empty() {
            return Err(anyhow!("registered class '{}' has no table", table));
        }
        let fields: Vec<Field> = rows
            .iter()
            .map(|r| {
                let name: String = r.get("name");
                let declared: String = r.get("type");
                (name, declared)
            })
            .filter(|(name, _)| !SHAPE_COLUMNS.iter().any(|c| c.eq_ignore_ascii_case(name)))
            .map(|(name, declared)| Field::new(name, field_kind(&declared)))
            .collect();
        debug!(table, fields = fields.len(), "cached table fields");
        self.fields.write().insert(key, fields.clone());
        Ok(fields)
    }
}

/// Maps a declared column type to a field kind, following SQLite's affinity rules.
fn field_kind(declared: &str) -> FieldKind {
    let t = declared.to_ascii_uppercase();
    if t.contains("DATE") || t.contains("TIME") {
        FieldKind::Date
    } else if t.contains("INT") {
        FieldKind::Integer
    } else if t.contains("CHAR") || t.contains("CLOB") || t.contains("TEXT") {
        FieldKind::Text
    } else if t.contains("REAL") || t.contains("FLOA") || t.contains("DOUB") || t.contains("NUMERIC") || t.contains("DECIMAL") {
        FieldKind::Double
    } else {
        FieldKind::Other
    }
}

fn select_columns(class: &ObjectClass, alias: &str) -> String {
    let mut columns = vec![format!("{}.OBJECTID AS OBJECTID", alias)];
    if class.spatial {
        columns.extend(
            SHAPE_COLUMNS
                .iter()
                .map(|c| format!("{}.{} AS {}", alias, c, c)),
        );
    }
    columns.join(", ")
}

fn to_row(row: &SqliteRow, class: &ObjectClass) -> Result<Row> {
    let shape = if class.spatial {
        let mut corners = [0.0; 4];
        let mut complete = true;
        for (slot, column) in corners.iter_mut().zip(SHAPE_COLUMNS) {
            match row.try_get::<Option<f64>, _>(column)? {
                Some(v) => *slot = v,
                None => complete = false,
            }
        }
        complete.then(|| Envelope::from(corners))
    } else {
        None
    };
    Ok(Row {
        oid: row.try_get("OBJECTID")?,
        class: class.id,
        shape,
    })
}

#[async_trait]
impl Store for SqliteStore {
    async fn object_class(&self, id: ClassId) -> Result<Option<ObjectClass>> {
        let row = sqlx::query("SELECT id, name, spatial, model_names FROM gdb_classes WHERE id = ?")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => Ok(Some(self.class_from_row(&row).await?)),
            None => Ok(None),
        }
    }

    async fn find_class(&self, name: &str) -> Result<Option<ObjectClass>> {
        let row = sqlx::query(
            "SELECT id, name, spatial, model_names FROM gdb_classes WHERE name = ? COLLATE NOCASE",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => Ok(Some(self.class_from_row(&row).await?)),
            None => Ok(None),
        }
    }

    async fn query(&self, class: &ObjectClass, where_clause: &str) -> Result<Vec<Row>> {
        let sql = format!(
            "SELECT {} FROM {} t WHERE {} ORDER BY t.OBJECTID",
            select_columns(class, "t"),
            quote_ident(&class.name),
            where_clause
        );
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .with_context(|| format!("Query on '{}' failed: {}", class.name, where_clause))?;
        rows.iter().map(|r| to_row(r, class)).collect()
    }

    async fn relationship_classes(&self, class: &ObjectClass) -> Result<Vec<RelationshipClass>> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, origin_class, destination_class
            FROM gdb_relationships
            WHERE origin_class = ? OR destination_class = ?
            ORDER BY id
            "#,
        )
        .bind(class.id.0)
        .bind(class.id.0)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(|r| self.relationship_from_row(r)).collect())
    }

    async fn related_rows(&self, relationship: &RelationshipClass, row: &Row) -> Result<Vec<Row>> {
        let keys = sqlx::query(
            "SELECT origin_primary_key, origin_foreign_key FROM gdb_relationships WHERE id = ?",
        )
        .bind(relationship.id)
        .fetch_optional(&self.pool)
        .await?;
        let Some(keys) = keys else {
            return Ok(Vec::new());
        };
        let pk: String = keys.get("origin_primary_key");
        let fk: String = keys.get("origin_foreign_key");

        let (Some(origin), Some(destination)) = (
            self.object_class(relationship.origin).await?,
            self.object_class(relationship.destination).await?,
        ) else {
            return Ok(Vec::new());
        };

        let (target, sql) = if row.class == origin.id {
            let sql = format!(
                "SELECT {} FROM {} d WHERE d.{} = (SELECT o.{} FROM {} o WHERE o.OBJECTID = ?) ORDER BY d.OBJECTID",
                select_columns(&destination, "d"),
                quote_ident(&destination.name),
                quote_ident(&fk),
                quote_ident(&pk),
                quote_ident(&origin.name),
            );
            (destination, sql)
        } else if row.class == destination.id {
            let sql = format!(
                "SELECT {} FROM {} o WHERE o.{} = (SELECT d.{} FROM {} d WHERE d.OBJECTID = ?) ORDER BY o.OBJECTID",
                select_columns(&origin, "o"),
                quote_ident(&origin.name),
                quote_ident(&pk),
                quote_ident(&fk),
                quote_ident(&destination.name),
            );
            (origin, sql)
        } else {
            return Ok(Vec::new());
        };

        let rows = sqlx::query(&sql)
            .bind(row.oid)
            .fetch_all(&self.pool)
            .await
            .with_context(|| format!("Failed to follow relationship '{}'", relationship.name))?;
        rows.iter().map(|r| to_row(r, &target)).collect()
    }
}
