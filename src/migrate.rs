use anyhow::{Context, Result};
use sqlx::SqlitePool;
use tracing::info;

use crate::config::Config;
use crate::db;

/// Creates the metadata schema in every configured source.
pub async fn run_migrations(config: &Config) -> Result<()> {
    for (name, source) in &config.sources {
        let pool = db::connect(&source.path)
            .await
            .with_context(|| format!("Failed to open source '{}'", name))?;
        apply(&pool).await?;
        pool.close().await;
        info!(source = %name, path = %source.path.display(), "schema ready");
    }
    Ok(())
}

/// Creates the class and relationship registries. Idempotent.
///
/// User tables are ordinary SQLite tables with an `OBJECTID INTEGER PRIMARY
/// KEY`; spatial tables add `SHAPE_XMIN`, `SHAPE_YMIN`, `SHAPE_XMAX`, and
/// `SHAPE_YMAX` columns holding the feature envelope. A relationship links
/// `origin_primary_key` on the origin table to `origin_foreign_key` on the
/// destination table.
pub async fn apply(pool: &SqlitePool) -> Result<()> {
    // Create class registry
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS gdb_classes (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL UNIQUE COLLATE NOCASE,
            spatial INTEGER NOT NULL DEFAULT 0,
            model_names TEXT NOT NULL DEFAULT ''
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create relationship registry
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS gdb_relationships (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL UNIQUE COLLATE NOCASE,
            origin_class INTEGER NOT NULL,
            destination_class INTEGER NOT NULL,
            origin_primary_key TEXT NOT NULL DEFAULT 'OBJECTID',
            origin_foreign_key TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_relationships_origin ON gdb_relationships(origin_class)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_relationships_destination ON gdb_relationships(destination_class)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
