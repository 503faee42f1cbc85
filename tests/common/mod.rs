#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use graphfind::config::{load_config, Config};
use graphfind::sqlite_store::{NewRelationship, SqliteStore};
use graphfind::{db, migrate};
use tempfile::TempDir;

/// A temp dir holding `data/electric.sqlite` and `config/gfind.toml`.
pub struct TestEnv {
    pub tmp: TempDir,
    pub config_path: PathBuf,
    pub db_path: PathBuf,
}

impl TestEnv {
    pub fn config(&self) -> Config {
        load_config(&self.config_path).unwrap()
    }
}

/// Writes a config pointing at an (unseeded) electric database.
///
/// `session` is appended verbatim after the `[session]` header.
pub fn setup_test_env(session: &str) -> TestEnv {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    let db_path = root.join("data").join("electric.sqlite");

    let config_content = format!(
        r#"[search]
threshold = 0

[sources.electric]
path = "{db}"
default = true

[session]
{session}

[[inventory]]
name = "Pole"
is_feature_class = true
fields = [{{ name = "FACILITYID" }}]

[[inventory.relationships]]
name = "PoleHasUnit"
fields = [{{ name = "SERIAL" }}]

[[inventory]]
name = "PoleInspection"
fields = [{{ name = "NOTES" }}]

[[inventory.relationships]]
name = "PoleHasInspection"
"#,
        db = db_path.display(),
        session = session,
    );

    let config_path = config_dir.join("gfind.toml");
    fs::write(&config_path, config_content).unwrap();

    TestEnv {
        tmp,
        config_path,
        db_path,
    }
}

/// Creates and registers the electric fixture:
///
/// | Pole | FACILITYID | shape |
/// |------|------------|-------|
/// | 1 | P-001 | (10, 10) |
/// | 2 | P-123 | (20, 20) |
/// | 3 | P-003 | (500, 500) |
///
/// `PoleUnit` 20 (`SN-123-A`) hangs off pole 1 through `FACILITYID`,
/// unit 21 (`SN-777`) off pole 3. `PoleInspection` 40 (`ticket 123`)
/// references pole 3 by object id.
pub async fn seed_electric(path: &Path) {
    let pool = db::connect(path).await.unwrap();
    migrate::apply(&pool).await.unwrap();

    for ddl in [
        r#"CREATE TABLE Pole (
            OBJECTID INTEGER PRIMARY KEY,
            FACILITYID VARCHAR(20),
            HEIGHT INTEGER,
            SHAPE_XMIN REAL, SHAPE_YMIN REAL, SHAPE_XMAX REAL, SHAPE_YMAX REAL
        )"#,
        "CREATE TABLE PoleUnit (OBJECTID INTEGER PRIMARY KEY, SERIAL TEXT, POLE_FID TEXT)",
        "CREATE TABLE PoleInspection (OBJECTID INTEGER PRIMARY KEY, NOTES TEXT, POLEOID INTEGER)",
    ] {
        sqlx::query(ddl).execute(&pool).await.unwrap();
    }

    for (oid, fid, xy) in [(1, "P-001", 10.0), (2, "P-123", 20.0), (3, "P-003", 500.0)] {
        sqlx::query("INSERT INTO Pole VALUES (?, ?, 30, ?, ?, ?, ?)")
            .bind(oid)
            .bind(fid)
            .bind(xy)
            .bind(xy)
            .bind(xy)
            .bind(xy)
            .execute(&pool)
            .await
            .unwrap();
    }
    for (oid, serial, fid) in [(20, "SN-123-A", "P-001"), (21, "SN-777", "P-003")] {
        sqlx::query("INSERT INTO PoleUnit VALUES (?, ?, ?)")
            .bind(oid)
            .bind(serial)
            .bind(fid)
            .execute(&pool)
            .await
            .unwrap();
    }
    sqlx::query("INSERT INTO PoleInspection VALUES (40, 'ticket 123', 3)")
        .execute(&pool)
        .await
        .unwrap();

    let store = SqliteStore::new(pool, path.display().to_string());
    let pole = store.register_class("Pole", true, &["UtilityPole"]).await.unwrap();
    let unit = store.register_class("PoleUnit", false, &[]).await.unwrap();
    let inspection = store
        .register_class("PoleInspection", false, &[])
        .await
        .unwrap();

    store
        .register_relationship(&NewRelationship {
            id: Some(10),
            name: "PoleHasUnit",
            origin: pole,
            destination: unit,
            origin_primary_key: "FACILITYID",
            origin_foreign_key: "POLE_FID",
        })
        .await
        .unwrap();
    store
        .register_relationship(&NewRelationship {
            id: Some(11),
            name: "PoleHasInspection",
            origin: pole,
            destination: inspection,
            origin_primary_key: "OBJECTID",
            origin_foreign_key: "POLEOID",
        })
        .await
        .unwrap();

    store.close().await;
}
