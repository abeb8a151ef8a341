use extension_core::db::migrations::latest_version;
use extension_core::db::{open_db, DbError};
use extension_core::{
    Collaborators, Environment, Finder, LocalFileAccess, RegistryConfig, SqliteStateStore,
    StateStore, AVAILABLE_KEY,
};
use rusqlite::Connection;
use serde_json::json;
use std::path::Path;
use std::sync::Arc;

fn write_manifest(dir: &Path, body: &str) {
    std::fs::create_dir_all(dir).unwrap();
    std::fs::write(dir.join("orchestra.json"), body).unwrap();
}

fn environment(base: &Path, db: &Path) -> Environment {
    let files = Arc::new(LocalFileAccess::new());
    let finder = Finder::new(files.clone(), &base.join("app"), base);
    let store = SqliteStateStore::open(db).unwrap();
    Environment::new(finder, Box::new(store), files, Collaborators::default())
}

#[test]
fn activation_survives_restart() {
    let base = tempfile::tempdir().unwrap();
    let db = base.path().join("state.sqlite3");
    write_manifest(
        &base.path().join("vendor/acme/widgets"),
        r#"{"config": {"limit": 3}}"#,
    );

    {
        let env = environment(base.path(), &db);
        env.detect().unwrap();
        env.activate("acme/widgets").unwrap();
    }

    let mut env = environment(base.path(), &db);
    assert!(env.is_available("acme/widgets").unwrap());
    assert!(env.is_active("acme/widgets").unwrap());
    assert_eq!(env.load().unwrap(), 1);
    assert_eq!(env.option("acme/widgets", "limit", json!(0)), json!(3));
}

#[test]
fn catalog_is_stored_as_one_document() {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteStateStore::open(dir.path().join("state.sqlite3")).unwrap();
    store.put(AVAILABLE_KEY, json!({ "a/b": {} })).unwrap();

    let conn = Connection::open(dir.path().join("state.sqlite3")).unwrap();
    let rows: i64 = conn
        .query_row("SELECT COUNT(*) FROM memory;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(rows, 1);
}

#[test]
fn opening_database_with_newer_schema_version_returns_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("future.sqlite3");

    let conn = Connection::open(&path).unwrap();
    conn.execute_batch("PRAGMA user_version = 999;").unwrap();
    drop(conn);

    match open_db(&path) {
        Err(DbError::UnsupportedSchemaVersion {
            db_version,
            latest_supported,
        }) => {
            assert_eq!(db_version, 999);
            assert_eq!(latest_supported, latest_version());
        }
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("newer schema must be rejected"),
    }
}

#[test]
fn unreachable_store_falls_back_to_memory() {
    let base = tempfile::tempdir().unwrap();
    write_manifest(&base.path().join("vendor/acme/widgets"), "{}");

    let mut config = RegistryConfig::for_base(base.path());
    config.store_path = Some(base.path().join("missing/dir/state.sqlite3"));

    let env = Environment::from_config(&config, Collaborators::default()).unwrap();
    assert!(!env.store().is_durable());
    env.detect().unwrap();
    assert!(env.activate("acme/widgets").unwrap());
}
