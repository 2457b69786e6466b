//! Tests for library database initialization

use frogbase_common::db::init::{init_database, SCHEMA_VERSION};
use sqlx::Row;

#[tokio::test]
async fn test_database_created_with_parent_dirs() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("libraries").join("frogverse").join("frogbase.db");

    let pool = init_database(&db_path).await.expect("init database");
    assert!(db_path.exists(), "Database file was not created");

    let tables: Vec<String> =
        sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
            .fetch_all(&pool)
            .await
            .unwrap();
    for expected in ["embeddings", "media", "schema_version", "segments", "settings"] {
        assert!(tables.iter().any(|t| t == expected), "missing table {}", expected);
    }
}

#[tokio::test]
async fn test_reopen_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("frogbase.db");

    let pool1 = init_database(&db_path).await.unwrap();
    pool1.close().await;
    let pool2 = init_database(&db_path).await.unwrap();

    let versions: Vec<i64> = sqlx::query_scalar("SELECT version FROM schema_version")
        .fetch_all(&pool2)
        .await
        .unwrap();
    assert_eq!(versions, vec![SCHEMA_VERSION]);
}

#[tokio::test]
async fn test_foreign_keys_enforced() {
    let dir = tempfile::tempdir().unwrap();
    let pool = init_database(&dir.path().join("frogbase.db")).await.unwrap();

    let fk: i64 = sqlx::query("PRAGMA foreign_keys")
        .fetch_one(&pool)
        .await
        .unwrap()
        .get(0);
    assert_eq!(fk, 1);

    // Segment pointing at a missing media row must be rejected
    let result = sqlx::query(
        "INSERT INTO segments (id, media_id, number, start_seconds, end_seconds, text, generated_by)
         VALUES ('s1', 'missing', 0, 0.0, 1.0, 'hello', 'test')",
    )
    .execute(&pool)
    .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_media_status_is_constrained() {
    let dir = tempfile::tempdir().unwrap();
    let pool = init_database(&dir.path().join("frogbase.db")).await.unwrap();

    let result = sqlx::query(
        "INSERT INTO media (id, source, source_kind, source_name, title, status, created_at, updated_at)
         VALUES ('m1', '/tmp/a.wav', 'local_file', 'disk', 'a', 'bogus', '', '')",
    )
    .execute(&pool)
    .await;
    assert!(result.is_err(), "unknown status should violate CHECK constraint");
}
