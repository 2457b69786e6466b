//! Settings table operations
//!
//! Key-value accessors. The effective library settings are stored as JSON
//! under `library_settings`.

use frogbase_common::{Error, Result};
use sqlx::{Pool, Sqlite};

use crate::config::Settings;

const LIBRARY_SETTINGS_KEY: &str = "library_settings";

/// Store the effective settings of a library
pub async fn save_library_settings(db: &Pool<Sqlite>, settings: &Settings) -> Result<()> {
    let json = serde_json::to_string(settings)
        .map_err(|e| Error::Internal(format!("Serialize settings failed: {}", e)))?;
    set_setting(db, LIBRARY_SETTINGS_KEY, json).await
}

/// Settings stored by the last open, if any
pub async fn load_library_settings(db: &Pool<Sqlite>) -> Result<Option<Settings>> {
    let raw: Option<String> = get_setting(db, LIBRARY_SETTINGS_KEY).await?;
    raw.map(|json| {
        serde_json::from_str(&json)
            .map_err(|e| Error::Config(format!("Parse stored settings failed: {}", e)))
    })
    .transpose()
}

/// Generic setting getter
pub async fn get_setting<T>(db: &Pool<Sqlite>, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let row: Option<(Option<String>,)> = sqlx::query_as("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(db)
        .await
        .map_err(Error::Database)?;

    match row {
        Some((Some(value),)) => {
            let parsed = value
                .parse::<T>()
                .map_err(|e| Error::Config(format!("Parse setting {} failed: {}", key, e)))?;
            Ok(Some(parsed))
        }
        _ => Ok(None),
    }
}

/// Generic setting setter
pub async fn set_setting<T>(db: &Pool<Sqlite>, key: &str, value: T) -> Result<()>
where
    T: std::fmt::Display,
{
    sqlx::query(
        "INSERT INTO settings (key, value, updated_at) VALUES (?, ?, CURRENT_TIMESTAMP)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = CURRENT_TIMESTAMP",
    )
    .bind(key)
    .bind(value.to_string())
    .execute(db)
    .await
    .map_err(Error::Database)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Metric;
    use crate::db::test_support::setup_test_db;

    #[tokio::test]
    async fn test_library_settings_round_trip() {
        let (_dir, pool) = setup_test_db().await;
        assert!(load_library_settings(&pool).await.unwrap().is_none());

        let mut settings = Settings::default();
        settings.index.metric = Metric::L2;
        settings.pipeline.workers = 7;
        save_library_settings(&pool, &settings).await.unwrap();

        let loaded = load_library_settings(&pool).await.unwrap().unwrap();
        assert_eq!(loaded, settings);
    }

    #[tokio::test]
    async fn test_generic_setting_overwrites() {
        let (_dir, pool) = setup_test_db().await;
        set_setting(&pool, "answer", 41).await.unwrap();
        set_setting(&pool, "answer", 42).await.unwrap();

        let value: Option<i64> = get_setting(&pool, "answer").await.unwrap();
        assert_eq!(value, Some(42));

        let missing: Option<i64> = get_setting(&pool, "nope").await.unwrap();
        assert!(missing.is_none());
    }
}
