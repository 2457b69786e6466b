//! Media table operations

use chrono::Utc;
use frogbase_common::Result;
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};

use super::parse_timestamp;
use crate::models::{MediaItem, MediaStatus, SourceKind};

const MEDIA_COLUMNS: &str = "id, source, source_kind, source_name, title, local_path, ext, \
     is_video, duration_seconds, filesize, uploader, upload_date, status, error, \
     created_at, updated_at";

/// Filter for `list_media`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MediaFilter {
    /// Case-insensitive title substring
    pub title: Option<String>,
    pub source_kind: Option<SourceKind>,
    pub status: Option<MediaStatus>,
    pub limit: Option<u32>,
}

/// Insert or update a media item (created_at is kept on update)
pub async fn save_media(pool: &SqlitePool, item: &MediaItem) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO media (id, source, source_kind, source_name, title, local_path, ext,
                           is_video, duration_seconds, filesize, uploader, upload_date,
                           status, error, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            source = excluded.source,
            source_kind = excluded.source_kind,
            source_name = excluded.source_name,
            title = excluded.title,
            local_path = excluded.local_path,
            ext = excluded.ext,
            is_video = excluded.is_video,
            duration_seconds = excluded.duration_seconds,
            filesize = excluded.filesize,
            uploader = excluded.uploader,
            upload_date = excluded.upload_date,
            status = excluded.status,
            error = excluded.error,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(&item.id)
    .bind(&item.source)
    .bind(item.source_kind.as_str())
    .bind(&item.source_name)
    .bind(&item.title)
    .bind(&item.local_path)
    .bind(&item.ext)
    .bind(item.is_video)
    .bind(item.duration_seconds)
    .bind(item.filesize)
    .bind(&item.uploader)
    .bind(&item.upload_date)
    .bind(item.status.as_str())
    .bind(&item.error)
    .bind(item.created_at.to_rfc3339())
    .bind(item.updated_at.to_rfc3339())
    .execute(pool)
    .await?;

    Ok(())
}

/// Load a media item by id
pub async fn load_media(pool: &SqlitePool, id: &str) -> Result<Option<MediaItem>> {
    let sql = format!("SELECT {} FROM media WHERE id = ?", MEDIA_COLUMNS);
    let row = sqlx::query(&sql).bind(id).fetch_optional(pool).await?;

    row.map(|row| media_from_row(&row)).transpose()
}

/// Load several media items keyed by id
pub async fn load_media_by_ids(
    pool: &SqlitePool,
    ids: &[String],
) -> Result<std::collections::HashMap<String, MediaItem>> {
    let mut items = std::collections::HashMap::new();
    if ids.is_empty() {
        return Ok(items);
    }

    let placeholders = vec!["?"; ids.len()].join(", ");
    let sql = format!("SELECT {} FROM media WHERE id IN ({})", MEDIA_COLUMNS, placeholders);
    let mut query = sqlx::query(&sql);
    for id in ids {
        query = query.bind(id);
    }

    for row in query.fetch_all(pool).await? {
        let item = media_from_row(&row)?;
        items.insert(item.id.clone(), item);
    }
    Ok(items)
}

/// Set status and error message, bumping updated_at
///
/// Accepts a pool or a transaction connection.
pub async fn update_status<'e, E>(
    executor: E,
    id: &str,
    status: MediaStatus,
    error: Option<&str>,
) -> Result<()>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    sqlx::query("UPDATE media SET status = ?, error = ?, updated_at = ? WHERE id = ?")
        .bind(status.as_str())
        .bind(error)
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(executor)
        .await?;

    Ok(())
}

/// Move every `indexed` item back to `transcribed`
///
/// Used when the embedding model changes: stored segments are kept and
/// the next add of the item re-embeds them.
pub async fn demote_indexed(pool: &SqlitePool) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE media SET status = 'transcribed', updated_at = ? WHERE status = 'indexed'",
    )
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

/// List media items, newest first
pub async fn list_media(pool: &SqlitePool, filter: &MediaFilter) -> Result<Vec<MediaItem>> {
    let mut sql = format!("SELECT {} FROM media WHERE 1 = 1", MEDIA_COLUMNS);
    if filter.title.is_some() {
        sql.push_str(" AND LOWER(title) LIKE ? ESCAPE '\\'");
    }
    if filter.source_kind.is_some() {
        sql.push_str(" AND source_kind = ?");
    }
    if filter.status.is_some() {
        sql.push_str(" AND status = ?");
    }
    sql.push_str(" ORDER BY created_at DESC, id ASC");
    if filter.limit.is_some() {
        sql.push_str(" LIMIT ?");
    }

    let mut query = sqlx::query(&sql);
    if let Some(title) = &filter.title {
        query = query.bind(like_pattern(title));
    }
    if let Some(kind) = filter.source_kind {
        query = query.bind(kind.as_str());
    }
    if let Some(status) = filter.status {
        query = query.bind(status.as_str());
    }
    if let Some(limit) = filter.limit {
        query = query.bind(limit as i64);
    }

    query
        .fetch_all(pool)
        .await?
        .iter()
        .map(media_from_row)
        .collect()
}

/// `%needle%` with LIKE wildcards escaped, lower-cased
pub(crate) fn like_pattern(needle: &str) -> String {
    let escaped = needle
        .to_lowercase()
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

fn media_from_row(row: &SqliteRow) -> Result<MediaItem> {
    let source_kind: String = row.get("source_kind");
    let status: String = row.get("status");
    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");

    Ok(MediaItem {
        id: row.get("id"),
        source: row.get("source"),
        source_kind: source_kind.parse()?,
        source_name: row.get("source_name"),
        title: row.get("title"),
        local_path: row.get("local_path"),
        ext: row.get("ext"),
        is_video: row.get("is_video"),
        duration_seconds: row.get("duration_seconds"),
        filesize: row.get("filesize"),
        uploader: row.get("uploader"),
        upload_date: row.get("upload_date"),
        status: status.parse()?,
        error: row.get("error"),
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::{sample_media, setup_test_db};
    use chrono::Duration;

    #[tokio::test]
    async fn test_save_and_load() {
        let (_dir, pool) = setup_test_db().await;
        let mut item = sample_media("m1", "pond");
        item.duration_seconds = Some(12.5);
        save_media(&pool, &item).await.unwrap();

        let loaded = load_media(&pool, "m1").await.unwrap().unwrap();
        assert_eq!(loaded.title, "pond");
        assert_eq!(loaded.duration_seconds, Some(12.5));
        assert_eq!(loaded.status, MediaStatus::Pending);
        assert!(load_media(&pool, "missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_status_records_error() {
        let (_dir, pool) = setup_test_db().await;
        save_media(&pool, &sample_media("m1", "pond")).await.unwrap();

        update_status(&pool, "m1", MediaStatus::FetchFailed, Some("404"))
            .await
            .unwrap();

        let loaded = load_media(&pool, "m1").await.unwrap().unwrap();
        assert_eq!(loaded.status, MediaStatus::FetchFailed);
        assert_eq!(loaded.error.as_deref(), Some("404"));
    }

    #[tokio::test]
    async fn test_demote_indexed_only_touches_indexed() {
        let (_dir, pool) = setup_test_db().await;
        let mut done = sample_media("done", "done");
        done.status = MediaStatus::Indexed;
        save_media(&pool, &done).await.unwrap();
        save_media(&pool, &sample_media("new", "new")).await.unwrap();

        assert_eq!(demote_indexed(&pool).await.unwrap(), 1);
        let done = load_media(&pool, "done").await.unwrap().unwrap();
        let new = load_media(&pool, "new").await.unwrap().unwrap();
        assert_eq!(done.status, MediaStatus::Transcribed);
        assert_eq!(new.status, MediaStatus::Pending);
    }

    #[tokio::test]
    async fn test_list_newest_first_with_filters() {
        let (_dir, pool) = setup_test_db().await;
        let mut older = sample_media("a", "Old Frog Song");
        older.created_at = Utc::now() - Duration::hours(1);
        older.status = MediaStatus::Indexed;
        let mut middle = sample_media("c", "wet pond");
        middle.created_at = Utc::now() - Duration::minutes(30);
        let newer = sample_media("b", "new_toad");
        save_media(&pool, &older).await.unwrap();
        save_media(&pool, &middle).await.unwrap();
        save_media(&pool, &newer).await.unwrap();

        let all = list_media(&pool, &MediaFilter::default()).await.unwrap();
        let ids: Vec<_> = all.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c", "a"]);

        let frogs = list_media(
            &pool,
            &MediaFilter {
                title: Some("FROG".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(frogs.len(), 1);
        assert_eq!(frogs[0].id, "a");

        // Underscore is literal, not a wildcard
        let toads = list_media(
            &pool,
            &MediaFilter {
                title: Some("w_t".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(toads.len(), 1);
        assert_eq!(toads[0].id, "b");

        let indexed = list_media(
            &pool,
            &MediaFilter {
                status: Some(MediaStatus::Indexed),
                limit: Some(5),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(indexed.len(), 1);
    }
}
