//! Metadata store access for a library
//!
//! One module per table. Schema creation lives in
//! `frogbase_common::db::init`.

pub mod embeddings;
pub mod media;
pub mod segments;
pub mod settings;

use chrono::{DateTime, Utc};
use frogbase_common::{Error, Result};

/// Parse an RFC 3339 timestamp column
pub(crate) fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("Invalid timestamp '{}': {}", value, e)))
}

/// Parse a UUID column
pub(crate) fn parse_uuid(value: &str) -> Result<uuid::Uuid> {
    uuid::Uuid::parse_str(value)
        .map_err(|e| Error::Internal(format!("Invalid UUID '{}': {}", value, e)))
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::models::{MediaItem, MediaLocation, MediaStub, Source, SourceKind};
    use sqlx::SqlitePool;
    use std::path::PathBuf;
    use tempfile::TempDir;

    /// Fresh library database in a temp directory
    pub async fn setup_test_db() -> (TempDir, SqlitePool) {
        let dir = tempfile::tempdir().unwrap();
        let pool = frogbase_common::db::init_database(&dir.path().join("frogbase.db"))
            .await
            .unwrap();
        (dir, pool)
    }

    pub fn sample_media(id: &str, title: &str) -> MediaItem {
        let path = PathBuf::from(format!("/tmp/{}.wav", title));
        MediaItem::from_stub(&MediaStub {
            id: id.to_string(),
            source: Source {
                raw: path.to_string_lossy().to_string(),
                kind: SourceKind::LocalFile,
            },
            kind: SourceKind::LocalFile,
            location: MediaLocation::Path(path),
            title: title.to_string(),
            source_name: "disk".to_string(),
        })
    }
}
