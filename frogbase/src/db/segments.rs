//! Segment table operations

use frogbase_common::Result;
use sqlx::{sqlite::SqliteRow, Row, SqliteConnection, SqlitePool};
use std::collections::HashMap;
use uuid::Uuid;

use super::media::like_pattern;
use super::parse_uuid;
use crate::models::Segment;

const SEGMENT_COLUMNS: &str = "s.id, s.media_id, s.number, s.start_seconds, s.end_seconds, \
     s.text, s.language, s.generated_by, s.avg_logprob, s.no_speech_prob";

/// Replace all segments of a media item
///
/// Existing segments (and, by cascade, their embeddings) are deleted first.
/// Run inside a transaction so readers never see a partial transcript.
pub async fn replace_segments(
    conn: &mut SqliteConnection,
    media_id: &str,
    segments: &[Segment],
) -> Result<()> {
    sqlx::query("DELETE FROM segments WHERE media_id = ?")
        .bind(media_id)
        .execute(&mut *conn)
        .await?;

    for segment in segments {
        sqlx::query(
            r#"
            INSERT INTO segments (id, media_id, number, start_seconds, end_seconds, text,
                                  language, generated_by, avg_logprob, no_speech_prob)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(segment.id.to_string())
        .bind(&segment.media_id)
        .bind(segment.number as i64)
        .bind(segment.start_seconds)
        .bind(segment.end_seconds)
        .bind(&segment.text)
        .bind(&segment.language)
        .bind(&segment.generated_by)
        .bind(segment.avg_logprob)
        .bind(segment.no_speech_prob)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

/// Segments of one media item in order
pub async fn load_segments_for_media(pool: &SqlitePool, media_id: &str) -> Result<Vec<Segment>> {
    let sql = format!(
        "SELECT {} FROM segments s WHERE s.media_id = ? ORDER BY s.number ASC",
        SEGMENT_COLUMNS
    );
    sqlx::query(&sql)
        .bind(media_id)
        .fetch_all(pool)
        .await?
        .iter()
        .map(segment_from_row)
        .collect()
}

/// Segments keyed by id; unknown ids are absent from the map
pub async fn load_segments_by_ids(
    pool: &SqlitePool,
    ids: &[Uuid],
) -> Result<HashMap<Uuid, Segment>> {
    let mut segments = HashMap::new();
    if ids.is_empty() {
        return Ok(segments);
    }

    let placeholders = vec!["?"; ids.len()].join(", ");
    let sql = format!(
        "SELECT {} FROM segments s WHERE s.id IN ({})",
        SEGMENT_COLUMNS, placeholders
    );
    let mut query = sqlx::query(&sql);
    for id in ids {
        query = query.bind(id.to_string());
    }

    for row in query.fetch_all(pool).await? {
        let segment = segment_from_row(&row)?;
        segments.insert(segment.id, segment);
    }
    Ok(segments)
}

/// Case-insensitive substring match over segment text
///
/// Ranked by media recency, then segment order.
pub async fn search_text(pool: &SqlitePool, needle: &str, limit: usize) -> Result<Vec<Segment>> {
    let sql = format!(
        r#"
        SELECT {}
        FROM segments s
        JOIN media m ON m.id = s.media_id
        WHERE LOWER(s.text) LIKE ? ESCAPE '\'
        ORDER BY m.created_at DESC, m.id ASC, s.number ASC
        LIMIT ?
        "#,
        SEGMENT_COLUMNS
    );
    sqlx::query(&sql)
        .bind(like_pattern(needle))
        .bind(limit as i64)
        .fetch_all(pool)
        .await?
        .iter()
        .map(segment_from_row)
        .collect()
}

/// Total stored segments
pub async fn count_segments(pool: &SqlitePool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM segments")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

fn segment_from_row(row: &SqliteRow) -> Result<Segment> {
    let id: String = row.get("id");
    let number: i64 = row.get("number");

    Ok(Segment {
        id: parse_uuid(&id)?,
        media_id: row.get("media_id"),
        number: number as u32,
        start_seconds: row.get("start_seconds"),
        end_seconds: row.get("end_seconds"),
        text: row.get("text"),
        language: row.get("language"),
        generated_by: row.get("generated_by"),
        avg_logprob: row.get("avg_logprob"),
        no_speech_prob: row.get("no_speech_prob"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::media::save_media;
    use crate::db::test_support::{sample_media, setup_test_db};
    use crate::models::{TranscribedSegment, Transcript};

    fn transcript(texts: &[&str]) -> Transcript {
        Transcript {
            language: Some("en".to_string()),
            generated_by: "captions:en".to_string(),
            segments: texts
                .iter()
                .enumerate()
                .map(|(i, t)| TranscribedSegment::new(i as f64, i as f64 + 1.0, *t))
                .collect(),
        }
    }

    #[tokio::test]
    async fn test_replace_is_not_additive() {
        let (_dir, pool) = setup_test_db().await;
        save_media(&pool, &sample_media("m1", "pond")).await.unwrap();

        let first = Segment::from_transcript("m1", &transcript(&["a", "b", "c"]));
        let mut tx = pool.begin().await.unwrap();
        replace_segments(&mut tx, "m1", &first).await.unwrap();
        tx.commit().await.unwrap();

        let second = Segment::from_transcript("m1", &transcript(&["only"]));
        let mut tx = pool.begin().await.unwrap();
        replace_segments(&mut tx, "m1", &second).await.unwrap();
        tx.commit().await.unwrap();

        let loaded = load_segments_for_media(&pool, "m1").await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].text, "only");
        assert_eq!(loaded[0].number, 0);
        assert_eq!(count_segments(&pool).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_load_by_ids_and_search_text() {
        let (_dir, pool) = setup_test_db().await;
        save_media(&pool, &sample_media("m1", "pond")).await.unwrap();
        let segments = Segment::from_transcript(
            "m1",
            &transcript(&["The Squeaky Frog", "a quiet pond", "100% frog"]),
        );
        let mut tx = pool.begin().await.unwrap();
        replace_segments(&mut tx, "m1", &segments).await.unwrap();
        tx.commit().await.unwrap();

        let by_id = load_segments_by_ids(&pool, &[segments[1].id, Uuid::new_v4()])
            .await
            .unwrap();
        assert_eq!(by_id.len(), 1);
        assert_eq!(by_id[&segments[1].id].text, "a quiet pond");

        let hits = search_text(&pool, "FROG", 10).await.unwrap();
        let numbers: Vec<u32> = hits.iter().map(|s| s.number).collect();
        assert_eq!(numbers, vec![0, 2]);

        let percent = search_text(&pool, "0%", 10).await.unwrap();
        assert_eq!(percent.len(), 1);
    }
}
