//! Embedding table operations
//!
//! Vectors are stored as little-endian f32 blobs tagged with the model id,
//! so a library never mixes vectors from different models.

use chrono::Utc;
use frogbase_common::{Error, Result};
use sqlx::{Row, SqliteConnection, SqlitePool};
use uuid::Uuid;

use super::parse_uuid;

/// Insert or replace embeddings for segments
pub async fn save_embeddings(
    conn: &mut SqliteConnection,
    model: &str,
    embeddings: &[(Uuid, Vec<f32>)],
) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    for (segment_id, vector) in embeddings {
        sqlx::query(
            r#"
            INSERT INTO embeddings (segment_id, model, dimensions, vector, created_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(segment_id) DO UPDATE SET
                model = excluded.model,
                dimensions = excluded.dimensions,
                vector = excluded.vector
            "#,
        )
        .bind(segment_id.to_string())
        .bind(model)
        .bind(vector.len() as i64)
        .bind(encode_vector(vector))
        .bind(&now)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

/// All embeddings for a model in insertion (rowid) order
pub async fn load_embeddings(pool: &SqlitePool, model: &str) -> Result<Vec<(Uuid, Vec<f32>)>> {
    let rows = sqlx::query(
        "SELECT segment_id, dimensions, vector FROM embeddings WHERE model = ? ORDER BY rowid ASC",
    )
    .bind(model)
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            let id: String = row.get("segment_id");
            let dimensions: i64 = row.get("dimensions");
            let blob: Vec<u8> = row.get("vector");
            let vector = decode_vector(&blob)?;
            if vector.len() as i64 != dimensions {
                return Err(Error::Internal(format!(
                    "Embedding {} has {} values, expected {}",
                    id,
                    vector.len(),
                    dimensions
                )));
            }
            Ok((parse_uuid(&id)?, vector))
        })
        .collect()
}

/// Number of embeddings stored for a model
pub async fn count_embeddings(pool: &SqlitePool, model: &str) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM embeddings WHERE model = ?")
        .bind(model)
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// Drop embeddings produced by other models
pub async fn delete_other_models(pool: &SqlitePool, model: &str) -> Result<u64> {
    let result = sqlx::query("DELETE FROM embeddings WHERE model != ?")
        .bind(model)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

/// Drop embeddings for specific segments
pub async fn delete_embeddings(pool: &SqlitePool, segment_ids: &[Uuid]) -> Result<u64> {
    let mut deleted = 0;
    for segment_id in segment_ids {
        let result = sqlx::query("DELETE FROM embeddings WHERE segment_id = ?")
            .bind(segment_id.to_string())
            .execute(pool)
            .await?;
        deleted += result.rows_affected();
    }
    Ok(deleted)
}

pub fn encode_vector(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|v| v.to_le_bytes()).collect()
}

pub fn decode_vector(blob: &[u8]) -> Result<Vec<f32>> {
    if blob.len() % 4 != 0 {
        return Err(Error::Internal(format!(
            "Embedding blob length {} is not a multiple of 4",
            blob.len()
        )));
    }
    Ok(blob
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}
