//! Segment vector index
//!
//! `IndexManager` owns one library's `SegmentGraph` behind a
//! `tokio::sync::RwLock`. Writers (pipeline workers, rebuild) are
//! serialized; readers never observe a partially inserted entry.
//!
//! The index file is a cache of the `embeddings` table. On open it is
//! loaded and, when absent, corrupt or out of step with the table,
//! rebuilt from the stored vectors in insertion order.

pub mod distance;
pub mod graph;
pub mod storage;

pub use graph::{Neighbor, SegmentGraph};
pub use storage::IndexHeader;

use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{IndexSettings, Metric};
use crate::db::embeddings::{count_embeddings, delete_embeddings, load_embeddings};
use crate::error::{IngestError, IngestResult};

/// File name of the index inside a library directory
pub const INDEX_FILE_NAME: &str = "segments.hnsw";

pub struct IndexManager {
    path: PathBuf,
    header: IndexHeader,
    settings: IndexSettings,
    graph: RwLock<SegmentGraph>,
    persist_lock: Mutex<()>,
}

impl IndexManager {
    /// Empty in-memory index
    pub fn new(path: PathBuf, settings: IndexSettings, dimensions: usize, model: String) -> Self {
        let header = IndexHeader {
            metric: settings.metric,
            dimensions,
            model,
        };
        let graph = SegmentGraph::new(settings.metric, dimensions, settings.ef_construction);
        Self {
            path,
            header,
            settings,
            graph: RwLock::new(graph),
            persist_lock: Mutex::new(()),
        }
    }

    /// Load the index file
    ///
    /// Returns `IndexCorrupt` on any format or header mismatch and an empty
    /// index when the file does not exist.
    pub async fn load(
        path: PathBuf,
        settings: IndexSettings,
        dimensions: usize,
        model: String,
    ) -> IngestResult<Self> {
        let manager = Self::new(path, settings, dimensions, model);
        if let Some(graph) = storage::read_index(&manager.path, &manager.header).await? {
            *manager.graph.write().await = graph;
        }
        Ok(manager)
    }

    /// Load the index, rebuilding from the metadata store when needed
    pub async fn open(
        path: PathBuf,
        settings: IndexSettings,
        dimensions: usize,
        model: String,
        pool: &SqlitePool,
    ) -> IngestResult<Self> {
        let stored = count_embeddings(pool, &model).await? as usize;

        let manager = match Self::load(path.clone(), settings.clone(), dimensions, model.clone()).await
        {
            Ok(manager) => manager,
            Err(IngestError::IndexCorrupt(reason)) => {
                warn!(path = %path.display(), "Index unusable, rebuilding: {}", reason);
                let manager = Self::new(path, settings, dimensions, model);
                manager.rebuild(pool).await?;
                return Ok(manager);
            }
            Err(e) => return Err(e),
        };

        let loaded = manager.len().await;
        if loaded != stored {
            info!(
                path = %manager.path.display(),
                loaded,
                stored,
                "Index out of step with stored embeddings, rebuilding"
            );
            manager.rebuild(pool).await?;
        } else {
            debug!(path = %manager.path.display(), entries = loaded, "Index loaded");
        }
        Ok(manager)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn metric(&self) -> Metric {
        self.header.metric
    }

    pub fn dimensions(&self) -> usize {
        self.header.dimensions
    }

    pub fn model(&self) -> &str {
        &self.header.model
    }

    pub async fn len(&self) -> usize {
        self.graph.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.graph.read().await.is_empty()
    }

    pub async fn contains(&self, segment_id: &Uuid) -> bool {
        self.graph.read().await.contains(segment_id)
    }

    /// Add one entry; returns `false` when the segment is already indexed
    pub async fn insert(&self, segment_id: Uuid, vector: &[f32]) -> IngestResult<bool> {
        self.graph.write().await.insert(segment_id, vector)
    }

    /// Add entries in order under a single write lock
    ///
    /// Returns the number of new entries.
    pub async fn insert_batch(&self, entries: &[(Uuid, Vec<f32>)]) -> IngestResult<usize> {
        let mut graph = self.graph.write().await;
        let mut added = 0;
        for (segment_id, vector) in entries {
            if graph.insert(*segment_id, vector)? {
                added += 1;
            }
        }
        Ok(added)
    }

    /// k nearest segments by the configured metric
    pub async fn query(&self, vector: &[f32], k: usize) -> IngestResult<Vec<Neighbor>> {
        self.graph.read().await.search(
            vector,
            k,
            self.settings.ef_search,
            self.settings.exact_threshold,
        )
    }

    /// Write the index file atomically
    pub async fn persist(&self) -> IngestResult<()> {
        let _guard = self.persist_lock.lock().await;
        let bytes = {
            let graph = self.graph.read().await;
            storage::encode(&self.header, &graph)?
        };
        storage::write_atomic(&self.path, &bytes).await?;
        debug!(path = %self.path.display(), bytes = bytes.len(), "Index persisted");
        Ok(())
    }

    /// Replace the graph with one built from the stored embeddings
    ///
    /// Stored vectors the graph rejects are deleted so the table and the
    /// index agree on the entry count. Returns the number of entries.
    pub async fn rebuild(&self, pool: &SqlitePool) -> IngestResult<usize> {
        let embeddings = load_embeddings(pool, &self.header.model).await?;
        let metric = self.header.metric;
        let dimensions = self.header.dimensions;
        let ef_construction = self.settings.ef_construction;

        let (graph, rejected) = tokio::task::spawn_blocking(move || {
            let mut graph = SegmentGraph::new(metric, dimensions, ef_construction);
            let mut rejected = Vec::new();
            for (segment_id, vector) in &embeddings {
                if let Err(e) = graph.insert(*segment_id, vector) {
                    warn!(segment_id = %segment_id, "Dropping stored embedding: {}", e);
                    rejected.push(*segment_id);
                }
            }
            (graph, rejected)
        })
        .await
        .map_err(|e| IngestError::IndexCorrupt(format!("Rebuild task failed: {}", e)))?;

        if !rejected.is_empty() {
            delete_embeddings(pool, &rejected).await?;
        }

        let entries = graph.len();
        *self.graph.write().await = graph;
        self.persist().await?;
        info!(
            path = %self.path.display(),
            entries,
            dropped = rejected.len(),
            "Index rebuilt"
        );
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager(dir: &Path) -> IndexManager {
        IndexManager::new(
            dir.join(INDEX_FILE_NAME),
            IndexSettings::default(),
            2,
            "test-model".to_string(),
        )
    }

    #[tokio::test]
    async fn test_persist_then_load_gives_same_results() {
        let dir = tempfile::tempdir().unwrap();
        let index = manager(dir.path());
        for i in 0..20u128 {
            let angle = i as f32 / 10.0;
            index.insert(Uuid::from_u128(i), &[angle.cos(), angle.sin()]).await.unwrap();
        }
        index.persist().await.unwrap();

        let loaded = IndexManager::load(
            dir.path().join(INDEX_FILE_NAME),
            IndexSettings::default(),
            2,
            "test-model".to_string(),
        )
        .await
        .unwrap();

        let query = [0.3f32.cos(), 0.3f32.sin()];
        let before: Vec<Uuid> = index.query(&query, 5).await.unwrap().iter().map(|n| n.segment_id).collect();
        let after: Vec<Uuid> = loaded.query(&query, 5).await.unwrap().iter().map(|n| n.segment_id).collect();
        assert_eq!(before, after);
        assert_eq!(before[0], Uuid::from_u128(3));
    }

    #[tokio::test]
    async fn test_load_with_other_model_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let index = manager(dir.path());
        index.insert(Uuid::from_u128(1), &[1.0, 0.0]).await.unwrap();
        index.persist().await.unwrap();

        let result = IndexManager::load(
            dir.path().join(INDEX_FILE_NAME),
            IndexSettings::default(),
            2,
            "other-model".to_string(),
        )
        .await;
        assert!(matches!(result, Err(IngestError::IndexCorrupt(_))));
    }

    #[tokio::test]
    async fn test_query_empty_index() {
        let dir = tempfile::tempdir().unwrap();
        let index = manager(dir.path());
        assert!(matches!(index.query(&[1.0, 0.0], 3).await, Err(IngestError::EmptyIndex)));
    }

    #[tokio::test]
    async fn test_rebuild_drops_unindexable_rows() {
        use crate::db::embeddings::save_embeddings;
        use crate::db::media::save_media;
        use crate::db::segments::replace_segments;
        use crate::db::test_support::{sample_media, setup_test_db};
        use crate::models::{Segment, TranscribedSegment, Transcript};

        let (dir, pool) = setup_test_db().await;
        save_media(&pool, &sample_media("m1", "pond")).await.unwrap();
        let transcript = Transcript {
            language: None,
            generated_by: "test".into(),
            segments: vec![
                TranscribedSegment::new(0.0, 1.0, "good"),
                TranscribedSegment::new(1.0, 2.0, "bad"),
            ],
        };
        let segments = Segment::from_transcript("m1", &transcript);
        let mut tx = pool.begin().await.unwrap();
        replace_segments(&mut tx, "m1", &segments).await.unwrap();
        save_embeddings(
            &mut tx,
            "test-model",
            &[
                (segments[0].id, vec![1.0, 0.0]),
                (segments[1].id, vec![1.0, 0.0, 0.0]),
            ],
        )
        .await
        .unwrap();
        tx.commit().await.unwrap();

        let path = dir.path().join(INDEX_FILE_NAME);
        let open = || {
            IndexManager::open(
                path.clone(),
                IndexSettings::default(),
                2,
                "test-model".to_string(),
                &pool,
            )
        };

        let index = open().await.unwrap();
        assert_eq!(index.len().await, 1);
        assert!(index.contains(&segments[0].id).await);
        assert_eq!(count_embeddings(&pool, "test-model").await.unwrap(), 1);

        // Counts agree now, so the next open keeps the persisted file
        let modified = std::fs::metadata(&path).unwrap().modified().unwrap();
        let reopened = open().await.unwrap();
        assert_eq!(reopened.len().await, 1);
        assert_eq!(std::fs::metadata(&path).unwrap().modified().unwrap(), modified);
    }
}
