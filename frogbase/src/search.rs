//! Search facade
//!
//! Turns query text into ranked `SearchHit`s. Three strategies:
//! - `semantic`: embed the query and ask the index
//! - `substring`: case-insensitive match over segment text, newest media first
//! - `hybrid`: reciprocal-rank fusion of the two

use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::config::{SearchSettings, SearchStrategy};
use crate::db::{media::load_media_by_ids, segments};
use crate::error::{IngestError, IngestResult};
use crate::index::{distance::score, IndexManager};
use crate::models::{MediaItem, Segment};
use crate::services::Embedder;

/// Reciprocal-rank fusion constant
const RRF_K: f32 = 60.0;

/// One ranked result
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub media: MediaItem,
    pub segment_id: Uuid,
    pub number: u32,
    pub start: f64,
    pub end: f64,
    pub text: String,
    pub score: f32,
}

impl SearchHit {
    fn new(media: MediaItem, segment: Segment, score: f32) -> Self {
        Self {
            media,
            segment_id: segment.id,
            number: segment.number,
            start: segment.start_seconds,
            end: segment.end_seconds,
            text: segment.text,
            score,
        }
    }
}

pub struct SearchEngine {
    pool: SqlitePool,
    index: Arc<IndexManager>,
    embedder: Arc<dyn Embedder>,
    settings: SearchSettings,
}

impl SearchEngine {
    pub fn new(
        pool: SqlitePool,
        index: Arc<IndexManager>,
        embedder: Arc<dyn Embedder>,
        settings: SearchSettings,
    ) -> Self {
        Self {
            pool,
            index,
            embedder,
            settings,
        }
    }

    pub fn settings(&self) -> &SearchSettings {
        &self.settings
    }

    /// Search with the configured default strategy
    pub async fn search(&self, query: &str, k: usize) -> IngestResult<Vec<SearchHit>> {
        self.search_with(query, k, self.settings.strategy).await
    }

    pub async fn search_with(
        &self,
        query: &str,
        k: usize,
        strategy: SearchStrategy,
    ) -> IngestResult<Vec<SearchHit>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(frogbase_common::Error::InvalidInput("Query is empty".to_string()).into());
        }
        if k == 0 {
            return Ok(Vec::new());
        }

        let ranked = match strategy {
            SearchStrategy::Semantic => self.semantic(query, k).await?,
            SearchStrategy::Substring => self.substring(query, k).await?,
            SearchStrategy::Hybrid => {
                let depth = self.settings.hybrid_depth.max(k);
                let semantic = self.semantic(query, depth).await?;
                let substring = self.substring(query, depth).await?;
                fuse(&[semantic, substring], k)
            }
        };

        let hits = self.resolve(ranked).await?;
        debug!(query, k, strategy = ?strategy, hits = hits.len(), "Search completed");
        Ok(hits)
    }

    /// Segment ids with similarity scores, best first
    async fn semantic(&self, query: &str, k: usize) -> IngestResult<Vec<(Uuid, f32)>> {
        if self.index.is_empty().await {
            return Err(IngestError::EmptyIndex);
        }
        let vector = self.embedder.embed(query).await?;
        let metric = self.index.metric();
        let neighbors = self.index.query(&vector, k).await?;

        Ok(neighbors
            .into_iter()
            .map(|n| (n.segment_id, score(metric, n.distance)))
            .filter(|(_, s)| *s >= self.settings.min_similarity)
            .collect())
    }

    async fn substring(&self, query: &str, k: usize) -> IngestResult<Vec<(Uuid, f32)>> {
        let matches = segments::search_text(&self.pool, query, k).await?;
        let total = matches.len().max(1) as f32;
        // Rank-derived score so callers still get a descending value
        Ok(matches
            .into_iter()
            .enumerate()
            .map(|(rank, s)| (s.id, 1.0 - rank as f32 / total))
            .collect())
    }

    /// Attach segments and media, preserving rank order
    ///
    /// Ids whose segment has since been replaced are dropped.
    async fn resolve(&self, ranked: Vec<(Uuid, f32)>) -> IngestResult<Vec<SearchHit>> {
        let ids: Vec<Uuid> = ranked.iter().map(|(id, _)| *id).collect();
        let mut segments = segments::load_segments_by_ids(&self.pool, &ids).await?;

        let mut media_ids: Vec<String> = segments.values().map(|s| s.media_id.clone()).collect();
        media_ids.sort();
        media_ids.dedup();
        let media = load_media_by_ids(&self.pool, &media_ids).await?;

        Ok(ranked
            .into_iter()
            .filter_map(|(id, score)| {
                let segment = segments.remove(&id)?;
                let item = media.get(&segment.media_id)?.clone();
                Some(SearchHit::new(item, segment, score))
            })
            .collect())
    }
}

/// Reciprocal-rank fusion
///
/// Ties keep the order in which ids were first seen across the lists.
fn fuse(lists: &[Vec<(Uuid, f32)>], k: usize) -> Vec<(Uuid, f32)> {
    let mut scores: HashMap<Uuid, (f32, usize)> = HashMap::new();
    let mut seen = 0usize;
    for list in lists {
        for (rank, (id, _)) in list.iter().enumerate() {
            let entry = scores.entry(*id).or_insert_with(|| {
                seen += 1;
                (0.0, seen)
            });
            entry.0 += 1.0 / (RRF_K + rank as f32 + 1.0);
        }
    }

    let mut fused: Vec<(Uuid, f32, usize)> = scores
        .into_iter()
        .map(|(id, (score, first_seen))| (id, score, first_seen))
        .collect();
    fused.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.2.cmp(&b.2)));
    fused.truncate(k);
    fused.into_iter().map(|(id, score, _)| (id, score)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fuse_rewards_agreement() {
        let a = Uuid::from_u128(1);
        let b = Uuid::from_u128(2);
        let c = Uuid::from_u128(3);
        let semantic = vec![(a, 0.9), (b, 0.8)];
        let substring = vec![(b, 1.0), (c, 0.5)];

        let fused = fuse(&[semantic, substring], 3);
        let ids: Vec<Uuid> = fused.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![b, a, c]);
    }

    #[test]
    fn test_fuse_of_fixed_lists_is_prefix_stable() {
        let a = Uuid::from_u128(1);
        let b = Uuid::from_u128(2);
        let c = Uuid::from_u128(3);
        let d = Uuid::from_u128(4);
        let semantic = vec![(a, 0.9), (b, 0.8), (d, 0.7)];
        let substring = vec![(c, 1.0), (d, 0.6), (b, 0.3)];
        let lists = [semantic, substring];

        let mut previous: Vec<Uuid> = Vec::new();
        for k in 1..=4 {
            let ids: Vec<Uuid> = fuse(&lists, k).iter().map(|(id, _)| *id).collect();
            assert_eq!(&ids[..previous.len()], &previous[..], "k={}", k);
            previous = ids;
        }
    }

    #[test]
    fn test_fuse_truncates() {
        let list: Vec<(Uuid, f32)> = (0..10).map(|i| (Uuid::from_u128(i), 1.0)).collect();
        assert_eq!(fuse(&[list], 4).len(), 4);
    }
}
