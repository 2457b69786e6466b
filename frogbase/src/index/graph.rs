//! Segment vector graph
//!
//! Wraps an HNSW graph with the segment ids in insertion order and the
//! stored vectors used for exact re-ranking. Entry `i` of the graph,
//! `ids` and `vectors` always refer to the same segment.

use hnsw::{Hnsw, Params, Searcher};
use rand_pcg::Pcg64;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

use super::distance::{distance, normalized, Euclidean};
use crate::config::Metric;
use crate::error::{IngestError, IngestResult};

/// Max neighbours per node on upper layers
pub const GRAPH_DEGREE: usize = 16;
/// Max neighbours per node on layer 0
pub const GRAPH_DEGREE_BASE: usize = 32;

type Graph = Hnsw<Euclidean, Vec<f32>, Pcg64, GRAPH_DEGREE, GRAPH_DEGREE_BASE>;

/// Nearest-neighbour result in graph space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub segment_id: Uuid,
    pub distance: f32,
    /// Insertion position, used to break distance ties
    pub position: usize,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct SegmentGraph {
    metric: Metric,
    dimensions: usize,
    graph: Graph,
    ids: Vec<Uuid>,
    vectors: Vec<Vec<f32>>,
    #[serde(skip)]
    positions: HashMap<Uuid, usize>,
}

impl fmt::Debug for SegmentGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SegmentGraph")
            .field("metric", &self.metric)
            .field("dimensions", &self.dimensions)
            .field("len", &self.ids.len())
            .finish_non_exhaustive()
    }
}

impl SegmentGraph {
    pub fn new(metric: Metric, dimensions: usize, ef_construction: usize) -> Self {
        let params = Params::new().ef_construction(ef_construction);
        Self {
            metric,
            dimensions,
            graph: Hnsw::new_params(Euclidean, params),
            ids: Vec::new(),
            vectors: Vec::new(),
            positions: HashMap::new(),
        }
    }

    pub fn metric(&self) -> Metric {
        self.metric
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn contains(&self, segment_id: &Uuid) -> bool {
        self.positions.contains_key(segment_id)
    }

    /// Segment ids in insertion order
    pub fn ids(&self) -> &[Uuid] {
        &self.ids
    }

    /// Rebuild the id lookup after deserialization
    pub(crate) fn reindex(&mut self) {
        self.positions = self
            .ids
            .iter()
            .enumerate()
            .map(|(position, id)| (*id, position))
            .collect();
    }

    /// Check that the graph, ids and vectors agree
    pub(crate) fn check_consistency(&self) -> IngestResult<()> {
        if self.graph.len() != self.ids.len() || self.vectors.len() != self.ids.len() {
            return Err(IngestError::IndexCorrupt(format!(
                "Graph has {} nodes, {} ids, {} vectors",
                self.graph.len(),
                self.ids.len(),
                self.vectors.len()
            )));
        }
        if let Some(v) = self.vectors.iter().find(|v| v.len() != self.dimensions) {
            return Err(IngestError::IndexCorrupt(format!(
                "Stored vector has {} dimensions, header says {}",
                v.len(),
                self.dimensions
            )));
        }
        if self.positions.len() != self.ids.len() {
            return Err(IngestError::IndexCorrupt("Duplicate segment ids".to_string()));
        }
        Ok(())
    }

    /// Vector in the form stored for this metric
    fn prepare(&self, vector: &[f32]) -> IngestResult<Vec<f32>> {
        if vector.len() != self.dimensions {
            return Err(IngestError::Embedding(format!(
                "Vector has {} dimensions, index expects {}",
                vector.len(),
                self.dimensions
            )));
        }
        match self.metric {
            Metric::Cosine => normalized(vector)
                .ok_or_else(|| IngestError::Embedding("Cannot index a zero vector".to_string())),
            Metric::L2 => {
                if vector.iter().all(|v| v.is_finite()) {
                    Ok(vector.to_vec())
                } else {
                    Err(IngestError::Embedding("Vector has non-finite values".to_string()))
                }
            }
        }
    }

    /// Add an entry; returns `false` if the segment is already present
    pub fn insert(&mut self, segment_id: Uuid, vector: &[f32]) -> IngestResult<bool> {
        if self.positions.contains_key(&segment_id) {
            return Ok(false);
        }
        let prepared = self.prepare(vector)?;

        let mut searcher = Searcher::default();
        let position = self.graph.insert(prepared.clone(), &mut searcher);
        debug_assert_eq!(position, self.ids.len());

        self.ids.push(segment_id);
        self.vectors.push(prepared);
        self.positions.insert(segment_id, self.ids.len() - 1);
        Ok(true)
    }

    /// k nearest entries, ascending distance, earliest insertion first on ties
    ///
    /// Below `exact_threshold` entries every vector is scanned. Above it the
    /// graph supplies `max(ef_search, k)` candidates which are re-ranked by
    /// exact distance.
    pub fn search(
        &self,
        query: &[f32],
        k: usize,
        ef_search: usize,
        exact_threshold: usize,
    ) -> IngestResult<Vec<Neighbor>> {
        if self.is_empty() {
            return Err(IngestError::EmptyIndex);
        }
        if k == 0 {
            return Ok(Vec::new());
        }
        let query = self.prepare(query)?;

        let candidates: Vec<usize> = if self.len() < exact_threshold {
            (0..self.len()).collect()
        } else {
            let ef = ef_search.max(k);
            let mut searcher = Searcher::default();
            let mut dest = vec![
                space::Neighbor {
                    index: !0,
                    distance: 0,
                };
                ef
            ];
            self.graph
                .nearest(&query, ef, &mut searcher, &mut dest)
                .iter()
                .map(|n| n.index)
                .filter(|&i| i < self.len())
                .collect()
        };

        let mut neighbors: Vec<Neighbor> = candidates
            .into_iter()
            .map(|position| Neighbor {
                segment_id: self.ids[position],
                distance: distance(self.metric, &query, &self.vectors[position]),
                position,
            })
            .collect();

        neighbors.sort_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then(a.position.cmp(&b.position))
        });
        neighbors.truncate(k);
        Ok(neighbors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: u128) -> Uuid {
        Uuid::from_u128(n)
    }

    #[test]
    fn test_insert_is_idempotent() {
        let mut graph = SegmentGraph::new(Metric::Cosine, 2, 100);
        assert!(graph.insert(id(1), &[1.0, 0.0]).unwrap());
        assert!(!graph.insert(id(1), &[0.0, 1.0]).unwrap());
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn test_wrong_dimensions_rejected() {
        let mut graph = SegmentGraph::new(Metric::Cosine, 3, 100);
        let err = graph.insert(id(1), &[1.0, 0.0]).unwrap_err();
        assert_eq!(err.kind(), "embedding_error");
        assert!(graph.is_empty());
    }

    #[test]
    fn test_empty_search_fails() {
        let graph = SegmentGraph::new(Metric::L2, 2, 100);
        assert!(matches!(
            graph.search(&[1.0, 0.0], 3, 50, 1000),
            Err(IngestError::EmptyIndex)
        ));
    }

    #[test]
    fn test_ties_break_by_insertion_order() {
        let mut graph = SegmentGraph::new(Metric::L2, 2, 100);
        graph.insert(id(3), &[1.0, 1.0]).unwrap();
        graph.insert(id(1), &[1.0, 1.0]).unwrap();
        graph.insert(id(2), &[0.0, 0.0]).unwrap();

        let hits = graph.search(&[1.0, 1.0], 3, 50, 1000).unwrap();
        let ids: Vec<Uuid> = hits.iter().map(|h| h.segment_id).collect();
        assert_eq!(ids, vec![id(3), id(1), id(2)]);
    }

    #[test]
    fn test_graph_search_matches_exact_on_clear_winner() {
        let mut graph = SegmentGraph::new(Metric::L2, 8, 100);
        let vector = |i: usize| -> Vec<f32> {
            let mut v: Vec<f32> = (1..8).map(|j| ((i * 7 + j * 13) % 101) as f32).collect();
            v.insert(0, i as f32);
            v
        };
        for i in 0..300usize {
            graph.insert(id(i as u128), &vector(i)).unwrap();
        }
        let target = vector(42);

        let exact = graph.search(&target, 1, 50, usize::MAX).unwrap();
        let approx = graph.search(&target, 1, 50, 0).unwrap();
        assert_eq!(exact[0].segment_id, id(42));
        assert_eq!(approx[0].segment_id, id(42));
        assert!(approx[0].distance < 1e-6);
    }

    #[test]
    fn test_graph_path_larger_k_extends_smaller_k() {
        let mut graph = SegmentGraph::new(Metric::Cosine, 6, 100);
        for i in 0..200usize {
            let v: Vec<f32> = (0..6).map(|j| (((i + 1) * (j + 3)) % 17) as f32 + 0.5).collect();
            graph.insert(id(i as u128), &v).unwrap();
        }
        let query = [3.0, 1.0, 4.0, 1.0, 5.0, 9.0];

        let mut previous: Vec<Uuid> = Vec::new();
        for k in [1, 5, 10, 25, 50] {
            let ids: Vec<Uuid> = graph
                .search(&query, k, 50, 0)
                .unwrap()
                .iter()
                .map(|n| n.segment_id)
                .collect();
            assert_eq!(ids.len(), k);
            assert_eq!(&ids[..previous.len()], &previous[..], "k={}", k);
            previous = ids;
        }
    }
}
