//! Distance functions and score conversion

use serde::{Deserialize, Serialize};

use crate::config::Metric;

/// Fixed-point scale for graph distances
///
/// `space::Metric` needs an unsigned unit. 100,000 gives 1e-5 precision,
/// which is enough for graph traversal; final ranking uses exact f32
/// distances.
const GRAPH_DISTANCE_SCALE: f32 = 100_000.0;

pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

pub fn l2_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

/// Cosine distance between unit vectors
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    (1.0 - dot(a, b)).clamp(0.0, 2.0)
}

/// Distance under `metric`
///
/// Cosine expects both vectors already normalized.
pub fn distance(metric: Metric, a: &[f32], b: &[f32]) -> f32 {
    match metric {
        Metric::Cosine => cosine_distance(a, b),
        Metric::L2 => l2_distance(a, b),
    }
}

/// Similarity score reported to callers (higher is better)
pub fn score(metric: Metric, distance: f32) -> f32 {
    match metric {
        Metric::Cosine => 1.0 - distance,
        Metric::L2 => 1.0 / (1.0 + distance),
    }
}

/// Unit-length copy of a vector, `None` for zero or non-finite input
pub fn normalized(vector: &[f32]) -> Option<Vec<f32>> {
    let norm = dot(vector, vector).sqrt();
    if norm == 0.0 || !norm.is_finite() {
        return None;
    }
    Some(vector.iter().map(|v| v / norm).collect())
}

/// Euclidean metric used to navigate the graph
///
/// For cosine the stored vectors are unit length, where Euclidean
/// order and cosine order agree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Euclidean;

impl space::Metric<Vec<f32>> for Euclidean {
    type Unit = u32;

    fn distance(&self, a: &Vec<f32>, b: &Vec<f32>) -> u32 {
        let d = l2_distance(a, b);
        (d * GRAPH_DISTANCE_SCALE).min(u32::MAX as f32) as u32
    }
}
