//! Index file format
//!
//! ```text
//! magic     8 bytes  "FROGHNSW"
//! version   u32 LE
//! checksum  32 bytes SHA-256 of payload
//! payload   bincode (metric, dimensions, model, graph)
//! ```

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;

use super::graph::SegmentGraph;
use crate::config::Metric;
use crate::error::{IngestError, IngestResult};

pub const MAGIC: &[u8; 8] = b"FROGHNSW";
pub const FORMAT_VERSION: u32 = 1;

const HEADER_LEN: usize = 8 + 4 + 32;

fn payload_config() -> impl bincode::config::Config {
    bincode::config::standard()
        .with_fixed_int_encoding()
        .with_little_endian()
}

/// What an index file must match to be usable
#[derive(Debug, Clone, PartialEq)]
pub struct IndexHeader {
    pub metric: Metric,
    pub dimensions: usize,
    pub model: String,
}

#[derive(Serialize)]
struct PayloadRef<'a> {
    metric: Metric,
    dimensions: usize,
    model: &'a str,
    graph: &'a SegmentGraph,
}

#[derive(Deserialize)]
struct Payload {
    metric: Metric,
    dimensions: usize,
    model: String,
    graph: SegmentGraph,
}

pub fn encode(header: &IndexHeader, graph: &SegmentGraph) -> IngestResult<Vec<u8>> {
    let payload = bincode::serde::encode_to_vec(
        PayloadRef {
            metric: header.metric,
            dimensions: header.dimensions,
            model: &header.model,
            graph,
        },
        payload_config(),
    )
    .map_err(|e| IngestError::IndexCorrupt(format!("Encode failed: {}", e)))?;

    let mut bytes = Vec::with_capacity(HEADER_LEN + payload.len());
    bytes.extend_from_slice(MAGIC);
    bytes.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    bytes.extend_from_slice(&Sha256::digest(&payload));
    bytes.extend_from_slice(&payload);
    Ok(bytes)
}

/// Decode and validate an index file against the expected header
pub fn decode(bytes: &[u8], expected: &IndexHeader) -> IngestResult<SegmentGraph> {
    if bytes.len() < HEADER_LEN {
        return Err(IngestError::IndexCorrupt(format!(
            "File is {} bytes, shorter than the header",
            bytes.len()
        )));
    }
    if &bytes[..8] != MAGIC {
        return Err(IngestError::IndexCorrupt("Bad magic bytes".to_string()));
    }

    let mut version = [0u8; 4];
    version.copy_from_slice(&bytes[8..12]);
    let version = u32::from_le_bytes(version);
    if version != FORMAT_VERSION {
        return Err(IngestError::IndexCorrupt(format!(
            "Format version {} (expected {})",
            version, FORMAT_VERSION
        )));
    }

    let payload = &bytes[HEADER_LEN..];
    if Sha256::digest(payload).as_slice() != &bytes[12..HEADER_LEN] {
        return Err(IngestError::IndexCorrupt("Checksum mismatch".to_string()));
    }

    let (decoded, read): (Payload, usize) =
        bincode::serde::decode_from_slice(payload, payload_config())
            .map_err(|e| IngestError::IndexCorrupt(format!("Decode failed: {}", e)))?;
    if read != payload.len() {
        return Err(IngestError::IndexCorrupt(format!(
            "{} trailing bytes after payload",
            payload.len() - read
        )));
    }

    if decoded.metric != expected.metric {
        return Err(IngestError::IndexCorrupt(format!(
            "Index metric {} does not match configured {}",
            decoded.metric.as_str(),
            expected.metric.as_str()
        )));
    }
    if decoded.dimensions != expected.dimensions || decoded.graph.dimensions() != expected.dimensions {
        return Err(IngestError::IndexCorrupt(format!(
            "Index has {} dimensions, configured {}",
            decoded.dimensions, expected.dimensions
        )));
    }
    if decoded.model != expected.model {
        return Err(IngestError::IndexCorrupt(format!(
            "Index built with model '{}', configured '{}'",
            decoded.model, expected.model
        )));
    }
    if decoded.graph.metric() != expected.metric {
        return Err(IngestError::IndexCorrupt("Graph metric disagrees with header".to_string()));
    }

    let mut graph = decoded.graph;
    graph.reindex();
    graph.check_consistency()?;
    Ok(graph)
}

/// Read an index file; `Ok(None)` when it does not exist
pub async fn read_index(path: &Path, expected: &IndexHeader) -> IngestResult<Option<SegmentGraph>> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(IngestError::IndexCorrupt(format!(
                "Read {} failed: {}",
                path.display(),
                e
            )))
        }
    };
    let expected = expected.clone();
    let graph = tokio::task::spawn_blocking(move || decode(&bytes, &expected))
        .await
        .map_err(|e| IngestError::IndexCorrupt(format!("Decode task failed: {}", e)))??;
    Ok(Some(graph))
}

/// Write bytes atomically (temp file + rename)
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> IngestResult<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(frogbase_common::Error::from)?;
    }
    let tmp_path = path.with_extension("hnsw.tmp");
    tokio::fs::write(&tmp_path, bytes)
        .await
        .map_err(frogbase_common::Error::from)?;
    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(frogbase_common::Error::from)?;
    Ok(())
}
