//! Ingest pipeline: add → resolve → fetch → transcribe → embed → index

pub mod orchestrator;
pub mod pipeline;

pub use orchestrator::IngestOrchestrator;
pub use pipeline::{ItemPipeline, StageTimeouts};
