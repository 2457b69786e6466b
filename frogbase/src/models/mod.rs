//! Data models for frogbase

pub mod media;
pub mod outcome;
pub mod segment;

pub use media::{MediaItem, MediaLocation, MediaStatus, MediaStub, Source, SourceKind};
pub use outcome::{AddSummary, ItemOutcome, OutcomeStatus};
pub use segment::{Segment, TranscribedSegment, Transcript};
