//! Per-item outcomes of an add batch

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::IngestError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    /// Segments stored and embeddable ones indexed
    Indexed,
    /// Already indexed before this batch
    Skipped,
    Failed,
    /// Not started when the batch was cancelled
    Cancelled,
}

/// Outcome for one media item, or for a source that never resolved
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemOutcome {
    pub source: String,
    pub media_id: Option<String>,
    pub title: Option<String>,
    pub status: OutcomeStatus,
    /// Segments stored for the item
    pub segments: usize,
    /// Index entries added for the item
    pub indexed: usize,
    pub error_kind: Option<String>,
    pub error: Option<String>,
}

impl ItemOutcome {
    pub fn indexed(
        source: impl Into<String>,
        media_id: impl Into<String>,
        title: impl Into<String>,
        segments: usize,
        indexed: usize,
    ) -> Self {
        Self {
            source: source.into(),
            media_id: Some(media_id.into()),
            title: Some(title.into()),
            status: OutcomeStatus::Indexed,
            segments,
            indexed,
            error_kind: None,
            error: None,
        }
    }

    pub fn skipped(source: impl Into<String>, media_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            media_id: Some(media_id.into()),
            title: Some(title.into()),
            status: OutcomeStatus::Skipped,
            segments: 0,
            indexed: 0,
            error_kind: None,
            error: None,
        }
    }

    pub fn failed(source: impl Into<String>, media_id: Option<String>, error: &IngestError) -> Self {
        let status = if matches!(error, IngestError::Cancelled) {
            OutcomeStatus::Cancelled
        } else {
            OutcomeStatus::Failed
        };
        Self {
            source: source.into(),
            media_id,
            title: None,
            status,
            segments: 0,
            indexed: 0,
            error_kind: Some(error.kind().to_string()),
            error: Some(error.to_string()),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}

/// Result of `Library::add`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddSummary {
    pub batch_id: Uuid,
    pub outcomes: Vec<ItemOutcome>,
    pub duration_ms: u64,
}

impl AddSummary {
    pub fn count(&self, status: OutcomeStatus) -> usize {
        self.outcomes.iter().filter(|o| o.status == status).count()
    }

    pub fn indexed(&self) -> usize {
        self.count(OutcomeStatus::Indexed)
    }

    pub fn failed(&self) -> usize {
        self.count(OutcomeStatus::Failed)
    }

    pub fn skipped(&self) -> usize {
        self.count(OutcomeStatus::Skipped)
    }

    pub fn cancelled(&self) -> usize {
        self.count(OutcomeStatus::Cancelled)
    }

    pub fn failures(&self) -> impl Iterator<Item = &ItemOutcome> {
        self.outcomes.iter().filter(|o| o.status == OutcomeStatus::Failed)
    }
}
