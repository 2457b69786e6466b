//! Batch orchestration for `Library::add`
//!
//! Resolves every source, de-duplicates the resulting stubs and runs them
//! through `ItemPipeline` with at most `workers` items in flight. Outcomes
//! come back in source order: a source that fails to resolve contributes
//! one failed outcome at its position.

use chrono::Utc;
use frogbase_common::events::{EventBus, IngestEvent};
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use super::pipeline::ItemPipeline;
use crate::error::IngestError;
use crate::models::{AddSummary, ItemOutcome, MediaStub};
use crate::services::SourceResolver;

/// Work item after resolution
enum Planned {
    Item(MediaStub),
    Done(ItemOutcome),
}

pub struct IngestOrchestrator {
    resolver: SourceResolver,
    pipeline: Arc<ItemPipeline>,
    workers: usize,
    events: EventBus,
}

impl IngestOrchestrator {
    pub fn new(
        resolver: SourceResolver,
        pipeline: Arc<ItemPipeline>,
        workers: usize,
        events: EventBus,
    ) -> Self {
        Self {
            resolver,
            pipeline,
            workers: workers.max(1),
            events,
        }
    }

    /// Add sources to the library
    ///
    /// # Arguments
    /// * `batch_id` - identifier carried by every event of this batch
    /// * `sources` - URLs or local paths, in order
    /// * `cancel` - items not yet started when this fires are reported `cancelled`
    pub async fn run(
        &self,
        batch_id: Uuid,
        sources: &[String],
        cancel: CancellationToken,
    ) -> AddSummary {
        let started = Instant::now();

        info!(batch_id = %batch_id, sources = sources.len(), "Add batch started");
        self.events.emit_lossy(IngestEvent::BatchStarted {
            batch_id,
            source_count: sources.len(),
            timestamp: Utc::now(),
        });

        let planned = self.plan(batch_id, sources, &cancel).await;

        let pipeline = &self.pipeline;
        let cancel = &cancel;
        let outcomes: Vec<ItemOutcome> = stream::iter(planned)
            .map(|planned| async move {
                match planned {
                    Planned::Done(outcome) => outcome,
                    Planned::Item(stub) => {
                        if cancel.is_cancelled() {
                            return ItemOutcome::failed(
                                stub.source.raw.clone(),
                                Some(stub.id.clone()),
                                &IngestError::Cancelled,
                            )
                            .with_title(stub.title.clone());
                        }
                        pipeline.process(batch_id, &stub).await
                    }
                }
            })
            .buffered(self.workers)
            .collect()
            .await;

        let summary = AddSummary {
            batch_id,
            outcomes,
            duration_ms: started.elapsed().as_millis() as u64,
        };

        info!(
            batch_id = %batch_id,
            indexed = summary.indexed(),
            skipped = summary.skipped(),
            failed = summary.failed(),
            cancelled = summary.cancelled(),
            duration_ms = summary.duration_ms,
            "Add batch completed"
        );
        self.events.emit_lossy(IngestEvent::BatchCompleted {
            batch_id,
            indexed: summary.indexed(),
            skipped: summary.skipped(),
            failed: summary.failed(),
            cancelled: summary.cancelled(),
            duration_ms: summary.duration_ms,
            timestamp: Utc::now(),
        });

        summary
    }

    /// Resolve sources into stubs, dropping ids already planned
    async fn plan(
        &self,
        batch_id: Uuid,
        sources: &[String],
        cancel: &CancellationToken,
    ) -> Vec<Planned> {
        let mut planned = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        for raw in sources {
            if cancel.is_cancelled() {
                planned.push(Planned::Done(ItemOutcome::failed(
                    raw.clone(),
                    None,
                    &IngestError::Cancelled,
                )));
                continue;
            }

            match self.resolver.resolve(raw).await {
                Ok(stubs) => {
                    for stub in stubs {
                        if seen.insert(stub.id.clone()) {
                            planned.push(Planned::Item(stub));
                        }
                    }
                }
                Err(e) => {
                    warn!(source = %raw, kind = e.kind(), "Source not resolved: {}", e);
                    self.events.emit_lossy(IngestEvent::ItemFailed {
                        batch_id,
                        media_id: None,
                        source: raw.clone(),
                        kind: e.kind().to_string(),
                        message: e.to_string(),
                        timestamp: Utc::now(),
                    });
                    planned.push(Planned::Done(ItemOutcome::failed(raw.clone(), None, &e)));
                }
            }
        }

        planned
    }
}
