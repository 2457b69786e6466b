//! Per-item ingest pipeline
//!
//! Runs one media item through fetch → transcribe → embed → index.
//! Stages are sequential and each runs under its own timeout, mapped to
//! that stage's error kind. Progress is written to the metadata store
//! after every stage, so an item added again resumes from its status:
//!
//! | status                                     | resumes at  |
//! |--------------------------------------------|-------------|
//! | `pending`, `fetch_failed`                  | fetch       |
//! | `fetched`, `transcription_failed`          | transcribe  |
//! | `transcribed`                              | embed       |
//! | `indexed`                                  | skipped     |
//!
//! Failures never escape `process`; they become a failed `ItemOutcome`.

use chrono::Utc;
use frogbase_common::events::{EventBus, IngestEvent, IngestStage};
use sqlx::SqlitePool;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::Settings;
use crate::db::{embeddings, media, segments};
use crate::error::{IngestError, IngestResult};
use crate::index::IndexManager;
use crate::models::{ItemOutcome, MediaItem, MediaStatus, MediaStub, Segment};
use crate::services::{normalize, Embedder, MediaFetcher, Transcriber};

/// Per-item stage time limits
#[derive(Debug, Clone, Copy)]
pub struct StageTimeouts {
    pub fetch: Duration,
    pub transcribe: Duration,
    pub embed: Duration,
}

impl StageTimeouts {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            fetch: Duration::from_secs(settings.fetch.timeout_secs),
            transcribe: Duration::from_secs(settings.transcription.timeout_secs),
            embed: Duration::from_secs(settings.pipeline.embed_timeout_secs),
        }
    }
}

/// Await `future`, turning an elapsed deadline into `on_timeout`
async fn with_timeout<T, F>(limit: Duration, future: F, on_timeout: IngestError) -> IngestResult<T>
where
    F: Future<Output = IngestResult<T>>,
{
    match tokio::time::timeout(limit, future).await {
        Ok(result) => result,
        Err(_) => Err(on_timeout),
    }
}

pub struct ItemPipeline {
    pool: SqlitePool,
    library_dir: PathBuf,
    fetcher: MediaFetcher,
    transcriber: Arc<dyn Transcriber>,
    embedder: Arc<dyn Embedder>,
    index: Arc<IndexManager>,
    settings: Settings,
    timeouts: StageTimeouts,
    events: EventBus,
}

impl ItemPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pool: SqlitePool,
        library_dir: PathBuf,
        fetcher: MediaFetcher,
        transcriber: Arc<dyn Transcriber>,
        embedder: Arc<dyn Embedder>,
        index: Arc<IndexManager>,
        settings: Settings,
        events: EventBus,
    ) -> Self {
        let timeouts = StageTimeouts::from_settings(&settings);
        Self {
            pool,
            library_dir,
            fetcher,
            transcriber,
            embedder,
            index,
            settings,
            timeouts,
            events,
        }
    }

    /// Process one stub to completion
    pub async fn process(&self, batch_id: Uuid, stub: &MediaStub) -> ItemOutcome {
        match self.run(batch_id, stub).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(media_id = %stub.id, kind = e.kind(), "Item failed: {}", e);
                self.events.emit_lossy(IngestEvent::ItemFailed {
                    batch_id,
                    media_id: Some(stub.id.clone()),
                    source: stub.source.raw.clone(),
                    kind: e.kind().to_string(),
                    message: e.to_string(),
                    timestamp: Utc::now(),
                });
                ItemOutcome::failed(stub.source.raw.clone(), Some(stub.id.clone()), &e)
                    .with_title(stub.title.clone())
            }
        }
    }

    async fn run(&self, batch_id: Uuid, stub: &MediaStub) -> IngestResult<ItemOutcome> {
        let mut item = match media::load_media(&self.pool, &stub.id).await? {
            Some(existing) if existing.status == MediaStatus::Indexed => {
                debug!(media_id = %existing.id, "Already indexed, skipping");
                self.events.emit_lossy(IngestEvent::ItemSkipped {
                    batch_id,
                    media_id: existing.id.clone(),
                    reason: "already indexed".to_string(),
                    timestamp: Utc::now(),
                });
                return Ok(ItemOutcome::skipped(
                    stub.source.raw.clone(),
                    existing.id,
                    existing.title,
                ));
            }
            Some(existing) => {
                info!(media_id = %existing.id, status = %existing.status, "Resuming item");
                existing
            }
            None => {
                let item = MediaItem::from_stub(stub);
                media::save_media(&self.pool, &item).await?;
                item
            }
        };

        self.events.emit_lossy(IngestEvent::ItemResolved {
            batch_id,
            media_id: item.id.clone(),
            title: item.title.clone(),
            source_kind: stub.kind.as_str().to_string(),
            timestamp: Utc::now(),
        });

        let media_missing = self.media_path(&item).map(|p| !p.is_file()).unwrap_or(true);
        let needs_fetch = matches!(item.status, MediaStatus::Pending | MediaStatus::FetchFailed)
            || (item.status != MediaStatus::Transcribed && media_missing);

        if needs_fetch {
            item = self.fetch(batch_id, stub, item).await?;
        }

        let stored = if item.status == MediaStatus::Transcribed {
            segments::load_segments_for_media(&self.pool, &item.id).await?
        } else {
            self.transcribe(batch_id, &item).await?
        };

        let indexed = self.embed_and_index(batch_id, &item, &stored).await?;

        info!(
            media_id = %item.id,
            segments = stored.len(),
            indexed,
            "Item indexed"
        );
        Ok(ItemOutcome::indexed(
            stub.source.raw.clone(),
            item.id.clone(),
            item.title.clone(),
            stored.len(),
            indexed,
        ))
    }

    fn media_path(&self, item: &MediaItem) -> Option<PathBuf> {
        item.local_path.as_ref().map(|p| self.library_dir.join(p))
    }

    async fn fetch(&self, batch_id: Uuid, stub: &MediaStub, item: MediaItem) -> IngestResult<MediaItem> {
        let id = item.id.clone();
        let fetched = with_timeout(
            self.timeouts.fetch,
            self.fetcher.fetch(stub, item),
            IngestError::Fetch(format!("Timed out after {}s", self.timeouts.fetch.as_secs())),
        )
        .await;

        let item = match fetched {
            Ok(item) => item,
            Err(e) => {
                media::update_status(&self.pool, &id, MediaStatus::FetchFailed, Some(&e.to_string()))
                    .await?;
                return Err(e);
            }
        };

        media::save_media(&self.pool, &item).await?;
        self.events.emit_lossy(IngestEvent::StageCompleted {
            batch_id,
            media_id: item.id.clone(),
            stage: IngestStage::Fetch,
            segment_count: None,
            timestamp: Utc::now(),
        });
        Ok(item)
    }

    async fn transcribe(&self, batch_id: Uuid, item: &MediaItem) -> IngestResult<Vec<Segment>> {
        let result = match self.media_path(item) {
            Some(path) => {
                info!(media_id = %item.id, transcriber = %self.transcriber.describe(), "Transcribing");
                with_timeout(
                    self.timeouts.transcribe,
                    self.transcriber.transcribe(&path),
                    IngestError::Transcription(format!(
                        "Timed out after {}s",
                        self.timeouts.transcribe.as_secs()
                    )),
                )
                .await
            }
            None => Err(IngestError::Transcription("Item has no local media file".to_string())),
        };

        let transcript = match result {
            Ok(transcript) => transcript,
            Err(e) => {
                media::update_status(
                    &self.pool,
                    &item.id,
                    MediaStatus::TranscriptionFailed,
                    Some(&e.to_string()),
                )
                .await?;
                return Err(e);
            }
        };

        let t = &self.settings.transcription;
        let transcript = normalize(
            transcript,
            item.duration_seconds,
            t.no_speech_threshold,
            t.logprob_threshold,
        );
        let new_segments = Segment::from_transcript(&item.id, &transcript);

        let mut tx = self.pool.begin().await?;
        segments::replace_segments(&mut *tx, &item.id, &new_segments).await?;
        media::update_status(&mut *tx, &item.id, MediaStatus::Transcribed, None).await?;
        tx.commit().await?;

        debug!(media_id = %item.id, segments = new_segments.len(), "Transcript stored");
        self.events.emit_lossy(IngestEvent::StageCompleted {
            batch_id,
            media_id: item.id.clone(),
            stage: IngestStage::Transcribe,
            segment_count: Some(new_segments.len()),
            timestamp: Utc::now(),
        });
        Ok(new_segments)
    }

    /// Embed segments, store vectors and add them to the index
    ///
    /// Segments whose text cannot be embedded stay stored but unindexed.
    /// Returns the number of segments that received a vector.
    async fn embed_and_index(
        &self,
        batch_id: Uuid,
        item: &MediaItem,
        stored: &[Segment],
    ) -> IngestResult<usize> {
        let texts: Vec<String> = stored.iter().map(|s| s.text.clone()).collect();
        let results = with_timeout(
            self.timeouts.embed,
            async { Ok(self.embedder.embed_batch(&texts).await) },
            IngestError::Embedding(format!("Timed out after {}s", self.timeouts.embed.as_secs())),
        )
        .await?;

        let mut vectors: Vec<(Uuid, Vec<f32>)> = Vec::with_capacity(stored.len());
        for (segment, result) in stored.iter().zip(results) {
            match result {
                Ok(vector) => vectors.push((segment.id, vector)),
                Err(e) => warn!(
                    media_id = %item.id,
                    segment = segment.number,
                    "Segment not indexed: {}",
                    e
                ),
            }
        }

        let model = self.embedder.model_id();
        let mut tx = self.pool.begin().await?;
        embeddings::save_embeddings(&mut *tx, &model, &vectors).await?;
        tx.commit().await?;

        self.events.emit_lossy(IngestEvent::StageCompleted {
            batch_id,
            media_id: item.id.clone(),
            stage: IngestStage::Embed,
            segment_count: Some(vectors.len()),
            timestamp: Utc::now(),
        });

        let added = self.index.insert_batch(&vectors).await?;
        if added > 0 {
            self.index.persist().await?;
        }
        media::update_status(&self.pool, &item.id, MediaStatus::Indexed, None).await?;

        self.events.emit_lossy(IngestEvent::StageCompleted {
            batch_id,
            media_id: item.id.clone(),
            stage: IngestStage::Index,
            segment_count: Some(added),
            timestamp: Utc::now(),
        });
        Ok(vectors.len())
    }
}
