//! Library facade
//!
//! A data root holds named libraries. Each library is a directory with
//! its own metadata store (`frogbase.db`), index file (`segments.hnsw`),
//! yt-dlp download archive and one sub-directory per media item.
//!
//! `Library` owns the shared pieces (pool, index, embedder) and hands
//! them to the ingest orchestrator and the search engine.

use serde::Serialize;
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use frogbase_common::events::EventBus;
use frogbase_common::Error;

use crate::config::{SearchStrategy, Settings};
use crate::db::{embeddings, media, segments, settings as settings_db};
use crate::error::IngestResult;
use crate::export::{self, TranscriptFormat};
use crate::index::{IndexManager, INDEX_FILE_NAME};
use crate::ingest::{IngestOrchestrator, ItemPipeline};
use crate::models::{AddSummary, MediaItem, Segment};
use crate::search::{SearchEngine, SearchHit};
use crate::services::{
    build_embedder, build_transcriber, Embedder, MediaDownloader, MediaFetcher, PlaylistExpander,
    SourceResolver, Transcriber, YtDlpDownloader, YtDlpPlaylistExpander,
};

pub const DATABASE_FILE_NAME: &str = "frogbase.db";
pub const ARCHIVE_FILE_NAME: &str = "download_archive.txt";

/// Replacements for the configured external backends
///
/// Anything left `None` is built from `Settings`.
#[derive(Clone, Default)]
pub struct Backends {
    pub transcriber: Option<Arc<dyn Transcriber>>,
    pub embedder: Option<Arc<dyn Embedder>>,
    pub downloader: Option<Arc<dyn MediaDownloader>>,
    pub playlist_expander: Option<Arc<dyn PlaylistExpander>>,
}

/// A media item with its ordered segments
#[derive(Debug, Clone, Serialize)]
pub struct MediaDetail {
    pub media: MediaItem,
    pub segments: Vec<Segment>,
}

pub struct Library {
    name: String,
    dir: PathBuf,
    pool: SqlitePool,
    settings: Settings,
    index: Arc<IndexManager>,
    search: SearchEngine,
    orchestrator: IngestOrchestrator,
    events: EventBus,
}

impl Library {
    /// Open (creating if needed) library `name` under `root`
    pub async fn open(root: &Path, name: &str, settings: Settings) -> IngestResult<Self> {
        Self::open_with(root, name, settings, Backends::default(), EventBus::default()).await
    }

    pub async fn open_with(
        root: &Path,
        name: &str,
        settings: Settings,
        backends: Backends,
        events: EventBus,
    ) -> IngestResult<Self> {
        validate_library_name(name)?;
        settings.validate()?;

        let dir = root.join(name);
        tokio::fs::create_dir_all(&dir).await.map_err(Error::from)?;

        let pool = frogbase_common::db::init_database(&dir.join(DATABASE_FILE_NAME)).await?;
        settings_db::save_library_settings(&pool, &settings).await?;

        let client = reqwest::Client::new();
        let embedder = backends
            .embedder
            .unwrap_or_else(|| build_embedder(&settings.embedding, client.clone()));
        let model = embedder.model_id();

        let stale = embeddings::delete_other_models(&pool, &model).await?;
        if stale > 0 {
            let demoted = media::demote_indexed(&pool).await?;
            warn!(
                library = name,
                model = %model,
                stale_embeddings = stale,
                demoted_items = demoted,
                "Embedding model changed; re-add sources to re-embed them"
            );
        }

        let index = Arc::new(
            IndexManager::open(
                dir.join(INDEX_FILE_NAME),
                settings.index.clone(),
                embedder.dimensions(),
                model,
                &pool,
            )
            .await?,
        );

        let transcriber = backends
            .transcriber
            .unwrap_or_else(|| build_transcriber(&settings.transcription, client.clone()));
        let downloader = backends.downloader.unwrap_or_else(|| {
            Arc::new(YtDlpDownloader::new(&settings.fetch, dir.join(ARCHIVE_FILE_NAME)))
        });
        let expander = backends.playlist_expander.unwrap_or_else(|| {
            Arc::new(YtDlpPlaylistExpander::new(
                settings.fetch.ytdlp_binary.clone(),
                Duration::from_secs(settings.fetch.timeout_secs),
            ))
        });

        let fetcher = MediaFetcher::new(dir.clone(), downloader, settings.fetch.move_files);
        let pipeline = ItemPipeline::new(
            pool.clone(),
            dir.clone(),
            fetcher,
            transcriber,
            embedder.clone(),
            index.clone(),
            settings.clone(),
            events.clone(),
        );
        let orchestrator = IngestOrchestrator::new(
            SourceResolver::new(expander, settings.fetch.recursive),
            Arc::new(pipeline),
            settings.pipeline.workers,
            events.clone(),
        );
        let search = SearchEngine::new(
            pool.clone(),
            index.clone(),
            embedder,
            settings.search.clone(),
        );

        info!(
            library = name,
            dir = %dir.display(),
            entries = index.len().await,
            "Library opened"
        );

        Ok(Self {
            name: name.to_string(),
            dir,
            pool,
            settings,
            index,
            search,
            orchestrator,
            events,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn index(&self) -> &Arc<IndexManager> {
        &self.index
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Add sources; one outcome per item or unresolvable source
    pub async fn add(&self, sources: &[String]) -> AddSummary {
        self.add_with_cancel(sources, CancellationToken::new()).await
    }

    pub async fn add_with_cancel(&self, sources: &[String], cancel: CancellationToken) -> AddSummary {
        self.add_batch(Uuid::new_v4(), sources, cancel).await
    }

    /// Add sources under a caller-chosen batch id
    pub async fn add_batch(
        &self,
        batch_id: Uuid,
        sources: &[String],
        cancel: CancellationToken,
    ) -> AddSummary {
        self.orchestrator.run(batch_id, sources, cancel).await
    }

    /// Search with the configured strategy
    pub async fn search(&self, query: &str, k: usize) -> IngestResult<Vec<SearchHit>> {
        self.search.search(query, k).await
    }

    pub async fn search_with(
        &self,
        query: &str,
        k: usize,
        strategy: SearchStrategy,
    ) -> IngestResult<Vec<SearchHit>> {
        self.search.search_with(query, k, strategy).await
    }

    pub async fn list_media(&self, filter: &media::MediaFilter) -> IngestResult<Vec<MediaItem>> {
        Ok(media::list_media(&self.pool, filter).await?)
    }

    pub async fn media_detail(&self, id: &str) -> IngestResult<MediaDetail> {
        let item = media::load_media(&self.pool, id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Media {}", id)))?;
        let segments = segments::load_segments_for_media(&self.pool, id).await?;
        Ok(MediaDetail {
            media: item,
            segments,
        })
    }

    /// Transcript of one media item as a WebVTT, SRT or JSON document
    pub async fn export_transcript(&self, id: &str, format: TranscriptFormat) -> IngestResult<String> {
        let detail = self.media_detail(id).await?;
        export::render(&detail, format)
    }

    /// Rebuild the index from stored embeddings
    pub async fn rebuild_index(&self) -> IngestResult<usize> {
        self.index.rebuild(&self.pool).await
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}

/// Library names are single path components
fn validate_library_name(name: &str) -> IngestResult<()> {
    let valid = !name.trim().is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\'])
        && name.trim() == name;
    if valid {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!("Invalid library name '{}'", name)).into())
    }
}

/// Names of the libraries under `root`, sorted
pub async fn list_libraries(root: &Path) -> IngestResult<Vec<String>> {
    let mut names = Vec::new();
    let mut entries = match tokio::fs::read_dir(root).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(names),
        Err(e) => return Err(Error::from(e).into()),
    };

    while let Some(entry) = entries.next_entry().await.map_err(Error::from)? {
        let path = entry.path();
        if path.join(DATABASE_FILE_NAME).is_file() {
            names.push(entry.file_name().to_string_lossy().to_string());
        }
    }
    names.sort();
    Ok(names)
}

/// Delete library `name` and everything in it
pub async fn remove_library(root: &Path, name: &str) -> IngestResult<()> {
    validate_library_name(name)?;
    let dir = root.join(name);
    if !dir.join(DATABASE_FILE_NAME).is_file() {
        return Err(Error::NotFound(format!("Library {}", name)).into());
    }
    tokio::fs::remove_dir_all(&dir).await.map_err(Error::from)?;
    info!(library = name, dir = %dir.display(), "Library removed");
    Ok(())
}
