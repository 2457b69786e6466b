//! Test Helper Utilities
//!
//! Shared fixtures for the frogbase integration tests: offline libraries,
//! fake remote backends and generated media.

#![allow(dead_code)]

pub mod audio_generator;

pub use audio_generator::{generate_test_wav, write_vtt, AudioConfig};

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

use frogbase::config::{Settings, TranscriptionBackend};
use frogbase::models::Transcript;
use frogbase::services::media_fetcher::DownloadedMedia;
use frogbase::services::source_resolver::PlaylistEntry;
use frogbase::services::{
    build_transcriber, MediaDownloader, PlaylistExpander, Transcriber,
};
use frogbase::{Backends, IngestError, IngestResult, Library};
use frogbase_common::events::EventBus;

pub const TEST_LIBRARY: &str = "test-library";

/// Settings that never touch the network or external binaries
pub fn offline_settings() -> Settings {
    let mut settings = Settings::default();
    settings.transcription.backend = TranscriptionBackend::None;
    settings.embedding.dimensions = 256;
    settings.pipeline.workers = 2;
    settings
}

/// Transcriber wrapper that counts calls
pub struct CountingTranscriber {
    inner: Arc<dyn Transcriber>,
    calls: AtomicUsize,
}

impl CountingTranscriber {
    pub fn new(inner: Arc<dyn Transcriber>) -> Self {
        Self {
            inner,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transcriber for CountingTranscriber {
    fn describe(&self) -> String {
        self.inner.describe()
    }

    async fn transcribe(&self, media_path: &Path) -> IngestResult<Transcript> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.transcribe(media_path).await
    }
}

/// Downloader that writes a short tone and a caption file named after the URL
pub struct FakeDownloader;

#[async_trait]
impl MediaDownloader for FakeDownloader {
    async fn download(&self, url: &str, target_dir: &Path) -> IngestResult<DownloadedMedia> {
        if url.contains("unavailable") {
            return Err(IngestError::Fetch(format!("Video unavailable: {}", url)));
        }
        std::fs::create_dir_all(target_dir).map_err(|e| IngestError::Fetch(e.to_string()))?;
        let media_path = target_dir.join("media.wav");
        generate_test_wav(&media_path, &AudioConfig::default())
            .map_err(|e| IngestError::Fetch(e.to_string()))?;
        write_vtt(&media_path, &[(0.0, 2.5, &format!("remote frog chorus from {}", url))])
            .map_err(|e| IngestError::Fetch(e.to_string()))?;
        Ok(DownloadedMedia {
            media_path,
            info: None,
        })
    }
}

/// Expander returning two fixed entries, or none for URLs containing "empty"
pub struct FakeExpander;

#[async_trait]
impl PlaylistExpander for FakeExpander {
    async fn expand(&self, url: &str) -> IngestResult<Vec<PlaylistEntry>> {
        if url.contains("empty") {
            return Ok(Vec::new());
        }
        Ok(vec![
            PlaylistEntry {
                url: "https://www.youtube.com/watch?v=frog0001".to_string(),
                title: Some("Frog one".to_string()),
            },
            PlaylistEntry {
                url: "https://www.youtube.com/watch?v=frog0002".to_string(),
                title: Some("Frog two".to_string()),
            },
        ])
    }
}

/// Offline backends; the transcriber is the configured chain wrapped in a counter
pub fn offline_backends(settings: &Settings) -> (Backends, Arc<CountingTranscriber>) {
    let counting = Arc::new(CountingTranscriber::new(build_transcriber(
        &settings.transcription,
        reqwest::Client::new(),
    )));
    let backends = Backends {
        transcriber: Some(counting.clone()),
        embedder: None,
        downloader: Some(Arc::new(FakeDownloader)),
        playlist_expander: Some(Arc::new(FakeExpander)),
    };
    (backends, counting)
}

/// Temporary data root with an open library
pub struct TestLibrary {
    pub root: TempDir,
    pub media: TempDir,
    pub library: Library,
    pub transcriber: Arc<CountingTranscriber>,
}

impl TestLibrary {
    pub async fn new() -> Self {
        Self::with_settings(offline_settings()).await
    }

    pub async fn with_settings(settings: Settings) -> Self {
        let root = tempfile::tempdir().expect("Failed to create temp root");
        let media = tempfile::tempdir().expect("Failed to create media dir");
        let (backends, transcriber) = offline_backends(&settings);
        let library = Library::open_with(
            root.path(),
            TEST_LIBRARY,
            settings,
            backends,
            EventBus::new(1000),
        )
        .await
        .expect("Failed to open library");
        Self {
            root,
            media,
            library,
            transcriber,
        }
    }

    /// Reopen the same library directory with fresh backends
    pub async fn reopen(self, settings: Settings) -> Self {
        let TestLibrary {
            root,
            media,
            library,
            ..
        } = self;
        library.close().await;
        let (backends, transcriber) = offline_backends(&settings);
        let library = Library::open_with(
            root.path(),
            TEST_LIBRARY,
            settings,
            backends,
            EventBus::new(1000),
        )
        .await
        .expect("Failed to reopen library");
        Self {
            root,
            media,
            library,
            transcriber,
        }
    }

    /// Tone WAV with a caption sidecar in the media folder
    pub fn captioned_wav(&self, name: &str, cues: &[(f64, f64, &str)]) -> PathBuf {
        let path = self.media.path().join(format!("{}.wav", name));
        generate_test_wav(&path, &AudioConfig::default()).expect("Failed to write WAV");
        write_vtt(&path, cues).expect("Failed to write captions");
        path
    }

    /// Digitally silent WAV without captions
    pub fn silent_wav(&self, name: &str, duration_seconds: f64) -> PathBuf {
        let path = self.media.path().join(format!("{}.wav", name));
        generate_test_wav(&path, &AudioConfig::silent(duration_seconds))
            .expect("Failed to write WAV");
        path
    }

    /// Tone WAV without captions
    pub fn uncaptioned_wav(&self, name: &str) -> PathBuf {
        let path = self.media.path().join(format!("{}.wav", name));
        generate_test_wav(&path, &AudioConfig::default()).expect("Failed to write WAV");
        path
    }
}

pub fn source(path: &Path) -> String {
    path.to_string_lossy().to_string()
}
