//! Media fetching
//!
//! Places each item's bytes in `<library>/<title-stem>::<id>/`, probes the
//! stream and fills in the media attributes. Local files are copied (or
//! moved); remote items are downloaded through a `MediaDownloader`.

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::FetchSettings;
use crate::error::{IngestError, IngestResult};
use crate::models::{MediaItem, MediaLocation, MediaStatus, MediaStub};
use crate::services::audio_probe::probe_audio_file;
use crate::services::external_tool::run_tool;

/// Base name of downloaded media inside an item directory
const MEDIA_BASENAME: &str = "media";

/// Platform metadata written by the downloader (`media.info.json`)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RemoteInfo {
    pub title: Option<String>,
    pub uploader: Option<String>,
    pub upload_date: Option<String>,
    pub duration: Option<f64>,
    pub extractor: Option<String>,
}

/// Result of a remote download
#[derive(Debug, Clone)]
pub struct DownloadedMedia {
    pub media_path: PathBuf,
    pub info: Option<RemoteInfo>,
}

/// Downloads one remote item into a directory
#[async_trait]
pub trait MediaDownloader: Send + Sync {
    async fn download(&self, url: &str, target_dir: &Path) -> IngestResult<DownloadedMedia>;
}

/// yt-dlp downloader (audio-only mp3 by default, info json, WebVTT subtitles)
pub struct YtDlpDownloader {
    binary: String,
    audio_only: bool,
    high_quality: bool,
    subtitle_language: String,
    archive_path: PathBuf,
    timeout: Duration,
}

impl YtDlpDownloader {
    pub fn new(settings: &FetchSettings, archive_path: PathBuf) -> Self {
        Self {
            binary: settings.ytdlp_binary.clone(),
            audio_only: settings.audio_only,
            high_quality: settings.high_quality,
            subtitle_language: settings.subtitle_language.clone(),
            archive_path,
            timeout: Duration::from_secs(settings.timeout_secs),
        }
    }

    fn args(&self, url: &str, target_dir: &Path) -> Vec<String> {
        let format = match (self.audio_only, self.high_quality) {
            (true, true) => "bestaudio/best",
            (true, false) => "worstaudio/worst",
            (false, true) => "bestvideo+bestaudio/best",
            (false, false) => "worst",
        };
        let template = target_dir.join(format!("{}.%(ext)s", MEDIA_BASENAME));

        let mut args = vec!["-f".to_string(), format.to_string()];
        if self.audio_only {
            args.extend(["-x", "--audio-format", "mp3"].map(String::from));
        }
        args.extend(
            [
                "--no-playlist",
                "--write-info-json",
                "--write-subs",
                "--write-auto-subs",
                "--sub-format",
                "vtt",
            ]
            .map(String::from),
        );
        args.push("--sub-langs".to_string());
        args.push(self.subtitle_language.clone());
        args.push("--download-archive".to_string());
        args.push(self.archive_path.to_string_lossy().to_string());
        args.push("-o".to_string());
        args.push(template.to_string_lossy().to_string());
        args.push(url.to_string());
        args
    }
}

#[async_trait]
impl MediaDownloader for YtDlpDownloader {
    async fn download(&self, url: &str, target_dir: &Path) -> IngestResult<DownloadedMedia> {
        tokio::fs::create_dir_all(target_dir)
            .await
            .map_err(|e| IngestError::Fetch(format!("Create {}: {}", target_dir.display(), e)))?;

        info!(url, dir = %target_dir.display(), "Downloading with yt-dlp");
        run_tool(&self.binary, self.args(url, target_dir), self.timeout)
            .await
            .map_err(|e| IngestError::Fetch(e.to_string()))?;

        let media_path = find_media_file(target_dir).await?.ok_or_else(|| {
            IngestError::Fetch(format!(
                "yt-dlp produced no media file for {} (already in download archive?)",
                url
            ))
        })?;

        let info_path = target_dir.join(format!("{}.info.json", MEDIA_BASENAME));
        let info = match tokio::fs::read(&info_path).await {
            Ok(bytes) => match serde_json::from_slice::<RemoteInfo>(&bytes) {
                Ok(info) => Some(info),
                Err(e) => {
                    warn!("Unreadable {}: {}", info_path.display(), e);
                    None
                }
            },
            Err(_) => None,
        };

        Ok(DownloadedMedia { media_path, info })
    }
}

/// `media.<ext>` in an item directory, skipping sidecars and partials
async fn find_media_file(dir: &Path) -> IngestResult<Option<PathBuf>> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(IngestError::Fetch(format!("Read {}: {}", dir.display(), e))),
    };

    let mut found = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| IngestError::Fetch(e.to_string()))?
    {
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().to_string();
        let is_sidecar = name.ends_with(".json")
            || name.ends_with(".vtt")
            || name.ends_with(".part")
            || name.ends_with(".ytdl");
        if path.file_stem().map(|s| s == MEDIA_BASENAME).unwrap_or(false) && !is_sidecar {
            found.push(path);
        }
    }
    found.sort();
    Ok(found.into_iter().next())
}

/// Media fetcher
pub struct MediaFetcher {
    library_dir: PathBuf,
    downloader: Arc<dyn MediaDownloader>,
    move_files: bool,
}

impl MediaFetcher {
    pub fn new(library_dir: PathBuf, downloader: Arc<dyn MediaDownloader>, move_files: bool) -> Self {
        Self {
            library_dir,
            downloader,
            move_files,
        }
    }

    /// Directory holding an item's files
    pub fn item_dir(&self, title: &str, id: &str) -> PathBuf {
        self.library_dir.join(format!("{}::{}", sanitize_stem(title), id))
    }

    /// Fetch a stub, returning the item with status `fetched`
    ///
    /// An item whose media file is already in place is only re-probed.
    pub async fn fetch(&self, stub: &MediaStub, mut item: MediaItem) -> IngestResult<MediaItem> {
        if let Some(existing) = item.local_path.as_ref().map(|p| self.library_dir.join(p)) {
            if existing.is_file() {
                debug!(media_id = %item.id, "Media already fetched, re-probing");
                return self.finish(item, existing).await;
            }
        }

        let media_path = match &stub.location {
            MediaLocation::Path(path) => {
                let dir = self.item_dir(&stub.title, &stub.id);
                self.place_local_file(path, &dir).await?
            }
            MediaLocation::Url(url) => {
                let dir = self.item_dir(&stub.title, &stub.id);
                let downloaded = match find_media_file(&dir).await? {
                    Some(media_path) => DownloadedMedia {
                        media_path,
                        info: None,
                    },
                    None => self.downloader.download(url, &dir).await?,
                };
                if let Some(info) = downloaded.info {
                    if let Some(title) = info.title.filter(|t| !t.trim().is_empty()) {
                        item.title = title;
                    }
                    item.uploader = info.uploader;
                    item.upload_date = info.upload_date;
                    if let Some(extractor) = info.extractor {
                        item.source_name = extractor.to_lowercase();
                    }
                }
                downloaded.media_path
            }
        };

        self.finish(item, media_path).await
    }

    async fn finish(&self, mut item: MediaItem, media_path: PathBuf) -> IngestResult<MediaItem> {
        let probe_path = media_path.clone();
        let audio = tokio::task::spawn_blocking(move || probe_audio_file(&probe_path))
            .await
            .map_err(|e| IngestError::Fetch(format!("Probe task failed: {}", e)))?
            .map_err(|e| IngestError::Fetch(format!("Corrupt or unsupported media: {:#}", e)))?;

        let metadata = tokio::fs::metadata(&media_path)
            .await
            .map_err(|e| IngestError::Fetch(e.to_string()))?;

        item.is_video = infer::get_from_path(&media_path)
            .ok()
            .flatten()
            .map(|kind| kind.matcher_type() == infer::MatcherType::Video)
            .unwrap_or(false);
        item.ext = media_path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase());
        item.filesize = Some(metadata.len() as i64);
        item.duration_seconds = Some(audio.duration_seconds);
        item.local_path = Some(
            media_path
                .strip_prefix(&self.library_dir)
                .unwrap_or(&media_path)
                .to_string_lossy()
                .to_string(),
        );
        item.status = MediaStatus::Fetched;
        item.error = None;
        item.updated_at = Utc::now();

        info!(
            media_id = %item.id,
            duration_seconds = audio.duration_seconds,
            is_video = item.is_video,
            "Fetched media"
        );
        Ok(item)
    }

    /// Copy (or move) a local file and its caption sidecars into `dir`
    async fn place_local_file(&self, source: &Path, dir: &Path) -> IngestResult<PathBuf> {
        let file_name = source
            .file_name()
            .ok_or_else(|| IngestError::Fetch(format!("No file name in {}", source.display())))?;
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| IngestError::Fetch(format!("Create {}: {}", dir.display(), e)))?;

        let target = dir.join(file_name);
        if self.move_files {
            move_file(source, &target).await?;
        } else {
            tokio::fs::copy(source, &target)
                .await
                .map_err(|e| IngestError::Fetch(format!("Copy {}: {}", source.display(), e)))?;
        }

        for sidecar in caption_sidecars(source) {
            if let Some(name) = sidecar.file_name() {
                if let Err(e) = tokio::fs::copy(&sidecar, dir.join(name)).await {
                    warn!("Could not copy captions {}: {}", sidecar.display(), e);
                }
            }
        }

        Ok(target)
    }
}

async fn move_file(source: &Path, target: &Path) -> IngestResult<()> {
    if tokio::fs::rename(source, target).await.is_ok() {
        return Ok(());
    }
    // Cross-device move
    tokio::fs::copy(source, target)
        .await
        .map_err(|e| IngestError::Fetch(format!("Move {}: {}", source.display(), e)))?;
    tokio::fs::remove_file(source)
        .await
        .map_err(|e| IngestError::Fetch(format!("Remove {}: {}", source.display(), e)))?;
    Ok(())
}

/// `<stem>.vtt` and `<stem>.<lang>.vtt` next to a media file
pub fn caption_sidecars(media_path: &Path) -> Vec<PathBuf> {
    let (Some(dir), Some(stem)) = (media_path.parent(), media_path.file_stem()) else {
        return Vec::new();
    };
    let stem = stem.to_string_lossy();
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };

    let mut sidecars: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            let name = p.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
            name.ends_with(".vtt")
                && (name == format!("{}.vtt", stem) || name.starts_with(&format!("{}.", stem)))
        })
        .collect();
    sidecars.sort();
    sidecars
}

/// File-system safe directory stem
fn sanitize_stem(title: &str) -> String {
    let cleaned: String = title
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let trimmed = cleaned.trim().trim_matches('.');
    let truncated: String = trimmed.chars().take(80).collect();
    if truncated.is_empty() {
        "untitled".to_string()
    } else {
        truncated
    }
}
