//! Source resolution
//!
//! Turns a user-supplied URL or local path into ordered media stubs.
//! Resolution has no side effects beyond stub creation; playlists are
//! expanded through a `PlaylistExpander`.

use async_trait::async_trait;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;
use walkdir::{DirEntry, WalkDir};

use crate::error::{IngestError, IngestResult};
use crate::models::{MediaLocation, MediaStub, Source, SourceKind};
use crate::services::external_tool::run_tool;

/// Extensions accepted from local files and directories
pub const SUPPORTED_EXTENSIONS: &[&str] = &[
    "mp3", "mp4", "mpeg", "mpga", "m4a", "wav", "webm", "ogg", "flac", "mkv",
];

const IGNORE_PATTERNS: &[&str] = &[".DS_Store", "Thumbs.db", ".git", ".svn", "node_modules"];

/// One entry of an expanded playlist or channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistEntry {
    pub url: String,
    pub title: Option<String>,
}

/// Expands a playlist URL into its entries
#[async_trait]
pub trait PlaylistExpander: Send + Sync {
    async fn expand(&self, url: &str) -> IngestResult<Vec<PlaylistEntry>>;
}

/// `yt-dlp --flat-playlist -J`
pub struct YtDlpPlaylistExpander {
    binary: String,
    timeout: Duration,
}

impl YtDlpPlaylistExpander {
    pub fn new(binary: impl Into<String>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            timeout,
        }
    }
}

#[derive(Debug, Deserialize)]
struct FlatPlaylist {
    #[serde(default)]
    entries: Vec<FlatEntry>,
}

#[derive(Debug, Deserialize)]
struct FlatEntry {
    id: Option<String>,
    url: Option<String>,
    title: Option<String>,
}

#[async_trait]
impl PlaylistExpander for YtDlpPlaylistExpander {
    async fn expand(&self, url: &str) -> IngestResult<Vec<PlaylistEntry>> {
        let output = run_tool(&self.binary, ["--flat-playlist", "-J", url], self.timeout)
            .await
            .map_err(|e| IngestError::Fetch(format!("Playlist expansion failed: {}", e)))?;

        parse_flat_playlist(&output.stdout)
    }
}

fn parse_flat_playlist(json: &[u8]) -> IngestResult<Vec<PlaylistEntry>> {
    let playlist: FlatPlaylist = serde_json::from_slice(json)
        .map_err(|e| IngestError::Fetch(format!("Unreadable playlist listing: {}", e)))?;

    Ok(playlist
        .entries
        .into_iter()
        .filter_map(|entry| {
            let url = match (entry.url, entry.id) {
                (Some(url), _) if url.starts_with("http") => url,
                (_, Some(id)) => format!("https://www.youtube.com/watch?v={}", id),
                _ => return None,
            };
            Some(PlaylistEntry {
                url,
                title: entry.title,
            })
        })
        .collect())
}

/// Source resolver
pub struct SourceResolver {
    expander: Arc<dyn PlaylistExpander>,
    recursive: bool,
}

impl SourceResolver {
    pub fn new(expander: Arc<dyn PlaylistExpander>, recursive: bool) -> Self {
        Self {
            expander,
            recursive,
        }
    }

    /// Decide what kind of source a string is
    ///
    /// Existing paths win over URL parsing so that odd file names are never
    /// mistaken for URLs.
    pub fn classify(raw: &str) -> IngestResult<Source> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(IngestError::invalid_source(raw, "empty source"));
        }

        let path = Path::new(raw);
        if path.is_dir() {
            return Ok(Source {
                raw: raw.to_string(),
                kind: SourceKind::LocalDirectory,
            });
        }
        if path.is_file() {
            return Ok(Source {
                raw: raw.to_string(),
                kind: SourceKind::LocalFile,
            });
        }

        match Url::parse(raw) {
            Ok(url) if matches!(url.scheme(), "http" | "https") && url.host_str().is_some() => {
                let kind = if is_playlist_url(&url) {
                    SourceKind::RemotePlaylist
                } else {
                    SourceKind::RemoteVideo
                };
                Ok(Source {
                    raw: raw.to_string(),
                    kind,
                })
            }
            Ok(url) if url.scheme().len() > 1 => Err(IngestError::invalid_source(
                raw,
                format!("unsupported URL scheme '{}'", url.scheme()),
            )),
            _ => Err(IngestError::invalid_source(
                raw,
                "neither a supported URL nor an existing path",
            )),
        }
    }

    /// Resolve one source string into stubs
    pub async fn resolve(&self, raw: &str) -> IngestResult<Vec<MediaStub>> {
        let source = Self::classify(raw)?;
        debug!(source = %source.raw, kind = source.kind.as_str(), "Resolving source");

        let stubs = match source.kind {
            SourceKind::LocalFile => {
                let path = PathBuf::from(&source.raw);
                if !has_supported_extension(&path) {
                    return Err(IngestError::invalid_source(
                        &source.raw,
                        "unsupported file extension",
                    ));
                }
                vec![local_stub(&source, &path)?]
            }
            SourceKind::LocalDirectory => {
                let files = scan_directory(Path::new(&source.raw), self.recursive);
                if files.is_empty() {
                    return Err(IngestError::invalid_source(
                        &source.raw,
                        "directory contains no supported media files",
                    ));
                }
                files
                    .iter()
                    .map(|path| local_stub(&source, path))
                    .collect::<IngestResult<Vec<_>>>()?
            }
            SourceKind::RemoteVideo => vec![remote_stub(&source, &source.raw, None)?],
            SourceKind::RemotePlaylist => {
                let entries = self.expander.expand(&source.raw).await?;
                info!(source = %source.raw, entries = entries.len(), "Expanded playlist");
                if entries.is_empty() {
                    return Err(IngestError::Fetch(format!(
                        "playlist has no entries: {}",
                        source.raw
                    )));
                }
                entries
                    .iter()
                    .map(|entry| remote_stub(&source, &entry.url, entry.title.clone()))
                    .collect::<IngestResult<Vec<_>>>()?
            }
        };

        Ok(dedup_stubs(stubs))
    }
}

/// Playlists, channels and user pages
fn is_playlist_url(url: &Url) -> bool {
    let has_list = url.query_pairs().any(|(k, _)| k == "list");
    let path = url.path();
    has_list
        || path.contains("/playlist")
        || path.starts_with("/@")
        || path.contains("/channel/")
        || path.starts_with("/c/")
        || path.starts_with("/user/")
}

fn has_supported_extension(path: &Path) -> bool {
    path.extension()
        .map(|ext| {
            let ext = ext.to_string_lossy().to_lowercase();
            SUPPORTED_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// Supported files under `root`, sorted for a stable order
fn scan_directory(root: &Path, recursive: bool) -> Vec<PathBuf> {
    let mut symlink_visited = HashSet::new();
    let walker = WalkDir::new(root)
        .follow_links(false)
        .max_depth(if recursive { usize::MAX } else { 1 })
        .into_iter()
        .filter_entry(|e| should_process_entry(e, &mut symlink_visited));

    let mut files = Vec::new();
    for entry in walker {
        match entry {
            Ok(entry) => {
                let path = entry.path();
                let is_file = entry.file_type().is_file()
                    || (entry.file_type().is_symlink() && path.is_file());
                if is_file && has_supported_extension(path) {
                    files.push(path.to_path_buf());
                }
            }
            Err(e) => {
                warn!("Error accessing entry: {}", e);
            }
        }
    }

    files.sort();
    files
}

fn should_process_entry(entry: &DirEntry, symlink_visited: &mut HashSet<PathBuf>) -> bool {
    let file_name = entry.file_name().to_string_lossy();
    if entry.depth() > 0 && IGNORE_PATTERNS.iter().any(|p| file_name.contains(p)) {
        return false;
    }

    if entry.file_type().is_symlink() {
        if let Ok(canonical) = entry.path().canonicalize() {
            if !symlink_visited.insert(canonical) {
                warn!("Symlink loop detected: {}", entry.path().display());
                return false;
            }
        }
    }

    true
}

fn local_stub(source: &Source, path: &Path) -> IngestResult<MediaStub> {
    let canonical = path
        .canonicalize()
        .map_err(|e| IngestError::invalid_source(path.display().to_string(), e.to_string()))?;
    let title = canonical
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "untitled".to_string());

    Ok(MediaStub {
        id: local_media_id(&canonical),
        source: source.clone(),
        kind: SourceKind::LocalFile,
        location: MediaLocation::Path(canonical),
        title,
        source_name: "disk".to_string(),
    })
}

fn remote_stub(source: &Source, raw_url: &str, title: Option<String>) -> IngestResult<MediaStub> {
    let url = Url::parse(raw_url).map_err(|e| IngestError::invalid_source(raw_url, e.to_string()))?;
    let id = remote_media_id(&url);
    let source_name = source_name_for(&url);

    Ok(MediaStub {
        title: title.unwrap_or_else(|| id.clone()),
        id,
        source: source.clone(),
        kind: SourceKind::RemoteVideo,
        location: MediaLocation::Url(url.to_string()),
        source_name,
    })
}

fn dedup_stubs(stubs: Vec<MediaStub>) -> Vec<MediaStub> {
    let mut seen = HashSet::new();
    stubs
        .into_iter()
        .filter(|stub| seen.insert(stub.id.clone()))
        .collect()
}

/// First 16 hex chars of SHA-256 over the canonical path
pub fn local_media_id(canonical_path: &Path) -> String {
    short_hash(canonical_path.to_string_lossy().as_bytes())
}

/// Platform video id when recognisable, else a hash of the URL
pub fn remote_media_id(url: &Url) -> String {
    youtube_video_id(url).unwrap_or_else(|| short_hash(url.as_str().as_bytes()))
}

fn short_hash(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    format!("{:x}", digest)[..16].to_string()
}

fn is_youtube_host(host: &str) -> bool {
    let host = host.trim_start_matches("www.").trim_start_matches("m.");
    matches!(host, "youtube.com" | "music.youtube.com" | "youtu.be" | "youtube-nocookie.com")
}

fn source_name_for(url: &Url) -> String {
    match url.host_str() {
        Some(host) if is_youtube_host(host) => "youtube".to_string(),
        Some(host) => host.trim_start_matches("www.").to_string(),
        None => "web".to_string(),
    }
}

/// YouTube ids are 11 chars of `[A-Za-z0-9_-]`
fn youtube_video_id(url: &Url) -> Option<String> {
    let host = url.host_str()?;
    if !is_youtube_host(host) {
        return None;
    }

    let candidate = if host.ends_with("youtu.be") {
        url.path_segments()?.next().map(str::to_string)
    } else if let Some((_, v)) = url.query_pairs().find(|(k, _)| k == "v") {
        Some(v.to_string())
    } else {
        let mut segments = url.path_segments()?;
        match segments.next() {
            Some("shorts") | Some("embed") | Some("live") => segments.next().map(str::to_string),
            _ => None,
        }
    }?;

    let valid = candidate.len() == 11
        && candidate
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    valid.then_some(candidate)
}
