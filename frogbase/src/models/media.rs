//! Sources, media stubs and media items

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// How a user-supplied string was interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    RemoteVideo,
    RemotePlaylist,
    LocalFile,
    LocalDirectory,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::RemoteVideo => "remote_video",
            SourceKind::RemotePlaylist => "remote_playlist",
            SourceKind::LocalFile => "local_file",
            SourceKind::LocalDirectory => "local_directory",
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, SourceKind::RemoteVideo | SourceKind::RemotePlaylist)
    }
}

impl std::str::FromStr for SourceKind {
    type Err = frogbase_common::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "remote_video" => Ok(SourceKind::RemoteVideo),
            "remote_playlist" => Ok(SourceKind::RemotePlaylist),
            "local_file" => Ok(SourceKind::LocalFile),
            "local_directory" => Ok(SourceKind::LocalDirectory),
            other => Err(frogbase_common::Error::InvalidInput(format!(
                "Unknown source kind: {}",
                other
            ))),
        }
    }
}

/// A user-supplied source after resolution; immutable
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    /// Trimmed string as given by the user
    pub raw: String,
    pub kind: SourceKind,
}

/// Where a stub's bytes come from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum MediaLocation {
    Url(String),
    Path(PathBuf),
}

/// One concrete asset produced by the resolver, not yet fetched
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaStub {
    pub id: String,
    /// Source the stub was resolved from (a playlist or directory yields many)
    pub source: Source,
    /// `RemoteVideo` or `LocalFile`
    pub kind: SourceKind,
    pub location: MediaLocation,
    /// Best-effort title before fetching (file stem, playlist entry title)
    pub title: String,
    /// `disk`, `youtube`, or the extractor name
    pub source_name: String,
}

/// Processing status of a media item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaStatus {
    Pending,
    Fetched,
    Transcribed,
    Indexed,
    FetchFailed,
    TranscriptionFailed,
}

impl MediaStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaStatus::Pending => "pending",
            MediaStatus::Fetched => "fetched",
            MediaStatus::Transcribed => "transcribed",
            MediaStatus::Indexed => "indexed",
            MediaStatus::FetchFailed => "fetch_failed",
            MediaStatus::TranscriptionFailed => "transcription_failed",
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, MediaStatus::FetchFailed | MediaStatus::TranscriptionFailed)
    }
}

impl std::fmt::Display for MediaStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MediaStatus {
    type Err = frogbase_common::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(MediaStatus::Pending),
            "fetched" => Ok(MediaStatus::Fetched),
            "transcribed" => Ok(MediaStatus::Transcribed),
            "indexed" => Ok(MediaStatus::Indexed),
            "fetch_failed" => Ok(MediaStatus::FetchFailed),
            "transcription_failed" => Ok(MediaStatus::TranscriptionFailed),
            other => Err(frogbase_common::Error::InvalidInput(format!(
                "Unknown media status: {}",
                other
            ))),
        }
    }
}

/// A media item as stored in the library
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaItem {
    /// Stable identifier (platform video id or path/URL hash)
    pub id: String,
    pub source: String,
    pub source_kind: SourceKind,
    pub source_name: String,
    pub title: String,
    /// Media file path relative to the library directory
    pub local_path: Option<String>,
    pub ext: Option<String>,
    pub is_video: bool,
    pub duration_seconds: Option<f64>,
    pub filesize: Option<i64>,
    pub uploader: Option<String>,
    /// `YYYYMMDD` as reported by the platform
    pub upload_date: Option<String>,
    pub status: MediaStatus,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MediaItem {
    /// New pending item for a stub
    pub fn from_stub(stub: &MediaStub) -> Self {
        let now = Utc::now();
        let source = match &stub.location {
            MediaLocation::Url(url) => url.clone(),
            MediaLocation::Path(path) => path.to_string_lossy().to_string(),
        };
        Self {
            id: stub.id.clone(),
            source,
            source_kind: stub.kind,
            source_name: stub.source_name.clone(),
            title: stub.title.clone(),
            local_path: None,
            ext: None,
            is_video: false,
            duration_seconds: None,
            filesize: None,
            uploader: None,
            upload_date: None,
            status: MediaStatus::Pending,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }
}
