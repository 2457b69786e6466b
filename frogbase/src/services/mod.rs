//! Pipeline stage adapters
//!
//! Each stage talks to the outside world (filesystem, yt-dlp, whisper,
//! embedding servers) through a trait so the pipeline can run with
//! offline implementations in tests.

pub mod audio_probe;
pub mod embedder;
pub mod external_tool;
pub mod media_fetcher;
pub mod source_resolver;
pub mod transcriber;

pub use embedder::{build_embedder, Embedder, HashingEmbedder, RemoteEmbedder};
pub use media_fetcher::{MediaDownloader, MediaFetcher, YtDlpDownloader};
pub use source_resolver::{PlaylistExpander, SourceResolver, YtDlpPlaylistExpander};
pub use transcriber::{build_transcriber, normalize, Transcriber};
