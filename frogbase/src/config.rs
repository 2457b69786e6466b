//! Settings for a FrogBase library
//!
//! Resolution: TOML file sections, then environment overrides, then
//! `Settings::validate()`. The effective settings are written to the
//! library's `settings` table on open.

use frogbase_common::config::{load_toml_config, resolve_root_folder, LoggingConfig, ROOT_FOLDER_ENV};
use frogbase_common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Library used when none is named
pub const DEFAULT_LIBRARY: &str = "frogverse";

/// Whisper model sizes accepted by the CLI backend
pub const WHISPER_MODELS: &[&str] = &[
    "tiny", "tiny.en", "base", "base.en", "small", "small.en", "medium", "medium.en", "large",
    "large-v1", "large-v2", "large-v3", "turbo",
];

/// Top-level TOML configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FrogBaseConfig {
    /// Data root holding the libraries
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    /// Library opened when none is given on the command line
    #[serde(default)]
    pub library: Option<String>,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(flatten)]
    pub settings: Settings,
}

impl FrogBaseConfig {
    /// Load from `path` (defaults when absent) and apply environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config: FrogBaseConfig = load_toml_config(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply FROGBASE_* environment overrides
    pub fn apply_env_overrides(&mut self) {
        if let Ok(level) = std::env::var("FROGBASE_LOG_LEVEL") {
            if !level.trim().is_empty() {
                self.logging.level = level.trim().to_string();
            }
        }
        self.settings.apply_env_overrides();
    }

    /// Resolve the data root (CLI, FROGBASE_ROOT, TOML, OS default)
    pub fn resolve_root(&self, cli_root: Option<&Path>) -> PathBuf {
        resolve_root_folder(cli_root, ROOT_FOLDER_ENV, self.root_folder.as_deref())
    }

    /// Resolve the library name (CLI, TOML, default)
    pub fn resolve_library(&self, cli_library: Option<&str>) -> String {
        cli_library
            .map(str::to_string)
            .or_else(|| self.library.clone())
            .unwrap_or_else(|| DEFAULT_LIBRARY.to_string())
    }
}

/// Validated settings consumed by the pipeline and search facade
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub transcription: TranscriptionSettings,
    #[serde(default)]
    pub embedding: EmbeddingSettings,
    #[serde(default)]
    pub index: IndexSettings,
    #[serde(default)]
    pub pipeline: PipelineSettings,
    #[serde(default)]
    pub search: SearchSettings,
    #[serde(default)]
    pub fetch: FetchSettings,
}

/// Speech-to-text backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranscriptionBackend {
    /// Local `whisper` executable
    #[default]
    WhisperCli,
    /// OpenAI-compatible `/audio/transcriptions` endpoint
    Remote,
    /// Captions only; items without captions fail transcription
    None,
}

/// Whisper task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WhisperTask {
    #[default]
    Transcribe,
    Translate,
}

impl WhisperTask {
    pub fn as_str(&self) -> &'static str {
        match self {
            WhisperTask::Transcribe => "transcribe",
            WhisperTask::Translate => "translate",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptionSettings {
    pub backend: TranscriptionBackend,
    /// Model size (`base`, `small`, ...) or remote model name
    pub model: String,
    /// `None` lets the backend detect the language
    pub language: Option<String>,
    pub task: WhisperTask,
    pub temperature: f32,
    /// Added to the temperature on fallback; `None` disables fallback
    pub temperature_increment_on_fallback: Option<f32>,
    pub no_speech_threshold: f32,
    pub logprob_threshold: f32,
    pub compression_ratio_threshold: f32,
    pub condition_on_previous_text: bool,
    /// Prefer WebVTT sidecar captions over running a model
    pub use_captions: bool,
    /// Audio whose RMS never exceeds this level yields zero segments
    pub silence_threshold_db: f32,
    pub whisper_binary: String,
    pub api_base: String,
    /// Never persisted to the settings table
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

impl Default for TranscriptionSettings {
    fn default() -> Self {
        Self {
            backend: TranscriptionBackend::WhisperCli,
            model: "base".to_string(),
            language: Some("en".to_string()),
            task: WhisperTask::Transcribe,
            temperature: 0.0,
            temperature_increment_on_fallback: Some(0.2),
            no_speech_threshold: 0.6,
            logprob_threshold: -1.0,
            compression_ratio_threshold: 2.4,
            condition_on_previous_text: true,
            use_captions: true,
            silence_threshold_db: -60.0,
            whisper_binary: "whisper".to_string(),
            api_base: "https://api.openai.com/v1".to_string(),
            api_key: None,
            timeout_secs: 1800,
        }
    }
}

/// Text embedding backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingBackend {
    /// Offline feature-hashing embedder
    #[default]
    Hashing,
    /// OpenAI-compatible `/embeddings` endpoint
    Remote,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub backend: EmbeddingBackend,
    /// Remote model name; ignored by the hashing backend
    pub model: String,
    pub dimensions: usize,
    pub api_base: String,
    /// Never persisted to the settings table
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub batch_size: usize,
    pub timeout_secs: u64,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            backend: EmbeddingBackend::Hashing,
            model: "msmarco-MiniLM-L-6-v3".to_string(),
            dimensions: 384,
            api_base: "http://127.0.0.1:8080/v1".to_string(),
            api_key: None,
            batch_size: 32,
            timeout_secs: 120,
        }
    }
}

/// ANN distance metric
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    #[default]
    Cosine,
    L2,
}

impl Metric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Cosine => "cosine",
            Metric::L2 => "l2",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexSettings {
    pub metric: Metric,
    pub ef_construction: usize,
    pub ef_search: usize,
    /// Below this entry count queries use an exact scan
    pub exact_threshold: usize,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            metric: Metric::Cosine,
            ef_construction: 400,
            ef_search: 50,
            exact_threshold: 1000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    /// Maximum items processed concurrently
    pub workers: usize,
    pub embed_timeout_secs: u64,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            workers: 2,
            embed_timeout_secs: 300,
        }
    }
}

/// Search strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchStrategy {
    /// ANN over segment embeddings
    #[default]
    Semantic,
    /// Case-insensitive substring match over segment text
    Substring,
    /// Reciprocal-rank fusion of semantic and substring
    Hybrid,
}

impl std::str::FromStr for SearchStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "semantic" => Ok(SearchStrategy::Semantic),
            "substring" => Ok(SearchStrategy::Substring),
            "hybrid" => Ok(SearchStrategy::Hybrid),
            other => Err(Error::InvalidInput(format!("Unknown search strategy: {}", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    pub default_k: usize,
    /// Hits scoring below this are dropped
    pub min_similarity: f32,
    pub strategy: SearchStrategy,
    /// Candidates taken from each list before hybrid fusion; `k` above this
    /// widens the lists to `k`
    pub hybrid_depth: usize,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            default_k: 10,
            min_similarity: 0.0,
            strategy: SearchStrategy::Semantic,
            hybrid_depth: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchSettings {
    /// Move local files into the library instead of copying
    pub move_files: bool,
    /// Recurse into subdirectories of a local directory source
    pub recursive: bool,
    pub ytdlp_binary: String,
    /// Download audio only (mp3)
    pub audio_only: bool,
    /// Best available quality instead of the smallest stream
    pub high_quality: bool,
    pub subtitle_language: String,
    pub timeout_secs: u64,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            move_files: false,
            recursive: false,
            ytdlp_binary: "yt-dlp".to_string(),
            audio_only: true,
            high_quality: false,
            subtitle_language: "en".to_string(),
            timeout_secs: 3600,
        }
    }
}

impl Settings {
    /// Apply FROGBASE_WORKERS and FROGBASE_EMBEDDING_API_KEY
    pub fn apply_env_overrides(&mut self) {
        if let Ok(value) = std::env::var("FROGBASE_WORKERS") {
            match value.trim().parse::<usize>() {
                Ok(workers) => {
                    if workers != self.pipeline.workers {
                        info!(
                            "FROGBASE_WORKERS overrides configured workers ({} -> {})",
                            self.pipeline.workers, workers
                        );
                    }
                    self.pipeline.workers = workers;
                }
                Err(_) => warn!("Ignoring non-numeric FROGBASE_WORKERS: {}", value),
            }
        }

        self.embedding.api_key =
            resolve_api_key("FROGBASE_EMBEDDING_API_KEY", self.embedding.api_key.take());
        self.transcription.api_key =
            resolve_api_key("FROGBASE_TRANSCRIPTION_API_KEY", self.transcription.api_key.take());
    }

    /// Reject out-of-range values
    pub fn validate(&self) -> Result<()> {
        let t = &self.transcription;
        if t.backend == TranscriptionBackend::WhisperCli && !WHISPER_MODELS.contains(&t.model.as_str()) {
            return Err(Error::Config(format!(
                "Unknown whisper model '{}' (expected one of: {})",
                t.model,
                WHISPER_MODELS.join(", ")
            )));
        }
        if !(0.0..=1.0).contains(&t.no_speech_threshold) {
            return Err(Error::Config(format!(
                "transcription.no_speech_threshold must be within 0..=1, got {}",
                t.no_speech_threshold
            )));
        }
        if t.temperature < 0.0 {
            return Err(Error::Config("transcription.temperature must be >= 0".into()));
        }
        if let Some(inc) = t.temperature_increment_on_fallback {
            if inc <= 0.0 {
                return Err(Error::Config(
                    "transcription.temperature_increment_on_fallback must be > 0".into(),
                ));
            }
        }
        if t.logprob_threshold > 0.0 {
            return Err(Error::Config("transcription.logprob_threshold must be <= 0".into()));
        }
        if t.compression_ratio_threshold <= 0.0 {
            return Err(Error::Config(
                "transcription.compression_ratio_threshold must be > 0".into(),
            ));
        }
        if t.silence_threshold_db > 0.0 {
            return Err(Error::Config("transcription.silence_threshold_db must be <= 0".into()));
        }

        let e = &self.embedding;
        if e.dimensions == 0 {
            return Err(Error::Config("embedding.dimensions must be > 0".into()));
        }
        if e.batch_size == 0 {
            return Err(Error::Config("embedding.batch_size must be > 0".into()));
        }

        let i = &self.index;
        if i.ef_construction == 0 {
            return Err(Error::Config("index.ef_construction must be > 0".into()));
        }
        if i.ef_search == 0 {
            return Err(Error::Config("index.ef_search must be > 0".into()));
        }

        if self.pipeline.workers == 0 {
            return Err(Error::Config("pipeline.workers must be > 0".into()));
        }
        if !(-1.0..=1.0).contains(&self.search.min_similarity) {
            return Err(Error::Config(format!(
                "search.min_similarity must be within -1..=1, got {}",
                self.search.min_similarity
            )));
        }
        if self.search.default_k == 0 {
            return Err(Error::Config("search.default_k must be > 0".into()));
        }
        if self.search.hybrid_depth == 0 {
            return Err(Error::Config("search.hybrid_depth must be > 0".into()));
        }

        for (name, secs) in [
            ("transcription.timeout_secs", t.timeout_secs),
            ("embedding.timeout_secs", e.timeout_secs),
            ("pipeline.embed_timeout_secs", self.pipeline.embed_timeout_secs),
            ("fetch.timeout_secs", self.fetch.timeout_secs),
        ] {
            if secs == 0 {
                return Err(Error::Config(format!("{} must be > 0", name)));
            }
        }

        Ok(())
    }
}

/// Resolve an API key from environment then TOML
///
/// Warns when both are set; the environment wins.
fn resolve_api_key(env_var: &str, toml_key: Option<String>) -> Option<String> {
    let env_key = std::env::var(env_var).ok().filter(|k| is_valid_key(k));
    let toml_key = toml_key.filter(|k| is_valid_key(k));

    match (env_key, toml_key) {
        (Some(env), Some(_)) => {
            warn!("{} set in both environment and TOML config; using environment", env_var);
            Some(env)
        }
        (Some(env), None) => Some(env),
        (None, toml) => toml,
    }
}

/// Validate API key (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}
