//! Speech-to-text adapters
//!
//! Every backend implements `Transcriber`. The default chain is
//! captions sidecar, then silence gate, then the configured model backend.
//! `normalize` turns any backend output into ordered, non-overlapping
//! segments bounded by the media duration.

pub mod captions;
pub mod remote;
pub mod whisper_cli;

pub use captions::CaptionsTranscriber;
pub use remote::RemoteWhisperTranscriber;
pub use whisper_cli::WhisperCliTranscriber;

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use crate::config::{TranscriptionBackend, TranscriptionSettings};
use crate::error::{IngestError, IngestResult};
use crate::models::Transcript;
use crate::services::audio_probe::peak_level_db;

/// Produces a transcript for a media file
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Short label for logs (`whisper:base`, `captions`, ...)
    fn describe(&self) -> String;

    async fn transcribe(&self, media_path: &Path) -> IngestResult<Transcript>;
}

/// Build the transcriber chain for a library
pub fn build_transcriber(
    settings: &TranscriptionSettings,
    client: reqwest::Client,
) -> Arc<dyn Transcriber> {
    let backend: Arc<dyn Transcriber> = match settings.backend {
        TranscriptionBackend::WhisperCli => Arc::new(WhisperCliTranscriber::new(settings.clone())),
        TranscriptionBackend::Remote => {
            Arc::new(RemoteWhisperTranscriber::new(settings.clone(), client))
        }
        TranscriptionBackend::None => Arc::new(NoBackend),
    };

    let gated: Arc<dyn Transcriber> =
        Arc::new(SilenceGate::new(backend, settings.silence_threshold_db));

    if settings.use_captions {
        Arc::new(CaptionsTranscriber::new(gated, settings.language.clone()))
    } else {
        gated
    }
}

/// Backend used when only captions are wanted
pub struct NoBackend;

#[async_trait]
impl Transcriber for NoBackend {
    fn describe(&self) -> String {
        "none".to_string()
    }

    async fn transcribe(&self, media_path: &Path) -> IngestResult<Transcript> {
        Err(IngestError::Transcription(format!(
            "No captions for {} and no transcription backend configured",
            media_path.display()
        )))
    }
}

/// Returns zero segments for audio that never rises above the threshold
pub struct SilenceGate {
    inner: Arc<dyn Transcriber>,
    threshold_db: f32,
}

impl SilenceGate {
    pub fn new(inner: Arc<dyn Transcriber>, threshold_db: f32) -> Self {
        Self {
            inner,
            threshold_db,
        }
    }
}

#[async_trait]
impl Transcriber for SilenceGate {
    fn describe(&self) -> String {
        self.inner.describe()
    }

    async fn transcribe(&self, media_path: &Path) -> IngestResult<Transcript> {
        let path = media_path.to_path_buf();
        let threshold_db = self.threshold_db;
        let measured = tokio::task::spawn_blocking(move || peak_level_db(&path, threshold_db))
            .await
            .map_err(|e| IngestError::Transcription(format!("Decode task failed: {}", e)))?;

        match measured {
            Ok(peak_db) if peak_db < threshold_db => {
                debug!(
                    path = %media_path.display(),
                    peak_db,
                    threshold_db,
                    "Audio is silent, skipping transcription"
                );
                return Ok(Transcript::empty("silence"));
            }
            Ok(_) => {}
            Err(e) => {
                // Formats symphonia cannot decode go straight to the backend
                debug!(path = %media_path.display(), "Silence check skipped: {:#}", e);
            }
        }

        self.inner.transcribe(media_path).await
    }
}

/// Clean up raw transcriber output
///
/// Drops empty text and likely hallucinations (high no-speech probability
/// with low average log-probability), sorts by start, clamps each end to
/// the next start and to the duration, and drops zero-length segments.
pub fn normalize(
    mut transcript: Transcript,
    duration_seconds: Option<f64>,
    no_speech_threshold: f32,
    logprob_threshold: f32,
) -> Transcript {
    let mut segments: Vec<_> = transcript
        .segments
        .into_iter()
        .filter_map(|mut seg| {
            seg.text = seg.text.trim().to_string();
            if seg.text.is_empty() || !seg.start.is_finite() || !seg.end.is_finite() {
                return None;
            }
            if let (Some(no_speech), Some(logprob)) = (seg.no_speech_prob, seg.avg_logprob) {
                if no_speech > no_speech_threshold && logprob < logprob_threshold {
                    return None;
                }
            }
            seg.start = seg.start.max(0.0);
            Some(seg)
        })
        .collect();

    segments.sort_by(|a, b| a.start.total_cmp(&b.start).then(a.end.total_cmp(&b.end)));

    let next_starts: Vec<Option<f64>> = (0..segments.len())
        .map(|i| segments.get(i + 1).map(|s| s.start))
        .collect();

    transcript.segments = segments
        .into_iter()
        .zip(next_starts)
        .filter_map(|(mut seg, next_start)| {
            if let Some(next) = next_start {
                seg.end = seg.end.min(next);
            }
            if let Some(duration) = duration_seconds {
                seg.end = seg.end.min(duration);
            }
            (seg.end > seg.start).then_some(seg)
        })
        .collect();

    transcript
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TranscribedSegment;

    fn seg(start: f64, end: f64, text: &str) -> TranscribedSegment {
        TranscribedSegment::new(start, end, text)
    }

    fn transcript(segments: Vec<TranscribedSegment>) -> Transcript {
        Transcript {
            language: Some("en".into()),
            generated_by: "test".into(),
            segments,
        }
    }

    #[test]
    fn test_normalize_orders_and_clamps() {
        let raw = transcript(vec![
            seg(5.0, 9.0, "third"),
            seg(0.0, 3.0, "first"),
            seg(2.0, 6.0, "second"),
            seg(8.0, 12.0, "  "),
        ]);
        let out = normalize(raw, Some(8.5), 0.6, -1.0);
        let spans: Vec<(f64, f64, &str)> = out
            .segments
            .iter()
            .map(|s| (s.start, s.end, s.text.as_str()))
            .collect();
        assert_eq!(
            spans,
            vec![(0.0, 2.0, "first"), (2.0, 5.0, "second"), (5.0, 8.5, "third")]
        );
    }

    #[test]
    fn test_normalize_drops_hallucinations_and_out_of_range() {
        let mut noisy = seg(0.0, 2.0, "thanks for watching");
        noisy.no_speech_prob = Some(0.9);
        noisy.avg_logprob = Some(-1.5);

        let mut confident = seg(2.0, 4.0, "ribbit");
        confident.no_speech_prob = Some(0.9);
        confident.avg_logprob = Some(-0.2);

        let beyond = seg(12.0, 14.0, "after the end");

        let out = normalize(transcript(vec![noisy, confident, beyond]), Some(10.0), 0.6, -1.0);
        assert_eq!(out.segments.len(), 1);
        assert_eq!(out.segments[0].text, "ribbit");
    }

    #[test]
    fn test_normalize_is_deterministic() {
        let raw = transcript(vec![seg(1.0, 2.0, "b"), seg(0.0, 1.5, "a"), seg(1.0, 2.0, "c")]);
        let a = normalize(raw.clone(), None, 0.6, -1.0);
        let b = normalize(raw, None, 0.6, -1.0);
        assert_eq!(a, b);
        for pair in a.segments.windows(2) {
            assert!(pair[0].end <= pair[1].start);
        }
    }

    #[tokio::test]
    async fn test_no_backend_fails() {
        let err = NoBackend.transcribe(Path::new("/tmp/x.wav")).await.unwrap_err();
        assert_eq!(err.kind(), "transcription_error");
    }
}
