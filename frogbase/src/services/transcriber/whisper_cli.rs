//! Local `whisper` executable
//!
//! Runs the OpenAI whisper CLI with JSON output into a scratch directory
//! and reads back `<stem>.json`.

use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use super::Transcriber;
use crate::config::TranscriptionSettings;
use crate::error::{IngestError, IngestResult};
use crate::models::{TranscribedSegment, Transcript};
use crate::services::external_tool::run_tool;

/// Whisper JSON output (subset)
#[derive(Debug, Deserialize)]
pub(crate) struct WhisperOutput {
    pub language: Option<String>,
    #[serde(default)]
    pub segments: Vec<WhisperSegment>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WhisperSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
    pub avg_logprob: Option<f32>,
    pub no_speech_prob: Option<f32>,
}

impl WhisperOutput {
    pub(crate) fn into_transcript(self, generated_by: String, fallback_language: Option<String>) -> Transcript {
        Transcript {
            language: self.language.or(fallback_language),
            generated_by,
            segments: self
                .segments
                .into_iter()
                .map(|s| TranscribedSegment {
                    start: s.start,
                    end: s.end,
                    text: s.text,
                    avg_logprob: s.avg_logprob,
                    no_speech_prob: s.no_speech_prob,
                })
                .collect(),
        }
    }
}

pub struct WhisperCliTranscriber {
    settings: TranscriptionSettings,
}

impl WhisperCliTranscriber {
    pub fn new(settings: TranscriptionSettings) -> Self {
        Self { settings }
    }

    fn args(&self, media_path: &Path, output_dir: &Path) -> Vec<String> {
        let s = &self.settings;
        let mut args = vec![
            media_path.to_string_lossy().to_string(),
            "--model".to_string(),
            s.model.clone(),
            "--task".to_string(),
            s.task.as_str().to_string(),
            "--temperature".to_string(),
            s.temperature.to_string(),
            "--temperature_increment_on_fallback".to_string(),
            s.temperature_increment_on_fallback
                .map(|v| v.to_string())
                .unwrap_or_else(|| "None".to_string()),
            "--no_speech_threshold".to_string(),
            s.no_speech_threshold.to_string(),
            "--logprob_threshold".to_string(),
            s.logprob_threshold.to_string(),
            "--compression_ratio_threshold".to_string(),
            s.compression_ratio_threshold.to_string(),
            "--condition_on_previous_text".to_string(),
            if s.condition_on_previous_text { "True" } else { "False" }.to_string(),
            "--output_format".to_string(),
            "json".to_string(),
            "--output_dir".to_string(),
            output_dir.to_string_lossy().to_string(),
            "--verbose".to_string(),
            "False".to_string(),
        ];
        if let Some(language) = &s.language {
            args.push("--language".to_string());
            args.push(language.clone());
        }
        args
    }
}

#[async_trait]
impl Transcriber for WhisperCliTranscriber {
    fn describe(&self) -> String {
        format!("whisper:{}", self.settings.model)
    }

    async fn transcribe(&self, media_path: &Path) -> IngestResult<Transcript> {
        let output_dir: PathBuf =
            std::env::temp_dir().join(format!("frogbase-whisper-{}", uuid::Uuid::new_v4()));
        tokio::fs::create_dir_all(&output_dir)
            .await
            .map_err(|e| IngestError::Transcription(e.to_string()))?;

        tracing::debug!(
            audio_file = %media_path.display(),
            output_dir = %output_dir.display(),
            "Running whisper"
        );

        let result = run_tool(
            &self.settings.whisper_binary,
            self.args(media_path, &output_dir),
            Duration::from_secs(self.settings.timeout_secs),
        )
        .await;

        let parsed = match result {
            Ok(_) => {
                let stem = media_path
                    .file_stem()
                    .map(|s| s.to_string_lossy().to_string())
                    .unwrap_or_default();
                let json_path = output_dir.join(format!("{}.json", stem));
                match tokio::fs::read(&json_path).await {
                    Ok(bytes) => serde_json::from_slice::<WhisperOutput>(&bytes).map_err(|e| {
                        IngestError::Transcription(format!("Unreadable whisper output: {}", e))
                    }),
                    Err(e) => Err(IngestError::Transcription(format!(
                        "Whisper output {} missing: {}",
                        json_path.display(),
                        e
                    ))),
                }
            }
            Err(e) => Err(IngestError::Transcription(e.to_string())),
        };

        let _ = tokio::fs::remove_dir_all(&output_dir).await;

        let output = parsed?;
        info!(
            audio_file = %media_path.display(),
            segments = output.segments.len(),
            "Whisper transcription completed"
        );
        Ok(output.into_transcript(self.describe(), self.settings.language.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WhisperTask;

    #[test]
    fn test_settings_map_to_flags() {
        let mut settings = TranscriptionSettings::default();
        settings.task = WhisperTask::Translate;
        settings.condition_on_previous_text = false;
        settings.temperature_increment_on_fallback = None;
        let whisper = WhisperCliTranscriber::new(settings);

        let args = whisper.args(Path::new("/lib/a/frog.mp3"), Path::new("/tmp/out"));
        let flag = |name: &str| {
            let i = args.iter().position(|a| a == name).unwrap();
            args[i + 1].clone()
        };
        assert_eq!(args[0], "/lib/a/frog.mp3");
        assert_eq!(flag("--model"), "base");
        assert_eq!(flag("--task"), "translate");
        assert_eq!(flag("--no_speech_threshold"), "0.6");
        assert_eq!(flag("--condition_on_previous_text"), "False");
        assert_eq!(flag("--temperature_increment_on_fallback"), "None");
        assert_eq!(flag("--language"), "en");
        assert_eq!(flag("--output_format"), "json");
    }

    #[test]
    fn test_output_parsing() {
        let json = r#"{
            "text": " Hello frog.",
            "language": "en",
            "segments": [
                {"id": 0, "seek": 0, "start": 0.0, "end": 2.4, "text": " Hello frog.",
                 "tokens": [1, 2], "temperature": 0.0, "avg_logprob": -0.31,
                 "compression_ratio": 0.8, "no_speech_prob": 0.02}
            ]
        }"#;
        let output: WhisperOutput = serde_json::from_str(json).unwrap();
        let transcript = output.into_transcript("whisper:base".into(), None);
        assert_eq!(transcript.language.as_deref(), Some("en"));
        assert_eq!(transcript.segments.len(), 1);
        assert_eq!(transcript.segments[0].avg_logprob, Some(-0.31));
    }
}
