//! OpenAI-compatible transcription endpoint
//!
//! Works with OpenAI, Groq and self-hosted servers such as
//! faster-whisper-server. Requests `verbose_json` to get segment timings.

use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use super::whisper_cli::WhisperOutput;
use super::Transcriber;
use crate::config::TranscriptionSettings;
use crate::error::{IngestError, IngestResult};
use crate::models::Transcript;

pub struct RemoteWhisperTranscriber {
    settings: TranscriptionSettings,
    client: reqwest::Client,
}

impl RemoteWhisperTranscriber {
    pub fn new(settings: TranscriptionSettings, client: reqwest::Client) -> Self {
        Self { settings, client }
    }

    fn api_url(&self) -> String {
        format!("{}/audio/transcriptions", self.settings.api_base.trim_end_matches('/'))
    }
}

#[async_trait]
impl Transcriber for RemoteWhisperTranscriber {
    fn describe(&self) -> String {
        format!("remote:{}", self.settings.model)
    }

    async fn transcribe(&self, media_path: &Path) -> IngestResult<Transcript> {
        let audio = tokio::fs::read(media_path)
            .await
            .map_err(|e| IngestError::Transcription(format!("Read {}: {}", media_path.display(), e)))?;
        let file_name = media_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "audio".to_string());

        let mut form = reqwest::multipart::Form::new()
            .text("model", self.settings.model.clone())
            .text("response_format", "verbose_json")
            .text("temperature", self.settings.temperature.to_string())
            .part("file", reqwest::multipart::Part::bytes(audio).file_name(file_name));
        if let Some(language) = &self.settings.language {
            form = form.text("language", language.clone());
        }

        let api_key = self.settings.api_key.clone().unwrap_or_else(|| "no-auth".to_string());
        let response = self
            .client
            .post(self.api_url())
            .bearer_auth(api_key)
            .timeout(Duration::from_secs(self.settings.timeout_secs))
            .multipart(form)
            .send()
            .await
            .map_err(|e| IngestError::Transcription(format!("Failed to send request: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(IngestError::Transcription(format!(
                "API error ({}): {}",
                status, error_text
            )));
        }

        let output: WhisperOutput = response
            .json()
            .await
            .map_err(|e| IngestError::Transcription(format!("Failed to parse API response: {}", e)))?;

        info!(
            audio_file = %media_path.display(),
            segments = output.segments.len(),
            "Remote transcription completed"
        );
        Ok(output.into_transcript(self.describe(), self.settings.language.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_url_joins_cleanly() {
        let mut settings = TranscriptionSettings::default();
        settings.api_base = "http://localhost:8765/v1/".to_string();
        let remote = RemoteWhisperTranscriber::new(settings, reqwest::Client::new());
        assert_eq!(remote.api_url(), "http://localhost:8765/v1/audio/transcriptions");
    }

    #[tokio::test]
    async fn test_unreachable_server_is_transcription_error() {
        let dir = tempfile::tempdir().unwrap();
        let media = dir.path().join("frog.wav");
        std::fs::write(&media, b"RIFF").unwrap();

        let mut settings = TranscriptionSettings::default();
        settings.api_base = "http://127.0.0.1:9".to_string();
        settings.timeout_secs = 2;
        let remote = RemoteWhisperTranscriber::new(settings, reqwest::Client::new());
        let err = remote.transcribe(&media).await.unwrap_err();
        assert_eq!(err.kind(), "transcription_error");
    }
}
