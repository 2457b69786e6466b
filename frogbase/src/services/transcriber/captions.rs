//! WebVTT captions as a transcript source
//!
//! Platform subtitles downloaded next to the media (or shipped alongside a
//! local file) are used instead of running a model.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use super::Transcriber;
use crate::error::{IngestError, IngestResult};
use crate::models::{TranscribedSegment, Transcript};
use crate::services::media_fetcher::caption_sidecars;

/// Uses a caption sidecar when present, otherwise delegates to `inner`
pub struct CaptionsTranscriber {
    inner: Arc<dyn Transcriber>,
    language: Option<String>,
}

impl CaptionsTranscriber {
    pub fn new(inner: Arc<dyn Transcriber>, language: Option<String>) -> Self {
        Self { inner, language }
    }

    /// Preferred sidecar: `<stem>.<lang>.vtt`, then `<stem>.vtt`, then any
    fn pick_sidecar(&self, media_path: &Path) -> Option<(PathBuf, Option<String>)> {
        let sidecars = caption_sidecars(media_path);
        let stem = media_path.file_stem()?.to_string_lossy().to_string();

        let language_of = |path: &Path| -> Option<String> {
            let name = path.file_name()?.to_string_lossy().to_string();
            let middle = name.strip_prefix(&format!("{}.", stem))?.strip_suffix(".vtt")?;
            (!middle.is_empty() && middle != "vtt").then(|| middle.to_string())
        };

        if let Some(lang) = &self.language {
            if let Some(path) = sidecars
                .iter()
                .find(|p| language_of(p).as_deref() == Some(lang.as_str()))
            {
                return Some((path.clone(), Some(lang.clone())));
            }
        }
        if let Some(path) = sidecars.iter().find(|p| language_of(p).is_none()) {
            return Some((path.clone(), self.language.clone()));
        }
        sidecars.first().map(|p| (p.clone(), language_of(p)))
    }
}

#[async_trait]
impl Transcriber for CaptionsTranscriber {
    fn describe(&self) -> String {
        format!("captions+{}", self.inner.describe())
    }

    async fn transcribe(&self, media_path: &Path) -> IngestResult<Transcript> {
        let Some((sidecar, language)) = self.pick_sidecar(media_path) else {
            return self.inner.transcribe(media_path).await;
        };

        let content = tokio::fs::read_to_string(&sidecar).await.map_err(|e| {
            IngestError::Transcription(format!("Read {}: {}", sidecar.display(), e))
        })?;
        let segments = parse_webvtt(&content)?;

        info!(
            captions = %sidecar.display(),
            segments = segments.len(),
            "Using caption sidecar"
        );

        let label = language.clone().unwrap_or_else(|| "und".to_string());
        Ok(Transcript {
            language,
            generated_by: format!("captions:{}", label),
            segments,
        })
    }
}

/// Parse WebVTT cues into segments
///
/// Inline tags are stripped, and lines repeated from the previous cue
/// (rolling auto-captions) are dropped.
pub fn parse_webvtt(content: &str) -> IngestResult<Vec<TranscribedSegment>> {
    let content = content.trim_start_matches('\u{feff}');
    if !content.trim_start().starts_with("WEBVTT") {
        return Err(IngestError::Transcription(
            "Caption file is missing the WEBVTT header".to_string(),
        ));
    }

    let mut segments = Vec::new();
    let mut previous_lines: Vec<String> = Vec::new();

    for block in content.replace("\r\n", "\n").split("\n\n") {
        let mut lines = block.lines().map(str::trim).filter(|l| !l.is_empty());
        let Some(mut first) = lines.next() else {
            continue;
        };
        if first.starts_with("WEBVTT")
            || first.starts_with("NOTE")
            || first.starts_with("STYLE")
            || first.starts_with("REGION")
        {
            continue;
        }
        if !first.contains("-->") {
            // Cue identifier
            match lines.next() {
                Some(timing) => first = timing,
                None => continue,
            }
        }
        let Some((start, end)) = parse_timing(first) else {
            continue;
        };

        let cue_lines: Vec<String> = lines
            .map(strip_tags)
            .filter(|l| !l.is_empty())
            .collect();
        let fresh: Vec<&String> = cue_lines
            .iter()
            .filter(|l| !previous_lines.contains(*l))
            .collect();

        if !fresh.is_empty() {
            let text = fresh
                .iter()
                .map(|s| s.as_str())
                .collect::<Vec<_>>()
                .join(" ");
            segments.push(TranscribedSegment::new(start, end, text));
        }
        if !cue_lines.is_empty() {
            previous_lines = cue_lines;
        }
    }

    Ok(segments)
}

fn parse_timing(line: &str) -> Option<(f64, f64)> {
    let (start, rest) = line.split_once("-->")?;
    let end = rest.split_whitespace().next()?;
    Some((parse_timestamp(start.trim())?, parse_timestamp(end)?))
}

/// `hh:mm:ss.mmm` or `mm:ss.mmm` (comma accepted)
fn parse_timestamp(ts: &str) -> Option<f64> {
    let ts = ts.replace(',', ".");
    let parts: Vec<&str> = ts.split(':').collect();
    let (h, m, s) = match parts.as_slice() {
        [h, m, s] => (h.parse::<f64>().ok()?, m.parse::<f64>().ok()?, s.parse::<f64>().ok()?),
        [m, s] => (0.0, m.parse::<f64>().ok()?, s.parse::<f64>().ok()?),
        _ => return None,
    };
    Some(h * 3600.0 + m * 60.0 + s)
}

fn strip_tags(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut in_tag = false;
    for c in line.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            c if !in_tag => out.push(c),
            _ => {}
        }
    }
    out.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&nbsp;", " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::transcriber::NoBackend;

    const SAMPLE: &str = "WEBVTT\nKind: captions\nLanguage: en\n\n\
        NOTE produced by a test\n\n\
        1\n00:00:00.000 --> 00:00:02.500 align:start position:0%\nthe <c>squeaky</c> frog\n\n\
        00:02.500 --> 00:05.000\nthe squeaky frog\njumped &amp; landed\n\n\
        00:00:05.000 --> 00:00:07.000\n\n";

    #[test]
    fn test_parse_webvtt() {
        let segments = parse_webvtt(SAMPLE).unwrap();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].text, "the squeaky frog");
        assert_eq!(segments[0].end, 2.5);
        // Rolling duplicate line removed
        assert_eq!(segments[1].text, "jumped & landed");
        assert_eq!(segments[1].start, 2.5);
    }

    #[test]
    fn test_missing_header_rejected() {
        assert!(parse_webvtt("00:00.000 --> 00:01.000\nhello").is_err());
    }

    #[test]
    fn test_timestamps() {
        assert_eq!(parse_timestamp("01:02:03.500"), Some(3723.5));
        assert_eq!(parse_timestamp("02:03,250"), Some(123.25));
        assert_eq!(parse_timestamp("garbage"), None);
    }

    #[tokio::test]
    async fn test_prefers_language_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let media = dir.path().join("pond.wav");
        std::fs::write(&media, b"RIFF").unwrap();
        std::fs::write(
            dir.path().join("pond.de.vtt"),
            "WEBVTT\n\n00:00.000 --> 00:01.000\nquak\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("pond.en.vtt"),
            "WEBVTT\n\n00:00.000 --> 00:01.000\nribbit\n",
        )
        .unwrap();

        let captions = CaptionsTranscriber::new(Arc::new(NoBackend), Some("en".into()));
        let transcript = captions.transcribe(&media).await.unwrap();
        assert_eq!(transcript.generated_by, "captions:en");
        assert_eq!(transcript.segments[0].text, "ribbit");
    }

    #[tokio::test]
    async fn test_falls_back_to_inner() {
        let dir = tempfile::tempdir().unwrap();
        let media = dir.path().join("pond.wav");
        std::fs::write(&media, b"RIFF").unwrap();

        let captions = CaptionsTranscriber::new(Arc::new(NoBackend), Some("en".into()));
        let err = captions.transcribe(&media).await.unwrap_err();
        assert_eq!(err.kind(), "transcription_error");
    }
}
