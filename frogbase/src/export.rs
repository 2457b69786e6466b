//! Transcript export
//!
//! Renders a media item's stored segments as WebVTT, SRT or JSON.

use serde::Serialize;
use std::fmt::Write as _;

use crate::error::IngestResult;
use crate::library::MediaDetail;
use crate::models::Segment;

/// Transcript file format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TranscriptFormat {
    #[default]
    Vtt,
    Srt,
    Json,
}

impl TranscriptFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            TranscriptFormat::Vtt => "vtt",
            TranscriptFormat::Srt => "srt",
            TranscriptFormat::Json => "json",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            TranscriptFormat::Vtt => "text/vtt; charset=utf-8",
            TranscriptFormat::Srt => "application/x-subrip; charset=utf-8",
            TranscriptFormat::Json => "application/json",
        }
    }
}

impl std::str::FromStr for TranscriptFormat {
    type Err = frogbase_common::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "vtt" | "webvtt" => Ok(TranscriptFormat::Vtt),
            "srt" => Ok(TranscriptFormat::Srt),
            "json" => Ok(TranscriptFormat::Json),
            other => Err(frogbase_common::Error::InvalidInput(format!(
                "Unknown transcript format: {}",
                other
            ))),
        }
    }
}

#[derive(Serialize)]
struct JsonTranscript<'a> {
    media_id: &'a str,
    title: &'a str,
    language: Option<&'a str>,
    segments: Vec<JsonSegment<'a>>,
}

#[derive(Serialize)]
struct JsonSegment<'a> {
    number: u32,
    start: f64,
    end: f64,
    text: &'a str,
}

/// Render the transcript of `detail` in `format`
pub fn render(detail: &MediaDetail, format: TranscriptFormat) -> IngestResult<String> {
    match format {
        TranscriptFormat::Vtt => Ok(render_vtt(&detail.segments)),
        TranscriptFormat::Srt => Ok(render_srt(&detail.segments)),
        TranscriptFormat::Json => {
            let transcript = JsonTranscript {
                media_id: &detail.media.id,
                title: &detail.media.title,
                language: detail.segments.iter().find_map(|s| s.language.as_deref()),
                segments: detail
                    .segments
                    .iter()
                    .map(|s| JsonSegment {
                        number: s.number,
                        start: s.start_seconds,
                        end: s.end_seconds,
                        text: &s.text,
                    })
                    .collect(),
            };
            serde_json::to_string_pretty(&transcript).map_err(|e| {
                frogbase_common::Error::Internal(format!("Transcript encoding failed: {}", e))
                    .into()
            })
        }
    }
}

pub fn render_vtt(segments: &[Segment]) -> String {
    let mut out = String::from("WEBVTT\n");
    for segment in segments {
        let _ = write!(
            out,
            "\n{} --> {}\n{}\n",
            timestamp(segment.start_seconds, '.'),
            timestamp(segment.end_seconds, '.'),
            cue_text(&segment.text)
        );
    }
    out
}

pub fn render_srt(segments: &[Segment]) -> String {
    let mut out = String::new();
    for (i, segment) in segments.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        let _ = write!(
            out,
            "{}\n{} --> {}\n{}\n",
            i + 1,
            timestamp(segment.start_seconds, ','),
            timestamp(segment.end_seconds, ','),
            cue_text(&segment.text)
        );
    }
    out
}

/// `hh:mm:ss` plus milliseconds after `separator`
fn timestamp(seconds: f64, separator: char) -> String {
    let total_ms = (seconds.max(0.0) * 1000.0).round() as u64;
    let (hours, rest) = (total_ms / 3_600_000, total_ms % 3_600_000);
    let (minutes, rest) = (rest / 60_000, rest % 60_000);
    let (secs, ms) = (rest / 1000, rest % 1000);
    format!("{:02}:{:02}:{:02}{}{:03}", hours, minutes, secs, separator, ms)
}

/// Cue payload without blank lines, which would end the cue early
fn cue_text(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{TranscribedSegment, Transcript};
    use crate::services::transcriber::captions::parse_webvtt;

    fn segments() -> Vec<Segment> {
        let transcript = Transcript {
            language: Some("en".into()),
            generated_by: "test".into(),
            segments: vec![
                TranscribedSegment::new(0.0, 2.5, "the squeaky frog"),
                TranscribedSegment::new(2.5, 3661.5, "sings\n\nall night"),
            ],
        };
        Segment::from_transcript("m1", &transcript)
    }

    #[test]
    fn test_timestamps() {
        assert_eq!(timestamp(0.0, '.'), "00:00:00.000");
        assert_eq!(timestamp(3661.042, ','), "01:01:01,042");
        assert_eq!(timestamp(59.9996, '.'), "00:01:00.000");
    }

    #[test]
    fn test_vtt_reparses_to_same_cues() {
        let segments = segments();
        let parsed = parse_webvtt(&render_vtt(&segments)).unwrap();

        let spans: Vec<(f64, f64, &str)> = parsed
            .iter()
            .map(|s| (s.start, s.end, s.text.as_str()))
            .collect();
        assert_eq!(
            spans,
            vec![(0.0, 2.5, "the squeaky frog"), (2.5, 3661.5, "sings all night")]
        );
    }

    #[test]
    fn test_srt_layout() {
        let srt = render_srt(&segments());
        assert!(srt.starts_with("1\n00:00:00,000 --> 00:00:02,500\nthe squeaky frog\n\n2\n"));
        assert!(srt.ends_with("01:01:01,500\nsings\nall night\n"));
    }

    #[test]
    fn test_format_names() {
        assert_eq!("VTT".parse::<TranscriptFormat>().unwrap(), TranscriptFormat::Vtt);
        assert_eq!("srt".parse::<TranscriptFormat>().unwrap(), TranscriptFormat::Srt);
        assert_eq!("json".parse::<TranscriptFormat>().unwrap().as_str(), "json");
        assert!("docx".parse::<TranscriptFormat>().is_err());
    }
}
