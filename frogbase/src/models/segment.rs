//! Transcript segments

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Segment as produced by a transcriber, before it is stored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscribedSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
    pub avg_logprob: Option<f32>,
    pub no_speech_prob: Option<f32>,
}

impl TranscribedSegment {
    pub fn new(start: f64, end: f64, text: impl Into<String>) -> Self {
        Self {
            start,
            end,
            text: text.into(),
            avg_logprob: None,
            no_speech_prob: None,
        }
    }
}

/// Transcriber output for one media item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    /// Detected or configured language
    pub language: Option<String>,
    /// `whisper:base`, `captions:en`, `silence`, ...
    pub generated_by: String,
    pub segments: Vec<TranscribedSegment>,
}

impl Transcript {
    pub fn empty(generated_by: impl Into<String>) -> Self {
        Self {
            language: None,
            generated_by: generated_by.into(),
            segments: Vec::new(),
        }
    }
}

/// Stored segment; immutable once created
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub id: Uuid,
    pub media_id: String,
    /// 0-based order within the media item
    pub number: u32,
    pub start_seconds: f64,
    pub end_seconds: f64,
    pub text: String,
    pub language: Option<String>,
    pub generated_by: String,
    pub avg_logprob: Option<f32>,
    pub no_speech_prob: Option<f32>,
}

impl Segment {
    /// Build stored segments from a normalized transcript
    pub fn from_transcript(media_id: &str, transcript: &Transcript) -> Vec<Segment> {
        transcript
            .segments
            .iter()
            .enumerate()
            .map(|(number, seg)| Segment {
                id: Uuid::new_v4(),
                media_id: media_id.to_string(),
                number: number as u32,
                start_seconds: seg.start,
                end_seconds: seg.end,
                text: seg.text.clone(),
                language: transcript.language.clone(),
                generated_by: transcript.generated_by.clone(),
                avg_logprob: seg.avg_logprob,
                no_speech_prob: seg.no_speech_prob,
            })
            .collect()
    }
}
