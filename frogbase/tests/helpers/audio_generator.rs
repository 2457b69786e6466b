//! Media fixture generator
//!
//! WAV files with a tone (or digital silence) plus WebVTT caption sidecars.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

/// Configuration for generated audio
#[derive(Debug, Clone)]
pub struct AudioConfig {
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    /// Peak amplitude (0.0 writes digital silence)
    pub amplitude: f32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            duration_seconds: 3.0,
            sample_rate: 16000,
            channels: 1,
            amplitude: 0.3,
        }
    }
}

impl AudioConfig {
    pub fn silent(duration_seconds: f64) -> Self {
        Self {
            duration_seconds,
            amplitude: 0.0,
            ..Self::default()
        }
    }
}

/// Generate a 16-bit WAV file with a 440Hz tone
pub fn generate_test_wav(path: &Path, config: &AudioConfig) -> anyhow::Result<PathBuf> {
    let spec = hound::WavSpec {
        channels: config.channels,
        sample_rate: config.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(path, spec)?;
    let total_samples = (config.duration_seconds * config.sample_rate as f64) as usize;

    for i in 0..total_samples {
        let t = i as f32 / config.sample_rate as f32;
        let sample = (config.amplitude
            * (2.0 * std::f32::consts::PI * 440.0 * t).sin()
            * i16::MAX as f32) as i16;
        for _ in 0..config.channels {
            writer.write_sample(sample)?;
        }
    }

    writer.finalize()?;
    Ok(path.to_path_buf())
}

/// Write `<stem>.vtt` next to `media_path`
pub fn write_vtt(media_path: &Path, cues: &[(f64, f64, &str)]) -> anyhow::Result<PathBuf> {
    let mut content = String::from("WEBVTT\n\n");
    for (i, (start, end, text)) in cues.iter().enumerate() {
        writeln!(content, "{}", i + 1)?;
        writeln!(content, "{} --> {}", timestamp(*start), timestamp(*end))?;
        writeln!(content, "{}\n", text)?;
    }

    let path = media_path.with_extension("vtt");
    std::fs::write(&path, content)?;
    Ok(path)
}

fn timestamp(seconds: f64) -> String {
    let millis = (seconds * 1000.0).round() as u64;
    format!(
        "{:02}:{:02}:{:02}.{:03}",
        millis / 3_600_000,
        (millis / 60_000) % 60,
        (millis / 1000) % 60,
        millis % 1000
    )
}
