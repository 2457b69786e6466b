//! Audio probing and decoding
//!
//! Uses symphonia for format-agnostic decoding (MP3, FLAC, AAC, WAV, OGG...).
//! The fetcher probes duration; the silence gate streams mono f32 through a
//! windowed RMS meter.

use anyhow::{Context, Result};
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

/// Stream facts from a probe
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioInfo {
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: usize,
}

struct OpenedTrack {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    sample_rate: u32,
    channels: usize,
    n_frames: Option<u64>,
}

fn open_track(file_path: &Path) -> Result<OpenedTrack> {
    let file = std::fs::File::open(file_path)
        .with_context(|| format!("Failed to open audio file: {}", file_path.display()))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(extension) = file_path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(extension);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .with_context(|| format!("Failed to probe audio file: {}", file_path.display()))?;
    let format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .context("No audio track found in file")?;

    let track_id = track.id;
    let sample_rate = track.codec_params.sample_rate.context("Sample rate unknown")?;
    let channels = track
        .codec_params
        .channels
        .map(|c| c.count())
        .unwrap_or(1);
    let n_frames = track.codec_params.n_frames;

    let decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .with_context(|| format!("Failed to create decoder for: {}", file_path.display()))?;

    Ok(OpenedTrack {
        format,
        decoder,
        track_id,
        sample_rate,
        channels,
        n_frames,
    })
}

/// Decode packets, passing each mono chunk to `sink`
///
/// Stops early when `sink` returns false. Returns the number of frames seen.
fn decode_packets<F>(track: &mut OpenedTrack, mut sink: F) -> Result<u64>
where
    F: FnMut(&[f32]) -> bool,
{
    let mut frames = 0u64;
    let mut sample_buf: Option<SampleBuffer<f32>> = None;
    let mut mono = Vec::new();

    loop {
        let packet = match track.format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(anyhow::anyhow!("Error reading packet: {}", e)),
        };

        if packet.track_id() != track.track_id {
            continue;
        }

        let decoded = match track.decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(e)) => {
                tracing::debug!("Skipping undecodable packet: {}", e);
                continue;
            }
            Err(e) => return Err(anyhow::anyhow!("Failed to decode packet: {}", e)),
        };

        let spec = *decoded.spec();
        let channels = spec.channels.count().max(1);
        let buf = sample_buf
            .get_or_insert_with(|| SampleBuffer::<f32>::new(decoded.capacity() as u64, spec));
        if buf.capacity() < decoded.capacity() * channels {
            *buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        }
        buf.copy_interleaved_ref(decoded);

        mono.clear();
        mono.extend(
            buf.samples()
                .chunks(channels)
                .map(|frame| frame.iter().sum::<f32>() / channels as f32),
        );
        frames += mono.len() as u64;

        if !sink(&mono) {
            break;
        }
    }

    Ok(frames)
}

/// Probe duration and stream facts
///
/// When the container reports a frame count, only the first packet is
/// decoded to validate the stream; otherwise the whole stream is decoded.
pub fn probe_audio_file(file_path: &Path) -> Result<AudioInfo> {
    let mut track = open_track(file_path)?;
    let sample_rate = track.sample_rate;
    let channels = track.channels;

    let frames = match track.n_frames {
        Some(n_frames) => {
            let mut first_chunk = 0usize;
            decode_packets(&mut track, |chunk| {
                first_chunk = chunk.len();
                false
            })?;
            if first_chunk == 0 && n_frames > 0 {
                anyhow::bail!("No decodable audio in {}", file_path.display());
            }
            n_frames
        }
        None => decode_packets(&mut track, |_| true)?,
    };

    Ok(AudioInfo {
        duration_seconds: frames as f64 / sample_rate as f64,
        sample_rate,
        channels,
    })
}

/// Loudest 100 ms RMS level of a file, in dBFS
///
/// Decoding stops as soon as a full window reaches `stop_at_db`, so only quiet
/// files are read to the end. Memory use does not grow with duration.
pub fn peak_level_db(file_path: &Path, stop_at_db: f32) -> Result<f32> {
    tracing::debug!(path = %file_path.display(), "Measuring audio level");

    let mut track = open_track(file_path)?;
    let mut meter = WindowMeter::new(track.sample_rate);
    decode_packets(&mut track, |chunk| {
        meter.push(chunk);
        linear_to_db(meter.peak_rms) < stop_at_db
    })?;
    Ok(meter.peak_db())
}

/// Running RMS over consecutive 100 ms windows
#[derive(Debug, Clone)]
pub struct WindowMeter {
    window: usize,
    sum_squares: f64,
    filled: usize,
    peak_rms: f32,
}

impl WindowMeter {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            window: ((sample_rate as usize) / 10).max(1),
            sum_squares: 0.0,
            filled: 0,
            peak_rms: 0.0,
        }
    }

    pub fn push(&mut self, samples: &[f32]) {
        for &sample in samples {
            self.sum_squares += f64::from(sample) * f64::from(sample);
            self.filled += 1;
            if self.filled == self.window {
                self.peak_rms = self.peak_rms.max(self.current_rms());
                self.sum_squares = 0.0;
                self.filled = 0;
            }
        }
    }

    fn current_rms(&self) -> f32 {
        if self.filled == 0 {
            return 0.0;
        }
        (self.sum_squares / self.filled as f64).sqrt() as f32
    }

    /// Peak so far, counting the unfinished window
    ///
    /// `f32::NEG_INFINITY` for empty or all-zero audio.
    pub fn peak_db(&self) -> f32 {
        linear_to_db(self.peak_rms.max(self.current_rms()))
    }
}

/// Convert linear amplitude to dB
fn linear_to_db(linear: f32) -> f32 {
    if linear <= 0.0 {
        return f32::NEG_INFINITY;
    }
    20.0 * linear.log10()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metered(samples: &[f32], chunk: usize) -> f32 {
        let mut meter = WindowMeter::new(16000);
        for part in samples.chunks(chunk) {
            meter.push(part);
        }
        meter.peak_db()
    }

    #[test]
    fn test_rms_levels() {
        assert_eq!(metered(&[], 512), f32::NEG_INFINITY);
        assert_eq!(metered(&[0.0; 1600], 512), f32::NEG_INFINITY);

        // Full-scale square wave is 0 dBFS
        let square: Vec<f32> = (0..1600).map(|i| if i % 2 == 0 { 1.0 } else { -1.0 }).collect();
        assert!(metered(&square, 512).abs() < 0.01);

        // One loud window among quiet ones dominates, whatever the packet size
        let mut mixed = vec![0.0f32; 16000];
        for s in mixed[8000..9600].iter_mut() {
            *s = 0.1;
        }
        for chunk in [1, 333, 1152, 16000] {
            let db = metered(&mixed, chunk);
            assert!((db - -20.0).abs() < 0.1, "chunk {} got {}", chunk, db);
        }
    }

    #[test]
    fn test_peak_level_stops_at_first_loud_window() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 16000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for i in 0..16000 * 5 {
            let t = i as f32 / 16000.0;
            let sample = (t * 440.0 * 2.0 * std::f32::consts::PI).sin() * 0.3;
            writer.write_sample((sample * i16::MAX as f32) as i16).unwrap();
        }
        writer.finalize().unwrap();

        let loud = peak_level_db(&path, -40.0).unwrap();
        assert!(loud >= -40.0, "got {}", loud);
        // 0.3 sine is about -13.5 dBFS
        let full = peak_level_db(&path, 0.0).unwrap();
        assert!((full - -13.5).abs() < 0.5, "got {}", full);
    }

    #[test]
    fn test_probe_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.mp3");
        std::fs::write(&path, b"this is not audio at all").unwrap();
        assert!(probe_audio_file(&path).is_err());
    }
}
