//! Media samples and their decoded forms
//!
//! A [`MediaSample`] is what the caller hands in: bytes plus a declared kind.
//! Decoding turns it into either a [`DecodedFrame`] (images, and each sampled
//! video frame) or an [`AudioBuffer`].
//!
//! Audio goes through symphonia (supports MP3, FLAC, WAV, OGG, etc.), is mixed
//! down to mono, resampled to the analysis rate, trimmed of leading/trailing
//! silence and peak-normalised before any extractor sees it.

use crate::config::AudioConfig;
use crate::dsp::{self, Plane};
use crate::error::DecodeError;
use image::RgbImage;
use serde::Serialize;
use std::f64::consts::PI;
use std::fmt;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

// =============================================================================
// SAMPLES
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
    Audio,
}

/// Recognised file extensions (lowercase). Animated containers count as video.
pub const EXTENSIONS: &[(&str, MediaKind)] = &[
    ("png", MediaKind::Image),
    ("jpg", MediaKind::Image),
    ("jpeg", MediaKind::Image),
    ("bmp", MediaKind::Image),
    ("webp", MediaKind::Image),
    ("tif", MediaKind::Image),
    ("tiff", MediaKind::Image),
    ("gif", MediaKind::Video),
    ("apng", MediaKind::Video),
    ("mp4", MediaKind::Video),
    ("mov", MediaKind::Video),
    ("avi", MediaKind::Video),
    ("mkv", MediaKind::Video),
    ("webm", MediaKind::Video),
    ("wav", MediaKind::Audio),
    ("wave", MediaKind::Audio),
    ("mp3", MediaKind::Audio),
    ("flac", MediaKind::Audio),
    ("ogg", MediaKind::Audio),
    ("m4a", MediaKind::Audio),
    ("aac", MediaKind::Audio),
    ("aiff", MediaKind::Audio),
    ("aif", MediaKind::Audio),
];

impl MediaKind {
    /// Map a MIME-style content type (`image/png`, `video/mp4`, ...) to a kind.
    pub fn from_mime(content_type: &str) -> Option<MediaKind> {
        let major = content_type
            .split('/')
            .next()?
            .trim()
            .to_ascii_lowercase();
        match major.as_str() {
            "image" => Some(MediaKind::Image),
            "video" => Some(MediaKind::Video),
            "audio" => Some(MediaKind::Audio),
            _ => None,
        }
    }

    /// Guess a kind from a file extension, using [`EXTENSIONS`].
    pub fn from_extension(ext: &str) -> Option<MediaKind> {
        let ext = ext.to_ascii_lowercase();
        EXTENSIONS
            .iter()
            .find(|(known, _)| *known == ext)
            .map(|&(_, kind)| kind)
    }

    /// Comma-separated list of every recognised extension, for messages.
    pub fn supported_extensions() -> String {
        EXTENSIONS
            .iter()
            .map(|(ext, _)| *ext)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaKind::Image => write!(f, "image"),
            MediaKind::Video => write!(f, "video"),
            MediaKind::Audio => write!(f, "audio"),
        }
    }
}

/// Raw bytes plus the declared content kind.
#[derive(Debug, Clone)]
pub struct MediaSample {
    bytes: Vec<u8>,
    kind: MediaKind,
}

impl MediaSample {
    pub fn new(bytes: Vec<u8>, kind: MediaKind) -> Self {
        Self { bytes, kind }
    }

    /// Build a sample from a MIME content type; unsupported types are rejected.
    pub fn from_mime(bytes: Vec<u8>, content_type: &str) -> Result<Self, DecodeError> {
        let kind = MediaKind::from_mime(content_type)
            .ok_or_else(|| DecodeError::UnsupportedKind(content_type.to_string()))?;
        Ok(Self::new(bytes, kind))
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }
}

// =============================================================================
// FRAMES
// =============================================================================

/// A decoded RGB frame with its luminance plane precomputed.
#[derive(Debug, Clone)]
pub struct DecodedFrame {
    rgb: RgbImage,
    luma: Plane,
}

impl DecodedFrame {
    pub fn new(rgb: RgbImage) -> Self {
        let luma = luminance(&rgb);
        Self { rgb, luma }
    }

    pub fn width(&self) -> u32 {
        self.rgb.width()
    }

    pub fn height(&self) -> u32 {
        self.rgb.height()
    }

    pub fn rgb(&self) -> &RgbImage {
        &self.rgb
    }

    /// Luminance on the 8-bit scale (BT.601 weights)
    pub fn luma(&self) -> &Plane {
        &self.luma
    }
}

fn luminance(rgb: &RgbImage) -> Plane {
    let data = rgb
        .pixels()
        .map(|p| 0.299 * p[0] as f64 + 0.587 * p[1] as f64 + 0.114 * p[2] as f64)
        .collect();
    Plane::new(rgb.width() as usize, rgb.height() as usize, data)
}

/// Decode a still image (any format the `image` crate recognises).
pub fn decode_image(data: &[u8]) -> Result<DecodedFrame, DecodeError> {
    if data.is_empty() {
        return Err(DecodeError::Empty);
    }
    let image = image::load_from_memory(data)?;
    Ok(DecodedFrame::new(image.to_rgb8()))
}

// =============================================================================
// AUDIO
// =============================================================================

/// Mono PCM samples at a known rate.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    pub samples: Vec<f64>,
    pub sample_rate: u32,
}

impl AudioBuffer {
    pub fn new(samples: Vec<f64>, sample_rate: u32) -> Self {
        Self { samples, sample_rate }
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Decode audio to mono PCM samples using symphonia, then prepare it for analysis.
pub fn decode_audio(data: &[u8], config: &AudioConfig) -> Result<AudioBuffer, DecodeError> {
    if data.is_empty() {
        return Err(DecodeError::Empty);
    }
    let raw = decode_pcm(data, config.max_duration_secs)?;
    let prepared = prepare_audio(raw, config);
    if prepared.samples.is_empty() {
        return Err(DecodeError::Audio("clip is silent".to_string()));
    }
    Ok(prepared)
}

fn decode_pcm(data: &[u8], max_duration_secs: f64) -> Result<AudioBuffer, DecodeError> {
    let cursor = std::io::Cursor::new(data.to_vec());
    let mss = MediaSourceStream::new(Box::new(cursor), Default::default());

    // No hint - let symphonia auto-detect the format
    let hint = Hint::new();

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| DecodeError::Audio(e.to_string()))?;

    let mut format = probed.format;
    let track = format
        .default_track()
        .ok_or_else(|| DecodeError::Audio("no audio track".to_string()))?;
    let track_id = track.id;
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| DecodeError::Audio("unknown sample rate".to_string()))?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| DecodeError::Audio(e.to_string()))?;

    let mut samples = Vec::new();
    let mut sample_buf: Option<SampleBuffer<f32>> = None;
    let max_samples = (sample_rate as f64 * max_duration_secs) as usize;

    // A read error here is end-of-stream for every container symphonia supports
    while let Ok(packet) = format.next_packet() {
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(_) => continue,
        };

        if sample_buf.is_none() {
            let spec = *decoded.spec();
            let duration = decoded.capacity() as u64;
            sample_buf = Some(SampleBuffer::new(duration, spec));
        }

        if let Some(ref mut buf) = sample_buf {
            let channel_count = decoded.spec().channels.count().max(1);
            buf.copy_interleaved_ref(decoded);

            for chunk in buf.samples().chunks(channel_count) {
                let mono: f64 =
                    chunk.iter().map(|&s| s as f64).sum::<f64>() / channel_count as f64;
                samples.push(mono);
            }

            if samples.len() >= max_samples {
                samples.truncate(max_samples);
                break;
            }
        }
    }

    if samples.is_empty() {
        return Err(DecodeError::Audio("no decodable samples".to_string()));
    }

    Ok(AudioBuffer::new(samples, sample_rate))
}

/// Resample, trim silence and peak-normalise.
pub fn prepare_audio(buffer: AudioBuffer, config: &AudioConfig) -> AudioBuffer {
    let resampled = resample(&buffer.samples, buffer.sample_rate, config.sample_rate);
    let trimmed = trim_silence(&resampled, config.trim_top_db, config.n_fft, config.hop_length);
    AudioBuffer::new(normalize_peak(trimmed), config.sample_rate)
}

/// Half-width of the anti-aliasing kernel, in output samples.
const RESAMPLE_HALF_TAPS: usize = 16;

/// Linear-interpolation resampler. Downsampling first low-passes at the
/// target Nyquist frequency so content above it is removed, not folded back.
pub fn resample(samples: &[f64], from_rate: u32, to_rate: u32) -> Vec<f64> {
    if from_rate == to_rate || samples.is_empty() || from_rate == 0 || to_rate == 0 {
        return samples.to_vec();
    }
    let ratio = from_rate as f64 / to_rate as f64;
    let filtered;
    let source = if ratio > 1.0 {
        let half_width = (RESAMPLE_HALF_TAPS as f64 * ratio).ceil() as usize;
        filtered = low_pass(samples, 0.5 / ratio, half_width);
        &filtered[..]
    } else {
        samples
    };

    let out_len = ((source.len() as f64) / ratio).floor() as usize;
    (0..out_len)
        .map(|i| {
            let pos = i as f64 * ratio;
            let idx = pos.floor() as usize;
            let frac = pos - idx as f64;
            let a = source[idx.min(source.len() - 1)];
            let b = source[(idx + 1).min(source.len() - 1)];
            a + (b - a) * frac
        })
        .collect()
}

/// Hann-windowed sinc low-pass. `cutoff` is in cycles per sample; samples
/// past either end repeat the edge value.
fn low_pass(samples: &[f64], cutoff: f64, half_width: usize) -> Vec<f64> {
    let window = dsp::hanning_window(2 * half_width + 3);
    let mut kernel: Vec<f64> = (0..=2 * half_width)
        .map(|k| {
            let t = k as f64 - half_width as f64;
            let sinc = if t == 0.0 {
                2.0 * cutoff
            } else {
                (2.0 * PI * cutoff * t).sin() / (PI * t)
            };
            sinc * window[k + 1]
        })
        .collect();
    let sum: f64 = kernel.iter().sum();
    if sum.abs() > f64::EPSILON {
        kernel.iter_mut().for_each(|k| *k /= sum);
    }

    let last = samples.len() as isize - 1;
    (0..samples.len() as isize)
        .map(|i| {
            kernel
                .iter()
                .enumerate()
                .map(|(k, w)| {
                    let j = (i + k as isize - half_width as isize).clamp(0, last);
                    w * samples[j as usize]
                })
                .sum()
        })
        .collect()
}

/// Drop leading and trailing frames quieter than `top_db` below the loudest frame.
pub fn trim_silence(samples: &[f64], top_db: f64, frame_length: usize, hop: usize) -> Vec<f64> {
    if samples.is_empty() || hop == 0 {
        return Vec::new();
    }
    let frame_length = frame_length.max(1).min(samples.len());
    let n_frames = (samples.len() - frame_length) / hop + 1;
    let levels: Vec<f64> = (0..n_frames)
        .map(|i| dsp::rms(&samples[i * hop..i * hop + frame_length]))
        .collect();

    let peak = levels.iter().cloned().fold(0.0, f64::max);
    if peak <= 0.0 {
        return Vec::new();
    }

    let loud = |level: f64| dsp::to_db(level / peak) > -top_db;
    let first = levels.iter().position(|&l| loud(l));
    let last = levels.iter().rposition(|&l| loud(l));

    match (first, last) {
        (Some(first), Some(last)) => {
            let start = first * hop;
            let end = (last * hop + frame_length).min(samples.len());
            samples[start..end].to_vec()
        }
        _ => Vec::new(),
    }
}

pub fn normalize_peak(samples: Vec<f64>) -> Vec<f64> {
    let peak = samples.iter().fold(0.0f64, |m, s| m.max(s.abs()));
    if peak <= 0.0 {
        return samples;
    }
    samples.into_iter().map(|s| s / peak).collect()
}
