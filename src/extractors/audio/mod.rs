//! Audio-domain extractors
//!
//! All of them read from one [`Spectrogram`] computed per clip: the STFT
//! (Hann window, `n_fft` 2048, hop 512, centred), its magnitudes and a
//! 128-band mel spectrogram in dB. Feature groups:
//!
//! ```text
//! spectral   13 MFCCs × (mean, std, min, max) + centroid, rolloff, ZCR,
//!            bandwidth, chroma × (mean, std)                      = 62 values
//! rhythm     tempo, onset regularity, beat strength              =  3 values
//! voice      pitch mean/std/range, jitter, shimmer, voiced ratio
//! artifacts  spectral gaps, HNR, high-frequency ratio, phase variance
//! spoof      outlier model over the 70-value vector, or rule-based fallback
//! ```

pub mod artifacts;
pub mod rhythm;
pub mod spectral;
pub mod spoof;
pub mod voice;

use crate::config::AudioConfig;
use crate::dsp;
use crate::error::{ExtractorError, ExtractorResult};
use crate::media::AudioBuffer;
use rustfft::num_complex::Complex;

/// Shortest clip (in samples) any audio extractor will accept.
pub(crate) fn check_length(buffer: &AudioBuffer, config: &AudioConfig) -> ExtractorResult<()> {
    if buffer.samples.len() < config.n_fft {
        return Err(ExtractorError::NotEnoughAudio {
            samples: buffer.samples.len(),
            needed: config.n_fft,
        });
    }
    Ok(())
}

// =============================================================================
// SPECTROGRAM
// =============================================================================

/// STFT of one clip plus the derived views the extractors share.
#[derive(Debug, Clone)]
pub struct Spectrogram {
    /// `frames[t][k]`
    pub frames: Vec<Vec<Complex<f64>>>,
    /// `magnitude[t][k]`
    pub magnitude: Vec<Vec<f64>>,
    /// Centre frequency of each bin in Hz
    pub frequencies: Vec<f64>,
    /// `mel_db[t][m]`, power mel spectrogram in dB (80 dB dynamic range)
    pub mel_db: Vec<Vec<f64>>,
    pub sample_rate: u32,
    pub hop_length: usize,
}

impl Spectrogram {
    pub fn compute(buffer: &AudioBuffer, config: &AudioConfig) -> ExtractorResult<Self> {
        check_length(buffer, config)?;
        let frames = dsp::stft(&buffer.samples, config.n_fft, config.hop_length);
        if frames.is_empty() {
            return Err(ExtractorError::Degenerate("no STFT frames".to_string()));
        }

        let magnitude: Vec<Vec<f64>> = frames
            .iter()
            .map(|f| f.iter().map(|c| c.norm()).collect())
            .collect();
        let n_bins = config.n_fft / 2 + 1;
        let frequencies: Vec<f64> = (0..n_bins)
            .map(|k| k as f64 * buffer.sample_rate as f64 / config.n_fft as f64)
            .collect();

        let filters = mel_filterbank(config.n_mels, &frequencies, buffer.sample_rate as f64 / 2.0);
        let mel_power: Vec<Vec<f64>> = magnitude
            .iter()
            .map(|mags| {
                filters
                    .iter()
                    .map(|w| w.iter().zip(mags).map(|(w, m)| w * m * m).sum())
                    .collect()
            })
            .collect();
        let mel_db = power_to_db(&mel_power, 80.0);

        Ok(Self {
            frames,
            magnitude,
            frequencies,
            mel_db,
            sample_rate: buffer.sample_rate,
            hop_length: config.hop_length,
        })
    }

    pub fn n_frames(&self) -> usize {
        self.frames.len()
    }

    pub fn n_bins(&self) -> usize {
        self.frequencies.len()
    }
}

// =============================================================================
// MEL SCALE (Slaney)
// =============================================================================

const MEL_F_SP: f64 = 200.0 / 3.0;
const MEL_MIN_LOG_HZ: f64 = 1000.0;
const MEL_MIN_LOG_MEL: f64 = MEL_MIN_LOG_HZ / MEL_F_SP;

fn mel_log_step() -> f64 {
    6.4f64.ln() / 27.0
}

pub fn hz_to_mel(hz: f64) -> f64 {
    if hz < MEL_MIN_LOG_HZ {
        hz / MEL_F_SP
    } else {
        MEL_MIN_LOG_MEL + (hz / MEL_MIN_LOG_HZ).ln() / mel_log_step()
    }
}

pub fn mel_to_hz(mel: f64) -> f64 {
    if mel < MEL_MIN_LOG_MEL {
        mel * MEL_F_SP
    } else {
        MEL_MIN_LOG_HZ * (mel_log_step() * (mel - MEL_MIN_LOG_MEL)).exp()
    }
}

/// Triangular, area-normalised mel filters over the given FFT bin frequencies.
pub fn mel_filterbank(n_mels: usize, fft_freqs: &[f64], fmax: f64) -> Vec<Vec<f64>> {
    let mel_max = hz_to_mel(fmax);
    let points: Vec<f64> = (0..n_mels + 2)
        .map(|i| mel_to_hz(mel_max * i as f64 / (n_mels + 1) as f64))
        .collect();

    (0..n_mels)
        .map(|m| {
            let (lo, centre, hi) = (points[m], points[m + 1], points[m + 2]);
            let enorm = 2.0 / (hi - lo);
            fft_freqs
                .iter()
                .map(|&f| {
                    let rising = (f - lo) / (centre - lo);
                    let falling = (hi - f) / (hi - centre);
                    rising.min(falling).max(0.0) * enorm
                })
                .collect()
        })
        .collect()
}

/// `10·log10(power)` with a floor, clipped to `top_db` below the peak.
pub fn power_to_db(power: &[Vec<f64>], top_db: f64) -> Vec<Vec<f64>> {
    let mut db: Vec<Vec<f64>> = power
        .iter()
        .map(|row| row.iter().map(|&p| 10.0 * p.max(1e-10).log10()).collect())
        .collect();
    let peak = db
        .iter()
        .flatten()
        .cloned()
        .fold(f64::NEG_INFINITY, f64::max);
    if peak.is_finite() {
        let floor = peak - top_db;
        for v in db.iter_mut().flatten() {
            *v = v.max(floor);
        }
    }
    db
}
