//! Spectral features
//!
//! Summary statistics of the clip's timbre. Per frame:
//!
//! - **MFCCs**: orthonormal DCT-II of the mel dB spectrum, first `n_mfcc`
//! - **centroid**: magnitude-weighted mean frequency
//! - **rolloff**: frequency below which 85% of the magnitude lies
//! - **bandwidth**: magnitude-weighted standard deviation around the centroid
//! - **zero-crossing rate**: sign changes per sample in each frame
//! - **chroma**: power folded into 12 pitch classes, peak-normalised
//!
//! Each track is then reduced to its statistics across frames.

use super::{check_length, Spectrogram};
use crate::config::AudioConfig;
use crate::dsp;
use crate::error::{ExtractorError, ExtractorResult};
use crate::media::AudioBuffer;
use serde::Serialize;
use std::f64::consts::PI;

const ROLLOFF_PERCENT: f64 = 0.85;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SpectralFeatures {
    /// (mean, std, min, max) for each coefficient, flattened
    pub mfcc_stats: Vec<f64>,
    pub centroid_mean: f64,
    pub centroid_std: f64,
    pub rolloff_mean: f64,
    pub rolloff_std: f64,
    pub zcr_mean: f64,
    pub zcr_std: f64,
    pub bandwidth_mean: f64,
    pub bandwidth_std: f64,
    pub chroma_mean: f64,
    pub chroma_std: f64,
}

impl SpectralFeatures {
    /// Neutral stand-in when extraction fails: all zeros.
    pub fn zeroed(n_mfcc: usize) -> Self {
        Self {
            mfcc_stats: vec![0.0; n_mfcc * 4],
            ..Self::default()
        }
    }

    /// MFCC statistics followed by the ten spectral values.
    pub fn to_vector(&self) -> Vec<f64> {
        let mut v = self.mfcc_stats.clone();
        v.extend_from_slice(&[
            self.centroid_mean,
            self.centroid_std,
            self.rolloff_mean,
            self.rolloff_std,
            self.zcr_mean,
            self.zcr_std,
            self.bandwidth_mean,
            self.bandwidth_std,
            self.chroma_mean,
            self.chroma_std,
        ]);
        v
    }
}

/// First `n` orthonormal DCT-II coefficients of `x`.
fn dct_ortho(x: &[f64], n: usize) -> Vec<f64> {
    let len = x.len() as f64;
    (0..n)
        .map(|k| {
            let scale = if k == 0 { (1.0 / len).sqrt() } else { (2.0 / len).sqrt() };
            scale
                * x.iter()
                    .enumerate()
                    .map(|(i, v)| v * (PI * k as f64 * (2 * i + 1) as f64 / (2.0 * len)).cos())
                    .sum::<f64>()
        })
        .collect()
}

pub fn mfcc(spec: &Spectrogram, n_mfcc: usize) -> Vec<Vec<f64>> {
    spec.mel_db.iter().map(|frame| dct_ortho(frame, n_mfcc)).collect()
}

pub fn centroid(mags: &[f64], freqs: &[f64]) -> f64 {
    let total: f64 = mags.iter().sum();
    if total <= 0.0 {
        return 0.0;
    }
    mags.iter().zip(freqs).map(|(m, f)| m * f).sum::<f64>() / total
}

pub fn rolloff(mags: &[f64], freqs: &[f64], percent: f64) -> f64 {
    let total: f64 = mags.iter().sum();
    if total <= 0.0 {
        return 0.0;
    }
    let target = percent * total;
    let mut cumulative = 0.0;
    for (m, f) in mags.iter().zip(freqs) {
        cumulative += m;
        if cumulative >= target {
            return *f;
        }
    }
    freqs.last().copied().unwrap_or(0.0)
}

pub fn bandwidth(mags: &[f64], freqs: &[f64], centroid: f64) -> f64 {
    let total: f64 = mags.iter().sum();
    if total <= 0.0 {
        return 0.0;
    }
    (mags
        .iter()
        .zip(freqs)
        .map(|(m, f)| m * (f - centroid).powi(2))
        .sum::<f64>()
        / total)
        .sqrt()
}

/// Zero-crossing rate over centred frames (edge-padded).
pub fn zero_crossing_rates(samples: &[f64], frame_length: usize, hop: usize) -> Vec<f64> {
    if samples.is_empty() || frame_length == 0 || hop == 0 {
        return Vec::new();
    }
    let pad = frame_length / 2;
    let first = samples[0];
    let last = samples[samples.len() - 1];
    let padded: Vec<f64> = std::iter::repeat(first)
        .take(pad)
        .chain(samples.iter().copied())
        .chain(std::iter::repeat(last).take(pad))
        .collect();
    if padded.len() < frame_length {
        return Vec::new();
    }
    let n_frames = (padded.len() - frame_length) / hop + 1;
    (0..n_frames)
        .map(|i| {
            let frame = &padded[i * hop..i * hop + frame_length];
            let crossings = frame
                .windows(2)
                .filter(|w| w[0].is_sign_negative() != w[1].is_sign_negative())
                .count();
            crossings as f64 / frame_length as f64
        })
        .collect()
}

/// Pitch class (0 = C) of a frequency.
fn pitch_class(freq: f64) -> usize {
    // MIDI note 0 is C, 69 is A4 = 440 Hz
    let midi = 69.0 + 12.0 * (freq / 440.0).log2();
    (midi.round() as i64).rem_euclid(12) as usize
}

/// Per-frame 12-bin chroma, each frame scaled so its peak is 1.
pub fn chroma(spec: &Spectrogram) -> Vec<[f64; 12]> {
    let classes: Vec<Option<usize>> = spec
        .frequencies
        .iter()
        .map(|&f| (f >= 20.0).then(|| pitch_class(f)))
        .collect();
    spec.magnitude
        .iter()
        .map(|mags| {
            let mut bins = [0.0; 12];
            for (m, class) in mags.iter().zip(&classes) {
                if let Some(c) = class {
                    bins[*c] += m * m;
                }
            }
            let peak = bins.iter().cloned().fold(0.0, f64::max);
            if peak > 0.0 {
                for b in bins.iter_mut() {
                    *b /= peak;
                }
            }
            bins
        })
        .collect()
}

pub fn extract(
    buffer: &AudioBuffer,
    spec: &Spectrogram,
    config: &AudioConfig,
) -> ExtractorResult<SpectralFeatures> {
    check_length(buffer, config)?;

    let coefficients = mfcc(spec, config.n_mfcc);
    let mut mfcc_stats = Vec::with_capacity(config.n_mfcc * 4);
    for k in 0..config.n_mfcc {
        let track: Vec<f64> = coefficients.iter().map(|c| c[k]).collect();
        let (lo, hi) = dsp::min_max(&track);
        mfcc_stats.extend_from_slice(&[dsp::mean(&track), dsp::std_dev(&track), lo, hi]);
    }

    let mut centroids = Vec::with_capacity(spec.n_frames());
    let mut rolloffs = Vec::with_capacity(spec.n_frames());
    let mut bandwidths = Vec::with_capacity(spec.n_frames());
    for mags in &spec.magnitude {
        let c = centroid(mags, &spec.frequencies);
        centroids.push(c);
        rolloffs.push(rolloff(mags, &spec.frequencies, ROLLOFF_PERCENT));
        bandwidths.push(bandwidth(mags, &spec.frequencies, c));
    }

    let zcr = zero_crossing_rates(&buffer.samples, config.n_fft, config.hop_length);
    let chroma_values: Vec<f64> = chroma(spec).iter().flatten().copied().collect();

    let features = SpectralFeatures {
        mfcc_stats,
        centroid_mean: dsp::mean(&centroids),
        centroid_std: dsp::std_dev(&centroids),
        rolloff_mean: dsp::mean(&rolloffs),
        rolloff_std: dsp::std_dev(&rolloffs),
        zcr_mean: dsp::mean(&zcr),
        zcr_std: dsp::std_dev(&zcr),
        bandwidth_mean: dsp::mean(&bandwidths),
        bandwidth_std: dsp::std_dev(&bandwidths),
        chroma_mean: dsp::mean(&chroma_values),
        chroma_std: dsp::std_dev(&chroma_values),
    };

    if features.to_vector().iter().any(|v| !v.is_finite()) {
        return Err(ExtractorError::NonFinite("spectral features"));
    }
    Ok(features)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractors::audio::tests::tone;

    fn features_for(freq: f64) -> SpectralFeatures {
        let buffer = tone(freq, 0.5);
        let config = AudioConfig::default();
        let spec = Spectrogram::compute(&buffer, &config).unwrap();
        extract(&buffer, &spec, &config).unwrap()
    }

    #[test]
    fn test_vector_length_is_62() {
        let f = features_for(440.0);
        assert_eq!(f.mfcc_stats.len(), 52);
        assert_eq!(f.to_vector().len(), 62);
        assert_eq!(SpectralFeatures::zeroed(13).to_vector(), vec![0.0; 62]);
    }

    #[test]
    fn test_centroid_tracks_tone() {
        let f = features_for(1000.0);
        assert!(
            (f.centroid_mean - 1000.0).abs() < 150.0,
            "pure 1 kHz tone should centre near 1 kHz, got {}",
            f.centroid_mean
        );
        assert!(f.rolloff_mean >= 1000.0 - 25.0);
    }

    #[test]
    fn test_higher_tone_has_higher_zcr() {
        let low = features_for(200.0);
        let high = features_for(2000.0);
        assert!(high.zcr_mean > low.zcr_mean * 5.0);
        // A sine at f crosses zero 2f times per second
        assert!((high.zcr_mean - 2.0 * 2000.0 / 22050.0).abs() < 0.02);
    }

    #[test]
    fn test_pitch_class() {
        assert_eq!(pitch_class(440.0), 9, "A");
        assert_eq!(pitch_class(261.63), 0, "middle C");
        assert_eq!(pitch_class(130.81), 0, "C3");
    }

    #[test]
    fn test_chroma_peaks_at_tone_class() {
        let buffer = tone(440.0, 0.5);
        let spec = Spectrogram::compute(&buffer, &AudioConfig::default()).unwrap();
        let frames = chroma(&spec);
        let mid = frames[frames.len() / 2];
        assert_eq!(mid[9], 1.0, "A is the dominant class for a 440 Hz tone");
    }

    #[test]
    fn test_rolloff_and_bandwidth_basics() {
        let freqs = [0.0, 100.0, 200.0, 300.0];
        assert_eq!(rolloff(&[0.0, 1.0, 0.0, 0.0], &freqs, 0.85), 100.0);
        assert_eq!(bandwidth(&[0.0, 1.0, 0.0, 0.0], &freqs, 100.0), 0.0);
        assert_eq!(centroid(&[0.0, 1.0, 0.0, 1.0], &freqs), 200.0);
    }
}
