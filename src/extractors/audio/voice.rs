//! Voice-quality features
//!
//! Pitch is tracked with YIN over `[fmin_hz, fmax_hz]` (C2 to C7 by default):
//! per frame, the cumulative-mean-normalised difference function is searched
//! for the first dip below [`YIN_THRESHOLD`], refined by parabolic
//! interpolation. Frames with no such dip, or too quiet to matter, are
//! unvoiced.
//!
//! ```text
//! jitter  = mean |Δf0| / mean f0         over voiced frames
//! shimmer = mean |Δ|x|| / mean |x|       over samples
//! voiced_ratio = voiced frames / frames
//! ```

use super::check_length;
use crate::config::AudioConfig;
use crate::dsp;
use crate::error::{ExtractorError, ExtractorResult};
use crate::media::AudioBuffer;
use serde::Serialize;

pub const YIN_THRESHOLD: f64 = 0.1;

/// Frames quieter than this RMS (on the peak-normalised clip) are unvoiced.
const SILENCE_RMS: f64 = 1e-3;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct VoiceFeatures {
    pub pitch_mean: f64,
    pub pitch_std: f64,
    pub pitch_range: f64,
    pub jitter: f64,
    pub shimmer: f64,
    pub voiced_ratio: f64,
    pub voiced_frames: usize,
}

impl VoiceFeatures {
    /// The five values the spoof model sees.
    pub fn to_vector(&self) -> Vec<f64> {
        vec![
            self.pitch_mean,
            self.pitch_std,
            self.jitter,
            self.shimmer,
            self.voiced_ratio,
        ]
    }
}

/// YIN estimate for one frame; `None` when unvoiced.
pub fn yin_frame(frame: &[f64], sample_rate: f64, fmin: f64, fmax: f64) -> Option<f64> {
    let tau_min = (sample_rate / fmax).floor().max(2.0) as usize;
    let tau_max = (sample_rate / fmin).ceil() as usize;
    if frame.len() <= tau_max + 2 {
        return None;
    }
    let window = frame.len() - tau_max - 1;

    // Difference function d(τ) for τ in 0..=tau_max+1
    let mut diff = vec![0.0; tau_max + 2];
    for (tau, d) in diff.iter_mut().enumerate().skip(1) {
        *d = frame[..window]
            .iter()
            .zip(&frame[tau..tau + window])
            .map(|(a, b)| (a - b) * (a - b))
            .sum();
    }

    // Cumulative mean normalisation
    let mut cmnd = vec![1.0; diff.len()];
    let mut running = 0.0;
    for tau in 1..diff.len() {
        running += diff[tau];
        cmnd[tau] = if running > 0.0 {
            diff[tau] * tau as f64 / running
        } else {
            1.0
        };
    }

    let mut tau = tau_min;
    while tau <= tau_max {
        if cmnd[tau] < YIN_THRESHOLD {
            while tau < tau_max && cmnd[tau + 1] < cmnd[tau] {
                tau += 1;
            }
            let refined = parabolic(&cmnd, tau);
            return (refined > 0.0).then(|| sample_rate / refined);
        }
        tau += 1;
    }
    None
}

fn parabolic(values: &[f64], i: usize) -> f64 {
    if i == 0 || i + 1 >= values.len() {
        return i as f64;
    }
    let (a, b, c) = (values[i - 1], values[i], values[i + 1]);
    let denom = a - 2.0 * b + c;
    if denom.abs() < 1e-12 {
        return i as f64;
    }
    i as f64 + 0.5 * (a - c) / denom
}

/// Per-frame pitch track over centred frames; `None` marks unvoiced frames.
pub fn pitch_track(buffer: &AudioBuffer, config: &AudioConfig) -> Vec<Option<f64>> {
    let frame_length = config.n_fft;
    let hop = config.hop_length;
    let samples = &buffer.samples;
    if samples.is_empty() || hop == 0 {
        return Vec::new();
    }
    let half = frame_length / 2;
    let n_frames = samples.len() / hop + 1;
    let sr = buffer.sample_rate as f64;

    (0..n_frames)
        .map(|i| {
            // Centre the frame on sample i*hop, zero-padding past the ends
            let centre = i * hop;
            let frame: Vec<f64> = (0..frame_length)
                .map(|k| {
                    (centre + k)
                        .checked_sub(half)
                        .and_then(|idx| samples.get(idx))
                        .copied()
                        .unwrap_or(0.0)
                })
                .collect();
            if dsp::rms(&frame) < SILENCE_RMS {
                return None;
            }
            yin_frame(&frame, sr, config.fmin_hz, config.fmax_hz)
                .filter(|f| *f >= config.fmin_hz && *f <= config.fmax_hz)
        })
        .collect()
}

pub fn shimmer(samples: &[f64]) -> f64 {
    if samples.len() < 2 {
        return 0.0;
    }
    let amplitude: Vec<f64> = samples.iter().map(|s| s.abs()).collect();
    let mean_amp = dsp::mean(&amplitude);
    if mean_amp <= 0.0 {
        return 0.0;
    }
    let mean_delta = amplitude.windows(2).map(|w| (w[1] - w[0]).abs()).sum::<f64>()
        / (amplitude.len() - 1) as f64;
    mean_delta / mean_amp
}

pub fn extract(buffer: &AudioBuffer, config: &AudioConfig) -> ExtractorResult<VoiceFeatures> {
    check_length(buffer, config)?;

    let track = pitch_track(buffer, config);
    let voiced: Vec<f64> = track.iter().flatten().copied().collect();

    let (pitch_mean, pitch_std, pitch_range) = if voiced.is_empty() {
        (0.0, 0.0, 0.0)
    } else {
        let (lo, hi) = dsp::min_max(&voiced);
        (dsp::mean(&voiced), dsp::std_dev(&voiced), hi - lo)
    };

    let jitter = if voiced.len() > 1 && pitch_mean > 0.0 {
        let deltas: Vec<f64> = voiced.windows(2).map(|w| (w[1] - w[0]).abs()).collect();
        dsp::mean(&deltas) / pitch_mean
    } else {
        0.0
    };

    let features = VoiceFeatures {
        pitch_mean,
        pitch_std,
        pitch_range,
        jitter,
        shimmer: shimmer(&buffer.samples),
        voiced_ratio: if track.is_empty() {
            0.0
        } else {
            voiced.len() as f64 / track.len() as f64
        },
        voiced_frames: voiced.len(),
    };

    if features.to_vector().iter().any(|v| !v.is_finite()) {
        return Err(ExtractorError::NonFinite("voice features"));
    }
    Ok(features)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractors::audio::tests::tone;

    // ==========================================================================
    // PITCH TRACKING
    // ==========================================================================

    #[test]
    fn test_yin_finds_sine_pitch() {
        let buffer = tone(220.0, 0.2);
        let f0 = yin_frame(&buffer.samples[..2048], 22050.0, 65.406, 2093.005).unwrap();
        assert!((f0 - 220.0).abs() < 2.0, "expected ~220 Hz, got {}", f0);
    }

    #[test]
    fn test_silence_is_unvoiced() {
        let buffer = AudioBuffer::new(vec![0.0; 8192], 22050);
        let track = pitch_track(&buffer, &AudioConfig::default());
        assert!(track.iter().all(Option::is_none));
    }

    #[test]
    fn test_steady_tone_features() {
        let features = extract(&tone(220.0, 0.5), &AudioConfig::default()).unwrap();
        assert!((features.pitch_mean - 220.0).abs() < 3.0, "got {}", features.pitch_mean);
        assert!(features.jitter < 0.01, "steady tone has almost no jitter: {}", features.jitter);
        assert!(features.voiced_ratio > 0.8);
        assert!(features.voiced_frames > 10);
    }

    // ==========================================================================
    // SHIMMER
    // ==========================================================================

    #[test]
    fn test_shimmer_of_constant_amplitude() {
        assert_eq!(shimmer(&[0.5, -0.5, 0.5, -0.5]), 0.0);
        assert_eq!(shimmer(&[0.0, 0.0]), 0.0);
    }

    #[test]
    fn test_shimmer_of_alternating_amplitude() {
        // |x| = 1, 0, 1, 0: mean |Δ| = 1, mean |x| = 0.5
        assert!((shimmer(&[1.0, 0.0, -1.0, 0.0]) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_vector_has_five_values() {
        assert_eq!(VoiceFeatures::default().to_vector().len(), 5);
    }
}
