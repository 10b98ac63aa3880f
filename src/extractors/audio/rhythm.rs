//! Rhythm features
//!
//! Synthetic speech often has machine-regular pacing. From the onset-strength
//! envelope (positive mel-dB flux, averaged over bands):
//!
//! - **tempo**: autocorrelation peak of the envelope between 30 and 300 BPM,
//!   weighted towards 120 BPM (log-normal prior, one octave wide)
//! - **regularity**: `1 / (std(onset intervals) + 1e-6)`, 0 with fewer than
//!   two onsets
//! - **beat strength**: mean envelope value on a beat grid at the tempo
//!   period, phased to the strongest alignment

use super::{check_length, Spectrogram};
use crate::config::AudioConfig;
use crate::dsp;
use crate::error::{ExtractorError, ExtractorResult};
use crate::media::AudioBuffer;
use serde::Serialize;

const MIN_BPM: f64 = 30.0;
const MAX_BPM: f64 = 300.0;
const PRIOR_BPM: f64 = 120.0;

/// Peak picking, in seconds (converted to frames at the clip's frame rate)
const PRE_MAX_SECS: f64 = 0.03;
const POST_MAX_SECS: f64 = 0.03;
const PRE_AVG_SECS: f64 = 0.10;
const POST_AVG_SECS: f64 = 0.10;
const WAIT_SECS: f64 = 0.03;
const PEAK_DELTA: f64 = 0.07;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct RhythmFeatures {
    pub tempo: f64,
    pub regularity: f64,
    pub beat_strength: f64,
}

impl RhythmFeatures {
    pub fn to_vector(&self) -> Vec<f64> {
        vec![self.tempo, self.regularity, self.beat_strength]
    }
}

/// Mean positive first difference of the mel dB spectrogram, one value per frame.
pub fn onset_envelope(spec: &Spectrogram) -> Vec<f64> {
    let mut env = vec![0.0; spec.n_frames()];
    for t in 1..spec.n_frames() {
        let (prev, cur) = (&spec.mel_db[t - 1], &spec.mel_db[t]);
        let flux: f64 = cur.iter().zip(prev).map(|(c, p)| (c - p).max(0.0)).sum();
        env[t] = flux / cur.len().max(1) as f64;
    }
    env
}

fn frames_per_second(spec: &Spectrogram) -> f64 {
    spec.sample_rate as f64 / spec.hop_length as f64
}

/// Autocorrelation tempo estimate; returns (bpm, period in frames).
pub fn estimate_tempo(env: &[f64], fps: f64) -> Option<(f64, usize)> {
    let min_lag = (60.0 * fps / MAX_BPM).floor().max(1.0) as usize;
    let max_lag = ((60.0 * fps / MIN_BPM).ceil() as usize).min(env.len().saturating_sub(1));
    if min_lag > max_lag {
        return None;
    }

    let mean = dsp::mean(env);
    let centred: Vec<f64> = env.iter().map(|v| v - mean).collect();

    let mut best: Option<(f64, usize)> = None;
    for lag in min_lag..=max_lag {
        let ac: f64 = centred[..centred.len() - lag]
            .iter()
            .zip(&centred[lag..])
            .map(|(a, b)| a * b)
            .sum();
        let bpm = 60.0 * fps / lag as f64;
        let prior = (-0.5 * (bpm / PRIOR_BPM).log2().powi(2)).exp();
        let weighted = ac * prior;
        if best.map_or(true, |(w, _)| weighted > w) {
            best = Some((weighted, lag));
        }
    }

    match best {
        Some((w, lag)) if w > 0.0 => Some((60.0 * fps / lag as f64, lag)),
        _ => None,
    }
}

/// Onset frames by local-maximum peak picking on the normalised envelope.
pub fn detect_onsets(env: &[f64], fps: f64) -> Vec<usize> {
    let (lo, hi) = dsp::min_max(env);
    if env.is_empty() || hi <= lo {
        return Vec::new();
    }
    let norm: Vec<f64> = env.iter().map(|v| (v - lo) / (hi - lo)).collect();

    let frames = |secs: f64| (secs * fps).round() as usize;
    let (pre_max, post_max) = (frames(PRE_MAX_SECS), frames(POST_MAX_SECS));
    let (pre_avg, post_avg) = (frames(PRE_AVG_SECS), frames(POST_AVG_SECS));
    let wait = frames(WAIT_SECS);

    let n = norm.len();
    let mut onsets: Vec<usize> = Vec::new();
    for t in 0..n {
        let max_window = &norm[t.saturating_sub(pre_max)..(t + post_max + 1).min(n)];
        let is_peak = max_window.iter().all(|&v| v <= norm[t]);
        let avg_window = &norm[t.saturating_sub(pre_avg)..(t + post_avg + 1).min(n)];
        let above_avg = norm[t] >= dsp::mean(avg_window) + PEAK_DELTA;
        let waited = onsets.last().map_or(true, |&last| t > last + wait);
        if is_peak && above_avg && waited {
            onsets.push(t);
        }
    }
    onsets
}

/// Beat grid at `period` frames, phased to maximise total envelope strength.
pub fn beat_grid(env: &[f64], period: usize) -> Vec<usize> {
    if period == 0 || env.is_empty() {
        return Vec::new();
    }
    let phase = (0..period.min(env.len()))
        .max_by(|&a, &b| {
            let sa: f64 = env.iter().skip(a).step_by(period).sum();
            let sb: f64 = env.iter().skip(b).step_by(period).sum();
            sa.total_cmp(&sb)
        })
        .unwrap_or(0);
    (phase..env.len()).step_by(period).collect()
}

pub fn extract(
    buffer: &AudioBuffer,
    spec: &Spectrogram,
    config: &AudioConfig,
) -> ExtractorResult<RhythmFeatures> {
    check_length(buffer, config)?;
    let fps = frames_per_second(spec);
    let env = onset_envelope(spec);

    let onsets = detect_onsets(&env, fps);
    let regularity = if onsets.len() > 1 {
        let intervals: Vec<f64> = onsets.windows(2).map(|w| (w[1] - w[0]) as f64).collect();
        1.0 / (dsp::std_dev(&intervals) + 1e-6)
    } else {
        0.0
    };

    let (tempo, beat_strength) = match estimate_tempo(&env, fps) {
        Some((bpm, period)) => {
            let beats = beat_grid(&env, period);
            let strength = dsp::mean(&beats.iter().map(|&b| env[b]).collect::<Vec<_>>());
            (bpm, strength)
        }
        None => (0.0, 0.0),
    };

    let features = RhythmFeatures {
        tempo,
        regularity,
        beat_strength,
    };
    if features.to_vector().iter().any(|v| !v.is_finite()) {
        return Err(ExtractorError::NonFinite("rhythm features"));
    }
    Ok(features)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::AudioBuffer;

    /// Short noise bursts every `step` samples on silence.
    fn clicks(step: usize, secs: f64) -> AudioBuffer {
        let sr = 22050;
        let n = (secs * sr as f64) as usize;
        let mut state = 12345u32;
        let samples = (0..n)
            .map(|i| {
                if i % step < 400 {
                    state ^= state << 13;
                    state ^= state >> 17;
                    state ^= state << 5;
                    (state as f64 / u32::MAX as f64) * 2.0 - 1.0
                } else {
                    0.0
                }
            })
            .collect();
        AudioBuffer::new(samples, sr)
    }

    // ==========================================================================
    // TEMPO
    // ==========================================================================
    //
    // Clicks every 22 hops (0.51 s) are 117.5 BPM at ~43 frames per second.
    // The autocorrelation peaks at lag 22; lag 44 matches too but the tempo
    // prior pulls it down by a factor of e^-0.5.

    const CLICK_STEP: usize = 22 * 512;

    #[test]
    fn test_click_track_tempo() {
        let buffer = clicks(CLICK_STEP, 4.0);
        let config = AudioConfig::default();
        let spec = Spectrogram::compute(&buffer, &config).unwrap();
        let features = extract(&buffer, &spec, &config).unwrap();
        assert!(
            (features.tempo - 117.45).abs() < 3.0,
            "expected ~117 BPM, got {}",
            features.tempo
        );
        assert!(features.beat_strength > 0.0);
    }

    #[test]
    fn test_regular_clicks_are_regular() {
        let buffer = clicks(CLICK_STEP, 4.0);
        let config = AudioConfig::default();
        let spec = Spectrogram::compute(&buffer, &config).unwrap();
        let env = onset_envelope(&spec);
        let onsets = detect_onsets(&env, frames_per_second(&spec));
        assert!(onsets.len() >= 6, "expected one onset per click, got {:?}", onsets);
        let features = extract(&buffer, &spec, &config).unwrap();
        assert!(features.regularity > 1.0);
    }

    #[test]
    fn test_steady_tone_has_no_rhythm() {
        let buffer = crate::extractors::audio::tests::tone(440.0, 1.0);
        let config = AudioConfig::default();
        let spec = Spectrogram::compute(&buffer, &config).unwrap();
        let env = onset_envelope(&spec);
        // A steady tone barely changes between frames
        let mid = env.len() / 2;
        assert!(env[mid] < 0.5, "got {}", env[mid]);
    }

    #[test]
    fn test_beat_grid_phase() {
        let mut env = vec![0.0; 20];
        env[3] = 1.0;
        env[8] = 1.0;
        env[13] = 1.0;
        assert_eq!(beat_grid(&env, 5), vec![3, 8, 13, 18]);
        assert!(beat_grid(&env, 0).is_empty());
    }

    #[test]
    fn test_tempo_needs_enough_frames() {
        assert_eq!(estimate_tempo(&[0.0, 1.0, 0.0], 43.0), None);
    }
}
