//! Synthesis artifact analysis
//!
//! Four raw measurements, each later mapped to a [0,100] component:
//!
//! - **spectral gaps**: local minima of the Savitzky-Golay smoothed
//!   per-bin mean magnitude that drop below `gap_depth × mean`, as a
//!   percentage of bins
//! - **HNR**: harmonic vs percussive energy from median-filter HPSS on the
//!   magnitude spectrogram, in dB. Only measured when some frame is voiced.
//! - **high-frequency ratio**: mean magnitude of the top quarter of bins over
//!   the overall mean magnitude. Lossy vocoders cut the top band.
//! - **phase variance**: per adjacent-bin pair, `|Δphase|` unwrapped along
//!   the bin axis, variance over time, then averaged over pairs
//!
//! ```text
//! gaps   component = min(100, gap percentage)
//! HNR    > too_clean ⇒ 80,   < too_noisy ⇒ 60,   else 20,   unvoiced ⇒ 0
//! HF     < strong    ⇒ 70,   < moderate  ⇒ 40,   else 10
//! phase  > strong    ⇒ 80,   > moderate  ⇒ 50,   else 20
//! ```

use super::{check_length, Spectrogram};
use crate::config::{ArtifactThresholds, AudioConfig};
use crate::dsp;
use crate::error::{ExtractorError, ExtractorResult};
use crate::features::{FeatureReport, ScoreScale};
use crate::media::AudioBuffer;
use serde::Serialize;
use std::f64::consts::PI;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ArtifactFeatures {
    /// Percentage of bins sitting in a spectral gap
    pub gap_percentage: f64,
    /// `None` when no frame of the clip is voiced
    pub hnr_db: Option<f64>,
    pub hf_ratio: f64,
    pub phase_variance: f64,
}

/// The four [0,100] components and their mean.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ArtifactComponents {
    pub spectral_gaps: f64,
    pub unnatural_harmonics: f64,
    pub compression_artifacts: f64,
    pub phase_inconsistencies: f64,
}

impl ArtifactComponents {
    pub fn score(&self) -> f64 {
        (self.spectral_gaps
            + self.unnatural_harmonics
            + self.compression_artifacts
            + self.phase_inconsistencies)
            / 4.0
    }

    /// Percent-scale report of the mean, flagged above `flag_above`.
    pub fn report(&self, flag_above: f64) -> FeatureReport {
        let score = self.score();
        FeatureReport::new("audio_artifacts", score, ScoreScale::Percent, score > flag_above)
            .with("spectral_gaps", self.spectral_gaps)
            .with("unnatural_harmonics", self.unnatural_harmonics)
            .with("compression_artifacts", self.compression_artifacts)
            .with("phase_inconsistencies", self.phase_inconsistencies)
    }
}

impl ArtifactFeatures {
    pub fn components(&self, t: &ArtifactThresholds) -> ArtifactComponents {
        ArtifactComponents {
            spectral_gaps: self.gap_percentage.clamp(0.0, 100.0),
            unnatural_harmonics: hnr_component(self.hnr_db, t),
            compression_artifacts: hf_component(self.hf_ratio, t),
            phase_inconsistencies: phase_component(self.phase_variance, t),
        }
    }
}

pub fn hnr_component(hnr_db: Option<f64>, t: &ArtifactThresholds) -> f64 {
    match hnr_db {
        None => 0.0,
        Some(db) if db > t.hnr_too_clean_db => 80.0,
        Some(db) if db < t.hnr_too_noisy_db => 60.0,
        Some(_) => 20.0,
    }
}

pub fn hf_component(ratio: f64, t: &ArtifactThresholds) -> f64 {
    if ratio < t.hf_ratio_strong {
        70.0
    } else if ratio < t.hf_ratio_moderate {
        40.0
    } else {
        10.0
    }
}

pub fn phase_component(variance: f64, t: &ArtifactThresholds) -> f64 {
    if variance > t.phase_variance_strong {
        80.0
    } else if variance > t.phase_variance_moderate {
        50.0
    } else {
        20.0
    }
}

// =============================================================================
// SPECTRAL GAPS
// =============================================================================

/// Percentage of positions that are deep local minima of the smoothed curve.
pub fn gap_percentage(band_energy: &[f64], depth: f64) -> f64 {
    if band_energy.len() < 3 {
        return 0.0;
    }
    let smoothed = dsp::savgol_5_2(band_energy);
    let floor = dsp::mean(&smoothed) * depth;
    let gaps = smoothed
        .windows(3)
        .filter(|w| w[1] < w[0] && w[1] < w[2] && w[1] < floor)
        .count();
    (gaps as f64 / smoothed.len() as f64 * 100.0).min(100.0)
}

// =============================================================================
// HARMONIC / PERCUSSIVE SEPARATION
// =============================================================================

/// Median of `values[i - k/2 ..= i + k/2]` with reflected edges.
fn median_filter(values: &[f64], kernel: usize) -> Vec<f64> {
    let n = values.len() as isize;
    let half = (kernel / 2) as isize;
    let reflect = |i: isize| -> usize {
        // scipy "reflect": (d c b a | a b c d | d c b a)
        let period = 2 * n;
        let mut k = i.rem_euclid(period);
        if k >= n {
            k = period - 1 - k;
        }
        k as usize
    };
    let mut window = Vec::with_capacity(kernel);
    (0..n)
        .map(|i| {
            window.clear();
            window.extend((i - half..=i + half).map(|j| values[reflect(j)]));
            dsp::median(&mut window)
        })
        .collect()
}

/// Harmonic-to-percussive energy ratio in dB.
///
/// Harmonic enhancement is a median along time per bin, percussive a median
/// along frequency per frame. Soft (Wiener, power 2) masks split the
/// magnitude; the ratio compares the masked energies.
pub fn hnr_db(magnitude: &[Vec<f64>], kernel: usize) -> f64 {
    let n_frames = magnitude.len();
    let n_bins = magnitude.first().map_or(0, Vec::len);
    let kernel = kernel.max(1) | 1;

    let mut harmonic = vec![vec![0.0; n_bins]; n_frames];
    for k in 0..n_bins {
        let track: Vec<f64> = magnitude.iter().map(|frame| frame[k]).collect();
        for (t, v) in median_filter(&track, kernel).into_iter().enumerate() {
            harmonic[t][k] = v;
        }
    }
    let percussive: Vec<Vec<f64>> = magnitude
        .iter()
        .map(|frame| median_filter(frame, kernel))
        .collect();

    let mut harmonic_energy = 0.0;
    let mut percussive_energy = 0.0;
    for t in 0..n_frames {
        for k in 0..n_bins {
            let (h, p) = (harmonic[t][k], percussive[t][k]);
            let denom = h * h + p * p;
            if denom <= f64::MIN_POSITIVE {
                continue;
            }
            let s = magnitude[t][k];
            let (mh, mp) = (h * h / denom, p * p / denom);
            harmonic_energy += (s * mh).powi(2);
            percussive_energy += (s * mp).powi(2);
        }
    }
    10.0 * (harmonic_energy / (percussive_energy + 1e-10)).max(1e-300).log10()
}

// =============================================================================
// HIGH-FREQUENCY RATIO
// =============================================================================

pub fn hf_ratio(magnitude: &[Vec<f64>]) -> f64 {
    let n_bins = magnitude.first().map_or(0, Vec::len);
    if n_bins == 0 {
        return 0.0;
    }
    let top_start = n_bins - n_bins / 4;
    let total = dsp::mean(&magnitude.iter().flatten().copied().collect::<Vec<_>>());
    let high: Vec<f64> = magnitude
        .iter()
        .flat_map(|frame| frame[top_start..].iter().copied())
        .collect();
    dsp::mean(&high) / (total + 1e-10)
}

// =============================================================================
// PHASE
// =============================================================================

/// Remove 2π jumps from a sequence of angles.
pub fn unwrap(values: &[f64]) -> Vec<f64> {
    let mut out = Vec::with_capacity(values.len());
    let mut correction = 0.0;
    for (i, &v) in values.iter().enumerate() {
        if i > 0 {
            let dd = v - values[i - 1];
            let mut wrapped = (dd + PI).rem_euclid(2.0 * PI) - PI;
            if wrapped == -PI && dd > 0.0 {
                wrapped = PI;
            }
            if dd.abs() >= PI {
                correction += wrapped - dd;
            }
        }
        out.push(v + correction);
    }
    out
}

/// Mean over adjacent-bin pairs of the temporal variance of unwrapped `|Δphase|`.
pub fn phase_variance(spec: &Spectrogram) -> f64 {
    let n_bins = spec.n_bins();
    if n_bins < 2 || spec.n_frames() == 0 {
        return 0.0;
    }
    // diffs[t][k] for k in 0..n_bins-1, unwrapped along k
    let diffs: Vec<Vec<f64>> = spec
        .frames
        .iter()
        .map(|frame| {
            let phases: Vec<f64> = frame.iter().map(|c| c.arg()).collect();
            let raw: Vec<f64> = phases.windows(2).map(|w| (w[1] - w[0]).abs()).collect();
            unwrap(&raw)
        })
        .collect();

    let per_pair: Vec<f64> = (0..n_bins - 1)
        .map(|k| dsp::variance(&diffs.iter().map(|d| d[k]).collect::<Vec<_>>()))
        .collect();
    dsp::mean(&per_pair)
}

pub fn extract(
    buffer: &AudioBuffer,
    spec: &Spectrogram,
    voiced_frames: usize,
    config: &AudioConfig,
) -> ExtractorResult<ArtifactFeatures> {
    check_length(buffer, config)?;
    let t = &config.artifacts;

    let n_bins = spec.n_bins();
    let band_energy: Vec<f64> = (0..n_bins)
        .map(|k| dsp::mean(&spec.magnitude.iter().map(|frame| frame[k]).collect::<Vec<_>>()))
        .collect();

    let features = ArtifactFeatures {
        gap_percentage: gap_percentage(&band_energy, t.gap_depth),
        hnr_db: (voiced_frames > 0).then(|| hnr_db(&spec.magnitude, t.hpss_kernel)),
        hf_ratio: hf_ratio(&spec.magnitude),
        phase_variance: phase_variance(spec),
    };

    let values = [
        features.gap_percentage,
        features.hnr_db.unwrap_or(0.0),
        features.hf_ratio,
        features.phase_variance,
    ];
    if values.iter().any(|v| !v.is_finite()) {
        return Err(ExtractorError::NonFinite("artifact features"));
    }
    Ok(features)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractors::audio::tests::tone;

    fn noise(secs: f64) -> AudioBuffer {
        let mut state = 99u32;
        let n = (secs * 22050.0) as usize;
        let samples = (0..n)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                (state as f64 / u32::MAX as f64) * 2.0 - 1.0
            })
            .collect();
        AudioBuffer::new(samples, 22050)
    }

    // ==========================================================================
    // SPECTRAL GAPS
    // ==========================================================================
    //
    // Three-bin notches survive the 5-point smoothing as single deep minima;
    // a flat curve has no strict minima at all.

    #[test]
    fn test_gap_percentage_counts_notches() {
        let mut curve = vec![1.0; 100];
        for centre in [20, 50, 80] {
            curve[centre - 1] = 0.0;
            curve[centre] = 0.0;
            curve[centre + 1] = 0.0;
        }
        assert!((gap_percentage(&curve, 0.5) - 3.0).abs() < 1e-12);
        assert_eq!(gap_percentage(&vec![1.0; 100], 0.5), 0.0);
    }

    // ==========================================================================
    // COMPONENT MAPPING
    // ==========================================================================

    #[test]
    fn test_components_report_on_percent_scale() {
        let components = ArtifactComponents {
            spectral_gaps: 40.0,
            unnatural_harmonics: 80.0,
            compression_artifacts: 70.0,
            phase_inconsistencies: 80.0,
        };
        let report = components.report(60.0);
        assert_eq!(report.scale, ScoreScale::Percent);
        assert_eq!(report.anomaly_score, 67.5);
        assert!(report.is_suspicious, "67.5 is above the 60 flag line");
        assert_eq!(report.diagnostic_f64("unnatural_harmonics"), Some(80.0));
        assert!(!ArtifactComponents::default().report(60.0).is_suspicious);
    }

    #[test]
    fn test_component_steps() {
        let t = ArtifactThresholds::default();
        assert_eq!(hnr_component(None, &t), 0.0, "unvoiced clips are not judged");
        assert_eq!(hnr_component(Some(25.0), &t), 80.0);
        assert_eq!(hnr_component(Some(2.0), &t), 60.0);
        assert_eq!(hnr_component(Some(10.0), &t), 20.0);
        assert_eq!(hf_component(0.05, &t), 70.0);
        assert_eq!(hf_component(0.15, &t), 40.0);
        assert_eq!(hf_component(0.9, &t), 10.0);
        assert_eq!(phase_component(2.5, &t), 80.0);
        assert_eq!(phase_component(1.5, &t), 50.0);
        assert_eq!(phase_component(0.5, &t), 20.0);
    }

    #[test]
    fn test_score_is_mean_of_components() {
        let c = ArtifactComponents {
            spectral_gaps: 0.0,
            unnatural_harmonics: 80.0,
            compression_artifacts: 70.0,
            phase_inconsistencies: 50.0,
        };
        assert_eq!(c.score(), 50.0);
    }

    // ==========================================================================
    // MEASUREMENTS
    // ==========================================================================

    #[test]
    fn test_unwrap_removes_jumps() {
        let out = unwrap(&[0.0, 2.0 * PI - 0.1, 0.1]);
        assert!((out[1] + 0.1).abs() < 1e-12, "got {:?}", out);
        assert!((out[2] - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_tone_lacks_high_frequencies() {
        let buffer = tone(440.0, 0.5);
        let config = AudioConfig::default();
        let spec = Spectrogram::compute(&buffer, &config).unwrap();
        let features = extract(&buffer, &spec, 10, &config).unwrap();
        assert!(features.hf_ratio < 0.1, "got {}", features.hf_ratio);
        assert!(features.hnr_db.unwrap() > 20.0, "a steady tone is all harmonic");
    }

    #[test]
    fn test_noise_has_flat_spectrum() {
        let buffer = noise(0.5);
        let config = AudioConfig::default();
        let spec = Spectrogram::compute(&buffer, &config).unwrap();
        let features = extract(&buffer, &spec, 0, &config).unwrap();
        assert!(features.hf_ratio > 0.5, "got {}", features.hf_ratio);
        assert_eq!(features.hnr_db, None);
        assert!(features.phase_variance.is_finite());
    }

    #[test]
    fn test_median_filter_reflects_edges() {
        assert_eq!(median_filter(&[1.0, 5.0, 2.0], 3), vec![1.0, 2.0, 2.0]);
    }
}
