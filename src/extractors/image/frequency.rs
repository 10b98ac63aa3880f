//! Frequency-domain analysis
//!
//! Camera images carry sensor noise and fine detail that spread energy across
//! the whole spectrum. Generated or heavily smoothed faces concentrate it near
//! DC. Two measurements on the centred 2-D FFT of the mean-removed luminance:
//!
//! 1. **high_freq_ratio**: power outside a centred disk of radius
//!    `low_freq_radius` (clamped to a quarter of the shorter side) over total
//!    power. Below `min_high_freq_ratio` ⇒ +0.5.
//! 2. **log_magnitude_variance**: variance of `ln(1 + |F|)` over all bins.
//!    Outside `[natural_variance_min, natural_variance_max]` ⇒ +0.5.

use super::{check_size, finite, ImageSignal};
use crate::config::ImageThresholds;
use crate::dsp::{self, Plane};
use crate::error::{ExtractorError, ExtractorResult};
use crate::features::FeatureReport;
use crate::media::DecodedFrame;

pub fn extract(frame: &DecodedFrame, thresholds: &ImageThresholds) -> ExtractorResult<FeatureReport> {
    check_size(frame, thresholds.min_dimension)?;
    let t = &thresholds.frequency;

    let luma = frame.luma();
    let (w, h) = (luma.width, luma.height);
    if dsp::variance(&luma.data) < 1e-9 {
        return Err(ExtractorError::Degenerate(
            "flat luminance has no spectral energy".to_string(),
        ));
    }
    let mean = dsp::mean(&luma.data);
    let centred = Plane::new(w, h, luma.data.iter().map(|v| v - mean).collect());
    let spectrum = dsp::fft2d(&centred);

    let radius = t.low_freq_radius.min(w.min(h) as f64 / 4.0);
    let mut low = 0.0;
    let mut high = 0.0;
    let mut log_magnitude = Vec::with_capacity(spectrum.len());

    for y in 0..h {
        for x in 0..w {
            let bin = spectrum[y * w + x];
            let power = bin.norm_sqr();
            if dsp::shifted_radius(x, y, w, h) <= radius {
                low += power;
            } else {
                high += power;
            }
            log_magnitude.push(bin.norm().ln_1p());
        }
    }

    let total = low + high;
    let high_ratio = finite(high / total, "high-frequency ratio")?;
    let log_variance = finite(dsp::variance(&log_magnitude), "log-magnitude variance")?;

    let mut score = 0.0;
    if high_ratio < t.min_high_freq_ratio {
        score += 0.5;
    }
    if log_variance < t.natural_variance_min || log_variance > t.natural_variance_max {
        score += 0.5;
    }

    Ok(
        FeatureReport::unit(ImageSignal::Frequency.name(), score, thresholds.suspicious_at)
            .with("high_freq_ratio", high_ratio)
            .with("log_magnitude_variance", log_variance)
            .with("low_freq_radius", radius),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractors::image::tests::{flat_frame, gradient_frame, noise_frame};

    // ==========================================================================
    // HIGH-FREQUENCY RATIO
    // ==========================================================================
    //
    // White noise spreads power evenly, so almost all of it lands outside the
    // low-frequency disk. A smooth ramp keeps nearly everything inside.

    #[test]
    fn test_noise_has_high_frequency_energy() {
        let report = extract(&noise_frame(64, 64, 7), &ImageThresholds::default()).unwrap();
        let ratio = report.diagnostic_f64("high_freq_ratio").unwrap();
        assert!(ratio > 0.5, "white noise should be mostly high frequency, got {}", ratio);
    }

    #[test]
    fn test_smooth_ramp_is_low_frequency() {
        let report = extract(&gradient_frame(64, 64), &ImageThresholds::default()).unwrap();
        let ratio = report.diagnostic_f64("high_freq_ratio").unwrap();
        assert!(ratio < 0.15, "a linear ramp should sit near DC, got {}", ratio);
        assert!(report.anomaly_score >= 0.5);
        assert!(report.is_suspicious);
    }

    #[test]
    fn test_radius_clamped_to_quarter_side() {
        let report = extract(&noise_frame(32, 48, 3), &ImageThresholds::default()).unwrap();
        assert_eq!(report.diagnostic_f64("low_freq_radius"), Some(8.0));
    }

    // ==========================================================================
    // FAILURE MODES
    // ==========================================================================

    #[test]
    fn test_flat_frame_is_degenerate() {
        let err = extract(&flat_frame(16, 16, 128), &ImageThresholds::default()).unwrap_err();
        assert!(matches!(err, ExtractorError::Degenerate(_)));
    }

    #[test]
    fn test_tiny_frame_rejected() {
        let err = extract(&flat_frame(1, 1, 0), &ImageThresholds::default()).unwrap_err();
        assert!(matches!(err, ExtractorError::InputTooSmall { .. }));
    }

    #[test]
    fn test_score_bounded() {
        let report = extract(&noise_frame(40, 40, 11), &ImageThresholds::default()).unwrap();
        assert!((0.0..=1.0).contains(&report.anomaly_score));
    }
}
