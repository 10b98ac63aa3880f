//! Edge pattern analysis
//!
//! Blending seams and upsampling leave either too many hard edges or almost
//! none. Sobel gradient magnitude over the luminance:
//!
//! - edge density (magnitude above `edge_magnitude`) outside
//!   `[min_density, max_density]` ⇒ +0.5
//! - gradient-magnitude variance above `max_gradient_variance` ⇒ +0.5

use super::{check_size, finite, ImageSignal};
use crate::config::ImageThresholds;
use crate::dsp;
use crate::error::ExtractorResult;
use crate::features::FeatureReport;
use crate::media::DecodedFrame;

pub fn extract(frame: &DecodedFrame, thresholds: &ImageThresholds) -> ExtractorResult<FeatureReport> {
    check_size(frame, thresholds.min_dimension)?;
    let t = &thresholds.edge;

    let magnitude = dsp::gradient_magnitude(frame.luma());
    let edges = magnitude.data.iter().filter(|&&m| m > t.edge_magnitude).count();
    let density = finite(edges as f64 / magnitude.data.len() as f64, "edge density")?;
    let gradient_variance = finite(dsp::variance(&magnitude.data), "gradient variance")?;

    let mut score = 0.0;
    if density > t.max_density || density < t.min_density {
        score += 0.5;
    }
    if gradient_variance > t.max_gradient_variance {
        score += 0.5;
    }

    Ok(
        FeatureReport::unit(ImageSignal::Edge.name(), score, thresholds.suspicious_at)
            .with("edge_density", density)
            .with("gradient_variance", gradient_variance),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractors::image::tests::{flat_frame, noise_frame};
    use image::{Rgb, RgbImage};

    #[test]
    fn test_flat_frame_has_too_few_edges() {
        let report = extract(&flat_frame(16, 16, 50), &ImageThresholds::default()).unwrap();
        assert_eq!(report.diagnostic_f64("edge_density"), Some(0.0));
        assert_eq!(report.diagnostic_f64("gradient_variance"), Some(0.0));
        assert_eq!(report.anomaly_score, 0.5);
    }

    #[test]
    fn test_single_step_edge_is_in_range() {
        // One vertical step in a 20x20 frame: 2 of 20 columns are edges (density 0.1).
        // Gradient magnitudes are 0 or 920, so the variance is large.
        let frame = DecodedFrame::new(RgbImage::from_fn(20, 20, |x, _| {
            if x < 10 { Rgb([10, 10, 10]) } else { Rgb([240, 240, 240]) }
        }));
        let report = extract(&frame, &ImageThresholds::default()).unwrap();
        assert!((report.diagnostic_f64("edge_density").unwrap() - 0.1).abs() < 1e-12);
        assert!(report.diagnostic_f64("gradient_variance").unwrap() > 1000.0);
        assert_eq!(report.anomaly_score, 0.5);
    }

    #[test]
    fn test_noise_is_edge_saturated() {
        let report = extract(&noise_frame(32, 32, 4), &ImageThresholds::default()).unwrap();
        assert!(report.diagnostic_f64("edge_density").unwrap() > 0.15);
        assert_eq!(report.anomaly_score, 1.0);
        assert!(report.is_suspicious);
    }
}
