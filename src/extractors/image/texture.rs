//! Texture analysis
//!
//! Synthetic skin tends to be over-smooth. Two families of measurements on the
//! luminance plane:
//!
//! - **Local binary patterns.** For every interior pixel the 8 neighbours are
//!   read clockwise from the top-left, most significant bit first, each bit set
//!   when the neighbour is at least the centre. The variance and Shannon
//!   entropy (bits) of the resulting 0-255 code map measure how varied the
//!   micro-texture is.
//! - **Gabor responses** at 0°, 45°, 90° and 135° on the mean-removed plane.
//!   The variance of the pooled responses measures oriented structure.
//!
//! ```text
//! lbp_variance  < min_lbp_variance   ⇒ +0.35
//! lbp_entropy   < min_lbp_entropy    ⇒ +0.35
//! gabor_variance < min_gabor_variance ⇒ +0.30
//! ```

use super::{check_size, finite, working_plane, ImageSignal};
use crate::config::ImageThresholds;
use crate::dsp::{self, Plane};
use crate::error::ExtractorResult;
use crate::features::FeatureReport;
use crate::media::DecodedFrame;
use std::f64::consts::PI;

/// Gabor filtering runs on a copy no larger than this on its long side.
const GABOR_MAX_SIDE: usize = 256;

const GABOR_KSIZE: usize = 21;
const GABOR_SIGMA: f64 = 4.0;
const GABOR_LAMBDA: f64 = 10.0;
const GABOR_GAMMA: f64 = 0.5;

/// Neighbour offsets, clockwise from top-left.
const NEIGHBOURS: [(isize, isize); 8] = [
    (-1, -1),
    (0, -1),
    (1, -1),
    (1, 0),
    (1, 1),
    (0, 1),
    (-1, 1),
    (-1, 0),
];

/// LBP code map over interior pixels (border pixels have no full neighbourhood).
pub fn lbp_codes(plane: &Plane) -> Vec<u8> {
    if plane.width < 3 || plane.height < 3 {
        return Vec::new();
    }
    let mut codes = Vec::with_capacity((plane.width - 2) * (plane.height - 2));
    for y in 1..plane.height - 1 {
        for x in 1..plane.width - 1 {
            let centre = plane.get(x, y);
            let mut code = 0u8;
            for (dx, dy) in NEIGHBOURS {
                let n = plane.get((x as isize + dx) as usize, (y as isize + dy) as usize);
                code = (code << 1) | u8::from(n >= centre);
            }
            codes.push(code);
        }
    }
    codes
}

/// Real Gabor kernel, laid out row-major `ksize × ksize`.
pub fn gabor_kernel(ksize: usize, sigma: f64, theta: f64, lambda: f64, gamma: f64) -> Vec<f64> {
    let half = (ksize / 2) as isize;
    let (sin_t, cos_t) = theta.sin_cos();
    let mut kernel = Vec::with_capacity(ksize * ksize);
    for y in -half..=half {
        for x in -half..=half {
            let (x, y) = (x as f64, y as f64);
            let xr = x * cos_t + y * sin_t;
            let yr = -x * sin_t + y * cos_t;
            let envelope = (-(xr * xr + gamma * gamma * yr * yr) / (2.0 * sigma * sigma)).exp();
            kernel.push(envelope * (2.0 * PI * xr / lambda).cos());
        }
    }
    kernel
}

pub fn extract(frame: &DecodedFrame, thresholds: &ImageThresholds) -> ExtractorResult<FeatureReport> {
    check_size(frame, thresholds.min_dimension)?;
    let t = &thresholds.texture;
    let luma = frame.luma();

    let codes = lbp_codes(luma);
    let mut histogram = [0usize; 256];
    for &c in &codes {
        histogram[c as usize] += 1;
    }
    let code_values: Vec<f64> = codes.iter().map(|&c| c as f64).collect();
    let lbp_variance = finite(dsp::variance(&code_values), "lbp variance")?;
    let lbp_entropy = finite(dsp::entropy_bits(&histogram), "lbp entropy")?;

    let small = working_plane(luma, GABOR_MAX_SIDE);
    let small_mean = dsp::mean(&small.data);
    let small = Plane::new(
        small.width,
        small.height,
        small.data.iter().map(|v| v - small_mean).collect(),
    );
    let mut responses = Vec::with_capacity(small.data.len() * 4);
    for step in 0..4 {
        let theta = step as f64 * PI / 4.0;
        let kernel = gabor_kernel(GABOR_KSIZE, GABOR_SIGMA, theta, GABOR_LAMBDA, GABOR_GAMMA);
        responses.extend(dsp::convolve(&small, &kernel, GABOR_KSIZE).data);
    }
    let gabor_variance = finite(dsp::variance(&responses), "gabor variance")?;

    let mut score = 0.0;
    if lbp_variance < t.min_lbp_variance {
        score += 0.35;
    }
    if lbp_entropy < t.min_lbp_entropy {
        score += 0.35;
    }
    if gabor_variance < t.min_gabor_variance {
        score += 0.30;
    }

    Ok(
        FeatureReport::unit(ImageSignal::Texture.name(), score, thresholds.suspicious_at)
            .with("lbp_variance", lbp_variance)
            .with("lbp_entropy", lbp_entropy)
            .with("gabor_variance", gabor_variance),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractors::image::tests::{flat_frame, noise_frame};

    // ==========================================================================
    // LBP CODES
    // ==========================================================================

    #[test]
    fn test_lbp_flat_is_all_ones() {
        // Every neighbour equals the centre, so every bit is set
        let codes = lbp_codes(&Plane::filled(5, 5, 10.0));
        assert_eq!(codes.len(), 9);
        assert!(codes.iter().all(|&c| c == 0xff));
    }

    #[test]
    fn test_lbp_bit_order() {
        // Only the top-left neighbour is brighter than the centre
        let mut data = vec![0.0; 9];
        data[0] = 5.0;
        data[4] = 1.0;
        let codes = lbp_codes(&Plane::new(3, 3, data));
        assert_eq!(codes, vec![0b1000_0000], "top-left neighbour is the MSB");

        let mut data = vec![0.0; 9];
        data[3] = 5.0; // left neighbour, read last
        data[4] = 1.0;
        assert_eq!(lbp_codes(&Plane::new(3, 3, data)), vec![0b0000_0001]);
    }

    #[test]
    fn test_gabor_kernel_shape() {
        let k = gabor_kernel(21, 4.0, 0.0, 10.0, 0.5);
        assert_eq!(k.len(), 441);
        assert!((k[220] - 1.0).abs() < 1e-12, "centre tap is exp(0)*cos(0)");
    }

    // ==========================================================================
    // SCORING
    // ==========================================================================

    #[test]
    fn test_flat_frame_is_maximally_smooth() {
        let report = extract(&flat_frame(32, 32, 90), &ImageThresholds::default()).unwrap();
        assert_eq!(report.diagnostic_f64("lbp_variance"), Some(0.0));
        assert_eq!(report.diagnostic_f64("lbp_entropy"), Some(0.0));
        assert!((report.anomaly_score - 1.0).abs() < 1e-9);
        assert!(report.is_suspicious);
    }

    #[test]
    fn test_noise_is_richly_textured() {
        let report = extract(&noise_frame(48, 48, 5), &ImageThresholds::default()).unwrap();
        let entropy = report.diagnostic_f64("lbp_entropy").unwrap();
        assert!(entropy > 6.0, "noise should have near-uniform LBP codes, got {}", entropy);
        assert!(report.diagnostic_f64("gabor_variance").unwrap() > 100.0);
    }

    #[test]
    fn test_deterministic() {
        let frame = noise_frame(24, 24, 9);
        let a = extract(&frame, &ImageThresholds::default()).unwrap();
        let b = extract(&frame, &ImageThresholds::default()).unwrap();
        assert_eq!(a, b);
    }
}
