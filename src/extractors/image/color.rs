//! Color distribution
//!
//! Rendered faces often have unnaturally narrow colour distributions. Pixels
//! are converted to HSV and CIE L*a*b* on OpenCV's 8-bit scales:
//!
//! ```text
//! H: 0-180 (degrees / 2)   S, V: 0-255
//! L: 0-255 (L* × 255/100)  a, b: a* + 128, b* + 128
//! ```
//!
//! Each channel whose variance is below its floor adds 1/6 to the score.

use super::{check_size, finite, ImageSignal};
use crate::config::ImageThresholds;
use crate::dsp;
use crate::error::ExtractorResult;
use crate::features::FeatureReport;
use crate::media::DecodedFrame;

/// RGB (0-255) to HSV on the 8-bit OpenCV scale.
pub fn rgb_to_hsv(rgb: [u8; 3]) -> [f64; 3] {
    let (r, g, b) = (rgb[0] as f64, rgb[1] as f64, rgb[2] as f64);
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let s = if max > 0.0 { delta / max * 255.0 } else { 0.0 };
    let h = if delta == 0.0 {
        0.0
    } else if max == r {
        60.0 * (g - b) / delta
    } else if max == g {
        120.0 + 60.0 * (b - r) / delta
    } else {
        240.0 + 60.0 * (r - g) / delta
    };
    let h = if h < 0.0 { h + 360.0 } else { h };
    [h / 2.0, s, max]
}

fn srgb_to_linear(c: u8) -> f64 {
    let c = c as f64 / 255.0;
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

/// RGB (0-255) to CIE L*a*b* (D65) on the 8-bit OpenCV scale.
pub fn rgb_to_lab(rgb: [u8; 3]) -> [f64; 3] {
    let (r, g, b) = (
        srgb_to_linear(rgb[0]),
        srgb_to_linear(rgb[1]),
        srgb_to_linear(rgb[2]),
    );
    let x = (0.412453 * r + 0.357580 * g + 0.180423 * b) / 0.950456;
    let y = 0.212671 * r + 0.715160 * g + 0.072169 * b;
    let z = (0.019334 * r + 0.119193 * g + 0.950227 * b) / 1.088754;

    let f = |t: f64| {
        if t > 0.008856 {
            t.cbrt()
        } else {
            7.787 * t + 16.0 / 116.0
        }
    };
    let l = if y > 0.008856 {
        116.0 * y.cbrt() - 16.0
    } else {
        903.3 * y
    };
    let a = 500.0 * (f(x) - f(y));
    let b = 200.0 * (f(y) - f(z));
    [l * 255.0 / 100.0, a + 128.0, b + 128.0]
}

pub fn extract(frame: &DecodedFrame, thresholds: &ImageThresholds) -> ExtractorResult<FeatureReport> {
    check_size(frame, thresholds.min_dimension)?;
    let t = &thresholds.color;

    let n = (frame.width() * frame.height()) as usize;
    let mut channels: [Vec<f64>; 6] = Default::default();
    for c in channels.iter_mut() {
        c.reserve(n);
    }
    for p in frame.rgb().pixels() {
        let hsv = rgb_to_hsv(p.0);
        let lab = rgb_to_lab(p.0);
        for (i, v) in hsv.iter().chain(lab.iter()).enumerate() {
            channels[i].push(*v);
        }
    }

    const NAMES: [&str; 6] = [
        "hue_variance",
        "saturation_variance",
        "value_variance",
        "lightness_variance",
        "a_variance",
        "b_variance",
    ];
    let floors = [
        t.min_hue_variance,
        t.min_saturation_variance,
        t.min_value_variance,
        t.min_lightness_variance,
        t.min_a_variance,
        t.min_b_variance,
    ];

    let mut report_fields = Vec::with_capacity(6);
    let mut flat_channels = 0usize;
    for (i, values) in channels.iter().enumerate() {
        let variance = finite(dsp::variance(values), NAMES[i])?;
        if variance < floors[i] {
            flat_channels += 1;
        }
        report_fields.push((NAMES[i], variance));
    }

    let score = flat_channels as f64 / 6.0;
    let mut report = FeatureReport::unit(ImageSignal::Color.name(), score, thresholds.suspicious_at)
        .with("flat_channels", flat_channels);
    for (name, variance) in report_fields {
        report = report.with(name, variance);
    }
    Ok(report)
}
