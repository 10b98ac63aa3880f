//! Image-domain extractors
//!
//! Six independent signals, all on the 8-bit scale of the decoded frame:
//!
//! ```text
//! Signal        | Looks at                          | Over-smooth / synthetic tell
//! --------------|-----------------------------------|------------------------------
//! frequency     | 2-D FFT of luminance              | little high-frequency energy
//! texture       | LBP codes + Gabor responses       | low variance / entropy
//! face          | detected face boxes               | asymmetric halves, odd edge density
//! color         | HSV and Lab channel variances     | flat channels
//! edge          | Sobel magnitude                   | too many / too few edges
//! compression   | 8x8 block DCT AC coefficients     | missing or excessive AC energy
//! ```
//!
//! Every extractor refuses frames smaller than `min_dimension` on either side.

pub mod color;
pub mod compression;
pub mod edge;
pub mod face;
pub mod frequency;
pub mod texture;

use crate::config::FusionWeights;
use crate::dsp::Plane;
use crate::error::{ExtractorError, ExtractorResult};
use crate::media::DecodedFrame;
use serde::Serialize;
use std::borrow::Cow;

/// The image signals in declaration order. Fusion, region strings and
/// reports all follow this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageSignal {
    Frequency,
    Texture,
    Face,
    Color,
    Edge,
    Compression,
}

impl ImageSignal {
    pub const ALL: [ImageSignal; 6] = [
        ImageSignal::Frequency,
        ImageSignal::Texture,
        ImageSignal::Face,
        ImageSignal::Color,
        ImageSignal::Edge,
        ImageSignal::Compression,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ImageSignal::Frequency => "frequency",
            ImageSignal::Texture => "texture",
            ImageSignal::Face => "face",
            ImageSignal::Color => "color",
            ImageSignal::Edge => "edge",
            ImageSignal::Compression => "compression",
        }
    }

    /// Suspicious-region string emitted when this signal is flagged.
    pub fn region(self) -> &'static str {
        match self {
            ImageSignal::Frequency => "Frequency domain anomalies",
            ImageSignal::Texture => "Unnatural texture patterns",
            ImageSignal::Face => "Facial inconsistencies",
            ImageSignal::Color => "Color distribution anomalies",
            ImageSignal::Edge => "Edge artifacts",
            ImageSignal::Compression => "Compression artifacts",
        }
    }

    pub fn weight(self, weights: &FusionWeights) -> f64 {
        match self {
            ImageSignal::Frequency => weights.frequency,
            ImageSignal::Texture => weights.texture,
            ImageSignal::Face => weights.face,
            ImageSignal::Color => weights.color,
            ImageSignal::Edge => weights.edge,
            ImageSignal::Compression => weights.compression,
        }
    }
}

pub(crate) fn check_size(frame: &DecodedFrame, min: u32) -> ExtractorResult<()> {
    if frame.width() < min || frame.height() < min {
        return Err(ExtractorError::InputTooSmall {
            width: frame.width(),
            height: frame.height(),
            min,
        });
    }
    Ok(())
}

pub(crate) fn finite(value: f64, what: &'static str) -> ExtractorResult<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ExtractorError::NonFinite(what))
    }
}

/// Box-average a plane down so its longer side is at most `max_side`.
pub(crate) fn working_plane(plane: &Plane, max_side: usize) -> Cow<'_, Plane> {
    let longest = plane.width.max(plane.height);
    if longest <= max_side || max_side == 0 {
        return Cow::Borrowed(plane);
    }
    let factor = longest.div_ceil(max_side);
    let (w, h) = (plane.width / factor, plane.height / factor);
    if w == 0 || h == 0 {
        return Cow::Borrowed(plane);
    }

    let area = (factor * factor) as f64;
    let mut data = Vec::with_capacity(w * h);
    for by in 0..h {
        for bx in 0..w {
            let mut sum = 0.0;
            for y in by * factor..(by + 1) * factor {
                for x in bx * factor..(bx + 1) * factor {
                    sum += plane.get(x, y);
                }
            }
            data.push(sum / area);
        }
    }
    Cow::Owned(Plane::new(w, h, data))
}
