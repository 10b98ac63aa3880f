//! Face consistency
//!
//! Face swaps and generated faces often break bilateral symmetry or carry an
//! unusual amount of edge detail compared with the rest of the head. For each
//! detected face box (at or above `min_detection_confidence`):
//!
//! ```text
//! symmetry_diff = mean |left half - mirrored right half|     > 30 ⇒ +0.5
//! edge_density  = Sobel edges inside the box        outside [0.05, 0.2] ⇒ +0.5
//! ```
//!
//! Per-face scores are averaged. No faces is not a failure: the anomaly is 0
//! and nothing is flagged.

use super::{check_size, finite, ImageSignal};
use crate::capabilities::FaceBox;
use crate::config::ImageThresholds;
use crate::dsp::{self, Plane};
use crate::error::ExtractorResult;
use crate::features::FeatureReport;
use crate::media::DecodedFrame;

/// Faces narrower or shorter than this are ignored.
const MIN_FACE_SIDE: u32 = 4;

/// Mean absolute difference between the left half and the mirrored right half.
pub fn symmetry_difference(face: &Plane) -> f64 {
    let half = face.width / 2;
    if half == 0 || face.height == 0 {
        return 0.0;
    }
    let mut total = 0.0;
    for y in 0..face.height {
        for x in 0..half {
            total += (face.get(x, y) - face.get(face.width - 1 - x, y)).abs();
        }
    }
    total / (half * face.height) as f64
}

/// Faces worth scoring: confident enough, clipped to the frame, not tiny.
pub fn usable_faces(frame: &DecodedFrame, faces: &[FaceBox], min_confidence: f64) -> Vec<FaceBox> {
    faces
        .iter()
        .filter(|f| f.confidence >= min_confidence)
        .filter_map(|f| f.clipped(frame.width(), frame.height()))
        .filter(|f| f.width >= MIN_FACE_SIDE && f.height >= MIN_FACE_SIDE)
        .collect()
}

pub fn extract(
    frame: &DecodedFrame,
    faces: &[FaceBox],
    thresholds: &ImageThresholds,
) -> ExtractorResult<FeatureReport> {
    check_size(frame, thresholds.min_dimension)?;
    let t = &thresholds.face;

    let faces = usable_faces(frame, faces, t.min_detection_confidence);
    if faces.is_empty() {
        return Ok(
            FeatureReport::unit(ImageSignal::Face.name(), 0.0, thresholds.suspicious_at)
                .with("face_count", 0),
        );
    }

    let mut scores = Vec::with_capacity(faces.len());
    let mut symmetries = Vec::with_capacity(faces.len());
    let mut densities = Vec::with_capacity(faces.len());

    for face in &faces {
        let region = frame.luma().crop(
            face.x as usize,
            face.y as usize,
            face.width as usize,
            face.height as usize,
        );
        let symmetry = finite(symmetry_difference(&region), "face symmetry")?;
        let density = finite(
            dsp::edge_density(&region, thresholds.edge.edge_magnitude),
            "face edge density",
        )?;

        let mut score = 0.0;
        if symmetry > t.max_symmetry_diff {
            score += 0.5;
        }
        if density < t.min_edge_density || density > t.max_edge_density {
            score += 0.5;
        }
        scores.push(score);
        symmetries.push(symmetry);
        densities.push(density);
    }

    Ok(
        FeatureReport::unit(ImageSignal::Face.name(), dsp::mean(&scores), thresholds.suspicious_at)
            .with("face_count", faces.len())
            .with("symmetry_diff", dsp::mean(&symmetries))
            .with("edge_density", dsp::mean(&densities)),
    )
}
