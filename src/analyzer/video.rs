//! Video scoring: per-frame image scores plus temporal consistency
//!
//! # Frame score aggregation
//!
//! ```text
//! penalty = min(penalty_cap, variance(frame_scores) × variance_factor)
//! final   = min(1, mean(frame_scores) × (1 + penalty))
//! ```
//!
//! Scores that jump around between frames push the final score up.
//!
//! # Consistency signals
//!
//! - **motion**: block-matching displacement field between consecutive frames.
//!   Direction changes between neighbouring vectors are wrapped into [0,π];
//!   `consistency = 1 - mean/π`. Each pair below `min_motion_consistency` is
//!   reported as `"Frame i-j: Motion inconsistency"`.
//! - **face position**: mean corner drift of the first usable face box (at or
//!   above `min_detection_confidence`, clipped to the frame) between
//!   consecutive frames that have one; `max(0, 1 - drift/face_drift_pixels)`,
//!   averaged.
//! - **lip-sync**: edge density × 10 of the mouth band (lower 40% of the first
//!   face box), clamped to [0,1] and averaged over frames with a face.
//!
//! Signals without enough data (fewer than two frames or faces, no face at
//! all for lip-sync) are absent and never flag.

use super::image::{ImageScore, ImageScorer};
use crate::capabilities::FaceBox;
use crate::config::{EngineConfig, VideoConfig};
use crate::dsp::{self, Plane};
use crate::extractors::image::{face, working_plane};
use crate::media::DecodedFrame;
use rayon::prelude::*;
use serde::Serialize;
use std::f64::consts::PI;
use tracing::debug;

/// Side of a motion-search block, in working-plane pixels.
const BLOCK: usize = 16;
/// Search radius for block matching.
const SEARCH: isize = 4;
/// Frames are box-downscaled to this longest side before motion search.
const MOTION_MAX_SIDE: usize = 256;

#[derive(Debug, Clone, Serialize)]
pub struct FrameScore {
    /// Position in the sampled sequence
    pub index: usize,
    pub score: ImageScore,
}

/// Score every sampled frame, optionally on the rayon pool. Output order
/// follows the input either way.
pub fn score_frames(scorer: &ImageScorer<'_>, frames: &[DecodedFrame], parallel: bool) -> Vec<FrameScore> {
    let score_one = |(index, frame): (usize, &DecodedFrame)| FrameScore {
        index,
        score: scorer.score(frame),
    };
    if parallel {
        frames.par_iter().enumerate().map(score_one).collect()
    } else {
        frames.iter().enumerate().map(score_one).collect()
    }
}

// =============================================================================
// MOTION
// =============================================================================

/// Best displacement of each full block of `a` within `b` (mean absolute
/// difference, smallest displacement wins ties).
pub fn motion_field(a: &Plane, b: &Plane) -> Vec<(f64, f64)> {
    if a.width != b.width || a.height != b.height {
        return Vec::new();
    }
    let block = BLOCK.min(a.width).min(a.height);
    if block == 0 {
        return Vec::new();
    }

    // Search order: nearest displacements first, so ties keep the smaller one
    let mut offsets: Vec<(isize, isize)> = (-SEARCH..=SEARCH)
        .flat_map(|dy| (-SEARCH..=SEARCH).map(move |dx| (dx, dy)))
        .collect();
    offsets.sort_by_key(|&(dx, dy)| dx * dx + dy * dy);

    let mut field = Vec::new();
    for by in (0..=a.height - block).step_by(block) {
        for bx in (0..=a.width - block).step_by(block) {
            let mut best = (0isize, 0isize);
            let mut best_cost = f64::INFINITY;
            for &(dx, dy) in &offsets {
                let (tx, ty) = (bx as isize + dx, by as isize + dy);
                if tx < 0
                    || ty < 0
                    || tx as usize + block > b.width
                    || ty as usize + block > b.height
                {
                    continue;
                }
                let (tx, ty) = (tx as usize, ty as usize);
                let mut cost = 0.0;
                for y in 0..block {
                    for x in 0..block {
                        cost += (a.get(bx + x, by + y) - b.get(tx + x, ty + y)).abs();
                    }
                }
                if cost < best_cost {
                    best_cost = cost;
                    best = (dx, dy);
                }
            }
            field.push((best.0 as f64, best.1 as f64));
        }
    }
    field
}

/// `1 - mean(direction change)/π` over consecutive vectors; `None` for fewer
/// than two vectors.
pub fn direction_consistency(field: &[(f64, f64)]) -> Option<f64> {
    if field.len() < 2 {
        return None;
    }
    let directions: Vec<f64> = field.iter().map(|&(dx, dy)| dy.atan2(dx)).collect();
    let changes: Vec<f64> = directions
        .windows(2)
        .map(|w| dsp::circular_distance(w[1], w[0]))
        .collect();
    Some((1.0 - dsp::mean(&changes) / PI).clamp(0.0, 1.0))
}

// =============================================================================
// FACES
// =============================================================================

fn corners(face: &FaceBox) -> [(f64, f64); 4] {
    let (x, y) = (face.x as f64, face.y as f64);
    let (r, b) = (x + face.width as f64, y + face.height as f64);
    [(x, y), (r, y), (x, b), (r, b)]
}

/// Mean distance between corresponding corners of two boxes.
pub fn corner_drift(a: &FaceBox, b: &FaceBox) -> f64 {
    let total: f64 = corners(a)
        .iter()
        .zip(corners(b).iter())
        .map(|(p, q)| ((p.0 - q.0).powi(2) + (p.1 - q.1).powi(2)).sqrt())
        .sum();
    total / 4.0
}

/// Mouth band of a face: starts 60% down the box, 40% of its height.
pub fn mouth_region(luma: &Plane, face: &FaceBox) -> Plane {
    let top = face.y as usize + (face.height as f64 * 0.6) as usize;
    let height = (face.height as f64 * 0.4) as usize;
    luma.crop(face.x as usize, top, face.width as usize, height)
}

// =============================================================================
// AGGREGATION
// =============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct TemporalScore {
    pub frame_scores: Vec<f64>,
    pub mean: f64,
    pub variance: f64,
    pub penalty: f64,
    pub final_score: f64,
    /// Consistency per consecutive pair, `None` where the pair had no usable field
    pub motion_pairs: Vec<Option<f64>>,
    pub motion_consistency: Option<f64>,
    pub face_consistency: Option<f64>,
    pub lip_sync: Option<f64>,
    /// Mean of the available motion pair and face consistencies
    pub temporal_score: Option<f64>,
    pub regions: Vec<String>,
}

pub struct TemporalAggregator<'a> {
    video: &'a VideoConfig,
    edge_magnitude: f64,
    min_face_confidence: f64,
}

impl<'a> TemporalAggregator<'a> {
    pub fn new(config: &'a EngineConfig) -> Self {
        Self {
            video: &config.video,
            edge_magnitude: config.image.edge.edge_magnitude,
            min_face_confidence: config.image.face.min_detection_confidence,
        }
    }

    pub fn aggregate(&self, scores: &[FrameScore], frames: &[DecodedFrame]) -> TemporalScore {
        let frame_scores: Vec<f64> = scores.iter().map(|s| s.score.total).collect();
        let mean = dsp::mean(&frame_scores);
        let variance = dsp::variance(&frame_scores);
        let penalty = (variance * self.video.temporal_variance_factor).min(self.video.temporal_penalty_cap);
        let final_score = (mean * (1.0 + penalty)).clamp(0.0, 1.0);

        let motion_pairs = self.motion_pairs(frames);
        let available: Vec<f64> = motion_pairs.iter().flatten().copied().collect();
        let motion_consistency = (!available.is_empty()).then(|| dsp::mean(&available));

        // Same filter as the per-frame face extractor: weak or degenerate
        // detections do not count as a face.
        let first_faces: Vec<Option<FaceBox>> = scores
            .iter()
            .map(|s| {
                let frame = frames.get(s.index)?;
                face::usable_faces(frame, &s.score.faces, self.min_face_confidence)
                    .first()
                    .copied()
            })
            .collect();
        let face_consistency = self.face_consistency(&first_faces);
        let lip_sync = self.lip_sync(&first_faces, frames);

        let mut parts = available.clone();
        parts.extend(face_consistency);
        let temporal_score = (!parts.is_empty()).then(|| dsp::mean(&parts));

        let mut regions = Vec::new();
        for (i, pair) in motion_pairs.iter().enumerate() {
            if pair.is_some_and(|c| c < self.video.min_motion_consistency) {
                regions.push(format!("Frame {}-{}: Motion inconsistency", i, i + 1));
            }
        }
        if face_consistency.is_some_and(|c| c < self.video.min_face_consistency) {
            regions.push("Face consistency issues detected".to_string());
        }
        if lip_sync.is_some_and(|s| s < self.video.min_lip_sync) {
            regions.push("Lip-sync inconsistency".to_string());
        }

        debug!(
            frames = frame_scores.len(),
            mean,
            penalty,
            final_score,
            ?motion_consistency,
            ?face_consistency,
            ?lip_sync,
            "temporal aggregation"
        );

        TemporalScore {
            frame_scores,
            mean,
            variance,
            penalty,
            final_score,
            motion_pairs,
            motion_consistency,
            face_consistency,
            lip_sync,
            temporal_score,
            regions,
        }
    }

    fn motion_pairs(&self, frames: &[DecodedFrame]) -> Vec<Option<f64>> {
        let planes: Vec<_> = frames
            .iter()
            .map(|f| working_plane(f.luma(), MOTION_MAX_SIDE))
            .collect();
        let consistency = |pair: &[std::borrow::Cow<'_, Plane>]| {
            direction_consistency(&motion_field(&pair[0], &pair[1]))
        };
        if self.video.parallel_frames {
            planes.par_windows(2).map(consistency).collect()
        } else {
            planes.windows(2).map(consistency).collect()
        }
    }

    fn face_consistency(&self, faces: &[Option<FaceBox>]) -> Option<f64> {
        let detections: Vec<&FaceBox> = faces.iter().flatten().collect();
        if detections.len() < 2 {
            return None;
        }
        let scores: Vec<f64> = detections
            .windows(2)
            .map(|w| (1.0 - corner_drift(w[0], w[1]) / self.video.face_drift_pixels).max(0.0))
            .collect();
        Some(dsp::mean(&scores))
    }

    fn lip_sync(&self, faces: &[Option<FaceBox>], frames: &[DecodedFrame]) -> Option<f64> {
        let scores: Vec<f64> = faces
            .iter()
            .zip(frames)
            .filter_map(|(face, frame)| {
                let face = face.as_ref()?.clipped(frame.width(), frame.height())?;
                let mouth = mouth_region(frame.luma(), &face);
                if mouth.is_empty() {
                    return None;
                }
                Some((dsp::edge_density(&mouth, self.edge_magnitude) * 10.0).min(1.0))
            })
            .collect();
        (!scores.is_empty()).then(|| dsp::mean(&scores))
    }
}
