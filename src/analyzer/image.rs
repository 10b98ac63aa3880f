//! Image scoring: run the six extractors on one frame and fuse them
//!
//! # Fusion
//!
//! ```text
//! total = Σ weight_i × score_i        (i over the six image signals)
//! ```
//!
//! A failed extractor still contributes its full weight, at the neutral score
//! (0.5 by default), so the weights actually applied always sum to 1.0. The
//! total is non-decreasing in every extractor score.
//!
//! When a neural classifier is configured its fake probability is blended in:
//! `(1 - w) × total + w × fake`, with `w = fusion.classifier_weight` (0 by
//! default). A classifier error means it simply was not consulted.

use crate::capabilities::{FaceBox, FaceDetector, ImageClassifier};
use crate::config::EngineConfig;
use crate::error::{ExtractorError, ExtractorResult};
use crate::extractors::image::{color, compression, edge, face, frequency, texture, ImageSignal};
use crate::features::FeatureReport;
use crate::media::DecodedFrame;
use serde::Serialize;
use tracing::{debug, warn};

/// What one extractor contributed to the fused score.
#[derive(Debug, Clone, Serialize)]
pub struct SignalOutcome {
    pub signal: ImageSignal,
    pub weight: f64,
    /// Score used in the weighted sum (the neutral default on failure)
    pub applied_score: f64,
    pub report: Option<FeatureReport>,
    pub error: Option<String>,
}

impl SignalOutcome {
    pub fn failed(&self) -> bool {
        self.report.is_none()
    }

    pub fn is_suspicious(&self) -> bool {
        self.report.as_ref().is_some_and(|r| r.is_suspicious)
    }
}

/// The one place extractor failures are absorbed.
pub fn neutral_default(
    signal: ImageSignal,
    weight: f64,
    result: ExtractorResult<FeatureReport>,
    neutral: f64,
) -> SignalOutcome {
    match result {
        Ok(report) => SignalOutcome {
            signal,
            weight,
            applied_score: report.anomaly_score,
            report: Some(report),
            error: None,
        },
        Err(e) => {
            warn!(signal = signal.name(), error = %e, neutral, "extractor failed, using neutral score");
            SignalOutcome {
                signal,
                weight,
                applied_score: neutral,
                report: None,
                error: Some(e.to_string()),
            }
        }
    }
}

/// Weighted sum of applied scores, clamped to [0,1].
pub fn fuse(outcomes: &[SignalOutcome]) -> f64 {
    outcomes
        .iter()
        .map(|o| o.weight * o.applied_score)
        .sum::<f64>()
        .clamp(0.0, 1.0)
}

#[derive(Debug, Clone, Serialize)]
pub struct ClassifierOpinion {
    pub model: String,
    pub fake_probability: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImageScore {
    /// In [`ImageSignal::ALL`] order
    pub outcomes: Vec<SignalOutcome>,
    /// Extractor fusion alone
    pub fused: f64,
    /// Fused score after the classifier blend
    pub total: f64,
    pub classifier: Option<ClassifierOpinion>,
    /// Faces reported by the detector, before filtering
    #[serde(skip)]
    pub faces: Vec<FaceBox>,
}

impl ImageScore {
    pub fn applied_weight_sum(&self) -> f64 {
        self.outcomes.iter().map(|o| o.weight).sum()
    }

    pub fn failures(&self) -> usize {
        self.outcomes.iter().filter(|o| o.failed()).count()
    }

    pub fn all_failed(&self) -> bool {
        self.outcomes.iter().all(SignalOutcome::failed)
    }

    /// Region strings of the flagged signals, in declaration order.
    pub fn suspicious_regions(&self) -> Vec<&'static str> {
        self.outcomes
            .iter()
            .filter(|o| o.is_suspicious())
            .map(|o| o.signal.region())
            .collect()
    }

    /// `"signal: error"` for each failed extractor.
    pub fn failure_messages(&self) -> Vec<String> {
        self.outcomes
            .iter()
            .filter_map(|o| o.error.as_ref().map(|e| format!("{}: {}", o.signal.name(), e)))
            .collect()
    }

    pub fn face_count(&self) -> usize {
        self.faces.len()
    }
}

/// Runs the image extractors against shared, read-only capabilities.
pub struct ImageScorer<'a> {
    config: &'a EngineConfig,
    face_detector: &'a dyn FaceDetector,
    classifier: Option<&'a dyn ImageClassifier>,
}

impl<'a> ImageScorer<'a> {
    pub fn new(
        config: &'a EngineConfig,
        face_detector: &'a dyn FaceDetector,
        classifier: Option<&'a dyn ImageClassifier>,
    ) -> Self {
        Self {
            config,
            face_detector,
            classifier,
        }
    }

    pub fn score(&self, frame: &DecodedFrame) -> ImageScore {
        let thresholds = &self.config.image;
        let weights = &self.config.fusion.weights;
        let neutral = self.config.fusion.neutral_score;

        let detected = self.face_detector.detect(frame);
        let faces = detected.as_ref().cloned().unwrap_or_default();

        let outcomes: Vec<SignalOutcome> = ImageSignal::ALL
            .iter()
            .map(|&signal| {
                let result = match signal {
                    ImageSignal::Frequency => frequency::extract(frame, thresholds),
                    ImageSignal::Texture => texture::extract(frame, thresholds),
                    ImageSignal::Face => match &detected {
                        Ok(boxes) => face::extract(frame, boxes, thresholds),
                        Err(e) => Err(ExtractorError::Capability(e.clone())),
                    },
                    ImageSignal::Color => color::extract(frame, thresholds),
                    ImageSignal::Edge => edge::extract(frame, thresholds),
                    ImageSignal::Compression => compression::extract(frame, thresholds),
                };
                if let Ok(report) = &result {
                    debug!(signal = signal.name(), score = report.anomaly_score, "extractor done");
                }
                neutral_default(signal, signal.weight(weights), result, neutral)
            })
            .collect();

        let fused = fuse(&outcomes);
        let classifier = self.consult_classifier(frame);
        let total = match &classifier {
            Some(opinion) => {
                let w = self.config.fusion.classifier_weight;
                ((1.0 - w) * fused + w * opinion.fake_probability).clamp(0.0, 1.0)
            }
            None => fused,
        };

        ImageScore {
            outcomes,
            fused,
            total,
            classifier,
            faces,
        }
    }

    fn consult_classifier(&self, frame: &DecodedFrame) -> Option<ClassifierOpinion> {
        let classifier = self.classifier?;
        match classifier.classify(frame) {
            Ok(p) if p.fake.is_finite() => Some(ClassifierOpinion {
                model: classifier.name().to_string(),
                fake_probability: p.fake.clamp(0.0, 1.0),
            }),
            Ok(_) => {
                warn!(model = classifier.name(), "classifier returned a non-finite probability");
                None
            }
            Err(e) => {
                warn!(model = classifier.name(), error = %e, "classifier not consulted");
                None
            }
        }
    }
}
