//! Voice-spoof scoring
//!
//! The 70-value feature vector (62 spectral, 3 rhythm, 5 voice) goes to the
//! outlier model when one is configured:
//!
//! ```text
//! confidence = clamp((decision + 1) × 50, 0, 100)
//! spoofed    = model flags the vector as an outlier
//! ```
//!
//! Without a model, confidence comes from rules on the voice features alone
//! (see [`heuristic_confidence`]) and the clip is spoofed below 50.
//!
//! Either way the opinion is also carried as a percent-scale
//! [`FeatureReport`] whose anomaly is `100 - confidence`.

use super::rhythm::RhythmFeatures;
use super::spectral::SpectralFeatures;
use super::voice::VoiceFeatures;
use crate::capabilities::OutlierModel;
use crate::config::HeuristicConfig;
use crate::error::ExtractorResult;
use crate::features::{FeatureReport, ScoreScale};
use serde::Serialize;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SpoofMethod {
    OutlierModel,
    Heuristic,
    /// Scoring failed; confidence held at 50
    Neutral,
}

impl SpoofMethod {
    pub fn name(self) -> &'static str {
        match self {
            SpoofMethod::OutlierModel => "outlier_model",
            SpoofMethod::Heuristic => "heuristic",
            SpoofMethod::Neutral => "neutral",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpoofScore {
    /// 0-100, higher is more likely genuine
    pub confidence: f64,
    pub is_spoofed: bool,
    /// Raw model decision; `None` for the heuristic
    pub decision: Option<f64>,
    pub method: SpoofMethod,
    pub features_used: usize,
    pub report: FeatureReport,
}

impl SpoofScore {
    pub fn new(
        confidence: f64,
        is_spoofed: bool,
        decision: Option<f64>,
        method: SpoofMethod,
        features_used: usize,
    ) -> Self {
        let confidence = confidence.clamp(0.0, 100.0);
        let mut report = FeatureReport::new("voice_spoof", 100.0 - confidence, ScoreScale::Percent, is_spoofed)
            .with("confidence", confidence)
            .with("method", method.name());
        if let Some(decision) = decision {
            report = report.with("decision", decision);
        }
        Self {
            confidence,
            is_spoofed,
            decision,
            method,
            features_used,
            report,
        }
    }
}

/// Concatenate the feature groups in model order.
pub fn feature_vector(
    spectral: &SpectralFeatures,
    rhythm: &RhythmFeatures,
    voice: &VoiceFeatures,
) -> Vec<f64> {
    let mut v = spectral.to_vector();
    v.extend(rhythm.to_vector());
    v.extend(voice.to_vector());
    v
}

fn in_range(value: f64, (lo, hi): (f64, f64)) -> bool {
    value >= lo && value <= hi
}

/// Rule-based confidence from voice features.
pub fn heuristic_confidence(voice: &VoiceFeatures, rules: &HeuristicConfig) -> f64 {
    let mut confidence = rules.base;

    if in_range(voice.pitch_mean, rules.pitch_range) {
        confidence += 10.0;
    } else {
        confidence -= 20.0;
    }

    if in_range(voice.jitter, rules.natural_jitter) {
        confidence += 5.0;
    } else if voice.jitter > rules.excess_jitter {
        confidence -= 15.0;
    }

    if in_range(voice.shimmer, rules.natural_shimmer) {
        confidence += 5.0;
    } else if voice.shimmer > rules.excess_shimmer {
        confidence -= 15.0;
    }

    if in_range(voice.voiced_ratio, rules.voiced_ratio) {
        confidence += 10.0;
    } else {
        confidence -= 20.0;
    }

    confidence.clamp(0.0, 100.0)
}

pub fn score(
    features: &[f64],
    voice: &VoiceFeatures,
    model: Option<&dyn OutlierModel>,
    rules: &HeuristicConfig,
) -> ExtractorResult<SpoofScore> {
    match model {
        Some(model) => {
            let verdict = model.fit_score(features)?;
            debug!(model = model.name(), decision = verdict.decision, "outlier decision");
            Ok(SpoofScore::new(
                (verdict.decision + 1.0) * 50.0,
                verdict.is_outlier,
                Some(verdict.decision),
                SpoofMethod::OutlierModel,
                features.len(),
            ))
        }
        None => {
            let confidence = heuristic_confidence(voice, rules);
            Ok(SpoofScore::new(
                confidence,
                confidence < 50.0,
                None,
                SpoofMethod::Heuristic,
                features.len(),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::OutlierVerdict;
    use crate::config::ForestConfig;
    use crate::error::{CapabilityError, ExtractorError};
    use crate::outlier::IsolationForestModel;

    fn speechlike() -> VoiceFeatures {
        VoiceFeatures {
            pitch_mean: 180.0,
            pitch_std: 20.0,
            pitch_range: 90.0,
            jitter: 1.0,
            shimmer: 0.3,
            voiced_ratio: 0.5,
            voiced_frames: 40,
        }
    }

    struct Failing;

    impl OutlierModel for Failing {
        fn name(&self) -> &str {
            "failing"
        }
        fn fit_score(&self, _: &[f64]) -> Result<OutlierVerdict, CapabilityError> {
            Err(CapabilityError::Unavailable("failing"))
        }
    }

    // ==========================================================================
    // HEURISTIC FALLBACK
    // ==========================================================================
    //
    // Base 50, every rule satisfied: +10 +5 +5 +10 = 80.
    // Every rule violated: -20 -15 -15 -20 = -20, clamped to 0.

    #[test]
    fn test_heuristic_natural_voice() {
        let rules = HeuristicConfig::default();
        assert_eq!(heuristic_confidence(&speechlike(), &rules), 80.0);
    }

    #[test]
    fn test_heuristic_clamps_at_zero() {
        let voice = VoiceFeatures {
            pitch_mean: 1000.0,
            jitter: 6.0,
            shimmer: 2.0,
            voiced_ratio: 0.95,
            ..speechlike()
        };
        assert_eq!(heuristic_confidence(&voice, &HeuristicConfig::default()), 0.0);
    }

    #[test]
    fn test_heuristic_middle_band_is_neutral() {
        // Jitter between the natural band and the excess threshold changes nothing
        let voice = VoiceFeatures { jitter: 3.0, ..speechlike() };
        assert_eq!(heuristic_confidence(&voice, &HeuristicConfig::default()), 75.0);
    }

    #[test]
    fn test_heuristic_score_flags_below_fifty() {
        let voice = VoiceFeatures {
            pitch_mean: 0.0,
            voiced_ratio: 0.0,
            ..speechlike()
        };
        // 50 - 20 + 5 + 5 - 20 = 20
        let s = score(&[0.0; 70], &voice, None, &HeuristicConfig::default()).unwrap();
        assert_eq!(s.confidence, 20.0);
        assert!(s.is_spoofed);
        assert_eq!(s.method, SpoofMethod::Heuristic);
        assert_eq!(s.decision, None);
    }

    #[test]
    fn test_report_is_percent_anomaly() {
        // Confidence 20 means 80 points of anomaly on the percent scale
        let voice = VoiceFeatures {
            pitch_mean: 0.0,
            voiced_ratio: 0.0,
            ..speechlike()
        };
        let s = score(&[0.0; 70], &voice, None, &HeuristicConfig::default()).unwrap();
        assert_eq!(s.report.scale, ScoreScale::Percent);
        assert_eq!(s.report.anomaly_score, 80.0);
        assert!(s.report.is_suspicious, "spoofed clip must flag its report");
        assert_eq!(s.report.diagnostic_f64("confidence"), Some(20.0));
    }

    // ==========================================================================
    // OUTLIER MODEL
    // ==========================================================================

    #[test]
    fn test_single_vector_forest_is_boundary_inlier() {
        let model = IsolationForestModel::new(ForestConfig::default());
        let features: Vec<f64> = (0..70).map(|i| i as f64 * 0.3).collect();
        let s = score(&features, &speechlike(), Some(&model), &HeuristicConfig::default()).unwrap();
        assert_eq!(s.confidence, 50.0, "decision 0 maps to confidence 50");
        assert!(!s.is_spoofed);
        assert_eq!(s.features_used, 70);
        assert_eq!(s.method, SpoofMethod::OutlierModel);
    }

    #[test]
    fn test_model_failure_propagates() {
        let err = score(&[0.0; 70], &speechlike(), Some(&Failing), &HeuristicConfig::default())
            .unwrap_err();
        assert!(matches!(err, ExtractorError::Capability(_)));
    }

    #[test]
    fn test_feature_vector_is_seventy_long() {
        let v = feature_vector(
            &SpectralFeatures::zeroed(13),
            &RhythmFeatures::default(),
            &VoiceFeatures::default(),
        );
        assert_eq!(v.len(), 70);
    }
}
