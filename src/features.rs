//! Per-signal reports produced by the extractors

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Scale a report's anomaly score lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoreScale {
    /// `[0, 1]`, image and video signals
    Unit,
    /// `[0, 100]`, audio signals
    Percent,
}

impl ScoreScale {
    pub fn max(self) -> f64 {
        match self {
            ScoreScale::Unit => 1.0,
            ScoreScale::Percent => 100.0,
        }
    }
}

/// One extractor's opinion about one frame or clip.
///
/// Higher `anomaly_score` means more likely manipulated. Scores are clamped
/// to their scale on construction and a NaN score becomes the scale midpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureReport {
    pub name: &'static str,
    pub anomaly_score: f64,
    pub scale: ScoreScale,
    pub is_suspicious: bool,
    pub diagnostic: BTreeMap<String, Value>,
}

impl FeatureReport {
    pub fn new(name: &'static str, anomaly_score: f64, scale: ScoreScale, is_suspicious: bool) -> Self {
        let anomaly_score = if anomaly_score.is_nan() {
            scale.max() / 2.0
        } else {
            anomaly_score.clamp(0.0, scale.max())
        };
        Self {
            name,
            anomaly_score,
            scale,
            is_suspicious,
            diagnostic: BTreeMap::new(),
        }
    }

    /// Unit-scale report flagged suspicious at or above `suspicious_at`.
    pub fn unit(name: &'static str, anomaly_score: f64, suspicious_at: f64) -> Self {
        let report = Self::new(name, anomaly_score, ScoreScale::Unit, false);
        let flagged = report.anomaly_score >= suspicious_at;
        Self {
            is_suspicious: flagged,
            ..report
        }
    }

    /// Attach a diagnostic value. Non-finite floats serialise as null.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.diagnostic.insert(key.to_string(), value.into());
        self
    }

    pub fn diagnostic_f64(&self, key: &str) -> Option<f64> {
        self.diagnostic.get(key).and_then(Value::as_f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_score_is_clamped() {
        let r = FeatureReport::unit("frequency", 1.7, 0.5);
        assert_eq!(r.anomaly_score, 1.0);
        assert!(r.is_suspicious);

        let r = FeatureReport::unit("frequency", -0.3, 0.5);
        assert_eq!(r.anomaly_score, 0.0);
        assert!(!r.is_suspicious);
    }

    #[test]
    fn test_nan_becomes_midpoint() {
        let r = FeatureReport::new("spoof", f64::NAN, ScoreScale::Percent, false);
        assert_eq!(r.anomaly_score, 50.0);
    }

    #[test]
    fn test_suspicious_boundary_is_inclusive() {
        assert!(FeatureReport::unit("edge", 0.5, 0.5).is_suspicious);
        assert!(!FeatureReport::unit("edge", 0.49, 0.5).is_suspicious);
    }

    #[test]
    fn test_diagnostics() {
        let r = FeatureReport::unit("color", 0.2, 0.5)
            .with("hue_variance", 42.0)
            .with("note", "ok");
        assert_eq!(r.diagnostic_f64("hue_variance"), Some(42.0));
        assert_eq!(r.diagnostic_f64("note"), None);
        assert_eq!(r.diagnostic_f64("missing"), None);
    }
}
