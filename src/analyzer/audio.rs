//! Audio scoring
//!
//! ```text
//! overall = (spoof_confidence + (100 - artifact_score)) / 2
//! overall < 40  ⇒ manipulated
//! ```
//!
//! Extraction and scoring are split so a feature set can be scored (or
//! re-scored) on its own. A failed feature group is replaced by zeros and
//! logged; only when every group fails is the clip unanalysable.

use crate::capabilities::OutlierModel;
use crate::config::AudioConfig;
use crate::error::ExtractorResult;
use crate::extractors::audio::artifacts::{self, ArtifactComponents, ArtifactFeatures};
use crate::extractors::audio::rhythm::{self, RhythmFeatures};
use crate::extractors::audio::spectral::{self, SpectralFeatures};
use crate::extractors::audio::spoof::{self, SpoofMethod, SpoofScore};
use crate::extractors::audio::voice::{self, VoiceFeatures};
use crate::extractors::audio::Spectrogram;
use crate::features::FeatureReport;
use crate::media::AudioBuffer;
use serde::Serialize;
use tracing::{debug, warn};

/// Number of feature groups extracted per clip.
const GROUPS: usize = 4;

#[derive(Debug, Clone, Serialize)]
pub struct AudioFeatureSet {
    pub spectral: SpectralFeatures,
    pub rhythm: RhythmFeatures,
    pub voice: VoiceFeatures,
    /// `None` when artifact analysis failed
    pub artifacts: Option<ArtifactFeatures>,
    pub duration_secs: f64,
    /// `"group: error"` for each group that fell back to zeros
    pub failures: Vec<String>,
}

impl AudioFeatureSet {
    pub fn all_failed(&self) -> bool {
        self.failures.len() >= GROUPS
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AudioScore {
    pub spoof: SpoofScore,
    pub artifact_components: ArtifactComponents,
    pub artifact_report: FeatureReport,
    /// Same as `artifact_report.anomaly_score`
    pub artifact_score: f64,
    /// 0-100, higher is more likely genuine
    pub overall_confidence: f64,
    pub is_manipulated: bool,
    pub regions: Vec<String>,
    /// `"step: error"` for each scoring step that fell back
    pub failures: Vec<String>,
}

pub struct AudioScorer<'a> {
    config: &'a AudioConfig,
    outlier_model: Option<&'a dyn OutlierModel>,
}

/// The one place audio failures are absorbed: log the error, record it as
/// `"group: error"`, and carry on with `fallback`.
fn absorb<T>(group: &'static str, result: ExtractorResult<T>, fallback: T, failures: &mut Vec<String>) -> T {
    match result {
        Ok(v) => v,
        Err(e) => {
            warn!(group, error = %e, "audio analysis step failed, using fallback");
            failures.push(format!("{}: {}", group, e));
            fallback
        }
    }
}

impl<'a> AudioScorer<'a> {
    pub fn new(config: &'a AudioConfig, outlier_model: Option<&'a dyn OutlierModel>) -> Self {
        Self {
            config,
            outlier_model,
        }
    }

    pub fn extract(&self, buffer: &AudioBuffer) -> AudioFeatureSet {
        let cfg = self.config;
        let mut failures = Vec::new();
        let spec = Spectrogram::compute(buffer, cfg);

        let spectral = absorb(
            "spectral",
            spec.as_ref()
                .map_err(Clone::clone)
                .and_then(|s| spectral::extract(buffer, s, cfg)),
            SpectralFeatures::zeroed(cfg.n_mfcc),
            &mut failures,
        );
        let rhythm = absorb(
            "rhythm",
            spec.as_ref()
                .map_err(Clone::clone)
                .and_then(|s| rhythm::extract(buffer, s, cfg)),
            RhythmFeatures::default(),
            &mut failures,
        );
        let voice = absorb(
            "voice",
            voice::extract(buffer, cfg),
            VoiceFeatures::default(),
            &mut failures,
        );
        let artifacts = absorb(
            "artifacts",
            spec.as_ref()
                .map_err(Clone::clone)
                .and_then(|s| artifacts::extract(buffer, s, voice.voiced_frames, cfg))
                .map(Some),
            None,
            &mut failures,
        );

        debug!(failed = failures.len(), voiced = voice.voiced_frames, "audio features extracted");
        AudioFeatureSet {
            spectral,
            rhythm,
            voice,
            artifacts,
            duration_secs: buffer.duration_secs(),
            failures,
        }
    }

    pub fn score_features(&self, features: &AudioFeatureSet) -> AudioScore {
        let scoring = &self.config.scoring;
        let heuristic = &self.config.heuristic;

        let mut failures = Vec::new();
        let vector = spoof::feature_vector(&features.spectral, &features.rhythm, &features.voice);
        let spoof = absorb(
            "spoof",
            spoof::score(&vector, &features.voice, self.outlier_model, heuristic),
            SpoofScore::new(50.0, false, None, SpoofMethod::Neutral, 0),
            &mut failures,
        );

        let artifact_components = features
            .artifacts
            .map(|a| a.components(&self.config.artifacts))
            .unwrap_or_default();
        let artifact_report = artifact_components.report(scoring.artifact_flag_above);
        let artifact_score = artifact_report.anomaly_score;

        let overall_confidence = (spoof.confidence + (100.0 - artifact_score)) / 2.0;
        let is_manipulated = overall_confidence < scoring.manipulated_below;

        let mut regions = Vec::new();
        if spoof.report.is_suspicious {
            regions.push("Voice spoofing detected".to_string());
        }
        if artifact_report.is_suspicious {
            regions.push("Audio artifacts detected".to_string());
        }
        if features.voice.jitter > heuristic.excess_jitter {
            regions.push("Unnatural voice jitter".to_string());
        }
        if features.voice.shimmer > heuristic.excess_shimmer {
            regions.push("Unnatural voice shimmer".to_string());
        }
        if overall_confidence < scoring.high_probability_below {
            regions.push("High manipulation probability".to_string());
        } else if overall_confidence < scoring.moderate_probability_below {
            regions.push("Moderate manipulation signs".to_string());
        }

        AudioScore {
            spoof,
            artifact_components,
            artifact_report,
            artifact_score,
            overall_confidence,
            is_manipulated,
            regions,
            failures,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::capabilities::OutlierVerdict;
    use crate::config::ForestConfig;
    use crate::error::{CapabilityError, ExtractorError};
    use crate::extractors::audio::tests::tone;
    use crate::features::ScoreScale;
    use crate::outlier::IsolationForestModel;

    pub(crate) fn feature_set(voice: VoiceFeatures, artifacts: Option<ArtifactFeatures>) -> AudioFeatureSet {
        AudioFeatureSet {
            spectral: SpectralFeatures::zeroed(13),
            rhythm: RhythmFeatures::default(),
            voice,
            artifacts,
            duration_secs: 1.0,
            failures: Vec::new(),
        }
    }

    fn natural_voice() -> VoiceFeatures {
        VoiceFeatures {
            pitch_mean: 150.0,
            pitch_std: 15.0,
            pitch_range: 60.0,
            jitter: 1.0,
            shimmer: 0.3,
            voiced_ratio: 0.6,
            voiced_frames: 30,
        }
    }

    fn quiet_artifacts() -> ArtifactFeatures {
        // components: 0 gaps, 20 HNR, 10 HF, 20 phase => 12.5
        ArtifactFeatures {
            gap_percentage: 0.0,
            hnr_db: Some(10.0),
            hf_ratio: 0.5,
            phase_variance: 0.5,
        }
    }

    // ==========================================================================
    // SCORING
    // ==========================================================================
    //
    // With the heuristic, a natural voice scores 80. Quiet artifacts score
    // 12.5, so overall = (80 + 87.5) / 2 = 83.75.

    #[test]
    fn test_natural_voice_is_authentic() {
        let config = AudioConfig::default();
        let scorer = AudioScorer::new(&config, None);
        let score = scorer.score_features(&feature_set(natural_voice(), Some(quiet_artifacts())));
        assert_eq!(score.spoof.confidence, 80.0);
        assert_eq!(score.artifact_score, 12.5);
        assert_eq!(score.overall_confidence, 83.75);
        assert!(!score.is_manipulated);
        assert!(score.regions.is_empty(), "got {:?}", score.regions);
    }

    #[test]
    fn test_excess_jitter_is_reported() {
        let config = AudioConfig::default();
        let scorer = AudioScorer::new(&config, None);
        let voice = VoiceFeatures { jitter: 6.0, ..natural_voice() };
        let score = scorer.score_features(&feature_set(voice, Some(quiet_artifacts())));
        assert!(score.regions.contains(&"Unnatural voice jitter".to_string()));
    }

    #[test]
    fn test_bad_voice_and_artifacts_are_manipulated() {
        let config = AudioConfig::default();
        let scorer = AudioScorer::new(&config, None);
        let voice = VoiceFeatures {
            pitch_mean: 0.0,
            jitter: 7.0,
            shimmer: 1.5,
            voiced_ratio: 0.0,
            ..natural_voice()
        };
        let artifacts = ArtifactFeatures {
            gap_percentage: 40.0,
            hnr_db: Some(30.0),
            hf_ratio: 0.01,
            phase_variance: 3.0,
        };
        // spoof 0, artifacts (40+80+70+80)/4 = 67.5, overall 16.25
        let score = scorer.score_features(&feature_set(voice, Some(artifacts)));
        assert!(score.is_manipulated);
        assert_eq!(
            score.regions,
            vec![
                "Voice spoofing detected",
                "Audio artifacts detected",
                "Unnatural voice jitter",
                "Unnatural voice shimmer",
                "High manipulation probability",
            ]
        );
    }

    #[test]
    fn test_moderate_band() {
        let config = AudioConfig::default();
        let scorer = AudioScorer::new(&config, None);
        // heuristic: 50 - 20 + 5 + 5 + 10 = 50; no artifacts: overall (50 + 100) / 2 = 75
        let voice = VoiceFeatures { pitch_mean: 0.0, ..natural_voice() };
        let score = scorer.score_features(&feature_set(voice, None));
        assert_eq!(score.overall_confidence, 75.0);
        assert!(score.regions.is_empty());

        // heuristic 0, artifacts 12.5: overall (0 + 87.5) / 2 = 43.75
        let voice = VoiceFeatures {
            pitch_mean: 0.0,
            jitter: 9.0,
            shimmer: 0.0,
            voiced_ratio: 0.0,
            ..natural_voice()
        };
        let score = scorer.score_features(&feature_set(voice, Some(quiet_artifacts())));
        // 50 - 20 - 15 - 20 = -5, clamped to 0
        assert_eq!(score.spoof.confidence, 0.0);
        assert_eq!(score.overall_confidence, 43.75);
        assert!(!score.is_manipulated);
        assert!(score.regions.contains(&"Moderate manipulation signs".to_string()));
    }

    #[test]
    fn test_forest_gives_fifty() {
        let config = AudioConfig::default();
        let model = IsolationForestModel::new(ForestConfig::default());
        let scorer = AudioScorer::new(&config, Some(&model));
        let score = scorer.score_features(&feature_set(natural_voice(), Some(quiet_artifacts())));
        assert_eq!(score.spoof.confidence, 50.0);
        assert!(!score.spoof.is_spoofed);
    }

    // ==========================================================================
    // FALLBACKS AND REPORTS
    // ==========================================================================
    //
    // Every group and the spoof step are absorbed by the same helper, and the
    // spoof and artifact results are both percent-scale reports.

    struct FailingModel;

    impl OutlierModel for FailingModel {
        fn name(&self) -> &str {
            "failing"
        }
        fn fit_score(&self, _: &[f64]) -> Result<OutlierVerdict, CapabilityError> {
            Err(CapabilityError::Unavailable("failing"))
        }
    }

    #[test]
    fn test_spoof_failure_goes_neutral_through_the_same_fallback() {
        let config = AudioConfig::default();
        let scorer = AudioScorer::new(&config, Some(&FailingModel));
        let score = scorer.score_features(&feature_set(natural_voice(), Some(quiet_artifacts())));
        assert_eq!(score.spoof.method, SpoofMethod::Neutral);
        assert_eq!(score.spoof.confidence, 50.0);
        assert_eq!(score.spoof.report.anomaly_score, 50.0);
        assert_eq!(score.spoof.report.scale, ScoreScale::Percent);
        assert_eq!(score.failures.len(), 1);
        assert!(score.failures[0].starts_with("spoof: "), "got {:?}", score.failures);
    }

    #[test]
    fn test_reports_are_percent_scaled() {
        let config = AudioConfig::default();
        let scorer = AudioScorer::new(&config, None);
        let score = scorer.score_features(&feature_set(natural_voice(), Some(quiet_artifacts())));
        assert_eq!(score.artifact_report.name, "audio_artifacts");
        assert_eq!(score.artifact_report.scale, ScoreScale::Percent);
        assert_eq!(score.artifact_report.anomaly_score, score.artifact_score);
        assert!(!score.artifact_report.is_suspicious);
        assert_eq!(score.spoof.report.scale, ScoreScale::Percent);
        assert_eq!(score.spoof.report.anomaly_score, 20.0, "confidence 80 is anomaly 20");
        assert!(score.failures.is_empty());
    }

    #[test]
    fn test_failed_artifacts_group_is_recorded_like_the_others() {
        let mut failures = Vec::new();
        let artifacts: Option<ArtifactFeatures> = absorb(
            "artifacts",
            Err(ExtractorError::NonFinite("artifact features")),
            None,
            &mut failures,
        );
        assert!(artifacts.is_none());
        assert_eq!(failures.len(), 1);
        assert!(failures[0].starts_with("artifacts: "), "got {:?}", failures);

        // A clip too short for the spectrogram fails artifacts with the rest
        let config = AudioConfig::default();
        let scorer = AudioScorer::new(&config, None);
        let features = scorer.extract(&AudioBuffer::new(vec![0.5; 100], 22050));
        assert!(features.artifacts.is_none());
        assert!(features.failures.iter().any(|f| f.starts_with("artifacts: ")), "got {:?}", features.failures);
    }

    // ==========================================================================
    // EXTRACTION
    // ==========================================================================

    #[test]
    fn test_extract_tone() {
        let config = AudioConfig::default();
        let scorer = AudioScorer::new(&config, None);
        let features = scorer.extract(&tone(220.0, 1.0));
        assert!(features.failures.is_empty(), "got {:?}", features.failures);
        assert!(features.artifacts.is_some());
        assert!((features.voice.pitch_mean - 220.0).abs() < 3.0);
        assert!((features.duration_secs - 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_short_clip_fails_every_group() {
        let config = AudioConfig::default();
        let scorer = AudioScorer::new(&config, None);
        let features = scorer.extract(&AudioBuffer::new(vec![0.5; 100], 22050));
        assert!(features.all_failed());
        assert_eq!(features.spectral.to_vector(), vec![0.0; 62]);
    }
}
