//! Engine configuration
//!
//! Every threshold the scorers use lives here with its contract value as the
//! default, so none of them are literals inside the extractors. A config file
//! is plain JSON; any missing field falls back to its default.
//!
//! ```json
//! { "verdict": { "image_threshold": 0.45 }, "video": { "max_frames": 20 } }
//! ```

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub fusion: FusionConfig,
    pub image: ImageThresholds,
    pub video: VideoConfig,
    pub audio: AudioConfig,
    pub verdict: VerdictConfig,
}

impl EngineConfig {
    /// Load a config from a JSON file and validate it.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)?;
        let config: EngineConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let weights = &self.fusion.weights;
        let all = weights.as_array();
        if all.iter().any(|(_, w)| !w.is_finite() || *w < 0.0) {
            return Err(ConfigError::Invalid(
                "fusion weights must be finite and non-negative".to_string(),
            ));
        }
        let sum = weights.sum();
        if (sum - 1.0).abs() > 1e-6 {
            return Err(ConfigError::Invalid(format!(
                "fusion weights must sum to 1.0 (got {:.6})",
                sum
            )));
        }
        if !(0.0..=1.0).contains(&self.fusion.neutral_score) {
            return Err(ConfigError::Invalid(
                "fusion.neutral_score must be within [0, 1]".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.fusion.classifier_weight) {
            return Err(ConfigError::Invalid(
                "fusion.classifier_weight must be within [0, 1]".to_string(),
            ));
        }
        if self.verdict.confidence_floor > 100 {
            return Err(ConfigError::Invalid(
                "verdict.confidence_floor must be within [0, 100]".to_string(),
            ));
        }
        if self.video.max_frames == 0 {
            return Err(ConfigError::Invalid(
                "video.max_frames must be at least 1".to_string(),
            ));
        }
        if self.video.ffmpeg.trim().is_empty() || self.video.ffprobe.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "video.ffmpeg and video.ffprobe must name a program".to_string(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// FUSION
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    pub weights: FusionWeights,
    /// Score a failed extractor contributes in place of its real output
    pub neutral_score: f64,
    /// Share of the final image score taken from the neural classifier, when present
    pub classifier_weight: f64,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            weights: FusionWeights::default(),
            neutral_score: 0.5,
            classifier_weight: 0.0,
        }
    }
}

/// Per-extractor weights for the image modality. Must sum to 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionWeights {
    pub frequency: f64,
    pub texture: f64,
    pub face: f64,
    pub color: f64,
    pub edge: f64,
    pub compression: f64,
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self {
            frequency: 0.25,
            texture: 0.20,
            face: 0.20,
            color: 0.15,
            edge: 0.10,
            compression: 0.10,
        }
    }
}

impl FusionWeights {
    pub fn as_array(&self) -> [(&'static str, f64); 6] {
        [
            ("frequency", self.frequency),
            ("texture", self.texture),
            ("face", self.face),
            ("color", self.color),
            ("edge", self.edge),
            ("compression", self.compression),
        ]
    }

    pub fn sum(&self) -> f64 {
        self.as_array().iter().map(|(_, w)| w).sum()
    }
}

// =============================================================================
// IMAGE EXTRACTORS
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageThresholds {
    pub frequency: FrequencyThresholds,
    pub texture: TextureThresholds,
    pub face: FaceThresholds,
    pub color: ColorThresholds,
    pub edge: EdgeThresholds,
    pub compression: CompressionThresholds,
    /// Extractors report `is_suspicious` at or above this score
    pub suspicious_at: f64,
    /// Smallest width/height any image extractor accepts
    pub min_dimension: u32,
}

impl Default for ImageThresholds {
    fn default() -> Self {
        Self {
            frequency: FrequencyThresholds::default(),
            texture: TextureThresholds::default(),
            face: FaceThresholds::default(),
            color: ColorThresholds::default(),
            edge: EdgeThresholds::default(),
            compression: CompressionThresholds::default(),
            suspicious_at: 0.5,
            min_dimension: 8,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FrequencyThresholds {
    pub low_freq_radius: f64,
    pub min_high_freq_ratio: f64,
    pub natural_variance_min: f64,
    pub natural_variance_max: f64,
}

impl Default for FrequencyThresholds {
    fn default() -> Self {
        Self {
            low_freq_radius: 50.0,
            min_high_freq_ratio: 0.15,
            natural_variance_min: 5.0,
            natural_variance_max: 15.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TextureThresholds {
    pub min_lbp_variance: f64,
    pub min_lbp_entropy: f64,
    pub min_gabor_variance: f64,
}

impl Default for TextureThresholds {
    fn default() -> Self {
        Self {
            min_lbp_variance: 2000.0,
            min_lbp_entropy: 5.0,
            min_gabor_variance: 100.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FaceThresholds {
    pub max_symmetry_diff: f64,
    pub min_edge_density: f64,
    pub max_edge_density: f64,
    pub min_detection_confidence: f64,
}

impl Default for FaceThresholds {
    fn default() -> Self {
        Self {
            max_symmetry_diff: 30.0,
            min_edge_density: 0.05,
            max_edge_density: 0.2,
            min_detection_confidence: 0.5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ColorThresholds {
    pub min_hue_variance: f64,
    pub min_saturation_variance: f64,
    pub min_value_variance: f64,
    pub min_lightness_variance: f64,
    pub min_a_variance: f64,
    pub min_b_variance: f64,
}

impl Default for ColorThresholds {
    fn default() -> Self {
        Self {
            min_hue_variance: 100.0,
            min_saturation_variance: 200.0,
            min_value_variance: 200.0,
            min_lightness_variance: 200.0,
            min_a_variance: 20.0,
            min_b_variance: 20.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EdgeThresholds {
    /// Sobel magnitude above which a pixel counts as an edge
    pub edge_magnitude: f64,
    pub max_density: f64,
    pub min_density: f64,
    pub max_gradient_variance: f64,
}

impl Default for EdgeThresholds {
    fn default() -> Self {
        Self {
            edge_magnitude: 100.0,
            max_density: 0.15,
            min_density: 0.03,
            max_gradient_variance: 1000.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionThresholds {
    pub min_ac_variance: f64,
    pub min_ac_energy: f64,
    pub max_ac_energy: f64,
}

impl Default for CompressionThresholds {
    fn default() -> Self {
        Self {
            min_ac_variance: 10.0,
            min_ac_energy: 5.0,
            max_ac_energy: 50.0,
        }
    }
}

// =============================================================================
// VIDEO
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    pub max_frames: usize,
    pub temporal_variance_factor: f64,
    pub temporal_penalty_cap: f64,
    pub min_motion_consistency: f64,
    pub min_face_consistency: f64,
    pub face_drift_pixels: f64,
    pub min_lip_sync: f64,
    /// Score frames on the rayon pool
    pub parallel_frames: bool,
    /// Program used to decode container video
    pub ffmpeg: String,
    /// Program used to read stream size and frame count
    pub ffprobe: String,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            max_frames: 15,
            temporal_variance_factor: 0.1,
            temporal_penalty_cap: 0.5,
            min_motion_consistency: 0.5,
            min_face_consistency: 0.6,
            face_drift_pixels: 50.0,
            min_lip_sync: 0.6,
            parallel_frames: true,
            ffmpeg: "ffmpeg".to_string(),
            ffprobe: "ffprobe".to_string(),
        }
    }
}

// =============================================================================
// AUDIO
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub n_fft: usize,
    pub hop_length: usize,
    pub n_mfcc: usize,
    pub n_mels: usize,
    pub max_duration_secs: f64,
    pub trim_top_db: f64,
    pub fmin_hz: f64,
    pub fmax_hz: f64,
    pub forest: ForestConfig,
    pub heuristic: HeuristicConfig,
    pub artifacts: ArtifactThresholds,
    pub scoring: AudioScoringConfig,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 22050,
            n_fft: 2048,
            hop_length: 512,
            n_mfcc: 13,
            n_mels: 128,
            max_duration_secs: 30.0,
            trim_top_db: 20.0,
            // C2 and C7
            fmin_hz: 65.406,
            fmax_hz: 2093.005,
            forest: ForestConfig::default(),
            heuristic: HeuristicConfig::default(),
            artifacts: ArtifactThresholds::default(),
            scoring: AudioScoringConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ForestConfig {
    pub n_trees: usize,
    pub max_samples: usize,
    pub contamination: f64,
    pub seed: u64,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_samples: 256,
            contamination: 0.1,
            seed: 42,
        }
    }
}

/// Rule-based spoof confidence used when no outlier model is available.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HeuristicConfig {
    pub base: f64,
    pub pitch_range: (f64, f64),
    pub natural_jitter: (f64, f64),
    pub excess_jitter: f64,
    pub natural_shimmer: (f64, f64),
    pub excess_shimmer: f64,
    pub voiced_ratio: (f64, f64),
}

impl Default for HeuristicConfig {
    fn default() -> Self {
        Self {
            base: 50.0,
            pitch_range: (80.0, 400.0),
            natural_jitter: (0.5, 2.0),
            excess_jitter: 5.0,
            natural_shimmer: (0.1, 0.5),
            excess_shimmer: 1.0,
            voiced_ratio: (0.3, 0.8),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactThresholds {
    pub gap_depth: f64,
    pub hnr_too_clean_db: f64,
    pub hnr_too_noisy_db: f64,
    pub hf_ratio_strong: f64,
    pub hf_ratio_moderate: f64,
    pub phase_variance_strong: f64,
    pub phase_variance_moderate: f64,
    pub hpss_kernel: usize,
}

impl Default for ArtifactThresholds {
    fn default() -> Self {
        Self {
            gap_depth: 0.5,
            hnr_too_clean_db: 20.0,
            hnr_too_noisy_db: 5.0,
            hf_ratio_strong: 0.1,
            hf_ratio_moderate: 0.2,
            phase_variance_strong: 2.0,
            phase_variance_moderate: 1.0,
            hpss_kernel: 31,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioScoringConfig {
    /// Overall confidence below this is labelled manipulated
    pub manipulated_below: f64,
    pub artifact_flag_above: f64,
    pub high_probability_below: f64,
    pub moderate_probability_below: f64,
}

impl Default for AudioScoringConfig {
    fn default() -> Self {
        Self {
            manipulated_below: 40.0,
            artifact_flag_above: 60.0,
            high_probability_below: 30.0,
            moderate_probability_below: 50.0,
        }
    }
}

// =============================================================================
// VERDICT
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VerdictConfig {
    pub image_threshold: f64,
    pub video_threshold: f64,
    pub confidence_floor: u32,
    /// How many suspicious regions the reason sentence names
    pub reason_region_cap: usize,
}

impl Default for VerdictConfig {
    fn default() -> Self {
        Self {
            image_threshold: 0.4,
            video_threshold: 0.4,
            confidence_floor: 60,
            reason_region_cap: 3,
        }
    }
}
