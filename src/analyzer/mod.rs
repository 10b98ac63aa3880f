//! Core analysis engine
//!
//! The [`Analyzer`] owns the configuration and the capability handles, and
//! routes each sample to its modality pipeline:
//!
//! ```text
//! image:  decode → ImageScorer                                   → verdict
//! video:  open → sample_frames → ImageScorer per frame
//!                              → TemporalAggregator              → verdict
//! audio:  decode → AudioScorer::extract → AudioScorer::score_features → verdict
//! ```
//!
//! Nothing in here returns an error to the caller: decode failures and
//! all-extractors-failed cases become an [`AnalysisResult`] labelled
//! [`Label::Error`] whose reason says what went wrong.

pub mod audio;
pub mod frame_sampler;
pub mod image;
pub mod verdict;
pub mod video;

use crate::capabilities::{
    AutoVideoDecoder, FaceDetector, ImageClassifier, OutlierModel, SkinToneFaceDetector,
    VideoDecoder,
};
use crate::config::EngineConfig;
use crate::extractors::audio::artifacts::ArtifactComponents;
use crate::extractors::audio::spoof::SpoofScore;
use crate::extractors::audio::voice::VoiceFeatures;
use crate::features::FeatureReport;
use crate::media::{self, MediaKind, MediaSample};
use crate::outlier::IsolationForestModel;
use serde::Serialize;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use self::audio::AudioScorer;
use self::image::{ImageScorer, SignalOutcome};
use self::video::{score_frames, TemporalAggregator};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Label {
    Authentic,
    Manipulated,
    Error,
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Label::Authentic => write!(f, "AUTHENTIC"),
            Label::Manipulated => write!(f, "MANIPULATED"),
            Label::Error => write!(f, "ERROR"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ImageExtras {
    pub width: u32,
    pub height: u32,
    pub face_count: usize,
    pub fused_score: f64,
    /// Present when a classifier was consulted
    pub fake_probability: Option<f64>,
    pub signals: Vec<SignalOutcome>,
    pub failed_extractors: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct VideoExtras {
    pub frames_analyzed: usize,
    pub total_frames: Option<usize>,
    pub stride: usize,
    pub frame_scores: Vec<f64>,
    pub temporal_penalty: f64,
    pub motion_consistency: Option<f64>,
    pub face_consistency: Option<f64>,
    pub lip_sync_score: Option<f64>,
    pub temporal_score: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AudioExtras {
    pub duration_secs: f64,
    pub overall_confidence: f64,
    pub spoof: SpoofScore,
    pub artifact_score: f64,
    pub artifact_components: ArtifactComponents,
    pub artifact_report: FeatureReport,
    pub voice: VoiceFeatures,
    pub failed_groups: Vec<String>,
}

/// Modality-specific detail attached to a result.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "modality", rename_all = "lowercase")]
pub enum Extras {
    Image(ImageExtras),
    Video(VideoExtras),
    Audio(AudioExtras),
    None,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisResult {
    pub file_path: String,
    pub file_name: String,
    pub media_kind: Option<MediaKind>,
    pub label: Label,
    pub is_deepfake: bool,
    /// 0-100, strength of the verdict
    pub confidence: u32,
    /// 0-100, how authentic the sample looks
    pub trust_score: u32,
    /// Fused anomaly score in [0,1]
    pub raw_score: f64,
    pub suspicious_regions: Vec<String>,
    pub model_used: Vec<String>,
    /// Seconds
    pub analysis_time: f64,
    pub reason: String,
    pub extras: Extras,
    pub error: Option<String>,
}

/// Main analyzer
pub struct Analyzer {
    config: EngineConfig,
    face_detector: Arc<dyn FaceDetector>,
    classifier: Option<Arc<dyn ImageClassifier>>,
    outlier_model: Option<Arc<dyn OutlierModel>>,
    video_decoder: Arc<dyn VideoDecoder>,
}

impl Default for Analyzer {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl Analyzer {
    /// Built-in capabilities: skin-tone face detector, isolation forest,
    /// GIF/APNG decoding in-process with ffmpeg for other containers, no
    /// classifier.
    pub fn new(config: EngineConfig) -> Self {
        let forest = IsolationForestModel::new(config.audio.forest.clone());
        let video_decoder = AutoVideoDecoder::new(&config.video);
        Self {
            config,
            face_detector: Arc::new(SkinToneFaceDetector::default()),
            classifier: None,
            outlier_model: Some(Arc::new(forest)),
            video_decoder: Arc::new(video_decoder),
        }
    }

    pub fn with_face_detector(mut self, detector: Arc<dyn FaceDetector>) -> Self {
        self.face_detector = detector;
        self
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn ImageClassifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    /// `None` switches audio spoof scoring to the rule-based fallback.
    pub fn with_outlier_model(mut self, model: Option<Arc<dyn OutlierModel>>) -> Self {
        self.outlier_model = model;
        self
    }

    pub fn with_video_decoder(mut self, decoder: Arc<dyn VideoDecoder>) -> Self {
        self.video_decoder = decoder;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn image_scorer(&self) -> ImageScorer<'_> {
        ImageScorer::new(
            &self.config,
            self.face_detector.as_ref(),
            self.classifier.as_deref(),
        )
    }

    /// Analyze one sample. Always returns a fully populated result.
    pub fn analyze(&self, sample: &MediaSample) -> AnalysisResult {
        let start = Instant::now();
        let kind = sample.kind();
        let mut result = match kind {
            MediaKind::Image => self.analyze_image(sample.bytes()),
            MediaKind::Video => self.analyze_video(sample.bytes()),
            MediaKind::Audio => self.analyze_audio(sample.bytes()),
        };
        result.media_kind = Some(kind);
        result.analysis_time = start.elapsed().as_secs_f64();

        info!(
            kind = %kind,
            label = %result.label,
            confidence = result.confidence,
            raw_score = result.raw_score,
            regions = result.suspicious_regions.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "analysis complete"
        );
        result
    }

    /// Read a file and analyze it. The kind comes from `kind` when given,
    /// otherwise from the file extension.
    pub fn analyze_path<P: AsRef<Path>>(&self, path: P, kind: Option<MediaKind>) -> AnalysisResult {
        let path = path.as_ref();
        let file_path = path.display().to_string();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        let kind = kind.or_else(|| {
            path.extension()
                .and_then(|e| e.to_str())
                .and_then(MediaKind::from_extension)
        });

        let mut result = match (kind, std::fs::read(path)) {
            (None, _) => verdict::build_error(
                None,
                &format!("cannot tell the media kind of {}", file_name),
            ),
            (Some(kind), Err(e)) => {
                verdict::build_error(Some(kind), &format!("failed to read file: {}", e))
            }
            (Some(kind), Ok(bytes)) => self.analyze(&MediaSample::new(bytes, kind)),
        };
        result.file_path = file_path;
        result.file_name = file_name;
        result
    }

    fn analyze_image(&self, data: &[u8]) -> AnalysisResult {
        let frame = match media::decode_image(data) {
            Ok(frame) => frame,
            Err(e) => return verdict::build_error(Some(MediaKind::Image), &e.to_string()),
        };
        debug!(width = frame.width(), height = frame.height(), "image decoded");
        let score = self.image_scorer().score(&frame);
        verdict::build_image(&frame, &score, &self.config)
    }

    fn analyze_video(&self, data: &[u8]) -> AnalysisResult {
        let sampled = self
            .video_decoder
            .open(data)
            .and_then(|mut source| frame_sampler::sample_frames(source.as_mut(), self.config.video.max_frames));
        let sampled = match sampled {
            Ok(s) => s,
            Err(e) => return verdict::build_error(Some(MediaKind::Video), &e.to_string()),
        };
        debug!(frames = sampled.len(), decoder = self.video_decoder.name(), "video sampled");

        let scorer = self.image_scorer();
        let scores = score_frames(&scorer, &sampled.frames, self.config.video.parallel_frames);
        let temporal = TemporalAggregator::new(&self.config).aggregate(&scores, &sampled.frames);
        verdict::build_video(&sampled, &scores, &temporal, &self.config)
    }

    fn analyze_audio(&self, data: &[u8]) -> AnalysisResult {
        let buffer = match media::decode_audio(data, &self.config.audio) {
            Ok(b) => b,
            Err(e) => return verdict::build_error(Some(MediaKind::Audio), &e.to_string()),
        };
        debug!(samples = buffer.samples.len(), rate = buffer.sample_rate, "audio decoded");

        let scorer = AudioScorer::new(&self.config.audio, self.outlier_model.as_deref());
        let features = scorer.extract(&buffer);
        let score = scorer.score_features(&features);
        verdict::build_audio(&features, &score, self.outlier_model.as_deref(), &self.config)
    }
}
