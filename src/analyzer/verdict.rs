//! Mapping of modality scores to an [`AnalysisResult`]
//!
//! Every builder is a pure function and never fails. The decision rule is the
//! same for all three modalities once the score is expressed as an anomaly in
//! [0,1]:
//!
//! ```text
//! manipulated  = anomaly > threshold
//! confidence   = max(floor, round(anomaly × 100))      (capped at 100)
//! trust_score  = round((1 − anomaly) × 100)
//! ```
//!
//! For audio the anomaly is `1 − overall / 100` and the decision comes from
//! the audio scorer itself (`overall < 40`).

use super::audio::{AudioFeatureSet, AudioScore};
use super::frame_sampler::SampledFrames;
use super::image::ImageScore;
use super::video::{FrameScore, TemporalScore};
use super::{AnalysisResult, AudioExtras, Extras, ImageExtras, Label, VideoExtras};
use crate::capabilities::OutlierModel;
use crate::config::{EngineConfig, VerdictConfig};
use crate::extractors::audio::spoof::SpoofMethod;
use crate::extractors::image::ImageSignal;
use crate::media::{DecodedFrame, MediaKind};

const AUDIO_GROUPS: usize = 4;

pub fn confidence_for(anomaly: f64, floor: u32) -> u32 {
    let evidence = (anomaly.clamp(0.0, 1.0) * 100.0).round() as u32;
    evidence.max(floor).min(100)
}

pub fn trust_for(anomaly: f64) -> u32 {
    ((1.0 - anomaly.clamp(0.0, 1.0)) * 100.0).round() as u32
}

/// Human-readable explanation of a verdict.
pub fn reason_text(
    manipulated: bool,
    confidence: u32,
    trust_score: u32,
    regions: &[String],
    cap: usize,
) -> String {
    if manipulated {
        let tier = if confidence > 80 {
            "High"
        } else if confidence > 60 {
            "Moderate"
        } else {
            "Low"
        };
        let mut reason = format!(
            "{} confidence manipulation detection. The media shows characteristics \
             commonly associated with AI-generated or manipulated content.",
            tier
        );
        if !regions.is_empty() {
            let named: Vec<&str> = regions.iter().take(cap).map(String::as_str).collect();
            reason.push_str(&format!(" Suspicious signals: {}.", named.join(", ")));
        }
        reason
    } else if trust_score >= 70 {
        "Media appears to be authentic. No significant signs of manipulation detected.".to_string()
    } else {
        "Media appears to be authentic. Some minor inconsistencies detected but not enough \
         to classify as manipulated."
            .to_string()
    }
}

#[allow(clippy::too_many_arguments)]
fn decided(
    kind: MediaKind,
    anomaly: f64,
    manipulated: bool,
    regions: Vec<String>,
    model_used: Vec<String>,
    reason_tail: String,
    extras: Extras,
    verdict: &VerdictConfig,
) -> AnalysisResult {
    let anomaly = anomaly.clamp(0.0, 1.0);
    let confidence = confidence_for(anomaly, verdict.confidence_floor);
    let trust_score = trust_for(anomaly);
    let mut reason = reason_text(manipulated, confidence, trust_score, &regions, verdict.reason_region_cap);
    reason.push_str(&reason_tail);

    AnalysisResult {
        file_path: String::new(),
        file_name: String::new(),
        media_kind: Some(kind),
        label: if manipulated { Label::Manipulated } else { Label::Authentic },
        is_deepfake: manipulated,
        confidence,
        trust_score,
        raw_score: anomaly,
        suspicious_regions: regions,
        model_used,
        analysis_time: 0.0,
        reason,
        extras,
        error: None,
    }
}

/// The fixed error-shaped result.
pub fn build_error(kind: Option<MediaKind>, message: &str) -> AnalysisResult {
    AnalysisResult {
        file_path: String::new(),
        file_name: String::new(),
        media_kind: kind,
        label: Label::Error,
        is_deepfake: false,
        confidence: 0,
        trust_score: 0,
        raw_score: 0.0,
        suspicious_regions: vec!["Analysis failed".to_string()],
        model_used: Vec::new(),
        analysis_time: 0.0,
        reason: format!("Analysis failed: {}", message),
        extras: Extras::None,
        error: Some(message.to_string()),
    }
}

pub fn build_image(frame: &DecodedFrame, score: &ImageScore, config: &EngineConfig) -> AnalysisResult {
    if score.all_failed() {
        let message = format!(
            "no image extractor could run ({})",
            score.failure_messages().join("; ")
        );
        return build_error(Some(MediaKind::Image), &message);
    }

    let manipulated = score.total > config.verdict.image_threshold;
    let regions: Vec<String> = score.suspicious_regions().into_iter().map(String::from).collect();

    let mut model_used: Vec<String> = score
        .outcomes
        .iter()
        .filter(|o| !o.failed())
        .map(|o| format!("{} analysis", o.signal.name()))
        .collect();
    if let Some(opinion) = &score.classifier {
        model_used.push(opinion.model.clone());
    }

    let failures = score.failures();
    let tail = if failures > 0 {
        format!(" {} of {} image extractors could not run.", failures, score.outcomes.len())
    } else {
        String::new()
    };

    let extras = Extras::Image(ImageExtras {
        width: frame.width(),
        height: frame.height(),
        face_count: score.face_count(),
        fused_score: score.fused,
        fake_probability: score.classifier.as_ref().map(|c| c.fake_probability),
        signals: score.outcomes.clone(),
        failed_extractors: score.failure_messages(),
    });

    decided(
        MediaKind::Image,
        score.total,
        manipulated,
        regions,
        model_used,
        tail,
        extras,
        &config.verdict,
    )
}

pub fn build_video(
    sampled: &SampledFrames,
    scores: &[FrameScore],
    temporal: &TemporalScore,
    config: &EngineConfig,
) -> AnalysisResult {
    if scores.is_empty() {
        return build_error(Some(MediaKind::Video), "no frames were decoded");
    }
    if scores.iter().all(|f| f.score.all_failed()) {
        return build_error(
            Some(MediaKind::Video),
            &format!("no image extractor could run on any of {} frames", scores.len()),
        );
    }

    let manipulated = temporal.final_score > config.verdict.video_threshold;

    let mut regions: Vec<String> = ImageSignal::ALL
        .iter()
        .filter(|signal| {
            scores.iter().any(|f| {
                f.score
                    .outcomes
                    .iter()
                    .any(|o| o.signal == **signal && o.is_suspicious())
            })
        })
        .map(|signal| signal.region().to_string())
        .collect();
    regions.extend(temporal.regions.iter().cloned());

    let model_used = ["Frame Analysis", "Temporal Analysis", "Lip-sync Analysis"]
        .iter()
        .map(|m| m.to_string())
        .collect();

    let extras = Extras::Video(VideoExtras {
        frames_analyzed: sampled.len(),
        total_frames: sampled.total,
        stride: sampled.stride,
        frame_scores: temporal.frame_scores.clone(),
        temporal_penalty: temporal.penalty,
        motion_consistency: temporal.motion_consistency,
        face_consistency: temporal.face_consistency,
        lip_sync_score: temporal.lip_sync,
        temporal_score: temporal.temporal_score,
    });

    decided(
        MediaKind::Video,
        temporal.final_score,
        manipulated,
        regions,
        model_used,
        format!(" Analyzed {} frames from the video.", scores.len()),
        extras,
        &config.verdict,
    )
}

pub fn build_audio(
    features: &AudioFeatureSet,
    score: &AudioScore,
    model: Option<&dyn OutlierModel>,
    config: &EngineConfig,
) -> AnalysisResult {
    if features.all_failed() {
        let message = format!(
            "no audio feature group could be extracted ({})",
            features.failures.join("; ")
        );
        return build_error(Some(MediaKind::Audio), &message);
    }

    let anomaly = 1.0 - score.overall_confidence / 100.0;

    let mut model_used: Vec<String> = [
        "Voice Spoofing Detection",
        "Audio Artifact Analysis",
        "Voice Characteristics",
    ]
    .iter()
    .map(|m| m.to_string())
    .collect();
    if let (Some(model), SpoofMethod::OutlierModel) = (model, score.spoof.method) {
        model_used.push(model.name().to_string());
    }

    let failures = features.failures.len();
    let tail = if failures > 0 {
        format!(" {} of {} audio feature groups could not be extracted.", failures, AUDIO_GROUPS)
    } else {
        String::new()
    };

    let extras = Extras::Audio(AudioExtras {
        duration_secs: features.duration_secs,
        overall_confidence: score.overall_confidence,
        spoof: score.spoof.clone(),
        artifact_score: score.artifact_score,
        artifact_components: score.artifact_components,
        artifact_report: score.artifact_report.clone(),
        voice: features.voice,
        failed_groups: features.failures.iter().chain(&score.failures).cloned().collect(),
    });

    decided(
        MediaKind::Audio,
        anomaly,
        score.is_manipulated,
        score.regions.clone(),
        model_used,
        tail,
        extras,
        &config.verdict,
    )
}
