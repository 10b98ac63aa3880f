//! Error types for decoding, extraction and configuration
//!
//! Only [`DecodeError`] ever reaches the top of an analysis, and even then it
//! is folded into an error-shaped [`AnalysisResult`](crate::AnalysisResult).
//! [`ExtractorError`] is absorbed at the fusion boundary.

use thiserror::Error;

/// Failure inside a single signal extractor.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ExtractorError {
    #[error("input too small: {width}x{height} (need at least {min}x{min})")]
    InputTooSmall { width: u32, height: u32, min: u32 },

    #[error("not enough audio: {samples} samples (need {needed})")]
    NotEnoughAudio { samples: usize, needed: usize },

    #[error("degenerate input: {0}")]
    Degenerate(String),

    #[error("non-finite value in {0}")]
    NonFinite(&'static str),

    #[error("capability failed: {0}")]
    Capability(#[from] CapabilityError),
}

/// Failure reported by an external capability (classifier, face detector,
/// outlier model).
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CapabilityError {
    #[error("{0} is not available")]
    Unavailable(&'static str),

    #[error("{capability} failed: {message}")]
    Failed {
        capability: &'static str,
        message: String,
    },
}

/// Malformed or unsupported media bytes.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum DecodeError {
    #[error("empty payload")]
    Empty,

    #[error("unsupported content kind: {0}")]
    UnsupportedKind(String),

    #[error("invalid image: {0}")]
    Image(String),

    #[error("invalid audio: {0}")]
    Audio(String),

    #[error("invalid video: {0}")]
    Video(String),

    #[error("no frames could be decoded from the video")]
    NoFrames,
}

impl From<image::ImageError> for DecodeError {
    fn from(e: image::ImageError) -> Self {
        DecodeError::Image(e.to_string())
    }
}

/// Failure loading or validating an [`EngineConfig`](crate::EngineConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

pub type ExtractorResult<T> = std::result::Result<T, ExtractorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extractor_error_messages() {
        let e = ExtractorError::InputTooSmall {
            width: 1,
            height: 1,
            min: 8,
        };
        assert_eq!(e.to_string(), "input too small: 1x1 (need at least 8x8)");
    }

    #[test]
    fn test_capability_error_converts() {
        let e: ExtractorError = CapabilityError::Unavailable("face detector").into();
        assert!(e.to_string().contains("face detector is not available"));
    }

    #[test]
    fn test_no_frames_message() {
        assert_eq!(
            DecodeError::NoFrames.to_string(),
            "no frames could be decoded from the video"
        );
    }
}
