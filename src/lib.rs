//! deepcheck - Detect manipulated images, video and audio
//!
//! deepcheck scores a media sample with several independent, individually
//! weak forensic signals and fuses them into one authenticity verdict: a
//! label, a confidence, a trust score and a list of human-readable
//! "suspicious region" explanations.
//!
//! # Overview
//!
//! Generated and edited media rarely fails one test badly. It tends to look a
//! little off in many places at once: too little high-frequency energy, too
//! uniform a texture, too perfect a face, too clean a harmonic structure. Each
//! extractor measures one of those properties and reports an anomaly score;
//! the engine combines them with fixed weights so that no single noisy signal
//! decides the outcome.
//!
//! # Detection Methods
//!
//! 1. **Images**: frequency spectrum, LBP/Gabor texture, face symmetry,
//!    colour-space variance, edge statistics and 8×8 DCT compression
//!    statistics, fused by weighted sum.
//!
//! 2. **Video**: up to 15 evenly spaced frames scored as images, then a
//!    temporal pass: score variance, block-matching motion consistency, face
//!    box drift and mouth-region activity.
//!
//! 3. **Audio**: spectral, rhythm, pitch and artifact features, scored by an
//!    isolation-forest outlier model (or rules on the voice features when no
//!    model is configured) and combined with an artifact score.
//!
//! Any extractor may fail without aborting the analysis. A failed image
//! extractor contributes a neutral score at its full weight; only when every
//! extractor fails, or the sample cannot be decoded, is the result an error.
//!
//! # Quick Start
//!
//! ```no_run
//! use deepcheck::{Analyzer, Label, MediaKind};
//!
//! let analyzer = Analyzer::default();
//! let result = analyzer.analyze_path("portrait.png", None);
//!
//! match result.label {
//!     Label::Authentic => println!("Looks genuine"),
//!     Label::Manipulated => println!("Likely manipulated"),
//!     Label::Error => println!("Couldn't analyze: {:?}", result.error),
//! }
//!
//! println!("Confidence: {}/100, trust {}/100", result.confidence, result.trust_score);
//! println!("Regions: {:?}", result.suspicious_regions);
//! # let _ = MediaKind::Image;
//! ```
//!
//! # Scoring System
//!
//! | Anomaly | Label | Confidence |
//! |---------|-------|------------|
//! | ≤ 0.4 | AUTHENTIC | 60 (the floor) |
//! | > 0.4 | MANIPULATED | max(60, anomaly × 100) |
//!
//! `trust_score = (1 − anomaly) × 100` carries the graded authenticity on
//! both sides.
//!
//! # Modules
//!
//! - [`analyzer`]: the engine: image fusion, frame sampling, temporal
//!   aggregation, audio scoring and verdicts
//! - [`extractors`]: per-modality signal extractors
//! - [`capabilities`]: pluggable face detector, classifier, outlier model and
//!   video decoder
//! - [`ffmpeg`]: container video decoding through the ffmpeg tools
//! - [`report`]: output formatters (JSON, CSV)

pub mod analyzer;
pub mod capabilities;
pub mod config;
pub mod dsp;
pub mod error;
pub mod extractors;
pub mod features;
pub mod ffmpeg;
pub mod logging;
pub mod media;
pub mod outlier;
pub mod report;

pub use analyzer::{AnalysisResult, Analyzer, Extras, Label};
pub use config::EngineConfig;
pub use error::{CapabilityError, ConfigError, DecodeError, ExtractorError};
pub use media::{MediaKind, MediaSample};
