//! Signal extractors
//!
//! Each extractor is a stateless function from a decoded unit (frame or audio
//! buffer) plus thresholds to a [`FeatureReport`](crate::features::FeatureReport) or an
//! [`ExtractorError`](crate::ExtractorError). None of them decide what a
//! failure means; the scorers do that in one place.

pub mod audio;
pub mod image;
