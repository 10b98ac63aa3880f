//! External capabilities the engine consumes
//!
//! The engine never owns a model. Classifiers, face detectors, outlier models
//! and video decoders are handed in once as `Arc<dyn Trait>` handles and only
//! ever read. Built-in implementations are provided for everything except
//! the neural classifier, so the CLI works without external models:
//!
//! - [`SkinToneFaceDetector`]: YCbCr skin rule, largest connected region
//! - [`AutoVideoDecoder`]: GIF and APNG through [`AnimatedImageDecoder`]
//!   (still images become one frame), every other container through
//!   [`FfmpegDecoder`](crate::ffmpeg::FfmpegDecoder)
//! - [`IsolationForestModel`](crate::outlier::IsolationForestModel), in `outlier`

use crate::config::VideoConfig;
use crate::error::{CapabilityError, DecodeError};
use crate::ffmpeg::FfmpegDecoder;
use crate::media::DecodedFrame;
use image::codecs::gif::GifDecoder;
use image::codecs::png::PngDecoder;
use image::{AnimationDecoder, DynamicImage, ImageFormat};
use serde::Serialize;
use std::collections::VecDeque;
use std::io::Cursor;

// =============================================================================
// CLASSIFIER
// =============================================================================

/// Two-class output of a neural image classifier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClassProbabilities {
    pub real: f64,
    pub fake: f64,
}

pub trait ImageClassifier: Send + Sync {
    /// Identifier reported in `model_used`.
    fn name(&self) -> &str;

    fn classify(&self, frame: &DecodedFrame) -> Result<ClassProbabilities, CapabilityError>;
}

// =============================================================================
// FACE DETECTION
// =============================================================================

/// Axis-aligned face box in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FaceBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub confidence: f64,
}

impl FaceBox {
    /// Clip the box to a frame; `None` if nothing is left.
    pub fn clipped(&self, frame_width: u32, frame_height: u32) -> Option<FaceBox> {
        let x = self.x.min(frame_width);
        let y = self.y.min(frame_height);
        let width = self.width.min(frame_width - x);
        let height = self.height.min(frame_height - y);
        if width == 0 || height == 0 {
            return None;
        }
        Some(FaceBox {
            x,
            y,
            width,
            height,
            confidence: self.confidence,
        })
    }
}

pub trait FaceDetector: Send + Sync {
    fn name(&self) -> &str;

    fn detect(&self, frame: &DecodedFrame) -> Result<Vec<FaceBox>, CapabilityError>;
}

/// Finds the largest skin-coloured region and reports it as a face.
///
/// Pixels are classified in YCbCr space (Cb in [77, 127], Cr in [133, 173]).
/// The biggest 4-connected skin region is accepted when it covers enough of
/// the frame and its bounding box is roughly face-shaped. Confidence is the
/// fraction of the box the region fills.
#[derive(Debug, Clone)]
pub struct SkinToneFaceDetector {
    pub min_area_fraction: f64,
    pub aspect_range: (f64, f64),
}

impl Default for SkinToneFaceDetector {
    fn default() -> Self {
        Self {
            min_area_fraction: 0.02,
            aspect_range: (0.5, 2.0),
        }
    }
}

pub(crate) fn ycbcr(rgb: [u8; 3]) -> (f64, f64, f64) {
    let (r, g, b) = (rgb[0] as f64, rgb[1] as f64, rgb[2] as f64);
    let y = 0.299 * r + 0.587 * g + 0.114 * b;
    let cb = 128.0 - 0.168736 * r - 0.331264 * g + 0.5 * b;
    let cr = 128.0 + 0.5 * r - 0.418688 * g - 0.081312 * b;
    (y, cb, cr)
}

fn is_skin(rgb: [u8; 3]) -> bool {
    let (_, cb, cr) = ycbcr(rgb);
    (77.0..=127.0).contains(&cb) && (133.0..=173.0).contains(&cr)
}

impl FaceDetector for SkinToneFaceDetector {
    fn name(&self) -> &str {
        "skin-tone-detector"
    }

    fn detect(&self, frame: &DecodedFrame) -> Result<Vec<FaceBox>, CapabilityError> {
        let (w, h) = (frame.width() as usize, frame.height() as usize);
        if w == 0 || h == 0 {
            return Ok(Vec::new());
        }

        let mask: Vec<bool> = frame.rgb().pixels().map(|p| is_skin(p.0)).collect();
        let mut visited = vec![false; w * h];
        let mut best: Option<(usize, (usize, usize, usize, usize))> = None;
        let mut queue = VecDeque::new();

        for start in 0..w * h {
            if !mask[start] || visited[start] {
                continue;
            }
            visited[start] = true;
            queue.push_back(start);

            let mut size = 0usize;
            let (mut min_x, mut min_y, mut max_x, mut max_y) = (w, h, 0, 0);

            while let Some(idx) = queue.pop_front() {
                size += 1;
                let (x, y) = (idx % w, idx / w);
                min_x = min_x.min(x);
                max_x = max_x.max(x);
                min_y = min_y.min(y);
                max_y = max_y.max(y);

                let mut visit = |n: usize| {
                    if mask[n] && !visited[n] {
                        visited[n] = true;
                        queue.push_back(n);
                    }
                };
                if x > 0 {
                    visit(idx - 1);
                }
                if x + 1 < w {
                    visit(idx + 1);
                }
                if y > 0 {
                    visit(idx - w);
                }
                if y + 1 < h {
                    visit(idx + w);
                }
            }

            if best.map_or(true, |(s, _)| size > s) {
                best = Some((size, (min_x, min_y, max_x, max_y)));
            }
        }

        let Some((size, (min_x, min_y, max_x, max_y))) = best else {
            return Ok(Vec::new());
        };

        if (size as f64) < self.min_area_fraction * (w * h) as f64 {
            return Ok(Vec::new());
        }

        let box_w = max_x - min_x + 1;
        let box_h = max_y - min_y + 1;
        let aspect = box_w as f64 / box_h as f64;
        if aspect < self.aspect_range.0 || aspect > self.aspect_range.1 {
            return Ok(Vec::new());
        }

        Ok(vec![FaceBox {
            x: min_x as u32,
            y: min_y as u32,
            width: box_w as u32,
            height: box_h as u32,
            confidence: size as f64 / (box_w * box_h) as f64,
        }])
    }
}

// =============================================================================
// OUTLIER MODEL
// =============================================================================

/// Decision from an unsupervised outlier model.
///
/// `decision` is positive for inliers and negative for outliers, roughly
/// within [-1, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct OutlierVerdict {
    pub decision: f64,
    pub is_outlier: bool,
}

pub trait OutlierModel: Send + Sync {
    fn name(&self) -> &str;

    /// Fit on this request's feature vector and score it.
    fn fit_score(&self, features: &[f64]) -> Result<OutlierVerdict, CapabilityError>;
}

// =============================================================================
// VIDEO DECODING
// =============================================================================

/// Sequential access to decoded frames.
pub trait FrameSource {
    /// Total frame count when the container reports one.
    fn frame_count(&self) -> Option<usize>;

    /// `None` at end of stream.
    fn next_frame(&mut self) -> Option<Result<DecodedFrame, DecodeError>>;
}

pub trait VideoDecoder: Send + Sync {
    fn name(&self) -> &str;

    fn open(&self, data: &[u8]) -> Result<Box<dyn FrameSource>, DecodeError>;
}

/// Decodes animated GIF and APNG files; any other still image the `image`
/// crate can read is treated as a single-frame video.
#[derive(Debug, Clone, Default)]
pub struct AnimatedImageDecoder;

struct AnimatedFrames {
    frames: image::Frames<'static>,
    total: Option<usize>,
}

impl FrameSource for AnimatedFrames {
    fn frame_count(&self) -> Option<usize> {
        self.total
    }

    fn next_frame(&mut self) -> Option<Result<DecodedFrame, DecodeError>> {
        let frame = self.frames.next()?;
        Some(
            frame
                .map(|f| DecodedFrame::new(DynamicImage::ImageRgba8(f.into_buffer()).to_rgb8()))
                .map_err(DecodeError::from),
        )
    }
}

struct SingleFrame {
    frame: Option<DecodedFrame>,
}

impl FrameSource for SingleFrame {
    fn frame_count(&self) -> Option<usize> {
        Some(1)
    }

    fn next_frame(&mut self) -> Option<Result<DecodedFrame, DecodeError>> {
        self.frame.take().map(Ok)
    }
}

fn animation_frames(data: &[u8], format: ImageFormat) -> Result<Option<image::Frames<'static>>, DecodeError> {
    let cursor = Cursor::new(data.to_vec());
    match format {
        ImageFormat::Gif => Ok(Some(GifDecoder::new(cursor)?.into_frames())),
        ImageFormat::Png => {
            let decoder = PngDecoder::new(cursor)?;
            if decoder.is_apng()? {
                Ok(Some(decoder.apng()?.into_frames()))
            } else {
                Ok(None)
            }
        }
        _ => Ok(None),
    }
}

impl VideoDecoder for AnimatedImageDecoder {
    fn name(&self) -> &str {
        "animated-image"
    }

    fn open(&self, data: &[u8]) -> Result<Box<dyn FrameSource>, DecodeError> {
        if data.is_empty() {
            return Err(DecodeError::Empty);
        }
        let format = image::guess_format(data).map_err(|_| {
            DecodeError::Video("not an image container".to_string())
        })?;

        // Count pass first so the sampler can stride; the second iterator does the work
        match animation_frames(data, format)? {
            Some(counting) => {
                let total = counting.count();
                let frames = animation_frames(data, format)?
                    .ok_or_else(|| DecodeError::Video("animation vanished".to_string()))?;
                Ok(Box::new(AnimatedFrames {
                    frames,
                    total: Some(total),
                }))
            }
            None => {
                let frame = crate::media::decode_image(data)?;
                Ok(Box::new(SingleFrame { frame: Some(frame) }))
            }
        }
    }
}

/// Default decoder: anything the `image` crate recognises goes to
/// [`AnimatedImageDecoder`], everything else to ffmpeg.
#[derive(Debug, Clone)]
pub struct AutoVideoDecoder {
    images: AnimatedImageDecoder,
    containers: FfmpegDecoder,
}

impl AutoVideoDecoder {
    pub fn new(config: &VideoConfig) -> Self {
        Self {
            images: AnimatedImageDecoder,
            containers: FfmpegDecoder::from_config(config),
        }
    }

    fn route(&self, data: &[u8]) -> &dyn VideoDecoder {
        if image::guess_format(data).is_ok() {
            &self.images
        } else {
            &self.containers
        }
    }
}

impl Default for AutoVideoDecoder {
    fn default() -> Self {
        Self::new(&VideoConfig::default())
    }
}

impl VideoDecoder for AutoVideoDecoder {
    fn name(&self) -> &str {
        "auto"
    }

    fn open(&self, data: &[u8]) -> Result<Box<dyn FrameSource>, DecodeError> {
        if data.is_empty() {
            return Err(DecodeError::Empty);
        }
        self.route(data).open(data)
    }
}
