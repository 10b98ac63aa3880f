//! Bounded, evenly spaced frame sampling
//!
//! Frames are read strictly in order. When the source reports more frames than
//! `n_max`, every `floor(total / n_max)`-th frame is kept; otherwise every
//! frame is. Sampling stops at `n_max` frames, at end of stream, or at the
//! first frame that fails to decode.

use crate::capabilities::FrameSource;
use crate::error::DecodeError;
use crate::media::DecodedFrame;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct SampledFrames {
    pub frames: Vec<DecodedFrame>,
    /// Source index of each kept frame
    pub indices: Vec<usize>,
    pub total: Option<usize>,
    pub stride: usize,
}

impl SampledFrames {
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

pub fn stride_for(total: Option<usize>, n_max: usize) -> usize {
    match total {
        Some(total) if n_max > 0 && total > n_max => total / n_max,
        _ => 1,
    }
}

/// Zero decodable frames is an error; a decode failure after the first kept
/// frame just ends sampling early.
pub fn sample_frames(source: &mut dyn FrameSource, n_max: usize) -> Result<SampledFrames, DecodeError> {
    let total = source.frame_count();
    let stride = stride_for(total, n_max);
    let mut frames = Vec::with_capacity(n_max.min(total.unwrap_or(n_max)));
    let mut indices = Vec::with_capacity(frames.capacity());

    let mut index = 0;
    while frames.len() < n_max {
        match source.next_frame() {
            None => break,
            Some(Ok(frame)) => {
                if index % stride == 0 {
                    frames.push(frame);
                    indices.push(index);
                }
            }
            Some(Err(e)) => {
                if frames.is_empty() {
                    return Err(e);
                }
                warn!(frame = index, error = %e, "frame decode failed, stopping early");
                break;
            }
        }
        index += 1;
    }

    if frames.is_empty() {
        return Err(DecodeError::NoFrames);
    }
    debug!(kept = frames.len(), ?total, stride, "frames sampled");
    Ok(SampledFrames {
        frames,
        indices,
        total,
        stride,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::RgbImage;

    /// In-memory source of `count` tiny frames, optionally failing at one index.
    pub(crate) struct Synthetic {
        pub count: usize,
        pub reported: Option<usize>,
        pub fail_at: Option<usize>,
        pub next: usize,
    }

    impl Synthetic {
        pub(crate) fn new(count: usize) -> Self {
            Self {
                count,
                reported: Some(count),
                fail_at: None,
                next: 0,
            }
        }
    }

    impl FrameSource for Synthetic {
        fn frame_count(&self) -> Option<usize> {
            self.reported
        }

        fn next_frame(&mut self) -> Option<Result<DecodedFrame, DecodeError>> {
            if self.next >= self.count {
                return None;
            }
            let i = self.next;
            self.next += 1;
            if self.fail_at == Some(i) {
                return Some(Err(DecodeError::Video(format!("bad frame {}", i))));
            }
            Some(Ok(DecodedFrame::new(RgbImage::from_pixel(4, 4, image::Rgb([i as u8; 3])))))
        }
    }

    // ==========================================================================
    // STRIDE
    // ==========================================================================

    #[test]
    fn test_long_stream_is_strided() {
        let sampled = sample_frames(&mut Synthetic::new(45), 15).unwrap();
        assert_eq!(sampled.len(), 15);
        assert_eq!(sampled.stride, 3);
        assert_eq!(sampled.indices[..4], [0, 3, 6, 9]);
        assert_eq!(*sampled.indices.last().unwrap(), 42);
    }

    #[test]
    fn test_short_stream_keeps_everything() {
        let sampled = sample_frames(&mut Synthetic::new(5), 15).unwrap();
        assert_eq!(sampled.len(), 5);
        assert_eq!(sampled.stride, 1);
    }

    #[test]
    fn test_unknown_length_reads_first_frames() {
        let mut source = Synthetic::new(40);
        source.reported = None;
        let sampled = sample_frames(&mut source, 15).unwrap();
        assert_eq!(sampled.indices, (0..15).collect::<Vec<_>>());
    }

    #[test]
    fn test_stride_rounds_down() {
        assert_eq!(stride_for(Some(44), 15), 2);
        assert_eq!(stride_for(Some(15), 15), 1);
        assert_eq!(stride_for(None, 15), 1);
    }

    // ==========================================================================
    // FAILURES
    // ==========================================================================

    #[test]
    fn test_empty_stream_is_terminal() {
        let err = sample_frames(&mut Synthetic::new(0), 15).unwrap_err();
        assert_eq!(err, DecodeError::NoFrames);
    }

    #[test]
    fn test_late_failure_stops_early() {
        let mut source = Synthetic::new(10);
        source.fail_at = Some(4);
        let sampled = sample_frames(&mut source, 15).unwrap();
        assert_eq!(sampled.indices, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_first_frame_failure_is_an_error() {
        let mut source = Synthetic::new(10);
        source.fail_at = Some(0);
        assert!(matches!(sample_frames(&mut source, 15), Err(DecodeError::Video(_))));
    }
}
