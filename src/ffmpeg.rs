//! Container video (MP4, MOV, AVI, MKV, WebM, ...) through the ffmpeg tools
//!
//! `ffprobe` reports the first video stream's size and frame count, then
//! `ffmpeg` streams that stream to stdout as packed RGB24 and
//! [`RawFrameReader`] cuts the byte stream into frames. Decoders are handed
//! bytes, so the payload is staged in a temporary file that is removed when
//! the frame source is dropped.
//!
//! Both programs are looked up on `PATH` unless `video.ffmpeg` /
//! `video.ffprobe` name another binary.

use crate::capabilities::{FrameSource, VideoDecoder};
use crate::config::VideoConfig;
use crate::error::DecodeError;
use crate::media::DecodedFrame;
use image::RgbImage;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};
use tracing::debug;

/// Bytes per RGB24 pixel.
const CHANNELS: usize = 3;

/// Frame geometry of the first video stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamInfo {
    pub width: u32,
    pub height: u32,
    /// `None` when the container does not record it (`N/A`)
    pub frame_count: Option<usize>,
}

/// Parse `ffprobe -show_entries stream=width,height,nb_frames
/// -of default=noprint_wrappers=1` output (`key=value` per line).
pub fn parse_stream_info(text: &str) -> Result<StreamInfo, DecodeError> {
    let mut width = None;
    let mut height = None;
    let mut frame_count = None;
    for line in text.lines() {
        let Some((key, value)) = line.trim().split_once('=') else {
            continue;
        };
        let value = value.trim();
        match key {
            "width" => width = value.parse::<u32>().ok(),
            "height" => height = value.parse::<u32>().ok(),
            "nb_frames" => frame_count = value.parse::<usize>().ok().filter(|&n| n > 0),
            _ => {}
        }
    }
    match (width, height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => Ok(StreamInfo {
            width: w,
            height: h,
            frame_count,
        }),
        _ => Err(DecodeError::Video("no video stream found".to_string())),
    }
}

// =============================================================================
// RAW FRAME STREAM
// =============================================================================

/// Splits a packed RGB24 byte stream into fixed-size frames. A short
/// trailing frame is treated as end of stream.
pub struct RawFrameReader<R: Read> {
    reader: R,
    info: StreamInfo,
    produced: usize,
    done: bool,
}

impl<R: Read> RawFrameReader<R> {
    pub fn new(reader: R, info: StreamInfo) -> Self {
        Self {
            reader,
            info,
            produced: 0,
            done: false,
        }
    }

    /// Frames handed out so far.
    pub fn produced(&self) -> usize {
        self.produced
    }

    fn frame_len(&self) -> usize {
        self.info.width as usize * self.info.height as usize * CHANNELS
    }
}

impl<R: Read> FrameSource for RawFrameReader<R> {
    fn frame_count(&self) -> Option<usize> {
        self.info.frame_count
    }

    fn next_frame(&mut self) -> Option<Result<DecodedFrame, DecodeError>> {
        if self.done {
            return None;
        }
        let mut buf = vec![0u8; self.frame_len()];
        match self.reader.read_exact(&mut buf) {
            Ok(()) => {
                self.produced += 1;
                Some(
                    RgbImage::from_raw(self.info.width, self.info.height, buf)
                        .map(DecodedFrame::new)
                        .ok_or_else(|| DecodeError::Video("frame buffer size mismatch".to_string())),
                )
            }
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(DecodeError::Video(format!("reading frames: {}", e))))
            }
        }
    }
}

// =============================================================================
// FFMPEG DECODER
// =============================================================================

/// Payload staged on disk for the ffmpeg tools; deleted on drop.
struct StagedInput {
    path: PathBuf,
}

impl StagedInput {
    fn write(data: &[u8]) -> io::Result<Self> {
        let path = std::env::temp_dir().join(format!("deepcheck_video_{}.bin", rand::random::<u64>()));
        std::fs::write(&path, data)?;
        Ok(Self { path })
    }
}

impl Drop for StagedInput {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Frames from a running `ffmpeg` process.
struct FfmpegFrames {
    frames: RawFrameReader<ChildStdout>,
    child: Child,
    program: String,
    finished: bool,
    // dropped after the child is reaped
    _input: StagedInput,
}

impl FrameSource for FfmpegFrames {
    fn frame_count(&self) -> Option<usize> {
        self.frames.frame_count()
    }

    fn next_frame(&mut self) -> Option<Result<DecodedFrame, DecodeError>> {
        if self.finished {
            return None;
        }
        if let Some(frame) = self.frames.next_frame() {
            return Some(frame);
        }
        self.finished = true;
        if self.frames.produced() > 0 {
            return None;
        }
        // Nothing came out: surface a failed exit instead of an empty video
        match self.child.wait() {
            Ok(status) if !status.success() => Some(Err(DecodeError::Video(format!(
                "{} exited with {}",
                self.program, status
            )))),
            _ => None,
        }
    }
}

impl Drop for FfmpegFrames {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Decodes any container ffmpeg understands.
#[derive(Debug, Clone)]
pub struct FfmpegDecoder {
    ffmpeg: String,
    ffprobe: String,
}

impl Default for FfmpegDecoder {
    fn default() -> Self {
        Self::new("ffmpeg", "ffprobe")
    }
}

impl FfmpegDecoder {
    pub fn new(ffmpeg: impl Into<String>, ffprobe: impl Into<String>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }

    pub fn from_config(config: &VideoConfig) -> Self {
        Self::new(config.ffmpeg.clone(), config.ffprobe.clone())
    }

    fn stream_info(&self, input: &Path) -> Result<StreamInfo, DecodeError> {
        let output = Command::new(&self.ffprobe)
            .args(["-v", "error"])
            .args(["-select_streams", "v:0"])
            .args(["-show_entries", "stream=width,height,nb_frames"])
            .args(["-of", "default=noprint_wrappers=1"])
            .arg(input)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| DecodeError::Video(format!("{} not available: {}", self.ffprobe, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DecodeError::Video(format!(
                "{} could not read the container: {}",
                self.ffprobe,
                stderr.trim()
            )));
        }
        parse_stream_info(&String::from_utf8_lossy(&output.stdout))
    }

    fn spawn(&self, input: &Path) -> Result<Child, DecodeError> {
        Command::new(&self.ffmpeg)
            .args(["-hide_banner", "-loglevel", "error", "-nostdin"])
            // keep the coded frame size that ffprobe reported
            .arg("-noautorotate")
            .arg("-i")
            .arg(input)
            .args(["-an", "-sn"])
            .args(["-f", "rawvideo", "-pix_fmt", "rgb24", "-"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| DecodeError::Video(format!("{} not available: {}", self.ffmpeg, e)))
    }
}

impl VideoDecoder for FfmpegDecoder {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    fn open(&self, data: &[u8]) -> Result<Box<dyn FrameSource>, DecodeError> {
        if data.is_empty() {
            return Err(DecodeError::Empty);
        }
        let input = StagedInput::write(data)
            .map_err(|e| DecodeError::Video(format!("could not stage input: {}", e)))?;
        let info = self.stream_info(&input.path)?;
        debug!(width = info.width, height = info.height, frames = ?info.frame_count, "video stream info");

        let mut child = self.spawn(&input.path)?;
        let Some(stdout) = child.stdout.take() else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(DecodeError::Video(format!("{} produced no output pipe", self.ffmpeg)));
        };

        Ok(Box::new(FfmpegFrames {
            frames: RawFrameReader::new(stdout, info),
            child,
            program: self.ffmpeg.clone(),
            finished: false,
            _input: input,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn info(width: u32, height: u32, frame_count: Option<usize>) -> StreamInfo {
        StreamInfo {
            width,
            height,
            frame_count,
        }
    }

    /// `n` frames of 2x2 RGB24, frame `i` filled with value `i * 10`.
    fn raw_stream(n: usize) -> Vec<u8> {
        (0..n).flat_map(|i| vec![(i * 10) as u8; 2 * 2 * CHANNELS]).collect()
    }

    fn tools_available() -> bool {
        ["ffmpeg", "ffprobe"].iter().all(|p| {
            Command::new(p)
                .arg("-version")
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .map(|s| s.success())
                .unwrap_or(false)
        })
    }

    // ==========================================================================
    // FFPROBE OUTPUT
    // ==========================================================================

    #[test]
    fn test_parse_stream_info() {
        let parsed = parse_stream_info("width=320\nheight=240\nnb_frames=75\n").unwrap();
        assert_eq!(parsed, info(320, 240, Some(75)));
    }

    #[test]
    fn test_unknown_frame_count() {
        let parsed = parse_stream_info("width=64\r\nheight=48\r\nnb_frames=N/A\r\n").unwrap();
        assert_eq!(parsed.frame_count, None, "N/A means the container has no count");
    }

    #[test]
    fn test_missing_stream_is_video_error() {
        assert!(matches!(parse_stream_info(""), Err(DecodeError::Video(_))));
        assert!(matches!(
            parse_stream_info("width=0\nheight=240\n"),
            Err(DecodeError::Video(_))
        ));
    }

    // ==========================================================================
    // RAW FRAME STREAM
    // ==========================================================================
    //
    // A synthetic rgb24 stream stands in for ffmpeg's stdout.

    #[test]
    fn test_reader_cuts_frames() {
        let mut reader = RawFrameReader::new(Cursor::new(raw_stream(3)), info(2, 2, Some(3)));
        assert_eq!(reader.frame_count(), Some(3));
        let mut values = Vec::new();
        while let Some(frame) = reader.next_frame() {
            let frame = frame.unwrap();
            assert_eq!((frame.width(), frame.height()), (2, 2));
            values.push(frame.rgb().get_pixel(1, 1)[0]);
        }
        assert_eq!(values, vec![0, 10, 20]);
        assert_eq!(reader.produced(), 3);
    }

    #[test]
    fn test_partial_trailing_frame_ends_stream() {
        let mut bytes = raw_stream(2);
        bytes.extend_from_slice(&[255; 5]);
        let mut reader = RawFrameReader::new(Cursor::new(bytes), info(2, 2, None));
        assert!(reader.next_frame().is_some());
        assert!(reader.next_frame().is_some());
        assert!(reader.next_frame().is_none(), "5 stray bytes are not a frame");
        assert!(reader.next_frame().is_none());
    }

    // ==========================================================================
    // DECODER
    // ==========================================================================

    #[test]
    fn test_missing_binary_is_video_error() {
        let decoder = FfmpegDecoder::new("deepcheck-missing-ffmpeg", "deepcheck-missing-ffprobe");
        let err = decoder.open(b"\x00\x00\x00\x18ftypisom not really").err();
        match err {
            Some(DecodeError::Video(msg)) => assert!(msg.contains("deepcheck-missing-ffprobe"), "got {}", msg),
            other => panic!("expected a video error, got {:?}", other),
        }
        assert_eq!(decoder.open(&[]).err(), Some(DecodeError::Empty));
    }

    #[test]
    fn test_decodes_generated_avi() {
        if !tools_available() {
            return;
        }
        let path = std::env::temp_dir().join(format!("deepcheck_test_{}.avi", rand::random::<u64>()));
        let made = Command::new("ffmpeg")
            .args(["-hide_banner", "-loglevel", "error", "-nostdin", "-y"])
            .args(["-f", "lavfi", "-i", "testsrc=size=64x48:rate=10"])
            .args(["-frames:v", "12", "-c:v", "mpeg4"])
            .arg(&path)
            .status()
            .map(|s| s.success())
            .unwrap_or(false);
        if !made {
            return;
        }
        let bytes = std::fs::read(&path).unwrap();
        let _ = std::fs::remove_file(&path);

        let mut source = FfmpegDecoder::default().open(&bytes).unwrap();
        assert!(matches!(source.frame_count(), Some(12) | None));
        let mut n = 0;
        while let Some(frame) = source.next_frame() {
            let frame = frame.unwrap();
            assert_eq!((frame.width(), frame.height()), (64, 48));
            n += 1;
        }
        assert_eq!(n, 12);
    }

    #[test]
    fn test_garbage_container_fails_to_open() {
        if !tools_available() {
            return;
        }
        let err = FfmpegDecoder::default().open(b"\x00\x00\x00\x18ftypisom not really").err();
        assert!(matches!(err, Some(DecodeError::Video(_))), "got {:?}", err);
    }
}
