use crate::{PlayerError, Result};
use ffmpeg_next as ffmpeg;
use log::{debug, info, warn};
use std::path::{Path, PathBuf};

/// Properties of a video stream, read once when the source is opened
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoMetadata {
    /// Number of frames in the stream
    pub total_frames: u64,
    /// Native frame rate in frames per second
    pub frame_rate: f64,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
}

impl VideoMetadata {
    /// Playback duration at the native frame rate, in seconds
    pub fn duration(&self) -> f64 {
        if self.frame_rate > 0.0 {
            self.total_frames as f64 / self.frame_rate
        } else {
            0.0
        }
    }

    /// Reject metadata that would make frame scheduling meaningless
    pub fn validate(&self) -> Result<()> {
        if !self.frame_rate.is_finite() || self.frame_rate <= 0.0 {
            return Err(PlayerError::DegenerateMetadata(format!(
                "frame rate must be positive, got {}",
                self.frame_rate
            )));
        }
        if self.total_frames == 0 {
            return Err(PlayerError::DegenerateMetadata(
                "stream reports no frames".to_string(),
            ));
        }
        if self.width == 0 || self.height == 0 {
            return Err(PlayerError::DegenerateMetadata(format!(
                "invalid frame size {}x{}",
                self.width, self.height
            )));
        }
        Ok(())
    }

    /// Substitute `fallback` when the container did not report a frame rate
    pub fn with_frame_rate_fallback(mut self, fallback: Option<f64>) -> Self {
        if self.frame_rate <= 0.0 {
            if let Some(fps) = fallback {
                warn!("Source reports no frame rate, assuming {:.2} FPS", fps);
                self.frame_rate = fps;
            }
        }
        self
    }
}

/// A decoded frame as packed RGB24 rows without padding
#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// Raw RGB data, `width * height * 3` bytes
    pub data: Vec<u8>,
    /// Frame width
    pub width: u32,
    /// Frame height
    pub height: u32,
    /// Zero-based position in the stream
    pub index: u64,
}

impl VideoFrame {
    /// Build a frame filled with a single color
    pub fn solid(width: u32, height: u32, rgb: (u8, u8, u8), index: u64) -> Self {
        let mut data = Vec::with_capacity((width * height * 3) as usize);
        for _ in 0..(width * height) {
            data.extend_from_slice(&[rgb.0, rgb.1, rgb.2]);
        }
        Self {
            data,
            width,
            height,
            index,
        }
    }
}

/// Sequential, forward-only supplier of decoded frames
pub trait FrameSource {
    fn metadata(&self) -> VideoMetadata;

    /// Next frame in decode order, `None` at end of stream
    fn next_frame(&mut self) -> Result<Option<VideoFrame>>;

    /// Rewind to the first frame; needed only for looping
    fn seek_to_start(&mut self) -> Result<()>;

    /// Release decoder resources; later reads report end of stream
    fn close(&mut self);
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn metadata(&self) -> VideoMetadata {
        (**self).metadata()
    }

    fn next_frame(&mut self) -> Result<Option<VideoFrame>> {
        (**self).next_frame()
    }

    fn seek_to_start(&mut self) -> Result<()> {
        (**self).seek_to_start()
    }

    fn close(&mut self) {
        (**self).close()
    }
}

/// Demuxer, codec and scaler; dropped as a unit when the source is closed
struct DecodeState {
    input_context: ffmpeg::format::context::Input,
    decoder: ffmpeg::codec::decoder::Video,
    scaler: Option<ffmpeg::software::scaling::Context>,
    eof_sent: bool,
}

impl DecodeState {
    /// Convert a decoded frame to packed RGB24
    fn convert_frame(&mut self, frame: &ffmpeg::frame::Video, index: u64) -> Result<VideoFrame> {
        let width = frame.width();
        let height = frame.height();

        if self.scaler.is_none() {
            self.scaler = Some(ffmpeg::software::scaling::Context::get(
                frame.format(),
                width,
                height,
                ffmpeg::format::Pixel::RGB24,
                width,
                height,
                ffmpeg::software::scaling::Flags::BILINEAR,
            )?);
        }

        let mut rgb_frame = ffmpeg::frame::Video::empty();
        if let Some(ref mut scaler) = self.scaler {
            scaler.run(frame, &mut rgb_frame)?;
        }

        // ffmpeg pads each row to its own stride
        let stride = rgb_frame.stride(0);
        let row_bytes = width as usize * 3;
        let plane = rgb_frame.data(0);
        let mut data = Vec::with_capacity(row_bytes * height as usize);
        for row in 0..height as usize {
            let start = row * stride;
            data.extend_from_slice(&plane[start..start + row_bytes]);
        }

        debug!("Decoded frame {}: {}x{}", index, width, height);

        Ok(VideoFrame {
            data,
            width,
            height,
            index,
        })
    }
}

/// ffmpeg-backed decoder for video files
pub struct VideoDecoder {
    path: PathBuf,
    stream_index: usize,
    state: Option<DecodeState>,
    metadata: VideoMetadata,
    duration: f64,
    frames_decoded: u64,
}

impl VideoDecoder {
    /// Open a video file and read its stream metadata
    pub fn open(path: &Path) -> Result<Self> {
        if let Err(e) = ffmpeg::init() {
            debug!("FFmpeg init error: {:?}", e);
        }

        let open_error = |reason: String| PlayerError::SourceOpen {
            path: path.to_path_buf(),
            reason,
        };

        debug!("Attempting to open video file: {}", path.display());
        let input_context = ffmpeg::format::input(&path).map_err(|e| open_error(e.to_string()))?;

        let stream = input_context
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| open_error("no video stream found".to_string()))?;
        let stream_index = stream.index();

        let context_decoder = ffmpeg::codec::context::Context::from_parameters(stream.parameters())
            .map_err(|e| open_error(format!("failed to create codec context: {}", e)))?;
        let decoder = context_decoder
            .decoder()
            .video()
            .map_err(|e| open_error(format!("failed to create video decoder: {}", e)))?;

        let rate = stream.avg_frame_rate();
        let frame_rate = if rate.denominator() != 0 && rate.numerator() > 0 {
            rate.numerator() as f64 / rate.denominator() as f64
        } else {
            0.0
        };

        let duration = if stream.duration() != ffmpeg::ffi::AV_NOPTS_VALUE {
            let tb = stream.time_base();
            stream.duration() as f64 * tb.numerator() as f64 / tb.denominator() as f64
        } else if input_context.duration() != ffmpeg::ffi::AV_NOPTS_VALUE {
            input_context.duration() as f64 / ffmpeg::ffi::AV_TIME_BASE as f64
        } else {
            0.0
        };

        let total_frames = if stream.frames() > 0 {
            stream.frames() as u64
        } else {
            // Containers without a frame count still tend to carry a duration
            frames_in(duration, frame_rate)
        };

        let metadata = VideoMetadata {
            total_frames,
            frame_rate,
            width: decoder.width(),
            height: decoder.height(),
        };

        info!(
            "Opened '{}': stream {}, {}x{}, {:.2} FPS, {} frames",
            path.display(),
            stream_index,
            metadata.width,
            metadata.height,
            metadata.frame_rate,
            metadata.total_frames
        );

        Ok(Self {
            path: path.to_path_buf(),
            stream_index,
            state: Some(DecodeState {
                input_context,
                decoder,
                scaler: None,
                eof_sent: false,
            }),
            metadata,
            duration,
            frames_decoded: 0,
        })
    }

    /// Fill in a frame rate for containers that do not declare one
    pub fn apply_frame_rate_hint(&mut self, hint: Option<f64>) {
        self.metadata = self.metadata.with_frame_rate_fallback(hint);
        if self.metadata.total_frames == 0 {
            self.metadata.total_frames = frames_in(self.duration, self.metadata.frame_rate);
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the ffmpeg contexts are still held
    pub fn is_open(&self) -> bool {
        self.state.is_some()
    }

    /// Pull packets into the decoder until it yields a frame or runs dry
    fn decode_next(&mut self) -> Result<Option<VideoFrame>> {
        let Some(state) = self.state.as_mut() else {
            return Ok(None);
        };
        let mut decoded = ffmpeg::frame::Video::empty();

        loop {
            match state.decoder.receive_frame(&mut decoded) {
                Ok(()) => {
                    let frame = state.convert_frame(&decoded, self.frames_decoded)?;
                    self.frames_decoded += 1;
                    return Ok(Some(frame));
                }
                Err(ffmpeg::Error::Eof) => return Ok(None),
                Err(ffmpeg::Error::Other { errno }) if errno == ffmpeg::ffi::EAGAIN => {}
                Err(e) => return Err(PlayerError::SourceRead(e)),
            }

            if state.eof_sent {
                return Ok(None);
            }

            let mut fed = false;
            for (stream, packet) in state.input_context.packets() {
                if stream.index() == self.stream_index {
                    state.decoder.send_packet(&packet)?;
                    fed = true;
                    break;
                }
            }

            if !fed {
                state.decoder.send_eof()?;
                state.eof_sent = true;
            }
        }
    }
}

impl FrameSource for VideoDecoder {
    fn metadata(&self) -> VideoMetadata {
        self.metadata
    }

    fn next_frame(&mut self) -> Result<Option<VideoFrame>> {
        self.decode_next()
    }

    fn seek_to_start(&mut self) -> Result<()> {
        let Some(state) = self.state.as_mut() else {
            return Err(PlayerError::SourceOpen {
                path: self.path.clone(),
                reason: "source is closed".to_string(),
            });
        };
        state.input_context.seek(0, ..0)?;
        state.decoder.flush();
        state.eof_sent = false;
        self.frames_decoded = 0;
        debug!("Rewound '{}' to the first frame", self.path.display());
        Ok(())
    }

    fn close(&mut self) {
        if self.state.take().is_some() {
            debug!("Closed '{}' after {} frames", self.path.display(), self.frames_decoded);
        }
    }
}

fn frames_in(seconds: f64, frame_rate: f64) -> u64 {
    (seconds * frame_rate).round().max(0.0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(total_frames: u64, frame_rate: f64) -> VideoMetadata {
        VideoMetadata {
            total_frames,
            frame_rate,
            width: 160,
            height: 120,
        }
    }

    #[test]
    fn test_invalid_file() {
        let result = VideoDecoder::open(Path::new("nonexistent.mp4"));
        assert!(matches!(result, Err(PlayerError::SourceOpen { .. })));
    }

    #[test]
    fn test_duration() {
        assert_eq!(metadata(250, 25.0).duration(), 10.0);
        assert_eq!(metadata(250, 0.0).duration(), 0.0);
    }

    #[test]
    fn test_validate_rejects_degenerate_metadata() {
        assert!(metadata(10, 10.0).validate().is_ok());
        assert!(matches!(
            metadata(10, 0.0).validate(),
            Err(PlayerError::DegenerateMetadata(_))
        ));
        assert!(metadata(10, -5.0).validate().is_err());
        assert!(metadata(10, f64::NAN).validate().is_err());
        assert!(metadata(0, 30.0).validate().is_err());
    }

    #[test]
    fn test_frame_rate_fallback() {
        let meta = metadata(10, 0.0).with_frame_rate_fallback(Some(24.0));
        assert_eq!(meta.frame_rate, 24.0);

        let meta = metadata(10, 30.0).with_frame_rate_fallback(Some(24.0));
        assert_eq!(meta.frame_rate, 30.0);

        let meta = metadata(10, 0.0).with_frame_rate_fallback(None);
        assert_eq!(meta.frame_rate, 0.0);
    }

    #[test]
    fn test_frames_in() {
        assert_eq!(frames_in(2.0, 29.97), 60);
        assert_eq!(frames_in(1.0, 0.0), 0);
        assert_eq!(frames_in(-1.0, 30.0), 0);
    }

    #[test]
    fn test_solid_frame() {
        let frame = VideoFrame::solid(3, 2, (1, 2, 3), 7);
        assert_eq!(frame.data.len(), 18);
        assert_eq!(&frame.data[..6], &[1, 2, 3, 1, 2, 3]);
        assert_eq!(frame.index, 7);
    }
}
