//! Lazy, time-indexed frame streams.
//!
//! Every stage of the visual path is a [`FrameSource`]: the encoder asks for
//! the frame at playback time `t`, and wrappers (motion, captions) transform
//! whatever their inner source returns. Streams are forward-only; nothing is
//! materialised ahead of the encoder's request.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use image::RgbImage;
use tracing::debug;

use reel_models::VideoFormat;

use crate::command::{FfmpegCommand, FfmpegProcess, FfmpegRunner, PIPE};
use crate::error::{MediaError, MediaResult};

/// A packed RGB24 frame.
pub type Frame = RgbImage;

/// A finite, forward-only stream of frames addressed by playback time.
#[async_trait]
pub trait FrameSource: Send {
    /// Stream length in seconds.
    fn duration(&self) -> f64;

    /// Frame geometry and rate produced by this source.
    fn format(&self) -> VideoFormat;

    /// Frame shown at time `t` (seconds from the start of this source).
    ///
    /// Queries are expected in non-decreasing order of `t`.
    async fn frame_at(&mut self, t: f64) -> MediaResult<Frame>;

    /// Release underlying decoders.
    async fn close(&mut self) -> MediaResult<()> {
        Ok(())
    }
}

#[async_trait]
impl FrameSource for Box<dyn FrameSource> {
    fn duration(&self) -> f64 {
        (**self).duration()
    }

    fn format(&self) -> VideoFormat {
        (**self).format()
    }

    async fn frame_at(&mut self, t: f64) -> MediaResult<Frame> {
        (**self).frame_at(t).await
    }

    async fn close(&mut self) -> MediaResult<()> {
        (**self).close().await
    }
}

/// Decodes a slice of a clip through FFmpeg, scaled to fill the target frame.
///
/// Frames are read sequentially from FFmpeg's rawvideo output; asking for an
/// earlier time returns the most recent frame. If the clip ends before its
/// advertised length the last decoded frame is held.
pub struct ClipDecoder {
    path: PathBuf,
    format: VideoFormat,
    duration: f64,
    process: Option<FfmpegProcess>,
    current: Option<Frame>,
    current_index: Option<u64>,
    exhausted: bool,
}

impl ClipDecoder {
    /// Start decoding `duration` seconds of `path` from `in_point`.
    pub fn open(
        path: impl AsRef<Path>,
        in_point: f64,
        duration: f64,
        format: VideoFormat,
    ) -> MediaResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(MediaError::FileNotFound(path.to_path_buf()));
        }

        let cmd = decode_command(path, in_point, duration, &format);
        let process = FfmpegRunner::new().spawn(&cmd, None)?;

        debug!(
            path = %path.display(),
            in_point,
            duration,
            "Opened clip decoder"
        );

        Ok(Self {
            path: path.to_path_buf(),
            format,
            duration,
            process: Some(process),
            current: None,
            current_index: None,
            exhausted: false,
        })
    }

    async fn read_next(&mut self) -> MediaResult<bool> {
        let Some(process) = self.process.as_mut() else {
            return Ok(false);
        };

        let mut buf = vec![0u8; self.format.rgb_frame_len()];
        if !process.read_frame(&mut buf).await? {
            self.exhausted = true;
            return Ok(false);
        }

        let frame = Frame::from_raw(self.format.width, self.format.height, buf)
            .ok_or_else(|| MediaError::internal("decoded frame has the wrong size"))?;
        self.current = Some(frame);
        self.current_index = Some(self.current_index.map_or(0, |i| i + 1));
        Ok(true)
    }
}

/// Build the decode command: seek, trim, fill-scale and center-crop to the target.
pub fn decode_command(
    path: &Path,
    in_point: f64,
    duration: f64,
    format: &VideoFormat,
) -> FfmpegCommand {
    let (w, h) = (format.width, format.height);
    FfmpegCommand::new(path, PIPE)
        .seek(in_point)
        .duration(duration)
        .video_filter(format!(
            "scale={w}:{h}:force_original_aspect_ratio=increase,crop={w}:{h},fps={}",
            format.fps
        ))
        .output_arg("-an")
        .raw_frames_out()
}

#[async_trait]
impl FrameSource for ClipDecoder {
    fn duration(&self) -> f64 {
        self.duration
    }

    fn format(&self) -> VideoFormat {
        self.format
    }

    async fn frame_at(&mut self, t: f64) -> MediaResult<Frame> {
        let wanted = (t.max(0.0) * self.format.fps as f64 + 1e-6).floor() as u64;

        while !self.exhausted && self.current_index.map_or(true, |i| i < wanted) {
            if !self.read_next().await? {
                break;
            }
        }

        self.current.clone().ok_or_else(|| {
            MediaError::invalid_video(format!("no frames decoded from {}", self.path.display()))
        })
    }

    async fn close(&mut self) -> MediaResult<()> {
        if let Some(process) = self.process.take() {
            process.kill().await?;
        }
        Ok(())
    }
}

/// Linear blend of two equally sized frames; `alpha` is the weight of `to`.
pub fn blend_frames(from: &Frame, to: &Frame, alpha: f64) -> Frame {
    let alpha = alpha.clamp(0.0, 1.0);
    if from.dimensions() != to.dimensions() {
        return to.clone();
    }

    let (width, height) = to.dimensions();
    let data: Vec<u8> = from
        .as_raw()
        .iter()
        .zip(to.as_raw().iter())
        .map(|(a, b)| (*a as f64 * (1.0 - alpha) + *b as f64 * alpha).round() as u8)
        .collect();
    Frame::from_raw(width, height, data).unwrap_or_else(|| to.clone())
}
