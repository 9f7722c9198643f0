//! Ken Burns pan/zoom motion.
//!
//! Each clip gets its own randomly sampled zoom ramp and drift direction.
//! The transform itself is a pure function of the frame and its time within
//! the clip, so a given set of parameters always produces the same output.

use async_trait::async_trait;
use image::imageops::{self, FilterType};
use rand::Rng;
use serde::{Deserialize, Serialize};

use reel_models::VideoFormat;

use crate::error::MediaResult;
use crate::frame::{Frame, FrameSource};

/// Zoom range sampled for the start and end of a clip.
pub const ZOOM_RANGE: (f64, f64) = (1.0, 1.15);
/// Maximum drift of the crop center, as a fraction of the frame dimension.
pub const MAX_PAN: f64 = 0.02;

/// Motion parameters fixed for the lifetime of one clip.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KenBurnsParams {
    pub start_zoom: f64,
    pub end_zoom: f64,
    pub pan_x: f64,
    pub pan_y: f64,
}

impl Default for KenBurnsParams {
    /// No motion at all.
    fn default() -> Self {
        Self {
            start_zoom: 1.0,
            end_zoom: 1.0,
            pan_x: 0.0,
            pan_y: 0.0,
        }
    }
}

impl KenBurnsParams {
    /// Draw a fresh set of parameters.
    pub fn sample<R: Rng>(rng: &mut R) -> Self {
        Self {
            start_zoom: rng.random_range(ZOOM_RANGE.0..=ZOOM_RANGE.1),
            end_zoom: rng.random_range(ZOOM_RANGE.0..=ZOOM_RANGE.1),
            pan_x: rng.random_range(-MAX_PAN..=MAX_PAN),
            pan_y: rng.random_range(-MAX_PAN..=MAX_PAN),
        }
    }

    /// Zoom factor at `progress` in [0, 1].
    pub fn zoom_at(&self, progress: f64) -> f64 {
        self.start_zoom + (self.end_zoom - self.start_zoom) * progress
    }

    /// Crop rectangle `(x, y, w, h)` in source pixels for time `t` of a clip
    /// lasting `duration` seconds.
    ///
    /// The rectangle has the target aspect ratio, shrinks with zoom, and is
    /// clamped to stay inside the source.
    pub fn crop_rect(
        &self,
        source: (u32, u32),
        target: (u32, u32),
        t: f64,
        duration: f64,
    ) -> (u32, u32, u32, u32) {
        let (sw, sh) = (source.0 as f64, source.1 as f64);
        let (tw, th) = (target.0.max(1) as f64, target.1.max(1) as f64);

        let progress = if duration > 0.0 {
            (t / duration).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let zoom = self.zoom_at(progress).max(1.0);

        // Largest target-shaped window that fits the source, then zoomed in
        let fit = (sw / tw).min(sh / th);
        let crop_w = (tw * fit / zoom).round().clamp(1.0, sw);
        let crop_h = (th * fit / zoom).round().clamp(1.0, sh);

        let center_x = sw / 2.0 + self.pan_x * sw * progress;
        let center_y = sh / 2.0 + self.pan_y * sh * progress;

        let x = (center_x - crop_w / 2.0).round().clamp(0.0, sw - crop_w);
        let y = (center_y - crop_h / 2.0).round().clamp(0.0, sh - crop_h);

        (x as u32, y as u32, crop_w as u32, crop_h as u32)
    }

    /// Apply the motion to `frame`, producing exactly `target` pixels.
    pub fn apply(&self, frame: &Frame, t: f64, duration: f64, target: (u32, u32)) -> Frame {
        let (x, y, w, h) = self.crop_rect(frame.dimensions(), target, t, duration);

        if (x, y) == (0, 0) && (w, h) == frame.dimensions() && frame.dimensions() == target {
            return frame.clone();
        }

        let cropped = imageops::crop_imm(frame, x, y, w, h).to_image();
        imageops::resize(&cropped, target.0, target.1, FilterType::Lanczos3)
    }
}

/// A frame source with Ken Burns motion applied over its full duration.
pub struct KenBurns<S> {
    inner: S,
    params: KenBurnsParams,
}

impl<S: FrameSource> KenBurns<S> {
    pub fn new(inner: S, params: KenBurnsParams) -> Self {
        Self { inner, params }
    }

    pub fn params(&self) -> &KenBurnsParams {
        &self.params
    }
}

#[async_trait]
impl<S: FrameSource> FrameSource for KenBurns<S> {
    fn duration(&self) -> f64 {
        self.inner.duration()
    }

    fn format(&self) -> VideoFormat {
        self.inner.format()
    }

    async fn frame_at(&mut self, t: f64) -> MediaResult<Frame> {
        let frame = self.inner.frame_at(t).await?;
        let format = self.inner.format();
        Ok(self.params.apply(
            &frame,
            t,
            self.inner.duration(),
            (format.width, format.height),
        ))
    }

    async fn close(&mut self) -> MediaResult<()> {
        self.inner.close().await
    }
}
