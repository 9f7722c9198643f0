//! Output video format.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::clip::Orientation;

/// Default portrait width (9:16)
pub const DEFAULT_WIDTH: u32 = 1080;
/// Default portrait height (9:16)
pub const DEFAULT_HEIGHT: u32 = 1920;
/// Default frame rate
pub const DEFAULT_FPS: u32 = 30;

/// Frame geometry and rate of the rendered video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct VideoFormat {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl Default for VideoFormat {
    fn default() -> Self {
        Self {
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            fps: DEFAULT_FPS,
        }
    }
}

impl VideoFormat {
    pub fn new(width: u32, height: u32, fps: u32) -> Self {
        Self { width, height, fps }
    }

    /// Seconds per frame.
    pub fn frame_interval(&self) -> f64 {
        1.0 / self.fps.max(1) as f64
    }

    /// Number of frames needed to cover `duration` seconds.
    pub fn frame_count(&self, duration: f64) -> u64 {
        (duration.max(0.0) * self.fps as f64).round() as u64
    }

    /// Playback time of frame `index`.
    pub fn frame_time(&self, index: u64) -> f64 {
        index as f64 / self.fps.max(1) as f64
    }

    /// Bytes in one packed RGB24 frame.
    pub fn rgb_frame_len(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }

    /// Footage orientation that best fills this frame.
    pub fn orientation(&self) -> Orientation {
        match self.width.cmp(&self.height) {
            std::cmp::Ordering::Less => Orientation::Portrait,
            std::cmp::Ordering::Greater => Orientation::Landscape,
            std::cmp::Ordering::Equal => Orientation::Square,
        }
    }

    /// FFmpeg `WxH` size string.
    pub fn size_arg(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_portrait_1080p() {
        let format = VideoFormat::default();
        assert_eq!(format.size_arg(), "1080x1920");
        assert_eq!(format.fps, 30);
        assert_eq!(format.rgb_frame_len(), 1080 * 1920 * 3);
        assert_eq!(format.orientation(), Orientation::Portrait);
        assert_eq!(VideoFormat::new(1920, 1080, 30).orientation(), Orientation::Landscape);
        assert_eq!(VideoFormat::new(1080, 1080, 30).orientation(), Orientation::Square);
    }

    #[test]
    fn test_frame_math() {
        let format = VideoFormat::new(8, 8, 30);
        assert_eq!(format.frame_count(60.0), 1800);
        assert_eq!(format.frame_count(0.01), 0);
        assert!((format.frame_time(45) - 1.5).abs() < 1e-9);
        assert!((format.frame_interval() - 1.0 / 30.0).abs() < 1e-12);
    }
}
