//! Parsing of FFmpeg's `-progress pipe:2` channel.
//!
//! FFmpeg writes blocks of `key=value` lines, each block closed by a
//! `progress=continue` or `progress=end` line. [`ProgressParser`] folds the
//! lines of a block into one [`FfmpegProgress`] snapshot.

/// Keys FFmpeg emits on the progress channel.
const PROGRESS_KEYS: &[&str] = &[
    "frame",
    "fps",
    "bitrate",
    "total_size",
    "out_time_us",
    "out_time_ms",
    "out_time",
    "dup_frames",
    "drop_frames",
    "speed",
    "progress",
];

/// Encoder position at the end of one progress block.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FfmpegProgress {
    pub frame: u64,
    pub fps: f64,
    /// Output position in seconds
    pub out_time: f64,
    /// Multiple of realtime; `None` while FFmpeg reports `N/A`
    pub speed: Option<f64>,
    pub finished: bool,
}

impl FfmpegProgress {
    /// Share of `duration` written so far, clamped to `0.0..=1.0`.
    pub fn fraction(&self, duration: f64) -> f64 {
        if duration <= 0.0 {
            return 0.0;
        }
        (self.out_time / duration).clamp(0.0, 1.0)
    }
}

/// Receives each completed progress block.
pub type ProgressCallback = Box<dyn Fn(&FfmpegProgress) + Send + 'static>;

/// Accumulates progress lines into snapshots.
#[derive(Debug, Default)]
pub struct ProgressParser {
    current: FfmpegProgress,
}

impl ProgressParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a stderr line belongs to the progress protocol rather than
    /// FFmpeg's diagnostics.
    pub fn is_progress_line(line: &str) -> bool {
        match line.trim().split_once('=') {
            Some((key, _)) => PROGRESS_KEYS.contains(&key) || key.starts_with("stream_"),
            None => false,
        }
    }

    /// Fold one line in. Returns the snapshot when the line closes a block.
    pub fn feed(&mut self, line: &str) -> Option<FfmpegProgress> {
        let (key, value) = line.trim().split_once('=')?;
        let value = value.trim();

        match key {
            // both keys carry microseconds
            "out_time_us" | "out_time_ms" => {
                if let Ok(us) = value.parse::<i64>() {
                    self.current.out_time = us.max(0) as f64 / 1_000_000.0;
                }
            }
            "frame" => {
                if let Ok(frame) = value.parse() {
                    self.current.frame = frame;
                }
            }
            "fps" => {
                if let Ok(fps) = value.parse() {
                    self.current.fps = fps;
                }
            }
            "speed" => {
                self.current.speed = value
                    .strip_suffix('x')
                    .and_then(|s| s.trim().parse().ok());
            }
            "progress" => {
                self.current.finished = value == "end";
                return Some(self.current.clone());
            }
            _ => {}
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_folds_into_snapshot() {
        let mut parser = ProgressParser::new();
        for line in ["frame=150", "fps=29.97", "out_time_us=5000000", "speed=1.5x"] {
            assert!(parser.feed(line).is_none());
        }

        let snapshot = parser.feed("progress=continue").unwrap();
        assert_eq!(snapshot.frame, 150);
        assert_eq!(snapshot.out_time, 5.0);
        assert_eq!(snapshot.speed, Some(1.5));
        assert!(!snapshot.finished);
        assert!((snapshot.fraction(20.0) - 0.25).abs() < 1e-9);

        parser.feed("speed=N/A");
        let last = parser.feed("progress=end").unwrap();
        assert!(last.finished);
        assert_eq!(last.speed, None);
        assert_eq!(last.frame, 150);
    }

    #[test]
    fn test_fraction_bounds() {
        let progress = FfmpegProgress {
            out_time: 90.0,
            ..Default::default()
        };
        assert_eq!(progress.fraction(60.0), 1.0);
        assert_eq!(progress.fraction(0.0), 0.0);
    }

    #[test]
    fn test_progress_line_detection() {
        assert!(ProgressParser::is_progress_line("frame=120"));
        assert!(ProgressParser::is_progress_line("stream_0_0_q=28.0"));
        assert!(!ProgressParser::is_progress_line(
            "[h264_nvenc @ 0x55] Cannot load libnvidia-encode.so.1"
        ));
        assert!(!ProgressParser::is_progress_line("Conversion failed!"));
    }
}
