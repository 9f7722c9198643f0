//! Media error types.

use std::path::PathBuf;
use thiserror::Error;

pub type MediaResult<T> = Result<T, MediaError>;

/// Failures from FFmpeg, FFprobe and the frame pipeline.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("ffmpeg is not on PATH; install FFmpeg to render videos")]
    FfmpegNotFound,

    #[error("ffprobe is not on PATH; it ships with FFmpeg")]
    FfprobeNotFound,

    #[error("ffmpeg failed: {message}")]
    FfmpegFailed {
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("ffprobe failed: {message}")]
    FfprobeFailed {
        message: String,
        stderr: Option<String>,
    },

    #[error("Encoding failed with every encoder tried: {0}")]
    EncodingFailed(String),

    #[error("No usable clips for the timeline: {0}")]
    NoUsableClips(String),

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("ffmpeg timed out after {0}s")]
    Timeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unreadable probe output: {0}")]
    ProbeOutput(#[from] serde_json::Error),

    #[error("Invalid video: {0}")]
    InvalidVideo(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MediaError {
    pub fn ffmpeg_failed(
        message: impl Into<String>,
        stderr: Option<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::FfmpegFailed {
            message: message.into(),
            stderr,
            exit_code,
        }
    }

    pub fn encoding_failed(message: impl Into<String>) -> Self {
        Self::EncodingFailed(message.into())
    }

    pub fn invalid_video(message: impl Into<String>) -> Self {
        Self::InvalidVideo(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Whether the failure lies in the media being read rather than in the
    /// encoder, so retrying with another codec is pointless.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            Self::NoUsableClips(_) | Self::FileNotFound(_) | Self::InvalidVideo(_)
        )
    }

    /// Stderr captured from the failing tool, if any.
    pub fn stderr(&self) -> Option<&str> {
        match self {
            Self::FfmpegFailed { stderr, .. } | Self::FfprobeFailed { stderr, .. } => {
                stderr.as_deref()
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_errors() {
        assert!(MediaError::NoUsableClips("none".into()).is_input_error());
        assert!(MediaError::FileNotFound(PathBuf::from("/clips/a.mp4")).is_input_error());
        assert!(!MediaError::Timeout(30).is_input_error());
        assert!(!MediaError::encoding_failed("nvenc").is_input_error());
    }

    #[test]
    fn test_stderr_accessor() {
        let err = MediaError::ffmpeg_failed("exit 1", Some("Unknown encoder".into()), Some(1));
        assert_eq!(err.stderr(), Some("Unknown encoder"));
        assert_eq!(MediaError::internal("x").stderr(), None);
    }
}
