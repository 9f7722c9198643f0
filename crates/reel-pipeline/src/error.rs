//! Pipeline error types.

use thiserror::Error;

pub type PipelineResult<T> = Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Script too short: {words} words (expected ~{expected}). Try a different model or topic.")]
    ScriptTooShort { words: usize, expected: usize },

    #[error("Script generation failed: {0}")]
    ScriptFailed(String),

    #[error("Voice synthesis failed: {0}")]
    VoiceFailed(String),

    #[error("Transcription failed: {0}")]
    TranscriptionFailed(String),

    #[error("External command `{command}` failed: {message}")]
    CommandFailed { command: String, message: String },

    #[error("Media error: {0}")]
    Media(#[from] reel_media::MediaError),

    #[error("Sourcing error: {0}")]
    Sourcing(#[from] reel_sourcing::SourcingError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn script_failed(msg: impl Into<String>) -> Self {
        Self::ScriptFailed(msg.into())
    }

    pub fn voice_failed(msg: impl Into<String>) -> Self {
        Self::VoiceFailed(msg.into())
    }

    pub fn transcription_failed(msg: impl Into<String>) -> Self {
        Self::TranscriptionFailed(msg.into())
    }

    pub fn command_failed(command: impl Into<String>, message: impl Into<String>) -> Self {
        Self::CommandFailed {
            command: command.into(),
            message: message.into(),
        }
    }

    /// Pipeline stage the error is attributed to in logs and metrics.
    pub fn stage(&self) -> &'static str {
        match self {
            Self::ConfigError(_) => "config",
            Self::ScriptTooShort { .. } | Self::ScriptFailed(_) => "script",
            Self::VoiceFailed(_) => "voice",
            Self::TranscriptionFailed(_) => "transcription",
            Self::Sourcing(_) => "sourcing",
            Self::Media(_) => "assembly",
            Self::CommandFailed { .. } | Self::Json(_) | Self::Io(_) => "other",
        }
    }
}
