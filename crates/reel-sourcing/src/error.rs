//! Sourcing error types.

use thiserror::Error;

use reel_models::ProviderId;

pub type SourcingResult<T> = Result<T, SourcingError>;

#[derive(Debug, Error)]
pub enum SourcingError {
    #[error("Could not source any video clips after {attempts} searches over {keywords} keywords; check the footage provider API keys")]
    SourcingExhausted { keywords: usize, attempts: usize },

    #[error("No footage providers configured")]
    NoProviders,

    #[error("Missing API key for {0}")]
    MissingApiKey(ProviderId),

    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("LLM request failed: {0}")]
    Llm(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Media error: {0}")]
    Media(#[from] reel_media::MediaError),
}

impl SourcingError {
    pub fn request_failed(msg: impl Into<String>) -> Self {
        Self::RequestFailed(msg.into())
    }

    pub fn invalid_response(msg: impl Into<String>) -> Self {
        Self::InvalidResponse(msg.into())
    }

    pub fn download_failed(msg: impl Into<String>) -> Self {
        Self::DownloadFailed(msg.into())
    }

    pub fn llm(msg: impl Into<String>) -> Self {
        Self::Llm(msg.into())
    }

    /// Transport-level failures that may succeed on another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(e) => e.is_timeout() || e.is_connect(),
            Self::RequestFailed(_) | Self::DownloadFailed(_) => true,
            _ => false,
        }
    }

    /// Errors that must abort the run instead of falling back.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::SourcingExhausted { .. } | Self::NoProviders | Self::MissingApiKey(_)
        )
    }
}
