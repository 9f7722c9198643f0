//! Stock clip and footage provider models.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

/// Stock footage providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ProviderId {
    Pexels,
    Pixabay,
}

impl ProviderId {
    pub const ALL: &'static [ProviderId] = &[ProviderId::Pexels, ProviderId::Pixabay];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::Pexels => "pexels",
            ProviderId::Pixabay => "pixabay",
        }
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = ProviderParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pexels" => Ok(ProviderId::Pexels),
            "pixabay" => Ok(ProviderId::Pixabay),
            _ => Err(ProviderParseError(s.to_string())),
        }
    }
}

#[derive(Debug, Error)]
#[error("Unknown footage provider: {0}")]
pub struct ProviderParseError(String);

/// Requested clip orientation for provider searches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    #[default]
    Portrait,
    Landscape,
    Square,
}

impl Orientation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Orientation::Portrait => "portrait",
            Orientation::Landscape => "landscape",
            Orientation::Square => "square",
        }
    }
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A downloaded stock clip. Immutable once it lands in the cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct VideoClip {
    /// Local media file
    pub path: PathBuf,
    /// Native duration in seconds, as reported by the provider
    pub duration: f64,
    /// Search keyword that produced this clip
    pub keyword: String,
    /// Provider the clip came from
    pub provider: ProviderId,
}

impl VideoClip {
    pub fn new(
        path: impl Into<PathBuf>,
        duration: f64,
        keyword: impl Into<String>,
        provider: ProviderId,
    ) -> Self {
        Self {
            path: path.into(),
            duration,
            keyword: keyword.into(),
            provider,
        }
    }
}
