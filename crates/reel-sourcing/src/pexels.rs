//! Pexels video search client.

use std::path::Path;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use reel_models::{Orientation, ProviderId};

use crate::error::{SourcingError, SourcingResult};
use crate::provider::{
    download_to, ensure_success, http_client, Candidate, FootageProvider, Rendition,
    SEARCH_TIMEOUT,
};

pub const DEFAULT_BASE_URL: &str = "https://api.pexels.com";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    videos: Vec<PexelsVideo>,
}

#[derive(Debug, Deserialize)]
struct PexelsVideo {
    #[serde(default)]
    duration: f64,
    #[serde(default)]
    video_files: Vec<PexelsFile>,
}

#[derive(Debug, Deserialize)]
struct PexelsFile {
    link: String,
    width: Option<u32>,
    height: Option<u32>,
}

impl From<PexelsVideo> for Candidate {
    fn from(video: PexelsVideo) -> Self {
        Candidate {
            duration: video.duration,
            renditions: video
                .video_files
                .into_iter()
                .map(|f| Rendition {
                    url: f.link,
                    width: f.width.unwrap_or(0),
                    height: f.height.unwrap_or(0),
                })
                .collect(),
        }
    }
}

/// Pexels `videos/search` API.
pub struct PexelsProvider {
    http: Client,
    api_key: String,
    base_url: String,
}

impl PexelsProvider {
    pub fn new(api_key: impl Into<String>) -> SourcingResult<Self> {
        Ok(Self {
            http: http_client()?,
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    /// Point at a different API host (tests, proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl FootageProvider for PexelsProvider {
    fn id(&self) -> ProviderId {
        ProviderId::Pexels
    }

    async fn search(
        &self,
        keyword: &str,
        orientation: Orientation,
        per_page: u32,
    ) -> SourcingResult<Vec<Candidate>> {
        let url = format!("{}/videos/search", self.base_url);
        debug!(keyword, %orientation, "Searching Pexels");

        let per_page = per_page.to_string();
        let response = self
            .http
            .get(&url)
            .header("Authorization", &self.api_key)
            .query(&[
                ("query", keyword),
                ("orientation", orientation.as_str()),
                ("per_page", per_page.as_str()),
                ("size", "medium"),
            ])
            .timeout(SEARCH_TIMEOUT)
            .send()
            .await?;

        let response = ensure_success(ProviderId::Pexels, response).await?;
        let body: SearchResponse = response
            .json()
            .await
            .map_err(|e| SourcingError::invalid_response(format!("Pexels search: {e}")))?;

        Ok(body.videos.into_iter().map(Candidate::from).collect())
    }

    async fn download(&self, rendition: &Rendition, dest: &Path) -> SourcingResult<u64> {
        download_to(&self.http, &rendition.url, dest).await
    }
}
