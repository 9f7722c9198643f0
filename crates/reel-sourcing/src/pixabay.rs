//! Pixabay video search client.

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

pub const DEFAULT_BASE_URL: &str = "https://pixabay.com";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    hits: Vec<PixabayHit>,
}

#[derive(Debug, Deserialize)]
struct PixabayHit {
    #[serde(default)]
    duration: f64,
    #[serde(default)]
    videos: PixabayRenditions,
}

#[derive(Debug, Default, Deserialize)]
struct PixabayRenditions {
    large: Option<PixabayFile>,
    medium: Option<PixabayFile>,
    small: Option<PixabayFile>,
    tiny: Option<PixabayFile>,
}

#[derive(Debug, Deserialize)]
struct PixabayFile {
    #[serde(default)]
    url: String,
    #[serde(default)]
    width: u32,
    #[serde(default)]
    height: u32,
}

impl From<PixabayHit> for Candidate {
    fn from(hit: PixabayHit) -> Self {
        let v = hit.videos;
        Candidate {
            duration: hit.duration,
            renditions: [v.large, v.medium, v.small, v.tiny]
                .into_iter()
                .flatten()
                // Pixabay reports missing sizes with an empty URL
                .filter(|f| !f.url.is_empty())
                .map(|f| Rendition {
                    url: f.url,
                    width: f.width,
                    height: f.height,
                })
                .collect(),
        }
    }
}

/// Pixabay `api/videos` API. Orientation is not supported and is ignored.
pub struct PixabayProvider {
    http: Client,
    api_key: String,
    base_url: String,
}

impl PixabayProvider {
    pub fn new(api_key: impl Into<String>) -> SourcingResult<Self> {
        Ok(Self {
            http: http_client()?,
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl FootageProvider for PixabayProvider {
    fn id(&self) -> ProviderId {
        ProviderId::Pixabay
    }

    async fn search(
        &self,
        keyword: &str,
        _orientation: Orientation,
        per_page: u32,
    ) -> SourcingResult<Vec<Candidate>> {
        let url = format!("{}/api/videos/", self.base_url);
        debug!(keyword, "Searching Pixabay");

        // Pixabay rejects page sizes below 3
        let per_page = per_page.max(3).to_string();
        let response = self
            .http
            .get(&url)
            .query(&[
                ("key", self.api_key.as_str()),
                ("q", keyword),
                ("per_page", per_page.as_str()),
            ])
            .timeout(SEARCH_TIMEOUT)
            .send()
            .await?;

        let response = ensure_success(ProviderId::Pixabay, response).await?;
        let body: SearchResponse = response
            .json()
            .await
            .map_err(|e| SourcingError::invalid_response(format!("Pixabay search: {e}")))?;

        Ok(body.hits.into_iter().map(Candidate::from).collect())
    }

    async fn download(&self, rendition: &Rendition, dest: &Path) -> SourcingResult<u64> {
        download_to(&self.http, &rendition.url, dest).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::select_rendition;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_search_parses_hits() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/videos/"))
            .and(query_param("key", "pix-key"))
            .and(query_param("q", "mountain"))
            .and(query_param("per_page", "5"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "total": 1,
                "hits": [{
                    "id": 9,
                    "duration": 21,
                    "videos": {
                        "large": {"url": "", "width": 0, "height": 0},
                        "medium": {"url": "https://cdn/medium.mp4", "width": 1280, "height": 720},
                        "small": {"url": "https://cdn/small.mp4", "width": 960, "height": 540},
                        "tiny": {"url": "https://cdn/tiny.mp4", "width": 640, "height": 360}
                    }
                }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = PixabayProvider::new("pix-key")
            .unwrap()
            .with_base_url(server.uri());
        let candidates = provider
            .search("mountain", Orientation::Portrait, 5)
            .await
            .unwrap();

        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].duration, 21.0);
        assert_eq!(candidates[0].renditions.len(), 3);
        assert_eq!(
            select_rendition(&candidates[0]).unwrap().url,
            "https://cdn/medium.mp4"
        );
    }

    #[tokio::test]
    async fn test_search_without_hits() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"total": 0, "hits": []})))
            .mount(&server)
            .await;

        let provider = PixabayProvider::new("k").unwrap().with_base_url(server.uri());
        assert!(provider
            .search("void", Orientation::Landscape, 5)
            .await
            .unwrap()
            .is_empty());
    }
}
