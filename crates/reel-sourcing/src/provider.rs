//! Stock footage provider abstraction.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use reel_models::{Orientation, ProviderId};

use crate::error::{SourcingError, SourcingResult};

/// Renditions at least this tall count as HD.
pub const MIN_HD_HEIGHT: u32 = 720;

/// Timeout for one search request.
pub const SEARCH_TIMEOUT: Duration = Duration::from_secs(15);
/// Timeout for one clip download.
pub const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(60);

/// One downloadable encoding of a search result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendition {
    pub url: String,
    pub width: u32,
    pub height: u32,
}

/// A search result: one video offered in several renditions.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    /// Native duration in seconds
    pub duration: f64,
    /// Renditions in provider order
    pub renditions: Vec<Rendition>,
}

/// Tallest HD rendition, or the first rendition when none is HD.
pub fn select_rendition(candidate: &Candidate) -> Option<&Rendition> {
    candidate
        .renditions
        .iter()
        .filter(|r| r.height >= MIN_HD_HEIGHT)
        // max_by_key keeps the last maximum; reverse so the first wins ties
        .rev()
        .max_by_key(|r| r.height)
        .or_else(|| candidate.renditions.first())
}

/// A stock footage search API.
#[async_trait]
pub trait FootageProvider: Send + Sync {
    fn id(&self) -> ProviderId;

    /// Search for videos matching `keyword`.
    async fn search(
        &self,
        keyword: &str,
        orientation: Orientation,
        per_page: u32,
    ) -> SourcingResult<Vec<Candidate>>;

    /// Download `rendition` to `dest`, returning the number of bytes written.
    async fn download(&self, rendition: &Rendition, dest: &Path) -> SourcingResult<u64>;
}

/// Build the shared HTTP client used by providers.
pub fn http_client() -> SourcingResult<Client> {
    Ok(Client::builder()
        .user_agent(concat!("reel/", env!("CARGO_PKG_VERSION")))
        .build()?)
}

/// Stream `url` into `dest`.
pub async fn download_to(http: &Client, url: &str, dest: &Path) -> SourcingResult<u64> {
    let response = http.get(url).timeout(DOWNLOAD_TIMEOUT).send().await?;

    if !response.status().is_success() {
        return Err(SourcingError::download_failed(format!(
            "{} returned {}",
            url,
            response.status()
        )));
    }

    let mut file = tokio::fs::File::create(dest).await?;
    let mut written: u64 = 0;
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;

    if written == 0 {
        return Err(SourcingError::download_failed(format!("{url} returned no data")));
    }

    debug!(url, bytes = written, dest = %dest.display(), "Downloaded clip");
    Ok(written)
}

/// Fail with the response body when a search did not succeed.
pub(crate) async fn ensure_success(
    provider: ProviderId,
    response: reqwest::Response,
) -> SourcingResult<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Err(SourcingError::request_failed(format!(
        "{provider} returned {status}: {body}"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn rendition(height: u32) -> Rendition {
        Rendition {
            url: format!("https://cdn.example/{height}.mp4"),
            width: height * 9 / 16,
            height,
        }
    }

    #[test]
    fn test_select_tallest_hd() {
        let candidate = Candidate {
            duration: 10.0,
            renditions: vec![rendition(540), rendition(1920), rendition(720), rendition(1280)],
        };
        assert_eq!(select_rendition(&candidate).unwrap().height, 1920);
    }

    #[test]
    fn test_select_first_when_no_hd() {
        let candidate = Candidate {
            duration: 10.0,
            renditions: vec![rendition(360), rendition(540)],
        };
        assert_eq!(select_rendition(&candidate).unwrap().height, 360);
    }

    #[test]
    fn test_select_first_of_equal_heights() {
        let mut second = rendition(1080);
        second.url = "https://cdn.example/other.mp4".to_string();
        let candidate = Candidate {
            duration: 10.0,
            renditions: vec![rendition(1080), second],
        };
        assert_eq!(
            select_rendition(&candidate).unwrap().url,
            "https://cdn.example/1080.mp4"
        );
    }

    #[test]
    fn test_select_none_without_renditions() {
        let candidate = Candidate {
            duration: 10.0,
            renditions: vec![],
        };
        assert!(select_rendition(&candidate).is_none());
    }

    #[tokio::test]
    async fn test_download_streams_to_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/clip.mp4"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![7u8; 4096]))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("clip.mp4");
        let http = http_client().unwrap();

        let written = download_to(&http, &format!("{}/clip.mp4", server.uri()), &dest)
            .await
            .unwrap();
        assert_eq!(written, 4096);
        assert_eq!(std::fs::read(&dest).unwrap().len(), 4096);
    }

    #[tokio::test]
    async fn test_download_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let http = http_client().unwrap();
        let result = download_to(
            &http,
            &format!("{}/missing.mp4", server.uri()),
            &dir.path().join("clip.mp4"),
        )
        .await;
        assert!(matches!(result, Err(SourcingError::DownloadFailed(_))));
    }
}
