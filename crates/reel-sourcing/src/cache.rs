//! Content-addressed clip cache.
//!
//! Layout under the cache root:
//!
//! ```text
//! videos/<key>.json   {"path": ..., "duration": ..., "keyword": ...}
//! videos/<key>.mp4
//! ```
//!
//! An entry only counts as a hit while the file it points to still exists;
//! stale entries are treated as misses and overwritten by the next download.
//! Entries are never deleted.
//!
//! Concurrent runs may store the same key. Each download and metadata write
//! goes through its own uniquely named staging file, so the last rename wins
//! and both runs end up with a valid entry.

use std::path::{Path, PathBuf};

use metrics::counter;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tempfile::TempPath;
use tracing::{debug, warn};

use reel_media::fs_utils::move_file;
use reel_models::{ProviderId, VideoClip};

use crate::error::SourcingResult;

/// Persisted metadata for one cached clip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub path: PathBuf,
    pub duration: f64,
    pub keyword: String,
}

/// Deterministic cache key for a (provider, keyword) pair.
pub fn cache_key(provider: ProviderId, keyword: &str) -> String {
    let normalized = keyword.trim().to_lowercase();
    let digest = Sha256::digest(format!("{}:{}", provider.as_str(), normalized).as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Clip cache rooted at `<cache_dir>/videos`.
#[derive(Debug, Clone)]
pub struct ClipCache {
    dir: PathBuf,
}

impl ClipCache {
    /// Open (and create if needed) the cache under `cache_dir`.
    pub async fn open(cache_dir: impl AsRef<Path>) -> SourcingResult<Self> {
        let dir = cache_dir.as_ref().join("videos");
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn meta_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    pub fn video_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.mp4"))
    }

    /// Fresh staging file for an in-flight write of `key`, unique to the
    /// caller. It is removed on drop unless already renamed away.
    pub fn staging_file(&self, key: &str, extension: &str) -> SourcingResult<TempPath> {
        let file = tempfile::Builder::new()
            .prefix(&format!(".{key}."))
            .suffix(&format!(".partial.{extension}"))
            .tempfile_in(&self.dir)?;
        Ok(file.into_temp_path())
    }

    /// Return the cached clip for a pair, if its file is still present.
    pub async fn lookup(&self, provider: ProviderId, keyword: &str) -> Option<VideoClip> {
        let key = cache_key(provider, keyword);
        let meta_path = self.meta_path(&key);

        let raw = match tokio::fs::read(&meta_path).await {
            Ok(raw) => raw,
            Err(_) => {
                counter!("reel_clip_cache_total", "outcome" => "miss").increment(1);
                return None;
            }
        };

        let entry: CacheEntry = match serde_json::from_slice(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(path = %meta_path.display(), error = %e, "Unreadable cache entry, ignoring");
                counter!("reel_clip_cache_total", "outcome" => "miss").increment(1);
                return None;
            }
        };

        if !entry.path.exists() {
            debug!(
                keyword,
                %provider,
                path = %entry.path.display(),
                "Stale cache entry, file is gone"
            );
            counter!("reel_clip_cache_total", "outcome" => "stale").increment(1);
            return None;
        }

        counter!("reel_clip_cache_total", "outcome" => "hit").increment(1);
        debug!(keyword, %provider, path = %entry.path.display(), "Clip cache hit");
        Some(VideoClip::new(entry.path, entry.duration, keyword, provider))
    }

    /// Move a finished download into place and record its metadata.
    pub async fn store(
        &self,
        provider: ProviderId,
        keyword: &str,
        downloaded: &Path,
        duration: f64,
    ) -> SourcingResult<VideoClip> {
        let key = cache_key(provider, keyword);
        let video_path = self.video_path(&key);
        move_file(downloaded, &video_path).await?;

        let entry = CacheEntry {
            path: video_path.clone(),
            duration,
            keyword: keyword.to_string(),
        };
        let meta_path = self.meta_path(&key);
        let staging = self.staging_file(&key, "json")?;
        tokio::fs::write(&staging, serde_json::to_vec(&entry)?).await?;
        move_file(&staging, &meta_path).await?;

        Ok(VideoClip::new(video_path, duration, keyword, provider))
    }
}
