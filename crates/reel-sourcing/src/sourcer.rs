//! Visual sourcing: keywords to cached stock clips.
//!
//! Keywords are consulted round-robin with a budget of two consultations
//! each. When several providers are configured, iteration `i` uses keyword
//! `i % n` and provider `(i % n + i / n) % p`, so consecutive keywords go to
//! different providers and a keyword's second pass lands on another one.
//! Sourcing stops once enough clips covering the target duration have been
//! collected, or when the budget runs out.

use std::collections::HashSet;
use std::sync::Arc;

use metrics::counter;
use tracing::{debug, info, warn};

use reel_media::fs_utils::remove_if_exists;
use reel_models::{Orientation, ProviderId, VideoClip};

use crate::cache::{cache_key, ClipCache};
use crate::error::{SourcingError, SourcingResult};
use crate::keywords::{or_generic, KeywordExtractor};
use crate::provider::{select_rendition, FootageProvider};

/// Rough on-screen time each sourced clip is expected to cover.
pub const SECONDS_PER_CLIP: f64 = 5.0;
/// Never aim for fewer clips than this.
pub const MIN_CLIPS: usize = 3;
/// Results requested per search.
pub const SEARCH_PAGE_SIZE: u32 = 5;
/// Consultations allowed per keyword.
const PASSES_PER_KEYWORD: usize = 2;

/// Number of clips to aim for when covering `target` seconds.
pub fn needed_clips(target: f64) -> usize {
    let per_clip = (target / SECONDS_PER_CLIP).ceil();
    if per_clip.is_finite() && per_clip > 0.0 {
        (per_clip as usize).max(MIN_CLIPS)
    } else {
        MIN_CLIPS
    }
}

/// Provider index used for iteration `i` over `keywords` keywords and
/// `providers` providers.
pub fn provider_index(i: usize, keywords: usize, providers: usize) -> usize {
    let keywords = keywords.max(1);
    (i % keywords + i / keywords) % providers.max(1)
}

/// Finds, downloads and caches footage for a narration.
pub struct VisualSourcer {
    providers: Vec<Arc<dyn FootageProvider>>,
    cache: ClipCache,
    extractor: Arc<dyn KeywordExtractor>,
    orientation: Orientation,
}

impl VisualSourcer {
    pub fn new(
        providers: Vec<Arc<dyn FootageProvider>>,
        cache: ClipCache,
        extractor: Arc<dyn KeywordExtractor>,
    ) -> SourcingResult<Self> {
        if providers.is_empty() {
            return Err(SourcingError::NoProviders);
        }
        Ok(Self {
            providers,
            cache,
            extractor,
            orientation: Orientation::Portrait,
        })
    }

    pub fn with_orientation(mut self, orientation: Orientation) -> Self {
        self.orientation = orientation;
        self
    }

    pub fn providers(&self) -> Vec<ProviderId> {
        self.providers.iter().map(|p| p.id()).collect()
    }

    /// Extract keywords from `script` and source clips covering `target`
    /// seconds.
    pub async fn source(&self, script: &str, target: f64) -> SourcingResult<Vec<VideoClip>> {
        let keywords = or_generic(self.extractor.extract(script).await);
        info!(?keywords, target, "Sourcing footage");
        self.source_keywords(&keywords, target).await
    }

    /// Source clips for an explicit keyword list.
    pub async fn source_keywords(
        &self,
        keywords: &[String],
        target: f64,
    ) -> SourcingResult<Vec<VideoClip>> {
        let keywords = if keywords.is_empty() {
            or_generic(Vec::new())
        } else {
            keywords.to_vec()
        };

        let needed = needed_clips(target);
        let budget = keywords.len() * PASSES_PER_KEYWORD;
        let mut failed: HashSet<(ProviderId, String)> = HashSet::new();
        let mut clips: Vec<VideoClip> = Vec::new();
        let mut total = 0.0;

        for i in 0..budget {
            let keyword = &keywords[i % keywords.len()];
            let provider =
                &self.providers[provider_index(i, keywords.len(), self.providers.len())];
            let pair = (provider.id(), keyword.clone());

            if failed.contains(&pair) {
                debug!(keyword, provider = %provider.id(), "Skipping failed pair");
                continue;
            }

            match self.fetch(provider.as_ref(), keyword).await {
                Ok(Some(clip)) => {
                    total += clip.duration;
                    clips.push(clip);
                }
                Ok(None) => {
                    debug!(keyword, provider = %provider.id(), "No downloadable candidate");
                    failed.insert(pair);
                }
                Err(e) => {
                    warn!(
                        keyword,
                        provider = %provider.id(),
                        error = %e,
                        retryable = e.is_retryable(),
                        "Footage search failed"
                    );
                    counter!("reel_provider_failures_total", "provider" => provider.id().as_str())
                        .increment(1);
                    failed.insert(pair);
                }
            }

            if clips.len() >= needed && total >= target {
                break;
            }
        }

        if clips.is_empty() {
            return Err(SourcingError::SourcingExhausted {
                keywords: keywords.len(),
                attempts: budget,
            });
        }

        if clips.len() < needed || total < target {
            warn!(
                clips = clips.len(),
                needed,
                total_duration = total,
                target,
                "Sourcing under-filled, timeline will loop"
            );
        } else {
            info!(clips = clips.len(), total_duration = total, "Footage sourced");
        }

        Ok(clips)
    }

    /// Cache lookup, then search and download on a miss. `Ok(None)` means the
    /// search ran but nothing was downloadable.
    async fn fetch(
        &self,
        provider: &dyn FootageProvider,
        keyword: &str,
    ) -> SourcingResult<Option<VideoClip>> {
        let id = provider.id();
        if let Some(clip) = self.cache.lookup(id, keyword).await {
            return Ok(Some(clip));
        }

        let candidates = provider
            .search(keyword, self.orientation, SEARCH_PAGE_SIZE)
            .await?;
        let staging = self.cache.staging_file(&cache_key(id, keyword), "mp4")?;

        for candidate in &candidates {
            if candidate.duration <= 0.0 {
                continue;
            }
            let Some(rendition) = select_rendition(candidate) else {
                continue;
            };

            match provider.download(rendition, &staging).await {
                Ok(bytes) => {
                    debug!(keyword, provider = %id, bytes, height = rendition.height, "Clip downloaded");
                    return match self.cache.store(id, keyword, &staging, candidate.duration).await {
                        Ok(clip) => Ok(Some(clip)),
                        // another run may have stored the same pair meanwhile
                        Err(e) => match self.cache.lookup(id, keyword).await {
                            Some(clip) => {
                                warn!(keyword, provider = %id, error = %e, "Cache store failed, using existing entry");
                                Ok(Some(clip))
                            }
                            None => Err(e),
                        },
                    };
                }
                Err(e) => {
                    warn!(keyword, provider = %id, url = %rendition.url, error = %e, "Download failed, trying next candidate");
                    remove_if_exists(&staging).await;
                }
            }
        }

        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keywords::FrequencyKeywordExtractor;
    use crate::provider::{Candidate, Rendition};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempfile::TempDir;
    use tokio::sync::Barrier;
    use tokio_test::assert_ok;

    /// Provider serving canned results; URLs containing "broken" fail to
    /// download, keywords mapped to `None` fail to search.
    struct FakeProvider {
        id: ProviderId,
        results: HashMap<String, Option<Vec<Candidate>>>,
        searches: AtomicUsize,
        downloads: AtomicUsize,
        searched: Mutex<Vec<String>>,
        /// Held after writing each download, until every party arrives
        barrier: Option<Arc<Barrier>>,
    }

    impl FakeProvider {
        fn new(id: ProviderId) -> Self {
            Self {
                id,
                results: HashMap::new(),
                searches: AtomicUsize::new(0),
                downloads: AtomicUsize::new(0),
                searched: Mutex::new(Vec::new()),
                barrier: None,
            }
        }

        fn with_barrier(mut self, barrier: Arc<Barrier>) -> Self {
            self.barrier = Some(barrier);
            self
        }

        fn with(mut self, keyword: &str, durations: &[f64]) -> Self {
            let candidates = durations
                .iter()
                .enumerate()
                .map(|(n, d)| candidate(&format!("https://cdn/{keyword}/{n}.mp4"), *d))
                .collect();
            self.results.insert(keyword.to_string(), Some(candidates));
            self
        }

        fn with_candidates(mut self, keyword: &str, candidates: Vec<Candidate>) -> Self {
            self.results.insert(keyword.to_string(), Some(candidates));
            self
        }

        fn failing(mut self, keyword: &str) -> Self {
            self.results.insert(keyword.to_string(), None);
            self
        }

        fn searches(&self) -> usize {
            self.searches.load(Ordering::SeqCst)
        }

        fn downloads(&self) -> usize {
            self.downloads.load(Ordering::SeqCst)
        }
    }

    fn candidate(url: &str, duration: f64) -> Candidate {
        Candidate {
            duration,
            renditions: vec![Rendition {
                url: url.to_string(),
                width: 1080,
                height: 1920,
            }],
        }
    }

    #[async_trait]
    impl FootageProvider for FakeProvider {
        fn id(&self) -> ProviderId {
            self.id
        }

        async fn search(
            &self,
            keyword: &str,
            _orientation: Orientation,
            _per_page: u32,
        ) -> SourcingResult<Vec<Candidate>> {
            self.searches.fetch_add(1, Ordering::SeqCst);
            self.searched.lock().unwrap().push(keyword.to_string());
            match self.results.get(keyword) {
                Some(Some(candidates)) => Ok(candidates.clone()),
                Some(None) => Err(SourcingError::request_failed("503")),
                None => Ok(Vec::new()),
            }
        }

        async fn download(&self, rendition: &Rendition, dest: &Path) -> SourcingResult<u64> {
            self.downloads.fetch_add(1, Ordering::SeqCst);
            if rendition.url.contains("broken") {
                tokio::fs::write(dest, b"partial").await?;
                return Err(SourcingError::download_failed("connection reset"));
            }
            tokio::fs::write(dest, rendition.url.as_bytes()).await?;
            if let Some(barrier) = &self.barrier {
                barrier.wait().await;
            }
            Ok(rendition.url.len() as u64)
        }
    }

    /// Simulates another run finishing the same pair mid-download: stores
    /// its own entry and takes this download's file away.
    struct OvertakenProvider {
        cache: ClipCache,
    }

    #[async_trait]
    impl FootageProvider for OvertakenProvider {
        fn id(&self) -> ProviderId {
            ProviderId::Pexels
        }

        async fn search(
            &self,
            keyword: &str,
            _orientation: Orientation,
            _per_page: u32,
        ) -> SourcingResult<Vec<Candidate>> {
            Ok(vec![candidate(&format!("https://cdn/{keyword}.mp4"), 9.0)])
        }

        async fn download(&self, _rendition: &Rendition, dest: &Path) -> SourcingResult<u64> {
            let theirs = self.cache.staging_file("other-run", "mp4")?;
            tokio::fs::write(&theirs, b"their clip").await?;
            self.cache.store(ProviderId::Pexels, "hail", &theirs, 9.0).await?;
            tokio::fs::remove_file(dest).await?;
            Ok(10)
        }
    }

    async fn sourcer(
        root: &TempDir,
        providers: Vec<Arc<FakeProvider>>,
    ) -> VisualSourcer {
        let cache = ClipCache::open(root.path()).await.unwrap();
        let providers = providers
            .into_iter()
            .map(|p| p as Arc<dyn FootageProvider>)
            .collect();
        VisualSourcer::new(providers, cache, Arc::new(FrequencyKeywordExtractor)).unwrap()
    }

    fn partial_files(root: &TempDir) -> usize {
        std::fs::read_dir(root.path().join("videos"))
            .unwrap()
            .filter(|e| e.as_ref().unwrap().file_name().to_string_lossy().contains(".partial."))
            .count()
    }

    fn keywords(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn test_needed_clips() {
        assert_eq!(needed_clips(60.0), 12);
        assert_eq!(needed_clips(61.0), 13);
        assert_eq!(needed_clips(10.0), 3);
        assert_eq!(needed_clips(0.0), 3);
    }

    #[test]
    fn test_provider_alternation() {
        // 3 keywords, 2 providers: first pass 0,1,0 then second pass 1,0,1
        let picks: Vec<usize> = (0..6).map(|i| provider_index(i, 3, 2)).collect();
        assert_eq!(picks, vec![0, 1, 0, 1, 0, 1]);
        for n in 1..6 {
            for k in 0..n {
                assert_ne!(provider_index(k, n, 2), provider_index(k + n, n, 2));
            }
        }
        assert!((0..6).all(|i| provider_index(i, 3, 1) == 0));
    }

    #[tokio::test]
    async fn test_no_providers() {
        let root = TempDir::new().unwrap();
        let cache = ClipCache::open(root.path()).await.unwrap();
        let result = VisualSourcer::new(vec![], cache, Arc::new(FrequencyKeywordExtractor));
        assert!(matches!(result, Err(SourcingError::NoProviders)));
    }

    #[tokio::test]
    async fn test_stops_once_covered() {
        let root = TempDir::new().unwrap();
        let pexels = Arc::new(
            FakeProvider::new(ProviderId::Pexels)
                .with("ocean", &[6.0])
                .with("forest", &[6.0])
                .with("city", &[6.0])
                .with("desert", &[6.0]),
        );
        let sourcer = sourcer(&root, vec![pexels.clone()]).await;

        let clips = sourcer
            .source_keywords(&keywords(&["ocean", "forest", "city", "desert"]), 12.0)
            .await
            .unwrap();

        assert_eq!(clips.len(), 3);
        assert_eq!(pexels.searches(), 3);
        assert_eq!(
            clips.iter().map(|c| c.keyword.as_str()).collect::<Vec<_>>(),
            vec!["ocean", "forest", "city"]
        );
        assert!(clips.iter().all(|c| c.path.exists()));
    }

    #[tokio::test]
    async fn test_same_pair_downloads_once() {
        let root = TempDir::new().unwrap();
        let pexels = Arc::new(
            FakeProvider::new(ProviderId::Pexels)
                .with("ocean", &[10.0])
                .with("forest", &[10.0])
                .with("city", &[10.0]),
        );
        let sourcer = sourcer(&root, vec![pexels.clone()]).await;
        let words = keywords(&["ocean", "forest", "city"]);

        let first = assert_ok!(sourcer.source_keywords(&words, 20.0).await);
        assert_eq!(pexels.downloads(), 3);

        let second = assert_ok!(sourcer.source_keywords(&words, 20.0).await);
        assert_eq!(pexels.downloads(), 3);
        assert_eq!(pexels.searches(), 3);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_stale_entry_redownloads() {
        let root = TempDir::new().unwrap();
        let pexels = Arc::new(FakeProvider::new(ProviderId::Pexels).with("rain", &[20.0]));
        let sourcer = sourcer(&root, vec![pexels.clone()]).await;
        let words = keywords(&["rain"]);

        let clips = sourcer.source_keywords(&words, 5.0).await.unwrap();
        std::fs::remove_file(&clips[0].path).unwrap();

        let again = sourcer.source_keywords(&words, 5.0).await.unwrap();
        assert!(again[0].path.exists());
        assert_eq!(pexels.searches(), 2);
    }

    #[tokio::test]
    async fn test_zero_results_is_exhausted() {
        let root = TempDir::new().unwrap();
        let pexels = Arc::new(FakeProvider::new(ProviderId::Pexels).failing("storm"));
        let pixabay = Arc::new(FakeProvider::new(ProviderId::Pixabay));
        let sourcer = sourcer(&root, vec![pexels.clone(), pixabay.clone()]).await;

        let err = sourcer
            .source_keywords(&keywords(&["storm", "lightning"]), 30.0)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            SourcingError::SourcingExhausted {
                keywords: 2,
                attempts: 4
            }
        ));
        // each keyword tried once per provider
        assert_eq!(pexels.searches(), 2);
        assert_eq!(pixabay.searches(), 2);
        assert_eq!(std::fs::read_dir(root.path().join("videos")).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_failed_pair_not_retried() {
        let root = TempDir::new().unwrap();
        let pexels = Arc::new(FakeProvider::new(ProviderId::Pexels).failing("storm"));
        let sourcer = sourcer(&root, vec![pexels.clone()]).await;

        let err = sourcer
            .source_keywords(&keywords(&["storm"]), 30.0)
            .await
            .unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(pexels.searches(), 1);
    }

    #[tokio::test]
    async fn test_under_filled_proceeds() {
        let root = TempDir::new().unwrap();
        let pexels = Arc::new(FakeProvider::new(ProviderId::Pexels).with("moss", &[4.0]));
        let pixabay = Arc::new(FakeProvider::new(ProviderId::Pixabay));
        let sourcer = sourcer(&root, vec![pexels.clone(), pixabay.clone()]).await;

        let clips = sourcer
            .source_keywords(&keywords(&["moss"]), 60.0)
            .await
            .unwrap();

        assert_eq!(clips.len(), 1);
        assert_eq!(clips[0].provider, ProviderId::Pexels);
        assert_eq!(pixabay.searches(), 1);
    }

    #[tokio::test]
    async fn test_second_pass_uses_other_provider() {
        let root = TempDir::new().unwrap();
        let pexels = Arc::new(FakeProvider::new(ProviderId::Pexels).with("sky", &[5.0]));
        let pixabay = Arc::new(FakeProvider::new(ProviderId::Pixabay).with("sky", &[7.0]));
        let sourcer = sourcer(&root, vec![pexels.clone(), pixabay.clone()]).await;

        let clips = sourcer
            .source_keywords(&keywords(&["sky"]), 60.0)
            .await
            .unwrap();

        let providers: Vec<ProviderId> = clips.iter().map(|c| c.provider).collect();
        assert_eq!(providers, vec![ProviderId::Pexels, ProviderId::Pixabay]);
        assert_ne!(clips[0].path, clips[1].path);
    }

    #[tokio::test]
    async fn test_broken_download_tries_next_candidate() {
        let root = TempDir::new().unwrap();
        let pexels = Arc::new(FakeProvider::new(ProviderId::Pexels).with_candidates(
            "waves",
            vec![
                candidate("https://cdn/zero.mp4", 0.0),
                candidate("https://cdn/broken.mp4", 9.0),
                candidate("https://cdn/good.mp4", 11.0),
            ],
        ));
        let sourcer = sourcer(&root, vec![pexels.clone()]).await;

        let clips = sourcer
            .source_keywords(&keywords(&["waves"]), 5.0)
            .await
            .unwrap();

        assert_eq!(clips[0].duration, 11.0);
        assert_eq!(std::fs::read(&clips[0].path).unwrap(), b"https://cdn/good.mp4");
        // zero-length candidate never downloaded
        assert_eq!(pexels.downloads(), 2);
        assert_eq!(partial_files(&root), 0);
    }

    #[tokio::test]
    async fn test_source_uses_generic_keywords_when_none_extracted() {
        let root = TempDir::new().unwrap();
        let pexels = Arc::new(
            FakeProvider::new(ProviderId::Pexels)
                .with("nature", &[10.0])
                .with("abstract", &[10.0])
                .with("landscape", &[10.0]),
        );
        let sourcer = sourcer(&root, vec![pexels.clone()]).await;

        // nothing longer than three characters survives the frequency filter
        let clips = sourcer.source("a an the it is", 15.0).await.unwrap();
        assert_eq!(clips.len(), 3);
        assert_eq!(
            *pexels.searched.lock().unwrap(),
            vec!["nature", "abstract", "landscape"]
        );
    }

    #[tokio::test]
    async fn test_concurrent_runs_share_cache_key() {
        let root = TempDir::new().unwrap();
        let barrier = Arc::new(Barrier::new(2));
        let first = Arc::new(
            FakeProvider::new(ProviderId::Pexels)
                .with("rain", &[20.0])
                .with_barrier(barrier.clone()),
        );
        let second = Arc::new(
            FakeProvider::new(ProviderId::Pexels)
                .with("rain", &[20.0])
                .with_barrier(barrier),
        );
        let run_a = sourcer(&root, vec![first.clone()]).await;
        let run_b = sourcer(&root, vec![second.clone()]).await;
        let words = keywords(&["rain"]);

        // both downloads are in flight before either is stored
        let (a, b) = tokio::join!(
            run_a.source_keywords(&words, 5.0),
            run_b.source_keywords(&words, 5.0)
        );

        let a = assert_ok!(a);
        let b = assert_ok!(b);
        assert_eq!(a.len(), 2);
        assert_eq!(b.len(), 2);
        assert_eq!(first.downloads(), 1);
        assert_eq!(second.downloads(), 1);
        assert!(a.iter().chain(&b).all(|c| c.path.exists()));
        assert_eq!(partial_files(&root), 0);
    }

    #[tokio::test]
    async fn test_failed_store_uses_entry_from_other_run() {
        let root = TempDir::new().unwrap();
        let cache = ClipCache::open(root.path()).await.unwrap();
        let provider = OvertakenProvider {
            cache: cache.clone(),
        };
        let sourcer =
            VisualSourcer::new(vec![Arc::new(provider)], cache, Arc::new(FrequencyKeywordExtractor))
                .unwrap();

        let clips = assert_ok!(sourcer.source_keywords(&keywords(&["hail"]), 5.0).await);
        assert_eq!(clips.len(), 2);
        assert_eq!(std::fs::read(&clips[0].path).unwrap(), b"their clip");
        assert_eq!(clips[0].duration, 9.0);
    }
}
