//! Stock footage sourcing for the reel assembler.
//!
//! This crate provides:
//! - Pexels and Pixabay search/download clients behind [`FootageProvider`]
//! - A content-addressed clip cache validated against the filesystem
//! - LLM keyword extraction with a word-frequency fallback
//! - The visual sourcer that turns a narration into enough clips

pub mod cache;
pub mod error;
pub mod keywords;
pub mod llm;
pub mod pexels;
pub mod pixabay;
pub mod provider;
pub mod sourcer;

pub use cache::{cache_key, CacheEntry, ClipCache};
pub use error::{SourcingError, SourcingResult};
pub use keywords::{
    fallback_keywords, FrequencyKeywordExtractor, KeywordExtractor, LlmKeywordExtractor,
};
pub use llm::{OllamaClient, OllamaConfig};
pub use pexels::PexelsProvider;
pub use pixabay::PixabayProvider;
pub use provider::{select_rendition, Candidate, FootageProvider, Rendition};
pub use sourcer::{needed_clips, VisualSourcer};
