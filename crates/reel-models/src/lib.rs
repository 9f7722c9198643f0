//! Shared data models for the reel video assembler.
//!
//! This crate provides Serde-serializable types for:
//! - Sourced stock clips and their providers
//! - Word timestamps and caption chunks
//! - Timeline spans
//! - Output format, caption style and encoding configuration

pub mod caption;
pub mod clip;
pub mod encoding;
pub mod timeline;
pub mod transcript;
pub mod video;

// Re-export common types
pub use caption::{CaptionStyle, Rgb};
pub use clip::{Orientation, ProviderId, VideoClip};
pub use encoding::EncodingConfig;
pub use timeline::{Timeline, TimelineSpan};
pub use transcript::{chunk_words, CaptionChunk, TranscriptSegment, WordTimestamp};
pub use video::VideoFormat;
