#![deny(unreachable_patterns)]
//! FFmpeg-driven frame pipeline for the reel assembler.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building and raw frame piping
//! - Progress parsing from `-progress pipe:2`
//! - Lazy frame streams with Ken Burns motion and crossfaded span playback
//! - Timeline building from sourced clips
//! - Word-synchronised caption rendering
//! - Narration/music mixing
//! - Final encoding with hardware-to-software fallback

pub mod audio;
pub mod captions;
pub mod command;
pub mod encode;
pub mod error;
pub mod frame;
pub mod fs_utils;
pub mod motion;
pub mod probe;
pub mod progress;
pub mod text;
pub mod timeline;

pub use audio::AudioMixer;
pub use captions::{layout_caption, CaptionLayout, CaptionOverlay, CaptionRenderer};
pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegProcess, FfmpegRunner};
pub use encode::Encoder;
pub use error::{MediaError, MediaResult};
pub use frame::{ClipDecoder, Frame, FrameSource};
pub use motion::{KenBurns, KenBurnsParams};
pub use probe::{get_duration, probe_media, MediaInfo};
pub use progress::{FfmpegProgress, ProgressCallback, ProgressParser};
pub use text::CaptionFont;
pub use timeline::{build_timeline, DecoderOpener, SpanOpener, TimelineTrack};
