//! Narrated short video pipeline.
//!
//! This crate provides:
//! - Environment-driven configuration
//! - Script, voice and transcription collaborators
//! - Final assembly of footage, captions and audio
//! - The end-to-end pipeline behind the `reel` binary

pub mod assembler;
pub mod collaborators;
pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod output;
pub mod pipeline;

pub use assembler::Assembler;
pub use collaborators::{
    CommandTranscriber, CommandVoiceSynthesizer, OllamaScriptWriter, Script, ScriptWriter,
    Transcriber, VoiceSynthesizer, VoiceTrack,
};
pub use config::{PipelineConfig, VideoSource};
pub use error::{PipelineError, PipelineResult};
pub use logging::RunLogger;
pub use output::{output_path, sanitize_topic};
pub use pipeline::{build_providers, Pipeline, RunOutcome, RunRequest, Stage, StageCallback};
