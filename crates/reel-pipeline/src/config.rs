//! Pipeline configuration.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use reel_media::audio::DEFAULT_MUSIC_VOLUME;
use reel_media::timeline::DEFAULT_TRANSITION_SECS;
use reel_models::{CaptionStyle, EncodingConfig, ProviderId, Rgb, VideoFormat};
use reel_sourcing::OllamaConfig;

use crate::error::{PipelineError, PipelineResult};

pub const DEFAULT_VOICE: &str = "en-US-ChristopherNeural";
pub const DEFAULT_SPEECH_RATE: &str = "+0%";
pub const DEFAULT_TARGET_DURATION: u32 = 60;

/// Which stock footage providers to query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VideoSource {
    #[default]
    Pexels,
    Pixabay,
    Both,
}

impl VideoSource {
    /// Providers in query order.
    pub fn providers(&self) -> Vec<ProviderId> {
        match self {
            VideoSource::Pexels => vec![ProviderId::Pexels],
            VideoSource::Pixabay => vec![ProviderId::Pixabay],
            VideoSource::Both => vec![ProviderId::Pexels, ProviderId::Pixabay],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VideoSource::Pexels => "pexels",
            VideoSource::Pixabay => "pixabay",
            VideoSource::Both => "both",
        }
    }
}

impl fmt::Display for VideoSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VideoSource {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pexels" => Ok(VideoSource::Pexels),
            "pixabay" => Ok(VideoSource::Pixabay),
            "both" => Ok(VideoSource::Both),
            other => Err(PipelineError::config_error(format!(
                "VIDEO_SOURCE must be pexels, pixabay or both, got `{other}`"
            ))),
        }
    }
}

/// Everything a run needs besides the topic.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub pexels_api_key: Option<String>,
    pub pixabay_api_key: Option<String>,
    pub video_source: VideoSource,
    pub ollama: OllamaConfig,
    /// Clip cache root; clips live under `videos/`
    pub cache_dir: PathBuf,
    pub output_dir: PathBuf,
    pub format: VideoFormat,
    /// Requested narration length in seconds
    pub target_duration: u32,
    pub voice: String,
    pub speech_rate: String,
    pub captions: CaptionStyle,
    pub music_volume: f64,
    /// Try NVENC before libx264
    pub use_nvenc: bool,
    /// Crossfade between timeline spans, in seconds
    pub transition_secs: f64,
    pub tts_command: String,
    pub stt_command: String,
    pub stt_model: String,
    pub stt_language: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            pexels_api_key: None,
            pixabay_api_key: None,
            video_source: VideoSource::default(),
            ollama: OllamaConfig::default(),
            cache_dir: PathBuf::from("./cache"),
            output_dir: PathBuf::from("./output"),
            format: VideoFormat::default(),
            target_duration: DEFAULT_TARGET_DURATION,
            voice: DEFAULT_VOICE.to_string(),
            speech_rate: DEFAULT_SPEECH_RATE.to_string(),
            captions: CaptionStyle::default(),
            music_volume: DEFAULT_MUSIC_VOLUME,
            use_nvenc: true,
            transition_secs: DEFAULT_TRANSITION_SECS,
            tts_command: "edge-tts".to_string(),
            stt_command: "whisper".to_string(),
            stt_model: "base".to_string(),
            stt_language: "en".to_string(),
        }
    }
}

impl PipelineConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset or unparsable values use defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let mut captions = defaults.captions.clone();
        if let Some(path) = non_empty("REEL_FONT_PATH") {
            captions = captions.with_font_path(path);
        }
        let color = |key: &str, default: Rgb| {
            non_empty(key)
                .and_then(|s| s.parse().ok())
                .unwrap_or(default)
        };
        let fill = color("REEL_CAPTION_COLOR", captions.fill);
        let stroke = color("REEL_CAPTION_STROKE_COLOR", captions.stroke);
        captions = captions.with_colors(fill, stroke);

        Self {
            pexels_api_key: non_empty("PEXELS_API_KEY"),
            pixabay_api_key: non_empty("PIXABAY_API_KEY"),
            video_source: non_empty("VIDEO_SOURCE")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.video_source),
            ollama: OllamaConfig {
                base_url: non_empty("OLLAMA_BASE_URL").unwrap_or(defaults.ollama.base_url),
                model: non_empty("OLLAMA_MODEL").unwrap_or(defaults.ollama.model),
            },
            cache_dir: non_empty("REEL_CACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.cache_dir),
            output_dir: non_empty("REEL_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.output_dir),
            format: defaults.format,
            target_duration: non_empty("REEL_DURATION")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.target_duration),
            voice: non_empty("REEL_VOICE").unwrap_or(defaults.voice),
            speech_rate: non_empty("REEL_SPEECH_RATE").unwrap_or(defaults.speech_rate),
            captions,
            music_volume: non_empty("REEL_MUSIC_VOLUME")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.music_volume),
            use_nvenc: non_empty("REEL_USE_NVENC")
                .and_then(|s| parse_bool(&s))
                .unwrap_or(defaults.use_nvenc),
            transition_secs: non_empty("REEL_TRANSITION_SECS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.transition_secs),
            tts_command: non_empty("REEL_TTS_COMMAND").unwrap_or(defaults.tts_command),
            stt_command: non_empty("REEL_STT_COMMAND").unwrap_or(defaults.stt_command),
            stt_model: non_empty("REEL_STT_MODEL").unwrap_or(defaults.stt_model),
            stt_language: non_empty("REEL_STT_LANGUAGE").unwrap_or(defaults.stt_language),
        }
    }

    /// Check that every provider the source needs has an API key.
    pub fn validate(&self) -> PipelineResult<()> {
        for provider in self.video_source.providers() {
            if self.api_key(provider).is_none() {
                let var = match provider {
                    ProviderId::Pexels => "PEXELS_API_KEY",
                    ProviderId::Pixabay => "PIXABAY_API_KEY",
                };
                return Err(PipelineError::config_error(format!(
                    "{var} not set. Add it to .env file."
                )));
            }
        }
        if self.target_duration == 0 {
            return Err(PipelineError::config_error("Duration must be at least 1 second"));
        }
        Ok(())
    }

    pub fn api_key(&self, provider: ProviderId) -> Option<&str> {
        match provider {
            ProviderId::Pexels => self.pexels_api_key.as_deref(),
            ProviderId::Pixabay => self.pixabay_api_key.as_deref(),
        }
    }

    pub fn encoding(&self) -> EncodingConfig {
        EncodingConfig::new().with_hardware(self.use_nvenc)
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
