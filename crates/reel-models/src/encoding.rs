//! Final encode settings.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// H.264 in software; always available
pub const SOFTWARE_VIDEO_CODEC: &str = "libx264";
/// H.264 on NVIDIA NVENC
pub const HARDWARE_VIDEO_CODEC: &str = "h264_nvenc";
pub const DEFAULT_AUDIO_CODEC: &str = "aac";
pub const HARDWARE_PRESET: &str = "fast";
/// Slower but dependable; also used by the fallback attempt
pub const SOFTWARE_PRESET: &str = "medium";
pub const DEFAULT_CRF: u8 = 20;
pub const DEFAULT_AUDIO_BITRATE: &str = "192k";
pub const DEFAULT_THREADS: u32 = 4;

/// Codec, quality and audio settings for one encode attempt.
///
/// Missing fields deserialize to the software defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct EncodingConfig {
    pub codec: String,
    pub preset: String,
    /// Quality, 0-51, lower is better. Passed as `-crf`, or `-cq` on NVENC
    pub crf: u8,
    pub audio_codec: String,
    pub audio_bitrate: String,
    pub use_nvenc: bool,
    pub threads: u32,
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self {
            codec: SOFTWARE_VIDEO_CODEC.into(),
            preset: SOFTWARE_PRESET.into(),
            crf: DEFAULT_CRF,
            audio_codec: DEFAULT_AUDIO_CODEC.into(),
            audio_bitrate: DEFAULT_AUDIO_BITRATE.into(),
            use_nvenc: false,
            threads: DEFAULT_THREADS,
        }
    }
}

impl EncodingConfig {
    /// Software settings.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_crf(mut self, crf: u8) -> Self {
        self.crf = crf;
        self
    }

    /// Switch to NVENC with its faster preset.
    pub fn with_nvenc(self) -> Self {
        Self {
            codec: HARDWARE_VIDEO_CODEC.into(),
            preset: HARDWARE_PRESET.into(),
            use_nvenc: true,
            ..self
        }
    }

    pub fn with_hardware(self, enabled: bool) -> Self {
        if enabled {
            self.with_nvenc()
        } else {
            self.software_fallback()
        }
    }

    /// Same quality and audio settings on the software encoder.
    pub fn software_fallback(&self) -> Self {
        Self {
            codec: SOFTWARE_VIDEO_CODEC.into(),
            preset: SOFTWARE_PRESET.into(),
            use_nvenc: false,
            ..self.clone()
        }
    }

    fn quality_flag(&self) -> &'static str {
        if self.use_nvenc {
            "-cq"
        } else {
            "-crf"
        }
    }

    /// Output arguments for FFmpeg, video then audio.
    pub fn to_ffmpeg_args(&self) -> Vec<String> {
        [
            ("-c:v", self.codec.clone()),
            ("-preset", self.preset.clone()),
            (self.quality_flag(), self.crf.to_string()),
            ("-pix_fmt", "yuv420p".to_string()),
            ("-c:a", self.audio_codec.clone()),
            ("-b:a", self.audio_bitrate.clone()),
            ("-threads", self.threads.to_string()),
        ]
        .into_iter()
        .flat_map(|(flag, value)| [flag.to_string(), value])
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn value_after<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
        let i = args.iter().position(|a| a == flag)?;
        args.get(i + 1).map(String::as_str)
    }

    #[test]
    fn test_software_args() {
        let args = EncodingConfig::default().to_ffmpeg_args();
        assert_eq!(value_after(&args, "-c:v"), Some("libx264"));
        assert_eq!(value_after(&args, "-preset"), Some("medium"));
        assert_eq!(value_after(&args, "-crf"), Some("20"));
        assert_eq!(value_after(&args, "-c:a"), Some("aac"));
        assert_eq!(value_after(&args, "-pix_fmt"), Some("yuv420p"));
        assert!(!args.contains(&"-cq".to_string()));
    }

    #[test]
    fn test_nvenc_args_use_cq() {
        let args = EncodingConfig::default().with_nvenc().to_ffmpeg_args();
        assert_eq!(value_after(&args, "-c:v"), Some("h264_nvenc"));
        assert_eq!(value_after(&args, "-preset"), Some("fast"));
        assert_eq!(value_after(&args, "-cq"), Some("20"));
        assert!(!args.contains(&"-crf".to_string()));
    }

    #[test]
    fn test_software_fallback_keeps_quality_settings() {
        let hardware = EncodingConfig::default().with_nvenc().with_crf(23);
        let fallback = hardware.software_fallback();
        assert_eq!(fallback.codec, "libx264");
        assert_eq!(fallback.preset, "medium");
        assert!(!fallback.use_nvenc);
        assert_eq!(fallback.crf, 23);
        assert_eq!(EncodingConfig::new().with_hardware(false), EncodingConfig::new());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: EncodingConfig = serde_json::from_str(r#"{"crf": 18}"#).unwrap();
        assert_eq!(config.crf, 18);
        assert_eq!(config.codec, "libx264");
        assert_eq!(config.threads, 4);
    }
}
