//! Speech synthesis through an external TTS command.
//!
//! Narration is split at dramatic pauses (runs of three or more dots). Each
//! segment is spoken separately and the pieces are joined with a fixed
//! silence; a narration without pauses is spoken in one go.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use tracing::{debug, info};

use reel_media::{get_duration, FfmpegCommand, FfmpegRunner};

use super::{run_command, VoiceSynthesizer, VoiceTrack};
use crate::error::{PipelineError, PipelineResult};
use crate::metrics::record_voice_segments;

/// Silence inserted between narration segments.
pub const PAUSE_SECS: f64 = 0.7;

/// Sample rate every segment is normalised to before joining.
const SAMPLE_RATE: u32 = 24_000;

const TTS_TIMEOUT: Duration = Duration::from_secs(120);
const JOIN_TIMEOUT_SECS: u64 = 120;

static PAUSE_MARK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\.{3,}").unwrap());

/// Narration pieces between pause marks, trimmed, empties dropped.
pub fn split_segments(text: &str) -> Vec<String> {
    PAUSE_MARK
        .split(text)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Filter graph joining `count` inputs with `pause` seconds of silence.
pub fn join_filter(count: usize, pause: f64) -> String {
    let mut graph = String::new();
    for i in 0..count {
        graph.push_str(&format!(
            "[{i}:a]aformat=sample_rates={SAMPLE_RATE}:channel_layouts=mono"
        ));
        if i + 1 < count {
            graph.push_str(&format!(",apad=pad_dur={pause:.3}"));
        }
        graph.push_str(&format!("[a{i}];"));
    }
    for i in 0..count {
        graph.push_str(&format!("[a{i}]"));
    }
    graph.push_str(&format!("concat=n={count}:v=0:a=1[out]"));
    graph
}

/// Build the FFmpeg command that writes `inputs` to `output` as one WAV.
pub fn join_command(inputs: &[PathBuf], output: &Path, pause: f64) -> Option<FfmpegCommand> {
    let (first, rest) = inputs.split_first()?;
    let cmd = rest
        .iter()
        .fold(FfmpegCommand::new(first, output), |cmd, input| cmd.input(input))
        .filter_complex(join_filter(inputs.len(), pause))
        .map("[out]")
        .audio_codec("pcm_s16le");
    Some(cmd)
}

/// Runs an `edge-tts` compatible command per segment.
#[derive(Debug, Clone)]
pub struct CommandVoiceSynthesizer {
    program: String,
}

impl CommandVoiceSynthesizer {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Arguments for speaking `text` into `out`.
    pub fn tts_args(text: &str, voice: &str, rate: &str, out: &Path) -> Vec<String> {
        vec![
            format!("--voice={voice}"),
            format!("--rate={rate}"),
            format!("--text={text}"),
            "--write-media".to_string(),
            out.to_string_lossy().to_string(),
        ]
    }

    async fn speak(&self, text: &str, voice: &str, rate: &str, out: &Path) -> PipelineResult<()> {
        run_command(&self.program, &Self::tts_args(text, voice, rate, out), TTS_TIMEOUT)
            .await
            .map_err(|e| PipelineError::voice_failed(e.to_string()))?;
        if !out.exists() {
            return Err(PipelineError::voice_failed(format!(
                "{} produced no audio at {}",
                self.program,
                out.display()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl VoiceSynthesizer for CommandVoiceSynthesizer {
    async fn synthesize(
        &self,
        text: &str,
        voice: &str,
        rate: &str,
        out: &Path,
    ) -> PipelineResult<VoiceTrack> {
        let work = tempfile::Builder::new().prefix("reel-voice").tempdir()?;
        let segments = split_segments(text);

        let pieces: Vec<PathBuf> = if segments.len() <= 1 {
            let piece = work.path().join("voice_seg_0.mp3");
            self.speak(text.trim(), voice, rate, &piece).await?;
            vec![piece]
        } else {
            let mut pieces = Vec::with_capacity(segments.len());
            for (i, segment) in segments.iter().enumerate() {
                let piece = work.path().join(format!("voice_seg_{i}.mp3"));
                debug!(segment = i, chars = segment.len(), "Synthesizing segment");
                self.speak(segment, voice, rate, &piece).await?;
                pieces.push(piece);
            }
            pieces
        };
        record_voice_segments(pieces.len());

        let pause = if pieces.len() > 1 { PAUSE_SECS } else { 0.0 };
        let cmd = join_command(&pieces, out, pause)
            .ok_or_else(|| PipelineError::voice_failed("narration is empty"))?;
        FfmpegRunner::new()
            .with_timeout(JOIN_TIMEOUT_SECS)
            .run(&cmd)
            .await?;

        let duration = get_duration(out).await?;
        info!(
            segments = pieces.len(),
            duration,
            path = %out.display(),
            "Voiceover ready"
        );
        Ok(VoiceTrack {
            path: out.to_path_buf(),
            duration,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_segments() {
        assert_eq!(
            split_segments("They vanished... Nobody knows why..... The end."),
            vec!["They vanished", "Nobody knows why", "The end."]
        );
        assert_eq!(split_segments("No pauses. Just two dots.."), vec!["No pauses. Just two dots.."]);
        assert!(split_segments("...  ...").is_empty());
    }

    #[test]
    fn test_join_filter() {
        assert_eq!(
            join_filter(2, 0.7),
            "[0:a]aformat=sample_rates=24000:channel_layouts=mono,apad=pad_dur=0.700[a0];\
             [1:a]aformat=sample_rates=24000:channel_layouts=mono[a1];\
             [a0][a1]concat=n=2:v=0:a=1[out]"
        );
        assert_eq!(
            join_filter(1, 0.0),
            "[0:a]aformat=sample_rates=24000:channel_layouts=mono[a0];[a0]concat=n=1:v=0:a=1[out]"
        );
    }

    #[test]
    fn test_join_command() {
        let inputs = vec![PathBuf::from("/w/a.mp3"), PathBuf::from("/w/b.mp3")];
        let args = join_command(&inputs, Path::new("/w/voice.wav"), PAUSE_SECS)
            .unwrap()
            .build_args();
        let inputs: Vec<&String> = args
            .iter()
            .zip(args.iter().skip(1))
            .filter(|(flag, _)| *flag == "-i")
            .map(|(_, value)| value)
            .collect();
        assert_eq!(inputs, vec!["/w/a.mp3", "/w/b.mp3"]);
        assert!(args.contains(&"pcm_s16le".to_string()));
        assert_eq!(args.last().unwrap(), "/w/voice.wav");

        assert!(join_command(&[], Path::new("/w/voice.wav"), PAUSE_SECS).is_none());
    }

    #[test]
    fn test_tts_args() {
        let args = CommandVoiceSynthesizer::tts_args(
            "Hello there",
            "en-US-ChristopherNeural",
            "-10%",
            Path::new("/tmp/out.mp3"),
        );
        assert_eq!(
            args,
            vec![
                "--voice=en-US-ChristopherNeural",
                "--rate=-10%",
                "--text=Hello there",
                "--write-media",
                "/tmp/out.mp3"
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_tts_program_is_voice_error() {
        let synth = CommandVoiceSynthesizer::new("reel-missing-tts");
        let dir = tempfile::tempdir().unwrap();
        let err = synth
            .synthesize("Hello", "v", "+0%", &dir.path().join("voice.wav"))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::VoiceFailed(_)));
    }
}
