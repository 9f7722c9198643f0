//! Word-level transcription through the `whisper` command line.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

use reel_models::TranscriptSegment;

use super::{run_command, Transcriber};
use crate::error::{PipelineError, PipelineResult};
use crate::metrics::record_transcribed_words;

const TRANSCRIBE_TIMEOUT: Duration = Duration::from_secs(600);

#[derive(Debug, Deserialize)]
struct WhisperOutput {
    #[serde(default)]
    segments: Vec<TranscriptSegment>,
}

/// Parse whisper's JSON output, trimming the padding whisper leaves around
/// each word.
pub fn parse_whisper_json(raw: &str) -> PipelineResult<Vec<TranscriptSegment>> {
    let output: WhisperOutput = serde_json::from_str(raw)?;
    Ok(output
        .segments
        .into_iter()
        .map(|mut segment| {
            for word in &mut segment.words {
                word.word = word.word.trim().to_string();
            }
            segment
        })
        .collect())
}

/// Runs a whisper-compatible CLI and reads its JSON transcript.
#[derive(Debug, Clone)]
pub struct CommandTranscriber {
    program: String,
    model: String,
    language: String,
}

impl CommandTranscriber {
    pub fn new(program: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            model: model.into(),
            language: "en".to_string(),
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn args(&self, audio: &Path, output_dir: &Path) -> Vec<String> {
        vec![
            audio.to_string_lossy().to_string(),
            "--model".to_string(),
            self.model.clone(),
            "--word_timestamps".to_string(),
            "True".to_string(),
            "--output_format".to_string(),
            "json".to_string(),
            "--output_dir".to_string(),
            output_dir.to_string_lossy().to_string(),
            "--language".to_string(),
            self.language.clone(),
        ]
    }

    /// Where whisper writes the transcript for `audio`.
    pub fn output_file(audio: &Path, output_dir: &Path) -> PathBuf {
        let stem = audio
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "audio".to_string());
        output_dir.join(format!("{stem}.json"))
    }
}

#[async_trait]
impl Transcriber for CommandTranscriber {
    async fn transcribe(&self, audio: &Path) -> PipelineResult<Vec<TranscriptSegment>> {
        let out_dir = tempfile::Builder::new().prefix("reel-stt").tempdir()?;
        run_command(&self.program, &self.args(audio, out_dir.path()), TRANSCRIBE_TIMEOUT)
            .await
            .map_err(|e| PipelineError::transcription_failed(e.to_string()))?;

        let path = Self::output_file(audio, out_dir.path());
        let raw = tokio::fs::read_to_string(&path).await.map_err(|e| {
            PipelineError::transcription_failed(format!(
                "no transcript at {}: {}",
                path.display(),
                e
            ))
        })?;

        let segments = parse_whisper_json(&raw)?;
        let words = TranscriptSegment::flatten(&segments).len();
        record_transcribed_words(words);
        info!(segments = segments.len(), words, "Transcription ready");
        Ok(segments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reel_models::WordTimestamp;

    #[test]
    fn test_parse_whisper_json() {
        let raw = r#"{
            "text": " Cold night. Gone.",
            "language": "en",
            "segments": [
                {"id": 0, "start": 0.0, "end": 1.2, "text": " Cold night.",
                 "words": [
                    {"word": " Cold", "start": 0.0, "end": 0.4, "probability": 0.9},
                    {"word": " night.", "start": 0.4, "end": 1.2, "probability": 0.8}
                 ]},
                {"id": 1, "start": 1.5, "end": 2.0, "text": " Gone.",
                 "words": [{"word": " Gone.", "start": 1.5, "end": 2.0}]},
                {"id": 2, "start": 2.0, "end": 2.1, "text": ""}
            ]
        }"#;

        let segments = parse_whisper_json(raw).unwrap();
        assert_eq!(segments.len(), 3);
        assert!(segments[2].words.is_empty());
        assert_eq!(
            TranscriptSegment::flatten(&segments),
            vec![
                WordTimestamp::new("Cold", 0.0, 0.4),
                WordTimestamp::new("night.", 0.4, 1.2),
                WordTimestamp::new("Gone.", 1.5, 2.0),
            ]
        );
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            parse_whisper_json("not json"),
            Err(PipelineError::Json(_))
        ));
        assert!(parse_whisper_json("{}").unwrap().is_empty());
    }

    #[test]
    fn test_args_and_output_file() {
        let stt = CommandTranscriber::new("whisper", "base");
        let args = stt.args(Path::new("/w/voiceover.wav"), Path::new("/w/stt"));
        assert_eq!(
            args.join(" "),
            "/w/voiceover.wav --model base --word_timestamps True --output_format json \
             --output_dir /w/stt --language en"
        );
        assert_eq!(
            CommandTranscriber::output_file(Path::new("/w/voiceover.wav"), Path::new("/w/stt")),
            PathBuf::from("/w/stt/voiceover.json")
        );
    }

    #[tokio::test]
    async fn test_missing_program_is_transcription_error() {
        let stt = CommandTranscriber::new("reel-missing-stt", "base");
        let err = stt.transcribe(Path::new("/nonexistent/voice.wav")).await.unwrap_err();
        assert!(matches!(err, PipelineError::TranscriptionFailed(_)));
    }
}
