//! External collaborators: script writing, speech synthesis, transcription.
//!
//! The pipeline only talks to these through the traits below; the default
//! implementations wrap Ollama and command-line tools.

pub mod script;
pub mod transcribe;
pub mod voice;

use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use reel_models::TranscriptSegment;

use crate::error::{PipelineError, PipelineResult};

pub use script::{OllamaScriptWriter, Script};
pub use transcribe::CommandTranscriber;
pub use voice::CommandVoiceSynthesizer;

/// Narration audio on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceTrack {
    pub path: PathBuf,
    /// Seconds
    pub duration: f64,
}

/// Writes the narration for a topic.
#[async_trait]
pub trait ScriptWriter: Send + Sync {
    async fn write(&self, topic: &str, niche: &str, target_duration: u32)
        -> PipelineResult<Script>;
}

/// Turns narration text into speech.
#[async_trait]
pub trait VoiceSynthesizer: Send + Sync {
    async fn synthesize(
        &self,
        text: &str,
        voice: &str,
        rate: &str,
        out: &Path,
    ) -> PipelineResult<VoiceTrack>;
}

/// Produces word-level timestamps for an audio file.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, audio: &Path) -> PipelineResult<Vec<TranscriptSegment>>;
}

/// Run an external tool to completion, failing on a non-zero exit.
pub(crate) async fn run_command(
    program: &str,
    args: &[String],
    timeout: Duration,
) -> PipelineResult<Output> {
    debug!("Running {} {}", program, args.join(" "));

    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| PipelineError::command_failed(program, format!("could not start: {e}")))?;

    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(output) => output?,
        Err(_) => {
            return Err(PipelineError::command_failed(
                program,
                format!("timed out after {} seconds", timeout.as_secs()),
            ))
        }
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let message = stderr
            .lines()
            .rev()
            .find(|line| !line.trim().is_empty())
            .unwrap_or("no error output")
            .to_string();
        return Err(PipelineError::command_failed(
            program,
            format!("{} ({})", message, output.status),
        ));
    }

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_command_missing_program() {
        let err = run_command("reel-no-such-tool", &[], Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::CommandFailed { ref command, .. } if command == "reel-no-such-tool"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_command_reports_last_stderr_line() {
        let args = vec![
            "-c".to_string(),
            "echo first >&2; echo 'real cause' >&2; exit 3".to_string(),
        ];
        let err = run_command("sh", &args, Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("real cause"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_command_timeout() {
        let args = vec!["-c".to_string(), "sleep 5".to_string()];
        let err = run_command("sh", &args, Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }
}
