//! FFmpeg command builder and runner.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use reel_models::VideoFormat;

use crate::error::{MediaError, MediaResult};
use crate::progress::{ProgressCallback, ProgressParser};

/// Number of non-progress stderr lines kept for error reports.
const STDERR_TAIL_LINES: usize = 20;

/// Pipe target for stdin/stdout.
pub const PIPE: &str = "-";

/// One `-i` input with its own leading arguments.
#[derive(Debug, Clone)]
struct FfmpegInput {
    args: Vec<String>,
    source: String,
}

/// One FFmpeg invocation: any number of inputs, one output.
///
/// Either end may be [`PIPE`], in which case the process exchanges raw
/// frames with us over stdin or stdout.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    inputs: Vec<FfmpegInput>,
    output: PathBuf,
    output_args: Vec<String>,
    overwrite: bool,
    log_level: String,
}

impl FfmpegCommand {
    /// Command reading `input` and writing `output`.
    pub fn new(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Self {
            inputs: vec![FfmpegInput {
                args: Vec::new(),
                source: input.as_ref().to_string_lossy().to_string(),
            }],
            output: output.as_ref().to_path_buf(),
            output_args: Vec::new(),
            overwrite: true,
            log_level: "error".to_string(),
        }
    }

    /// Create a command whose first input is raw RGB24 frames on stdin.
    pub fn raw_frames_in(format: &VideoFormat, output: impl AsRef<Path>) -> Self {
        Self::new(PIPE, output).input_args([
            "-f".to_string(),
            "rawvideo".to_string(),
            "-pix_fmt".to_string(),
            "rgb24".to_string(),
            "-s".to_string(),
            format.size_arg(),
            "-r".to_string(),
            format.fps.to_string(),
        ])
    }

    /// Append another input.
    pub fn input(mut self, input: impl AsRef<Path>) -> Self {
        self.inputs.push(FfmpegInput {
            args: Vec::new(),
            source: input.as_ref().to_string_lossy().to_string(),
        });
        self
    }

    /// Add an argument placed before the most recently added input's `-i`.
    pub fn input_arg(mut self, arg: impl Into<String>) -> Self {
        if let Some(last) = self.inputs.last_mut() {
            last.args.push(arg.into());
        }
        self
    }

    /// Add multiple input arguments to the most recently added input.
    pub fn input_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if let Some(last) = self.inputs.last_mut() {
            last.args.extend(args.into_iter().map(Into::into));
        }
        self
    }

    /// Append an argument after all inputs.
    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    pub fn output_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Start reading the latest input at `seconds`.
    pub fn seek(self, seconds: f64) -> Self {
        self.input_arg("-ss").input_arg(format!("{:.3}", seconds))
    }

    /// Limit how much of the latest input is read.
    pub fn duration(self, seconds: f64) -> Self {
        self.input_arg("-t").input_arg(format!("{:.3}", seconds))
    }

    /// Loop the latest input `count` extra times.
    pub fn stream_loop(self, count: u32) -> Self {
        self.input_arg("-stream_loop").input_arg(count.to_string())
    }

    /// Cap the output duration.
    pub fn output_duration(self, seconds: f64) -> Self {
        self.output_arg("-t").output_arg(format!("{:.3}", seconds))
    }

    pub fn video_filter(self, filter: impl Into<String>) -> Self {
        self.output_arg("-vf").output_arg(filter)
    }

    pub fn filter_complex(self, filter: impl Into<String>) -> Self {
        self.output_arg("-filter_complex").output_arg(filter)
    }

    /// Map a stream or filter label into the output.
    pub fn map(self, spec: impl Into<String>) -> Self {
        self.output_arg("-map").output_arg(spec)
    }

    pub fn frame_rate(self, fps: u32) -> Self {
        self.output_arg("-r").output_arg(fps.to_string())
    }

    pub fn audio_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:a").output_arg(codec)
    }

    /// Emit raw RGB24 frames (used with a `-` output).
    pub fn raw_frames_out(self) -> Self {
        self.output_args(["-pix_fmt", "rgb24", "-f", "rawvideo"])
    }

    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Full argument list: global flags, each input with its own leading
    /// arguments, output arguments, then the output path.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = Vec::with_capacity(8 + self.output_args.len());
        if self.overwrite {
            args.push("-y".to_string());
        }
        args.extend(["-v".to_string(), self.log_level.clone()]);
        args.extend(["-progress".to_string(), "pipe:2".to_string()]);

        for input in &self.inputs {
            args.extend(input.args.iter().cloned());
            args.extend(["-i".to_string(), input.source.clone()]);
        }

        args.extend(self.output_args.iter().cloned());
        args.push(self.output.to_string_lossy().to_string());
        args
    }

    fn reads_stdin(&self) -> bool {
        self.inputs.iter().any(|input| input.source == PIPE)
    }

    fn writes_stdout(&self) -> bool {
        self.output.as_os_str() == PIPE
    }
}

/// Spawns FFmpeg commands, optionally bounded by a timeout.
pub struct FfmpegRunner {
    timeout_secs: Option<u64>,
}

impl Default for FfmpegRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl FfmpegRunner {
    pub fn new() -> Self {
        Self { timeout_secs: None }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    /// Run an FFmpeg command to completion.
    pub async fn run(&self, cmd: &FfmpegCommand) -> MediaResult<()> {
        let process = self.spawn(cmd, None)?;

        match self.timeout_secs {
            Some(secs) => {
                match tokio::time::timeout(std::time::Duration::from_secs(secs), process.finish())
                    .await
                {
                    Ok(result) => result,
                    Err(_) => {
                        // kill_on_drop reaps the child once the future is dropped
                        warn!("FFmpeg timed out after {} seconds, killing process", secs);
                        Err(MediaError::Timeout(secs))
                    }
                }
            }
            None => process.finish().await,
        }
    }

    /// Spawn an FFmpeg process with piped stdin/stdout as the command requires.
    pub fn spawn(
        &self,
        cmd: &FfmpegCommand,
        progress: Option<ProgressCallback>,
    ) -> MediaResult<FfmpegProcess> {
        check_ffmpeg()?;

        let args = cmd.build_args();
        debug!("Running FFmpeg: ffmpeg {}", args.join(" "));

        let mut child = Command::new("ffmpeg")
            .args(&args)
            .stdin(if cmd.reads_stdin() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(if cmd.writes_stdout() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| MediaError::internal("FFmpeg stderr not captured"))?;

        let stderr_task = tokio::spawn(async move {
            let mut reader = BufReader::new(stderr).lines();
            let mut parser = ProgressParser::new();
            let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);

            while let Ok(Some(line)) = reader.next_line().await {
                if ProgressParser::is_progress_line(&line) {
                    if let (Some(snapshot), Some(callback)) = (parser.feed(&line), progress.as_ref()) {
                        callback(&snapshot);
                    }
                    continue;
                }
                if tail.len() == STDERR_TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(line);
            }

            tail.into_iter().collect::<Vec<_>>().join("\n")
        });

        Ok(FfmpegProcess {
            child,
            stdin,
            stdout,
            stderr_task: Some(stderr_task),
        })
    }
}

/// A running FFmpeg child process.
///
/// The child is killed if this value is dropped before [`FfmpegProcess::finish`].
pub struct FfmpegProcess {
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: Option<ChildStdout>,
    stderr_task: Option<JoinHandle<String>>,
}

impl FfmpegProcess {
    /// Write raw bytes (one frame) to stdin.
    pub async fn write_frame(&mut self, data: &[u8]) -> MediaResult<()> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| MediaError::internal("FFmpeg stdin is not piped"))?;
        stdin.write_all(data).await?;
        Ok(())
    }

    /// Fill `buf` with the next frame from stdout.
    ///
    /// Returns `false` at end of stream (a trailing partial frame is discarded).
    pub async fn read_frame(&mut self, buf: &mut [u8]) -> MediaResult<bool> {
        let stdout = self
            .stdout
            .as_mut()
            .ok_or_else(|| MediaError::internal("FFmpeg stdout is not piped"))?;
        match stdout.read_exact(buf).await {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Close stdin, wait for exit, and report failures with captured stderr.
    pub async fn finish(mut self) -> MediaResult<()> {
        if let Some(mut stdin) = self.stdin.take() {
            // A broken pipe here means FFmpeg already exited; its status tells us why.
            let _ = stdin.shutdown().await;
        }
        // Unread output would block the child on a full pipe.
        self.stdout.take();

        let status = self.child.wait().await?;
        let stderr = self.collect_stderr().await;

        if status.success() {
            Ok(())
        } else {
            Err(MediaError::ffmpeg_failed(
                "FFmpeg exited with non-zero status",
                stderr,
                status.code(),
            ))
        }
    }

    /// Kill the process and reap it.
    pub async fn kill(mut self) -> MediaResult<()> {
        self.stdin.take();
        self.stdout.take();
        if let Err(e) = self.child.kill().await {
            debug!("FFmpeg kill failed (already exited?): {}", e);
        }
        self.collect_stderr().await;
        Ok(())
    }

    async fn collect_stderr(&mut self) -> Option<String> {
        let task = self.stderr_task.take()?;
        match task.await {
            Ok(text) if !text.trim().is_empty() => Some(text),
            _ => None,
        }
    }
}

/// Check if FFmpeg is available.
pub fn check_ffmpeg() -> MediaResult<PathBuf> {
    which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)
}

/// Check if FFprobe is available.
pub fn check_ffprobe() -> MediaResult<PathBuf> {
    which::which("ffprobe").map_err(|_| MediaError::FfprobeNotFound)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_builder() {
        let cmd = FfmpegCommand::new("input.mp4", "output.mp4")
            .seek(10.0)
            .duration(30.0)
            .output_args(["-c:v", "libx264"]);

        let args = cmd.build_args();
        assert!(args.contains(&"-ss".to_string()));
        assert!(args.contains(&"10.000".to_string()));
        assert!(args.contains(&"-c:v".to_string()));
        assert_eq!(args.last().unwrap(), "output.mp4");
    }

    #[test]
    fn test_input_args_attach_to_latest_input() {
        let cmd = FfmpegCommand::new("voice.wav", "mix.wav")
            .input("music.mp3")
            .stream_loop(3);

        let args = cmd.build_args();
        let voice = args.iter().position(|a| a == "voice.wav").unwrap();
        let loop_flag = args.iter().position(|a| a == "-stream_loop").unwrap();
        let music = args.iter().position(|a| a == "music.mp3").unwrap();
        assert!(voice < loop_flag && loop_flag < music);
        assert_eq!(args[loop_flag + 1], "3");
    }

    #[test]
    fn test_raw_frames_in_declares_geometry() {
        let format = VideoFormat::new(720, 1280, 25);
        let cmd = FfmpegCommand::raw_frames_in(&format, "out.mp4").input("audio.wav");
        assert!(cmd.reads_stdin());
        assert!(!cmd.writes_stdout());

        let args = cmd.build_args();
        let size = args.iter().position(|a| a == "-s").unwrap();
        assert_eq!(args[size + 1], "720x1280");
        let first_input = args.iter().position(|a| a == "-i").unwrap();
        assert_eq!(args[first_input + 1], "-");
        assert!(size < first_input);
    }

    #[test]
    fn test_raw_frames_out_targets_stdout() {
        let cmd = FfmpegCommand::new("clip.mp4", PIPE).raw_frames_out();
        assert!(cmd.writes_stdout());
        assert!(!cmd.reads_stdin());
    }
}
