//! Final encode with hardware-to-software fallback.
//!
//! Frames are pulled from a [`FrameSource`] at `t = i / fps` and piped into
//! FFmpeg as raw RGB24, muxed with the mixed audio track. A hardware attempt
//! that fails for any reason is retried once with the software encoder on a
//! freshly opened frame stream. Output is written beside the destination and
//! renamed into place only on success; an abandoned encode removes its
//! partial file.

use std::path::{Path, PathBuf};
use std::time::Instant;

use async_trait::async_trait;
use metrics::{counter, histogram};
use tracing::{debug, info, warn};

use reel_models::{EncodingConfig, VideoFormat};

use crate::command::{FfmpegCommand, FfmpegProcess, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::frame::FrameSource;
use crate::fs_utils::{remove_if_exists, StagingFile};
use crate::progress::{FfmpegProgress, ProgressCallback};

/// Build the encode command for one attempt.
pub fn encode_command(
    format: &VideoFormat,
    config: &EncodingConfig,
    audio: &Path,
    duration: f64,
    output: &Path,
) -> FfmpegCommand {
    FfmpegCommand::raw_frames_in(format, output)
        .input(audio)
        .map("0:v:0")
        .map("1:a:0")
        .output_args(config.to_ffmpeg_args())
        .frame_rate(format.fps)
        .output_duration(duration)
        .output_args(["-movflags", "+faststart"])
}

/// One encode attempt writing to `output` with `config`.
#[async_trait]
trait EncodeAttempt: Send {
    async fn attempt(&mut self, config: &EncodingConfig, output: &Path) -> MediaResult<()>;
}

/// Encodes a frame stream and an audio track into the final video.
#[derive(Debug, Clone)]
pub struct Encoder {
    config: EncodingConfig,
    format: VideoFormat,
}

impl Encoder {
    pub fn new(config: EncodingConfig, format: VideoFormat) -> Self {
        Self { config, format }
    }

    /// Configurations tried in order.
    pub fn attempt_plan(&self) -> Vec<EncodingConfig> {
        if self.config.use_nvenc {
            vec![self.config.clone(), self.config.software_fallback()]
        } else {
            vec![self.config.clone()]
        }
    }

    /// Encode `duration` seconds of video to `output`.
    ///
    /// `open` is called once per attempt and must return a fresh stream
    /// positioned at the start; frame streams cannot be rewound.
    pub async fn encode<F, S>(
        &self,
        open: F,
        audio: &Path,
        duration: f64,
        output: &Path,
    ) -> MediaResult<PathBuf>
    where
        F: FnMut() -> MediaResult<S> + Send,
        S: FrameSource + 'static,
    {
        let mut attempt = FfmpegAttempt {
            open,
            audio: audio.to_path_buf(),
            format: self.format,
            duration,
        };
        self.run_attempts(&mut attempt, output).await
    }

    async fn run_attempts(
        &self,
        runner: &mut dyn EncodeAttempt,
        output: &Path,
    ) -> MediaResult<PathBuf> {
        let staging = StagingFile::for_output(output);
        let plan = self.attempt_plan();
        let mut failures = Vec::new();

        for (index, config) in plan.iter().enumerate() {
            info!(
                codec = %config.codec,
                preset = %config.preset,
                attempt = index + 1,
                output = %output.display(),
                "Encoding video"
            );
            let started = Instant::now();

            match runner.attempt(config, staging.path()).await {
                Ok(()) => {
                    staging.commit(output).await?;
                    let elapsed = started.elapsed().as_secs_f64();
                    counter!("reel_encodes_total", "codec" => config.codec.clone(), "outcome" => "success")
                        .increment(1);
                    histogram!("reel_encode_duration_seconds", "codec" => config.codec.clone())
                        .record(elapsed);
                    info!(
                        codec = %config.codec,
                        elapsed_secs = elapsed,
                        output = %output.display(),
                        "Encoding complete"
                    );
                    return Ok(output.to_path_buf());
                }
                Err(e) => {
                    remove_if_exists(staging.path()).await;
                    counter!("reel_encodes_total", "codec" => config.codec.clone(), "outcome" => "failure")
                        .increment(1);
                    warn!(
                        codec = %config.codec,
                        error = %e,
                        stderr = e.stderr().unwrap_or_default(),
                        "Encoding attempt failed"
                    );
                    // another codec cannot fix a broken frame source
                    if e.is_input_error() {
                        return Err(e);
                    }
                    failures.push(format!("{}: {}", config.codec, e));

                    if let Some(next) = plan.get(index + 1) {
                        counter!("reel_encoder_fallbacks_total").increment(1);
                        warn!(
                            from = %config.codec,
                            to = %next.codec,
                            "Falling back to software encoder"
                        );
                    }
                }
            }
        }

        Err(MediaError::encoding_failed(failures.join("; ")))
    }
}

/// Real attempt: open a stream, spawn FFmpeg and pump every frame into it.
struct FfmpegAttempt<F> {
    open: F,
    audio: PathBuf,
    format: VideoFormat,
    duration: f64,
}

#[async_trait]
impl<F, S> EncodeAttempt for FfmpegAttempt<F>
where
    F: FnMut() -> MediaResult<S> + Send,
    S: FrameSource + 'static,
{
    async fn attempt(&mut self, config: &EncodingConfig, output: &Path) -> MediaResult<()> {
        let mut source = (self.open)()?;
        let cmd = encode_command(&self.format, config, &self.audio, self.duration, output);

        let duration = self.duration;
        let progress: ProgressCallback = Box::new(move |p: &FfmpegProgress| {
            debug!(
                frame = p.frame,
                percent = p.fraction(duration) * 100.0,
                speed = ?p.speed,
                "Encoding progress"
            );
        });

        let mut process = match FfmpegRunner::new().spawn(&cmd, Some(progress)) {
            Ok(process) => process,
            Err(e) => {
                close_quietly(&mut source).await;
                return Err(e);
            }
        };

        let pumped = pump_frames(&mut source, &mut process, &self.format, self.duration).await;
        close_quietly(&mut source).await;

        match pumped {
            Ok(frames) => {
                process.finish().await?;
                debug!(frames, "All frames written");
                Ok(())
            }
            // A broken pipe means FFmpeg died; its exit status says why
            Err(MediaError::Io(io)) => match process.finish().await {
                Err(ffmpeg) => Err(ffmpeg),
                Ok(()) => Err(MediaError::Io(io)),
            },
            Err(e) => {
                process.kill().await?;
                Err(e)
            }
        }
    }
}

async fn close_quietly<S: FrameSource>(source: &mut S) {
    if let Err(e) = source.close().await {
        warn!(error = %e, "Failed to close frame source");
    }
}

/// Write frames `0..round(duration * fps)` to the encoder's stdin.
async fn pump_frames<S: FrameSource>(
    source: &mut S,
    process: &mut FfmpegProcess,
    format: &VideoFormat,
    duration: f64,
) -> MediaResult<u64> {
    let total = format.frame_count(duration);
    for index in 0..total {
        let frame = source.frame_at(format.frame_time(index)).await?;
        if frame.dimensions() != (format.width, format.height) {
            return Err(MediaError::internal(format!(
                "frame {index} is {}x{}, expected {}",
                frame.width(),
                frame.height(),
                format.size_arg()
            )));
        }
        process.write_frame(frame.as_raw()).await?;
    }
    Ok(total)
}
