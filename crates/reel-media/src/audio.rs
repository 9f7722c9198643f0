//! Narration and background music mixing.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::MediaResult;
use crate::probe::get_duration;

/// Default music bed volume relative to the narration.
pub const DEFAULT_MUSIC_VOLUME: f64 = 0.10;

/// Timeout for a single mix run.
const MIX_TIMEOUT_SECS: u64 = 300;

/// How many times the music must play back-to-back to cover `target` seconds.
pub fn loop_count(target: f64, music_duration: f64) -> u32 {
    if music_duration <= 0.0 || music_duration >= target {
        return 1;
    }
    (target / music_duration).floor() as u32 + 1
}

/// FFmpeg filter graph: trim the looped music to `target`, attenuate it and
/// sum it with the narration without renormalising.
pub fn mix_filter(target: f64, volume: f64) -> String {
    format!(
        "[1:a]atrim=0:{target:.3},asetpts=PTS-STARTPTS,volume={volume:.3}[bed];\
         [0:a][bed]amix=inputs=2:duration=first:dropout_transition=0:normalize=0[out]"
    )
}

/// Build the mix command for a music track that must play `loops` times.
pub fn mix_command(
    voice: &Path,
    music: &Path,
    loops: u32,
    target: f64,
    volume: f64,
    output: &Path,
) -> FfmpegCommand {
    FfmpegCommand::new(voice, output)
        .input(music)
        .stream_loop(loops.saturating_sub(1))
        .filter_complex(mix_filter(target, volume))
        .map("[out]")
        .output_duration(target)
        .audio_codec("pcm_s16le")
}

/// Mixes an optional music bed under the narration.
#[derive(Debug, Clone)]
pub struct AudioMixer {
    volume: f64,
}

impl Default for AudioMixer {
    fn default() -> Self {
        Self::new(DEFAULT_MUSIC_VOLUME)
    }
}

impl AudioMixer {
    pub fn new(volume: f64) -> Self {
        Self {
            volume: volume.clamp(0.0, 1.0),
        }
    }

    pub fn volume(&self) -> f64 {
        self.volume
    }

    /// Produce the final audio track.
    ///
    /// Without usable music the narration is returned as is. Otherwise the
    /// mix is written to `output` and that path is returned.
    pub async fn mix(
        &self,
        voice: &Path,
        music: Option<&Path>,
        target: f64,
        output: &Path,
    ) -> MediaResult<PathBuf> {
        let Some(music) = music else {
            return Ok(voice.to_path_buf());
        };

        if !music.exists() {
            warn!(path = %music.display(), "Music file not found, using narration only");
            return Ok(voice.to_path_buf());
        }

        let music_duration = match get_duration(music).await {
            Ok(duration) if duration > 0.0 => duration,
            Ok(_) => {
                warn!(path = %music.display(), "Music has no duration, using narration only");
                return Ok(voice.to_path_buf());
            }
            Err(e) => {
                warn!(
                    path = %music.display(),
                    error = %e,
                    "Music could not be read, using narration only"
                );
                return Ok(voice.to_path_buf());
            }
        };

        let loops = loop_count(target, music_duration);
        let cmd = mix_command(voice, music, loops, target, self.volume, output);

        if let Err(e) = FfmpegRunner::new()
            .with_timeout(MIX_TIMEOUT_SECS)
            .run(&cmd)
            .await
        {
            warn!(
                error = %e,
                stderr = e.stderr().unwrap_or_default(),
                "Music mix failed, using narration only"
            );
            return Ok(voice.to_path_buf());
        }

        info!(
            music = %music.display(),
            music_duration,
            loops,
            target,
            volume = self.volume,
            "Mixed music bed under narration"
        );

        Ok(output.to_path_buf())
    }
}
