//! Final video assembly.
//!
//! Builds the timeline from the sourced clips, samples Ken Burns motion per
//! span, overlays captions, mixes the audio and hands the frame stream to
//! the encoder. Everything visual is lazy: frames are produced only as the
//! encoder asks for them.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::info;

use reel_media::timeline::DEFAULT_TRANSITION_SECS;
use reel_media::{
    build_timeline, AudioMixer, CaptionFont, CaptionOverlay, CaptionRenderer, DecoderOpener,
    Encoder, MediaResult, TimelineTrack,
};
use reel_models::{
    CaptionStyle, EncodingConfig, Timeline, VideoClip, VideoFormat, WordTimestamp,
};

use crate::collaborators::VoiceTrack;
use crate::error::PipelineResult;

/// Name of the mixed audio track inside the run's work directory.
const MIXED_AUDIO_FILE: &str = "mixed_audio.wav";

/// Assembles sourced footage, narration and captions into the final video.
#[derive(Debug, Clone)]
pub struct Assembler {
    format: VideoFormat,
    captions: CaptionStyle,
    encoding: EncodingConfig,
    mixer: AudioMixer,
    transition: f64,
    seed: Option<u64>,
}

impl Assembler {
    pub fn new(format: VideoFormat, captions: CaptionStyle, encoding: EncodingConfig) -> Self {
        Self {
            format,
            captions,
            encoding,
            mixer: AudioMixer::default(),
            transition: DEFAULT_TRANSITION_SECS,
            seed: None,
        }
    }

    pub fn with_music_volume(mut self, volume: f64) -> Self {
        self.mixer = AudioMixer::new(volume);
        self
    }

    pub fn with_transition(mut self, seconds: f64) -> Self {
        self.transition = seconds.max(0.0);
        self
    }

    /// Fix the motion RNG seed so renders are reproducible.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Sample per-span motion, seeded when a seed is configured.
    pub fn sample_motion(&self, timeline: &Timeline) -> DecoderOpener {
        match self.seed {
            Some(seed) => DecoderOpener::sample(timeline, &mut StdRng::seed_from_u64(seed)),
            None => DecoderOpener::sample(timeline, &mut rand::rng()),
        }
    }

    /// Render the final video to `output`. The narration's duration is the
    /// target for every track.
    pub async fn assemble(
        &self,
        clips: &[VideoClip],
        voice: &VoiceTrack,
        words: &[WordTimestamp],
        music: Option<&Path>,
        work_dir: &Path,
        output: &Path,
    ) -> PipelineResult<PathBuf> {
        let target = voice.duration;
        let clips: Vec<Arc<VideoClip>> = clips.iter().cloned().map(Arc::new).collect();
        let timeline = build_timeline(&clips, target)?;
        let opener = self.sample_motion(&timeline);

        let font = CaptionFont::load(self.captions.font_path.as_deref(), self.captions.font_size);
        info!(
            spans = timeline.len(),
            words = words.len(),
            bitmap_font = font.is_bitmap(),
            target,
            "Assembling video"
        );

        let audio = self
            .mixer
            .mix(&voice.path, music, target, &work_dir.join(MIXED_AUDIO_FILE))
            .await?;

        // One fresh stream per encode attempt
        let open = || -> MediaResult<CaptionOverlay<TimelineTrack>> {
            let track = TimelineTrack::new(timeline.clone(), self.format, Box::new(opener.clone()))
                .with_transition(self.transition);
            let renderer =
                CaptionRenderer::with_font(words, self.captions.clone(), font.clone());
            Ok(CaptionOverlay::new(track, renderer))
        };

        let encoder = Encoder::new(self.encoding.clone(), self.format);
        let path = encoder.encode(open, &audio, target, output).await?;
        Ok(path)
    }
}
