//! Timeline building and the composed visual track.
//!
//! [`build_timeline`] trims and loops sourced clips so their spans add up to
//! the narration length exactly. [`TimelineTrack`] then plays those spans back
//! as one continuous [`FrameSource`], opening one decoder per span as playback
//! reaches it.

use std::sync::Arc;

use async_trait::async_trait;
use rand::Rng;
use tracing::{debug, info};

use reel_models::{Timeline, TimelineSpan, VideoClip, VideoFormat};

use crate::error::{MediaError, MediaResult};
use crate::frame::{blend_frames, ClipDecoder, Frame, FrameSource};
use crate::motion::{KenBurns, KenBurnsParams};

/// Longest slice taken from a clip on the first pass.
pub const MAX_SPAN_SECS: f64 = 8.0;
/// First-pass spans shorter than this end the pass.
pub const MIN_SPAN_SECS: f64 = 0.5;
/// Default crossfade window between adjacent spans.
pub const DEFAULT_TRANSITION_SECS: f64 = 0.25;

const EPSILON: f64 = 1e-9;

/// Arrange `clips` into spans covering exactly `target` seconds.
///
/// The first pass takes up to [`MAX_SPAN_SECS`] from each clip in order. If
/// that falls short, the clips used so far are replayed from their start,
/// each contributing as much of its native length as is still missing.
pub fn build_timeline(clips: &[Arc<VideoClip>], target: f64) -> MediaResult<Timeline> {
    if target.is_nan() || target <= 0.0 {
        return Err(MediaError::invalid_video(format!(
            "target duration must be positive, got {target}"
        )));
    }

    let mut spans = Vec::new();
    let mut remaining = target;

    for clip in clips {
        if remaining <= EPSILON {
            break;
        }
        let take = clip.duration.min(remaining).min(MAX_SPAN_SECS);
        if take < MIN_SPAN_SECS {
            debug!(
                path = %clip.path.display(),
                take,
                "Span below minimum length, ending first pass"
            );
            break;
        }
        spans.push(TimelineSpan::new(clip.clone(), 0.0, take));
        remaining -= take;
    }

    if spans.is_empty() {
        return Err(MediaError::NoUsableClips(format!(
            "none of {} clips yields a span of at least {MIN_SPAN_SECS}s",
            clips.len()
        )));
    }

    let first_pass: Vec<Arc<VideoClip>> = spans.iter().map(|s| s.clip.clone()).collect();
    let mut loops = 0;

    while remaining > EPSILON {
        let mut progressed = false;
        for clip in &first_pass {
            if remaining <= EPSILON {
                break;
            }
            let take = clip.duration.min(remaining);
            if take <= 0.0 {
                continue;
            }
            spans.push(TimelineSpan::new(clip.clone(), 0.0, take));
            remaining -= take;
            progressed = true;
        }
        if !progressed {
            return Err(MediaError::NoUsableClips(
                "clips have no playable duration to loop".to_string(),
            ));
        }
        loops += 1;
    }

    let timeline = Timeline {
        spans,
        target_duration: target,
    };

    info!(
        spans = timeline.len(),
        loops,
        duration = timeline.duration(),
        target,
        "Built timeline"
    );

    Ok(timeline)
}

/// Opens the frame source for one timeline span.
pub trait SpanOpener: Send {
    fn open(
        &self,
        index: usize,
        span: &TimelineSpan,
        format: VideoFormat,
    ) -> MediaResult<Box<dyn FrameSource>>;
}

/// Opens spans as FFmpeg decoders with per-span Ken Burns motion.
#[derive(Debug, Clone)]
pub struct DecoderOpener {
    motions: Vec<KenBurnsParams>,
}

impl DecoderOpener {
    pub fn new(motions: Vec<KenBurnsParams>) -> Self {
        Self { motions }
    }

    /// Sample one set of motion parameters per span.
    pub fn sample<R: Rng>(timeline: &Timeline, rng: &mut R) -> Self {
        Self::new(
            (0..timeline.len())
                .map(|_| KenBurnsParams::sample(rng))
                .collect(),
        )
    }

    pub fn motions(&self) -> &[KenBurnsParams] {
        &self.motions
    }
}

impl SpanOpener for DecoderOpener {
    fn open(
        &self,
        index: usize,
        span: &TimelineSpan,
        format: VideoFormat,
    ) -> MediaResult<Box<dyn FrameSource>> {
        let decoder = ClipDecoder::open(&span.clip.path, span.in_point, span.duration(), format)?;
        let params = self.motions.get(index).copied().unwrap_or_default();
        Ok(Box::new(KenBurns::new(decoder, params)))
    }
}

/// Plays a [`Timeline`] as one continuous stream.
///
/// Only the span under the playhead has an open source. When playback moves
/// into the next span the previous source is closed, and for the first
/// `transition` seconds the new span fades in from the old span's last frame.
pub struct TimelineTrack {
    timeline: Timeline,
    offsets: Vec<f64>,
    format: VideoFormat,
    opener: Box<dyn SpanOpener>,
    transition: f64,
    current: Option<(usize, Box<dyn FrameSource>)>,
    last_frame: Option<Frame>,
    outgoing: Option<Frame>,
}

impl TimelineTrack {
    pub fn new(timeline: Timeline, format: VideoFormat, opener: Box<dyn SpanOpener>) -> Self {
        let offsets = timeline.span_offsets();
        Self {
            timeline,
            offsets,
            format,
            opener,
            transition: DEFAULT_TRANSITION_SECS,
            current: None,
            last_frame: None,
            outgoing: None,
        }
    }

    /// Set the crossfade window; zero disables blending.
    pub fn with_transition(mut self, seconds: f64) -> Self {
        self.transition = seconds.max(0.0);
        self
    }

    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    async fn switch_to(&mut self, index: usize) -> MediaResult<()> {
        if let Some((previous, mut source)) = self.current.take() {
            source.close().await?;
            // Only a directly preceding span fades into this one
            self.outgoing = if previous + 1 == index {
                self.last_frame.take()
            } else {
                None
            };
        }

        let span = &self.timeline.spans[index];
        debug!(
            index,
            path = %span.clip.path.display(),
            in_point = span.in_point,
            out_point = span.out_point,
            "Opening timeline span"
        );
        let source = self.opener.open(index, span, self.format)?;
        self.current = Some((index, source));
        Ok(())
    }
}

#[async_trait]
impl FrameSource for TimelineTrack {
    fn duration(&self) -> f64 {
        self.timeline.target_duration
    }

    fn format(&self) -> VideoFormat {
        self.format
    }

    async fn frame_at(&mut self, t: f64) -> MediaResult<Frame> {
        let t = t.clamp(0.0, self.timeline.target_duration);
        let (index, _) = self
            .timeline
            .locate(t)
            .ok_or_else(|| MediaError::NoUsableClips("timeline has no spans".to_string()))?;

        if self.current.as_ref().map(|(i, _)| *i) != Some(index) {
            self.switch_to(index).await?;
        }

        let local = (t - self.offsets[index]).max(0.0);
        let frame = match self.current.as_mut() {
            Some((_, source)) => source.frame_at(local).await?,
            None => return Err(MediaError::internal("timeline span not open")),
        };

        let output = match self.outgoing.as_ref() {
            Some(previous) if local < self.transition => {
                blend_frames(previous, &frame, local / self.transition)
            }
            _ => frame.clone(),
        };

        self.last_frame = Some(frame);
        Ok(output)
    }

    async fn close(&mut self) -> MediaResult<()> {
        if let Some((_, mut source)) = self.current.take() {
            source.close().await?;
        }
        self.last_frame = None;
        self.outgoing = None;
        Ok(())
    }
}
