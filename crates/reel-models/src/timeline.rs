//! Assembly timeline models.

use std::sync::Arc;

use crate::clip::VideoClip;

/// A slice of a clip placed on the timeline.
#[derive(Debug, Clone, PartialEq)]
pub struct TimelineSpan {
    /// Source clip (shared with other spans looping the same clip)
    pub clip: Arc<VideoClip>,
    /// In-point within the clip, in seconds
    pub in_point: f64,
    /// Out-point within the clip, in seconds
    pub out_point: f64,
}

impl TimelineSpan {
    pub fn new(clip: Arc<VideoClip>, in_point: f64, out_point: f64) -> Self {
        Self {
            clip,
            in_point,
            out_point,
        }
    }

    /// Span length in seconds.
    pub fn duration(&self) -> f64 {
        (self.out_point - self.in_point).max(0.0)
    }
}

/// Ordered spans whose durations sum to the narration length.
#[derive(Debug, Clone, PartialEq)]
pub struct Timeline {
    pub spans: Vec<TimelineSpan>,
    /// Narration length the timeline was built for
    pub target_duration: f64,
}

impl Timeline {
    /// Sum of all span durations.
    pub fn duration(&self) -> f64 {
        self.spans.iter().map(TimelineSpan::duration).sum()
    }

    pub fn len(&self) -> usize {
        self.spans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    /// Timeline start offset of each span.
    pub fn span_offsets(&self) -> Vec<f64> {
        let mut offset = 0.0;
        self.spans
            .iter()
            .map(|span| {
                let start = offset;
                offset += span.duration();
                start
            })
            .collect()
    }

    /// Locate the span covering timeline time `t`.
    ///
    /// Returns the span index and the clip-local time. Times past the end map
    /// into the last span.
    pub fn locate(&self, t: f64) -> Option<(usize, f64)> {
        let last = self.spans.len().checked_sub(1)?;
        let mut offset = 0.0;
        for (index, span) in self.spans.iter().enumerate() {
            let end = offset + span.duration();
            if t < end || index == last {
                let local = (t - offset).clamp(0.0, span.duration());
                return Some((index, span.in_point + local));
            }
            offset = end;
        }
        None
    }
}
