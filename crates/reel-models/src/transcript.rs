//! Word-level transcript and caption chunk models.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Default number of words shown together on screen.
pub const DEFAULT_WORDS_PER_CHUNK: usize = 4;

/// A single transcribed word with its timing, in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct WordTimestamp {
    pub word: String,
    pub start: f64,
    pub end: f64,
}

impl WordTimestamp {
    pub fn new(word: impl Into<String>, start: f64, end: f64) -> Self {
        Self {
            word: word.into(),
            start,
            end,
        }
    }
}

/// A transcription segment as returned by the speech-recognition collaborator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TranscriptSegment {
    #[serde(default)]
    pub words: Vec<WordTimestamp>,
}

impl TranscriptSegment {
    /// Flatten segments into a single ordered word list.
    pub fn flatten(segments: &[TranscriptSegment]) -> Vec<WordTimestamp> {
        segments
            .iter()
            .flat_map(|segment| segment.words.iter().cloned())
            .collect()
    }
}

/// A group of consecutive words displayed together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CaptionChunk {
    pub text: String,
    pub start: f64,
    pub end: f64,
}

impl CaptionChunk {
    /// Whether this chunk is on screen at playback time `t` (inclusive bounds).
    pub fn is_active_at(&self, t: f64) -> bool {
        self.start <= t && t <= self.end
    }
}

/// Group words greedily into fixed windows of at most `max_words`.
///
/// The result always has `ceil(words.len() / max_words)` chunks.
pub fn chunk_words(words: &[WordTimestamp], max_words: usize) -> Vec<CaptionChunk> {
    let max_words = max_words.max(1);

    words
        .chunks(max_words)
        .map(|group| {
            let text = group
                .iter()
                .map(|w| w.word.as_str())
                .collect::<Vec<_>>()
                .join(" ");
            CaptionChunk {
                text,
                start: group[0].start,
                end: group[group.len() - 1].end,
            }
        })
        .collect()
}

/// Find the chunk active at time `t`, if any.
pub fn active_chunk(chunks: &[CaptionChunk], t: f64) -> Option<&CaptionChunk> {
    chunks.iter().find(|chunk| chunk.is_active_at(t))
}
