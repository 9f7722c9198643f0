//! Pipeline metrics.
//!
//! Recorded through the `metrics` facade; nothing is exported unless the
//! embedding process installs a recorder.

use metrics::{counter, histogram};

/// Metric names as constants for consistency.
pub mod names {
    pub const RUNS_TOTAL: &str = "reel_runs_total";
    pub const STAGE_DURATION_SECONDS: &str = "reel_stage_duration_seconds";
    pub const STAGE_FAILURES_TOTAL: &str = "reel_stage_failures_total";
    pub const VOICE_SEGMENTS_TOTAL: &str = "reel_voice_segments_total";
    pub const TRANSCRIBED_WORDS_TOTAL: &str = "reel_transcribed_words_total";
}

/// Record how long a pipeline stage took.
pub fn record_stage_duration(stage: &'static str, duration_secs: f64) {
    histogram!(names::STAGE_DURATION_SECONDS, "stage" => stage).record(duration_secs);
}

/// Record a failed stage.
pub fn record_stage_failure(stage: &'static str) {
    counter!(names::STAGE_FAILURES_TOTAL, "stage" => stage).increment(1);
}

/// Record the outcome of a whole run.
pub fn record_run(outcome: &'static str) {
    counter!(names::RUNS_TOTAL, "outcome" => outcome).increment(1);
}

pub fn record_voice_segments(count: usize) {
    counter!(names::VOICE_SEGMENTS_TOTAL).increment(count as u64);
}

pub fn record_transcribed_words(count: usize) {
    counter!(names::TRANSCRIBED_WORDS_TOTAL).increment(count as u64);
}
