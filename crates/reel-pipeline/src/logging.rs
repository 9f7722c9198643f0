//! Structured run logging utilities.
//!
//! Every stage event carries the run id and stage name so one generation
//! can be followed through interleaved logs.

use std::time::Instant;

use tracing::{error, info, warn, Span};
use uuid::Uuid;

use crate::metrics::record_stage_duration;

/// Run logger for structured logging with consistent formatting.
#[derive(Debug, Clone)]
pub struct RunLogger {
    run_id: String,
    topic: String,
}

impl RunLogger {
    /// Create a logger with a fresh run id.
    pub fn new(topic: &str) -> Self {
        Self::with_run_id(&Uuid::new_v4().to_string(), topic)
    }

    pub fn with_run_id(run_id: &str, topic: &str) -> Self {
        Self {
            run_id: run_id.to_string(),
            topic: topic.to_string(),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Log the start of a stage and return a guard that records its duration.
    pub fn stage(&self, stage: &'static str) -> StageTimer {
        info!(run_id = %self.run_id, stage, "Stage started");
        StageTimer {
            run_id: self.run_id.clone(),
            stage,
            started: Instant::now(),
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(run_id = %self.run_id, topic = %self.topic, "Run started: {}", message);
    }

    pub fn log_warning(&self, message: &str) {
        warn!(run_id = %self.run_id, topic = %self.topic, "Run warning: {}", message);
    }

    pub fn log_error(&self, stage: &str, message: &str) {
        error!(run_id = %self.run_id, topic = %self.topic, stage, "Run failed: {}", message);
    }

    pub fn log_completion(&self, message: &str) {
        info!(run_id = %self.run_id, topic = %self.topic, "Run completed: {}", message);
    }

    /// Span carrying the run's fields for everything logged inside it.
    pub fn create_span(&self) -> Span {
        tracing::info_span!("run", run_id = %self.run_id, topic = %self.topic)
    }
}

/// Times one stage; call [`StageTimer::finish`] with a summary when done.
#[derive(Debug)]
pub struct StageTimer {
    run_id: String,
    stage: &'static str,
    started: Instant,
}

impl StageTimer {
    pub fn stage(&self) -> &'static str {
        self.stage
    }

    /// Log completion and record the stage duration.
    pub fn finish(self, summary: &str) -> f64 {
        let elapsed = self.started.elapsed().as_secs_f64();
        record_stage_duration(self.stage, elapsed);
        info!(
            run_id = %self.run_id,
            stage = self.stage,
            elapsed_secs = elapsed,
            "Stage completed: {}", summary
        );
        elapsed
    }
}
