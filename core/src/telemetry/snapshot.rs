//! telemetry/snapshot.rs
//! Immutable end-of-run report for one pipeline instance.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::stream::types::{SinkEnd, SourceEnd};
use crate::telemetry::counters::PipelineCounters;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineReport {
    pub counters: PipelineCounters,
    pub source: SourceEnd,
    pub sink: SinkEnd,
    pub elapsed: Duration,
}

impl PipelineReport {
    pub fn from(counters: &PipelineCounters, source: SourceEnd, sink: SinkEnd, started: Instant) -> Self {
        Self {
            counters: counters.clone(),
            source,
            sink,
            elapsed: started.elapsed(),
        }
    }

    /// True when the source ran dry and every queued batch reached the sink.
    pub fn is_clean(&self) -> bool {
        self.source == SourceEnd::EndOfStream && self.sink == SinkEnd::Drained
    }

    pub fn throughput_bytes_per_sec(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.counters.bytes_written as f64 / secs
        } else {
            0.0
        }
    }

    /// One-line JSON rendering for logs.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| format!("{{\"error\":\"{e}\"}}"))
    }
}
