//! telemetry/counters.rs
//! Mutable counters owned by one pipeline driver.
//!
//! Converted into an immutable `PipelineReport` when the pipeline ends.
use std::ops::AddAssign;

use serde::{Deserialize, Serialize};

#[derive(Default, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineCounters {
    pub batches_in: u64,
    pub bytes_in: u64,
    pub batches_out: u64,
    pub bytes_out: u64,
    /// Bytes the writer actually handed to the sink.
    pub bytes_written: u64,
    pub prefetch_failures: u64,
}

impl PipelineCounters {
    /// Record one batch taken off the read queue.
    pub fn add_input(&mut self, len: usize) {
        self.batches_in += 1;
        self.bytes_in += len as u64;
    }

    /// Record one transformed batch handed to the write queue.
    pub fn add_output(&mut self, len: usize) {
        self.batches_out += 1;
        self.bytes_out += len as u64;
    }

    pub fn add_prefetch_failure(&mut self) {
        self.prefetch_failures += 1;
    }

    /// Fold counters gathered by another stage into these.
    pub fn merge(&mut self, other: &PipelineCounters) {
        self.batches_in += other.batches_in;
        self.bytes_in += other.bytes_in;
        self.batches_out += other.batches_out;
        self.bytes_out += other.bytes_out;
        self.bytes_written += other.bytes_written;
        self.prefetch_failures += other.prefetch_failures;
    }
}

impl AddAssign for PipelineCounters {
    fn add_assign(&mut self, rhs: Self) {
        self.merge(&rhs);
    }
}
