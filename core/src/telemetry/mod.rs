//! telemetry/mod.rs
//! Per-pipeline counters and the immutable report built from them.

pub mod counters;
pub mod snapshot;

pub use counters::*;
pub use snapshot::*;
