//! stream: aligned batch pipeline.
//!
//! Three stages per instance, each on its own thread, joined by two
//! bounded queues:
//!
//! ```text
//! source -> read_batches -> [cap 2] -> transform -> [cap 1 + batch/work] -> write_batches -> sink
//! ```
//!
//! A full write queue blocks the driver, which stops draining the read
//! queue, which blocks the reader, which stops reading the source.

pub mod io;
pub mod pipeline;
pub mod processor;
pub mod types;

pub use io::{read_batches, write_batches, SharedBufferWriter};
pub use pipeline::run_pipeline;
pub use processor::{BatchProcessor, FnProcessor, IdentityProcessor, ProcessorFactory};
pub use types::{PipelineConfig, PipelineError, ProcessorError, SinkEnd, SourceEnd};
