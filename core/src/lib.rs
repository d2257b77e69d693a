//! batchpipe
//!
//! Aligned batch pipeline over raw byte streams, plus a local socket broker
//! that serves one private pipeline per authenticated connection.
//! No async runtime: every stage is an OS thread joined by bounded queues.

#![forbid(unsafe_code)]

// Shared and top level
pub mod constants;
pub mod types;

pub mod telemetry;

// Pipeline
pub mod stream;

// Socket front-end and its client side
pub mod server;
pub mod client;

pub use types::{Batch, BatchpipeError};

// -----------------------------------------------------------------------------
// Prelude (Rust users)
// -----------------------------------------------------------------------------
pub mod prelude {
    pub use crate::client::{connect, ServerProcess};
    pub use crate::server::{serve_stdio, BrokerConfig, ConnectionBroker, Rendezvous};
    pub use crate::stream::{
        run_pipeline, BatchProcessor, FnProcessor, IdentityProcessor, PipelineConfig, ProcessorError,
        ProcessorFactory,
    };
    pub use crate::telemetry::PipelineReport;
    pub use crate::types::{Batch, BatchpipeError};
}
