use std::io;

use bytes::Bytes;
use thiserror::Error;

use crate::client::ClientError;
use crate::server::types::{AuthError, BrokerError, RendezvousError};
use crate::stream::types::{PipelineError, ProcessorError};

/// One read-aligned chunk moving through a pipeline.
pub type Batch = Bytes;

/// Crate-wide error. Every module error converts into it so callers can
/// use `?` across layers.
#[derive(Debug, Error)]
pub enum BatchpipeError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("processor error: {0}")]
    Processor(#[from] ProcessorError),

    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("auth error: {0}")]
    Auth(#[from] AuthError),

    #[error("rendezvous error: {0}")]
    Rendezvous(#[from] RendezvousError),

    #[error("broker error: {0}")]
    Broker(#[from] BrokerError),

    #[error("client error: {0}")]
    Client(#[from] ClientError),
}

impl BatchpipeError {
    /// Conditions after which the process must not keep running.
    pub fn is_fatal(&self) -> bool {
        matches!(self, BatchpipeError::Broker(BrokerError::InvariantViolation(_)))
    }
}
