use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::stream::types::PipelineError;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("connection closed after {received} of {expected} token bytes")]
    ShortToken { received: usize, expected: usize },

    #[error("token mismatch from new client")]
    TokenMismatch,

    #[error("I/O error while reading token: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Error)]
pub enum RendezvousError {
    #[error("malformed rendezvous: {0}")]
    Malformed(String),

    #[error("I/O error while reading rendezvous: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Error)]
pub enum BrokerError {
    /// Startup cannot honour the fixed-width address contract. Fatal.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("failed to bind {}: {source}", path.display())]
    Bind {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to publish rendezvous: {0}")]
    Publish(#[source] io::Error),

    #[error("failed to spawn {task} thread: {source}")]
    Spawn {
        task: &'static str,
        #[source]
        source: io::Error,
    },
}
