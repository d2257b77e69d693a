use std::env;
use std::io;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::{env as env_keys, DEFAULT_BATCH_SIZE, DEFAULT_WORK_SIZE, READ_QUEUE_CAP};

/// Failure reported by a processor, either while being built or from an
/// advisory prefetch call.
#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("processor construction failed: {0}")]
    Construction(String),
    #[error("prefetch failed: {0}")]
    Prefetch(String),
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid pipeline config: {0}")]
    InvalidConfig(String),

    /// The factory refused to build a processor. Nothing was read or written.
    #[error("processor construction fault: {0}")]
    ProcessorConstruction(#[source] ProcessorError),

    #[error("{0} thread panicked")]
    Panicked(&'static str),

    #[error("failed to spawn {stage} thread: {source}")]
    Spawn {
        stage: &'static str,
        #[source]
        source: io::Error,
    },
}

/// How the reader stage finished.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceEnd {
    EndOfStream,
    Failed(String),
    /// Downstream went away before the source was exhausted.
    Detached,
}

/// How the writer stage finished.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SinkEnd {
    Drained,
    Failed(String),
}

/// Sizing for one pipeline instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Upper bound on bytes pulled from the source per round.
    pub batch_size: usize,
    /// Granularity every non-terminal batch is aligned to.
    pub work_size: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            work_size: DEFAULT_WORK_SIZE,
        }
    }
}

impl PipelineConfig {
    pub fn new(batch_size: usize, work_size: usize) -> Result<Self, PipelineError> {
        let config = Self { batch_size, work_size };
        config.validate()?;
        Ok(config)
    }

    /// Defaults overridden by `BATCHPIPE_BATCH_SIZE` / `BATCHPIPE_WORK_SIZE`.
    pub fn from_env() -> Result<Self, PipelineError> {
        let defaults = Self::default();
        let batch_size = env_usize(env_keys::BATCH_SIZE, defaults.batch_size)?;
        let work_size = env_usize(env_keys::WORK_SIZE, defaults.work_size)?;
        Self::new(batch_size, work_size)
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.work_size == 0 {
            return Err(PipelineError::InvalidConfig("work_size must be non-zero".into()));
        }
        if self.batch_size < self.work_size {
            return Err(PipelineError::InvalidConfig(format!(
                "batch_size {} is smaller than work_size {}",
                self.batch_size, self.work_size
            )));
        }
        // A full read of an unaligned batch_size could never be padded back
        // onto a work boundary.
        if self.batch_size % self.work_size != 0 {
            return Err(PipelineError::InvalidConfig(format!(
                "batch_size {} is not a multiple of work_size {}",
                self.batch_size, self.work_size
            )));
        }
        Ok(())
    }

    pub fn read_queue_capacity(&self) -> usize {
        READ_QUEUE_CAP
    }

    /// Room for one fully expanded batch worth of work units.
    pub fn write_queue_capacity(&self) -> usize {
        1 + self.batch_size / self.work_size
    }
}

fn env_usize(key: &str, default: usize) -> Result<usize, PipelineError> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| PipelineError::InvalidConfig(format!("{key} must be a positive integer, got {raw:?}"))),
        Err(_) => Ok(default),
    }
}
