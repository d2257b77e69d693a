//! Transform plugin seam.
//!
//! A `ProcessorFactory` is shared by every pipeline in the process; each
//! pipeline asks it for a fresh `BatchProcessor` that it owns exclusively.

use bytes::Bytes;

use crate::stream::types::ProcessorError;

/// One stateful transform instance, private to a single pipeline run.
pub trait BatchProcessor: Send {
    /// Map one input batch to its output bytes.
    fn transform(&mut self, batch: Bytes) -> Bytes;

    /// Advisory hook called after each output has been queued, e.g. to warm
    /// a cache for the next call. Errors are logged and ignored by the driver.
    fn prefetch(&mut self, _last_input: &Bytes, _last_output: &Bytes) -> Result<(), ProcessorError> {
        Ok(())
    }
}

impl<P: BatchProcessor + ?Sized> BatchProcessor for Box<P> {
    fn transform(&mut self, batch: Bytes) -> Bytes {
        (**self).transform(batch)
    }

    fn prefetch(&mut self, last_input: &Bytes, last_output: &Bytes) -> Result<(), ProcessorError> {
        (**self).prefetch(last_input, last_output)
    }
}

/// Builds processors. Any `Fn() -> Result<P, ProcessorError>` qualifies.
pub trait ProcessorFactory: Send + Sync {
    type Processor: BatchProcessor;

    fn create(&self) -> Result<Self::Processor, ProcessorError>;
}

impl<F, P> ProcessorFactory for F
where
    F: Fn() -> Result<P, ProcessorError> + Send + Sync,
    P: BatchProcessor,
{
    type Processor = P;

    fn create(&self) -> Result<P, ProcessorError> {
        self()
    }
}

/// Passes batches through untouched.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityProcessor;

impl BatchProcessor for IdentityProcessor {
    fn transform(&mut self, batch: Bytes) -> Bytes {
        batch
    }
}

type PrefetchFn = Box<dyn FnMut(&Bytes, &Bytes) -> Result<(), ProcessorError> + Send>;

/// Adapts a transform closure, and optionally a prefetch closure, into a
/// `BatchProcessor`.
pub struct FnProcessor<T> {
    transform: T,
    prefetch: Option<PrefetchFn>,
}

impl<T> FnProcessor<T>
where
    T: FnMut(Bytes) -> Bytes + Send,
{
    pub fn new(transform: T) -> Self {
        Self { transform, prefetch: None }
    }

    pub fn with_prefetch<P>(mut self, prefetch: P) -> Self
    where
        P: FnMut(&Bytes, &Bytes) -> Result<(), ProcessorError> + Send + 'static,
    {
        self.prefetch = Some(Box::new(prefetch));
        self
    }
}

impl<T> BatchProcessor for FnProcessor<T>
where
    T: FnMut(Bytes) -> Bytes + Send,
{
    fn transform(&mut self, batch: Bytes) -> Bytes {
        (self.transform)(batch)
    }

    fn prefetch(&mut self, last_input: &Bytes, last_output: &Bytes) -> Result<(), ProcessorError> {
        match self.prefetch.as_mut() {
            Some(f) => f(last_input, last_output),
            None => Ok(()),
        }
    }
}
