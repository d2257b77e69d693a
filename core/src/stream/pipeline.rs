// Pipeline driver: reader thread -> transform (this thread) -> writer thread.

use std::io::{Read, Write};
use std::thread;
use std::time::Instant;

use bytes::Bytes;
use crossbeam::channel::bounded;

use crate::stream::io::{read_batches, write_batches};
use crate::stream::processor::{BatchProcessor, ProcessorFactory};
use crate::stream::types::{PipelineConfig, PipelineError, SinkEnd, SourceEnd};
use crate::telemetry::{PipelineCounters, PipelineReport};

/// Run one pipeline instance to completion.
///
/// The processor is built before any thread starts, so a construction
/// fault leaves `source` unread and `sink` untouched. Afterwards every
/// batch from the reader is transformed exactly once, in arrival order,
/// queued for the writer, and then offered to `prefetch`.
///
/// Returns when the writer has finished. If the writer stopped early the
/// reader is left to notice the closed queue on its own.
pub fn run_pipeline<R, W, F>(
    source: R,
    sink: W,
    factory: &F,
    config: &PipelineConfig,
) -> Result<PipelineReport, PipelineError>
where
    R: Read + Send + 'static,
    W: Write + Send + 'static,
    F: ProcessorFactory + ?Sized,
{
    config.validate()?;

    let mut processor = factory.create().map_err(|e| {
        tracing::warn!(error = %e, "[PIPELINE] processor construction failed");
        PipelineError::ProcessorConstruction(e)
    })?;

    let started = Instant::now();
    let mut counters = PipelineCounters::default();

    // ---- Channels ----
    let (read_tx, read_rx) = bounded::<Bytes>(config.read_queue_capacity());
    let (write_tx, write_rx) = bounded::<Bytes>(config.write_queue_capacity());

    // ---- Reader thread ----
    let span = tracing::Span::current();
    let (batch_size, work_size) = (config.batch_size, config.work_size);
    let reader_span = span.clone();
    let reader = thread::Builder::new()
        .name("batchpipe-reader".into())
        .spawn(move || {
            let _enter = reader_span.enter();
            read_batches(source, read_tx, batch_size, work_size)
        })
        .map_err(|source| PipelineError::Spawn { stage: "reader", source })?;

    // ---- Writer thread ----
    let writer_span = span.clone();
    let writer = thread::Builder::new()
        .name("batchpipe-writer".into())
        .spawn(move || {
            let _enter = writer_span.enter();
            write_batches(write_rx, sink)
        })
        .map_err(|source| PipelineError::Spawn { stage: "writer", source })?;

    // ---- Transform loop ----
    let mut downstream_closed = false;
    for input in read_rx.iter() {
        counters.add_input(input.len());
        let output = processor.transform(input.clone());
        let out_len = output.len();

        if write_tx.send(output.clone()).is_err() {
            tracing::debug!("[PIPELINE] write queue closed, stopping transform loop");
            downstream_closed = true;
            break;
        }
        counters.add_output(out_len);

        if let Err(e) = processor.prefetch(&input, &output) {
            tracing::debug!(error = %e, "[PIPELINE] prefetch failed, ignoring");
            counters.add_prefetch_failure();
        }
    }

    drop(write_tx);
    drop(read_rx);

    let (sink_end, written) = writer
        .join()
        .unwrap_or_else(|_| (SinkEnd::Failed("writer thread panicked".into()), 0));
    counters.bytes_written = written;

    let source_end = if downstream_closed {
        SourceEnd::Detached
    } else {
        reader
            .join()
            .unwrap_or_else(|_| SourceEnd::Failed("reader thread panicked".into()))
    };

    let report = PipelineReport::from(&counters, source_end, sink_end, started);
    tracing::debug!(report = %report.to_json(), "[PIPELINE] finished");
    Ok(report)
}
