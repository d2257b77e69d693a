// Reader and writer stages plus small I/O helpers.

use std::io::{self, ErrorKind, Read, Write};
use std::mem;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use crossbeam::channel::{Receiver, Sender};

use crate::stream::types::{SinkEnd, SourceEnd};

/// In-memory sink whose contents stay reachable after the writer thread
/// takes ownership of it.
#[derive(Debug, Clone, Default)]
pub struct SharedBufferWriter {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl SharedBufferWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything written so far.
    pub fn contents(&self) -> Vec<u8> {
        self.buf.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }
}

impl Write for SharedBufferWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let mut guard = self.buf.lock().unwrap_or_else(|p| p.into_inner());
        guard.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Where a read round stopped.
enum ReadState {
    Open,
    Eof,
    Failed(io::Error),
}

/// Single read call, retrying only on `Interrupted`.
fn read_some<R: Read>(r: &mut R, buf: &mut [u8]) -> (usize, ReadState) {
    loop {
        match r.read(buf) {
            Ok(0) => return (0, ReadState::Eof),
            Ok(n) => return (n, ReadState::Open),
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return (0, ReadState::Failed(e)),
        }
    }
}

/// Fill `buf` completely unless the source ends or fails first. Returns
/// the bytes actually placed in `buf`.
fn read_exact_or_eof<R: Read>(r: &mut R, buf: &mut [u8]) -> (usize, ReadState) {
    let mut off = 0;
    while off < buf.len() {
        match r.read(&mut buf[off..]) {
            Ok(0) => return (off, ReadState::Eof),
            Ok(n) => off += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return (off, ReadState::Failed(e)),
        }
    }
    (off, ReadState::Open)
}

/// Reader stage.
///
/// Pulls up to `batch_size` bytes per round. A round that ends off a
/// `work_size` boundary blocks for the rest of the work unit (never past
/// `batch_size`), so only the terminal batch can be misaligned. Batches are
/// pushed on `tx`; returning drops `tx`, which closes the queue.
///
/// Reads land in one scratch buffer. A full round hands that buffer over
/// as the batch; a short round is copied out, so a queued batch never pins
/// more memory than it carries.
pub fn read_batches<R: Read>(
    mut source: R,
    tx: Sender<Bytes>,
    batch_size: usize,
    work_size: usize,
) -> SourceEnd {
    if work_size == 0 || batch_size == 0 || batch_size % work_size != 0 {
        tracing::warn!(batch_size, work_size, "[READER] refusing misaligned sizing");
        return SourceEnd::Failed(format!(
            "batch_size {batch_size} is not a non-zero multiple of work_size {work_size}"
        ));
    }

    let mut scratch = vec![0u8; batch_size];
    loop {
        let (mut len, mut state) = read_some(&mut source, &mut scratch);

        if matches!(state, ReadState::Open) && len % work_size != 0 {
            let target = (len + work_size - len % work_size).min(batch_size);
            let (filled, tail) = read_exact_or_eof(&mut source, &mut scratch[len..target]);
            len += filled;
            state = tail;
        }

        if len > 0 {
            let batch = if len == batch_size {
                Bytes::from(mem::replace(&mut scratch, vec![0u8; batch_size]))
            } else {
                Bytes::copy_from_slice(&scratch[..len])
            };
            if tx.send(batch).is_err() {
                tracing::debug!("[READER] downstream closed, stopping");
                return SourceEnd::Detached;
            }
        }

        match state {
            ReadState::Open => continue,
            ReadState::Eof => {
                tracing::debug!("[READER] end of stream");
                return SourceEnd::EndOfStream;
            }
            ReadState::Failed(e) => {
                tracing::warn!(error = %e, "[READER] source read failed");
                return SourceEnd::Failed(e.to_string());
            }
        }
    }
}

/// Writer stage.
///
/// Writes each queued batch in order and flushes after it. The first write
/// failure ends the stage; dropping `rx` then wakes any producer blocked on
/// a full queue with a send error.
pub fn write_batches<W: Write>(rx: Receiver<Bytes>, mut sink: W) -> (SinkEnd, u64) {
    let mut written = 0u64;
    for batch in rx.iter() {
        if batch.is_empty() {
            continue;
        }
        if let Err(e) = sink.write_all(&batch).and_then(|_| sink.flush()) {
            tracing::warn!(error = %e, written, "[WRITER] sink write failed");
            return (SinkEnd::Failed(e.to_string()), written);
        }
        written += batch.len() as u64;
    }
    tracing::debug!(written, "[WRITER] queue drained");
    (SinkEnd::Drained, written)
}
