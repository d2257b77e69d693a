// Writer stage: in-order delivery, stop on first failure, and the closed
// queue that failure leaves behind for blocked producers.

#[cfg(test)]
mod tests {
    use std::io::{self, ErrorKind, Write};
    use std::thread;

    use bytes::Bytes;
    use crossbeam::channel::{bounded, unbounded};

    use batchpipe::stream::{write_batches, SharedBufferWriter, SinkEnd};

    /// Accepts `budget` bytes, then fails every write.
    struct BrokenAfter {
        budget: usize,
    }

    impl Write for BrokenAfter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.budget == 0 {
                return Err(io::Error::new(ErrorKind::BrokenPipe, "peer hung up"));
            }
            let n = buf.len().min(self.budget);
            self.budget -= n;
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn writes_batches_in_queue_order() {
        let (tx, rx) = unbounded();
        let chunks: [&[u8]; 4] = [b"alpha", b"", b"beta", b"gamma"];
        for chunk in chunks {
            tx.send(Bytes::copy_from_slice(chunk)).unwrap();
        }
        drop(tx);

        let sink = SharedBufferWriter::new();
        let (end, written) = write_batches(rx, sink.clone());

        assert_eq!(end, SinkEnd::Drained);
        assert_eq!(written, 14);
        assert_eq!(sink.contents(), b"alphabetagamma");
    }

    #[test]
    fn first_failure_ends_the_stage() {
        let (tx, rx) = unbounded();
        tx.send(Bytes::from_static(b"1234")).unwrap();
        tx.send(Bytes::from_static(b"5678")).unwrap();
        tx.send(Bytes::from_static(b"9abc")).unwrap();

        let sink = BrokenAfter { budget: 6 };
        let (end, written) = write_batches(rx, sink);

        assert!(matches!(end, SinkEnd::Failed(ref msg) if msg.contains("peer hung up")));
        assert_eq!(written, 4);

        // The receiver is gone, so the queue reports disconnection.
        assert!(tx.send(Bytes::from_static(b"late")).is_err());
    }

    #[test]
    fn blocked_producer_is_released_by_failure() {
        let (tx, rx) = bounded::<Bytes>(1);

        let producer = thread::spawn(move || {
            for i in 0..64u8 {
                if tx.send(Bytes::from(vec![i; 8])).is_err() {
                    return Some(i);
                }
            }
            None
        });

        let sink = BrokenAfter { budget: 0 };
        let (end, written) = write_batches(rx, sink);

        assert!(matches!(end, SinkEnd::Failed(_)));
        assert_eq!(written, 0);
        let stopped_at = producer.join().unwrap();
        assert!(stopped_at.is_some(), "producer never saw the closed queue");
    }
}
