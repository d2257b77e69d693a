// Heap held by queued batches must track their payload, not the read
// buffer size. Lives in its own test binary because it installs a global
// allocator that tracks live bytes.

#![allow(unsafe_code)]

#[cfg(test)]
mod tests {
    use std::alloc::{GlobalAlloc, Layout, System};
    use std::io::{self, Read};
    use std::sync::atomic::{AtomicIsize, Ordering};

    use bytes::Bytes;
    use crossbeam::channel::unbounded;

    use batchpipe::stream::{read_batches, SourceEnd};

    // ── Live-bytes allocator ─────────────────────────────────────

    struct LiveBytes;

    static LIVE: AtomicIsize = AtomicIsize::new(0);

    unsafe impl GlobalAlloc for LiveBytes {
        unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
            LIVE.fetch_add(layout.size() as isize, Ordering::SeqCst);
            unsafe { System.alloc(layout) }
        }

        unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
            LIVE.fetch_sub(layout.size() as isize, Ordering::SeqCst);
            unsafe { System.dealloc(ptr, layout) }
        }
    }

    #[global_allocator]
    static GLOBAL: LiveBytes = LiveBytes;

    /// Serves `remaining` bytes, one per read call.
    struct OneByte(usize);

    impl Read for OneByte {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.0 == 0 || buf.is_empty() {
                return Ok(0);
            }
            self.0 -= 1;
            buf[0] = b'.';
            Ok(1)
        }
    }

    #[test]
    fn trickled_batches_do_not_pin_full_buffers() {
        const BATCH: usize = 64 * 1024;
        const BYTES: usize = 1000;

        let (tx, rx) = unbounded::<Bytes>();
        let before = LIVE.load(Ordering::SeqCst);

        let end = read_batches(OneByte(BYTES), tx, BATCH, 1);
        let held: Vec<Bytes> = rx.try_iter().collect();
        let grown = LIVE.load(Ordering::SeqCst) - before;

        assert_eq!(end, SourceEnd::EndOfStream);
        assert_eq!(held.len(), BYTES);
        // 1000 one-byte batches plus queue bookkeeping; a pinned read
        // buffer per batch would be 1000 * 64 KiB.
        assert!(grown < 2 * BATCH as isize, "queued batches hold {grown} bytes of heap");
    }
}
