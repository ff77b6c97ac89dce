use crate::models::error::CaptureError;
use crate::traits::capture_source::CaptureSource;
use crate::traits::stream_sink::StreamSink;

/// Fixed-capacity circular byte store holding the most recent audio.
///
/// Overflow behavior: overwrites the oldest bytes. Read offsets are relative
/// to the oldest byte still present, so offset 0 is the oldest and
/// `valid_bytes - 1` the newest.
///
/// Not synchronized. The audio worker owns the only instance.
#[derive(Debug, Default)]
pub struct RingBuffer {
    storage: Vec<u8>,
    staging: Vec<u8>,
    staged: usize,
    write_cursor: usize,
    total_bytes_written: u64,
}

/// Point-in-time view of the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BufferStats {
    pub valid_bytes: usize,
    pub capacity: usize,
    pub overwriting: bool,
    pub total_bytes_written: u64,
}

/// The slice of history selected for a dump: skip the oldest `skip` bytes,
/// emit the following `len` bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TrailingWindow {
    pub skip: usize,
    pub len: usize,
}

impl TrailingWindow {
    /// Select the newest `requested` bytes out of `available`, or everything
    /// when less is available.
    pub fn select(available: usize, requested: u64) -> Self {
        let requested = usize::try_from(requested).unwrap_or(usize::MAX);
        let skip = available.saturating_sub(requested);
        Self {
            skip,
            len: available - skip,
        }
    }
}

impl RingBuffer {
    /// An empty, disabled buffer (capacity 0).
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the backing storage. Everything stored before is lost.
    ///
    /// On allocation failure the buffer is left disabled.
    pub fn allocate(&mut self, capacity: usize) -> Result<(), CaptureError> {
        self.release();
        if capacity == 0 {
            return Ok(());
        }

        let mut storage = Vec::new();
        storage
            .try_reserve_exact(capacity)
            .map_err(|_| CaptureError::AllocationFailed(capacity as u64))?;
        storage.resize(capacity, 0);
        self.storage = storage;
        Ok(())
    }

    /// Drop the backing storage and forget all history.
    pub fn release(&mut self) {
        self.storage = Vec::new();
        self.staging = Vec::new();
        self.write_cursor = 0;
        self.total_bytes_written = 0;
        self.staged = 0;
    }

    /// Poll up to `max_bytes` from `source` and store them.
    ///
    /// Returns how many bytes were appended, which may be fewer than
    /// requested. A disabled buffer never touches the source.
    pub fn append(&mut self, source: &mut dyn CaptureSource, max_bytes: usize) -> Result<usize, CaptureError> {
        self.staged = 0;
        let capacity = self.capacity();
        if capacity == 0 || max_bytes == 0 {
            return Ok(0);
        }

        if self.staging.len() < max_bytes {
            self.staging.resize(max_bytes, 0);
        }
        let read = source.poll(&mut self.staging[..max_bytes])?.min(max_bytes);
        if read == 0 {
            return Ok(0);
        }
        self.staged = read;

        // Only the newest `capacity` bytes of an oversized chunk survive.
        let kept = read.min(capacity);
        let dropped = read - kept;
        let start = (self.write_cursor + dropped) % capacity;
        let chunk = &self.staging[dropped..read];

        let first = kept.min(capacity - start);
        self.storage[start..start + first].copy_from_slice(&chunk[..first]);
        if first < kept {
            self.storage[..kept - first].copy_from_slice(&chunk[first..]);
        }

        self.write_cursor = (self.write_cursor + read) % capacity;
        self.total_bytes_written += read as u64;
        Ok(read)
    }

    /// The chunk stored by the most recent `append`.
    pub fn last_appended(&self) -> &[u8] {
        &self.staging[..self.staged]
    }

    /// Stream every valid byte after the oldest `skip_bytes` into `sink`,
    /// oldest first. Returns the number of bytes written.
    pub fn read_range(&self, skip_bytes: usize, sink: &mut dyn StreamSink) -> Result<usize, CaptureError> {
        let valid = self.valid_bytes();
        if skip_bytes > valid {
            return Err(CaptureError::OutOfRange {
                skip: skip_bytes,
                valid,
            });
        }
        let len = valid - skip_bytes;
        if len == 0 {
            return Ok(0);
        }

        let capacity = self.capacity();
        let oldest = (self.write_cursor + capacity - valid) % capacity;
        let start = (oldest + skip_bytes) % capacity;

        let first = len.min(capacity - start);
        sink.write(&self.storage[start..start + first])?;
        if first < len {
            sink.write(&self.storage[..len - first])?;
        }
        Ok(len)
    }

    /// Dump the newest `requested_bytes` (or everything buffered, if less)
    /// into `sink`.
    pub fn dump_trailing(&self, requested_bytes: u64, sink: &mut dyn StreamSink) -> Result<TrailingWindow, CaptureError> {
        let window = TrailingWindow::select(self.valid_bytes(), requested_bytes);
        self.read_range(window.skip, sink)?;
        Ok(window)
    }

    pub fn stats(&self) -> BufferStats {
        BufferStats {
            valid_bytes: self.valid_bytes(),
            capacity: self.capacity(),
            overwriting: self.is_overwriting(),
            total_bytes_written: self.total_bytes_written,
        }
    }

    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    pub fn valid_bytes(&self) -> usize {
        self.total_bytes_written.min(self.capacity() as u64) as usize
    }

    pub fn is_overwriting(&self) -> bool {
        self.total_bytes_written > self.capacity() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory_sink::MemorySink;
    use crate::test_support::ScriptedSource;

    fn counting(range: std::ops::Range<usize>) -> Vec<u8> {
        range.map(|i| (i % 251) as u8).collect()
    }

    fn filled(capacity: usize, data: &[u8]) -> RingBuffer {
        let mut buf = RingBuffer::new();
        buf.allocate(capacity).unwrap();
        let mut source = ScriptedSource::new();
        source.push(data);
        while buf.append(&mut source, 64).unwrap() > 0 {}
        buf
    }

    fn read_all(buf: &RingBuffer, skip: usize) -> Vec<u8> {
        let mut sink = MemorySink::new();
        buf.read_range(skip, &mut sink).unwrap();
        sink.contents()
    }

    #[test]
    fn new_buffer_is_disabled() {
        let mut buf = RingBuffer::new();
        let mut source = ScriptedSource::new();
        source.push(&[1, 2, 3]);

        assert_eq!(buf.append(&mut source, 3).unwrap(), 0);
        assert_eq!(source.pending(), 3);
        assert_eq!(buf.stats(), BufferStats::default());
        assert!(read_all(&buf, 0).is_empty());
    }

    #[test]
    fn partial_fill_is_not_overwriting() {
        let data = counting(0..700);
        let buf = filled(1000, &data);

        let stats = buf.stats();
        assert_eq!(stats.valid_bytes, 700);
        assert_eq!(stats.capacity, 1000);
        assert!(!stats.overwriting);
        assert_eq!(read_all(&buf, 0), data);
    }

    #[test]
    fn scenario_overflow_keeps_newest_bytes() {
        let mut buf = RingBuffer::new();
        buf.allocate(1000).unwrap();
        let mut source = ScriptedSource::new();
        let data = counting(0..1100);

        source.push(&data[..500]);
        assert_eq!(buf.append(&mut source, 500).unwrap(), 500);
        let stats = buf.stats();
        assert_eq!(stats.valid_bytes, 500);
        assert!(!stats.overwriting);

        source.push(&data[500..]);
        assert_eq!(buf.append(&mut source, 600).unwrap(), 600);
        let stats = buf.stats();
        assert_eq!(stats.valid_bytes, 1000);
        assert!(stats.overwriting);
        assert_eq!(stats.total_bytes_written, 1100);
        assert_eq!(read_all(&buf, 0), &data[100..1100]);
    }

    #[test]
    fn exactly_full_is_not_overwriting() {
        let buf = filled(256, &counting(0..256));
        assert_eq!(buf.valid_bytes(), 256);
        assert!(!buf.is_overwriting());
    }

    #[test]
    fn read_range_skips_oldest() {
        let data = counting(0..300);
        let buf = filled(1000, &data);

        for k in [0, 1, 150, 299, 300] {
            assert_eq!(read_all(&buf, k), &data[k..]);
        }
    }

    #[test]
    fn read_range_across_wrap_point() {
        let data = counting(0..2345);
        let buf = filled(1000, &data);

        assert_eq!(read_all(&buf, 0), &data[1345..]);
        assert_eq!(read_all(&buf, 400), &data[1745..]);
        assert_eq!(read_all(&buf, 999), &data[2344..]);
    }

    #[test]
    fn read_range_out_of_range() {
        let buf = filled(100, &counting(0..40));
        let mut sink = MemorySink::new();
        assert_eq!(
            buf.read_range(41, &mut sink),
            Err(CaptureError::OutOfRange { skip: 41, valid: 40 })
        );
        assert!(sink.contents().is_empty());
    }

    #[test]
    fn append_larger_than_capacity() {
        let mut buf = RingBuffer::new();
        buf.allocate(10).unwrap();
        let mut source = ScriptedSource::new();
        let data = counting(0..25);
        source.push(&data);

        assert_eq!(buf.append(&mut source, 25).unwrap(), 25);
        assert_eq!(buf.last_appended(), &data[..]);
        assert_eq!(read_all(&buf, 0), &data[15..]);

        // the cursor keeps advancing consistently afterwards
        source.push(&[200, 201, 202]);
        buf.append(&mut source, 3).unwrap();
        assert_eq!(read_all(&buf, 0), [&data[18..], &[200, 201, 202][..]].concat());
    }

    #[test]
    fn short_reads_are_not_errors() {
        let mut buf = RingBuffer::new();
        buf.allocate(100).unwrap();
        let mut source = ScriptedSource::new();
        source.push(&[9; 7]);

        assert_eq!(buf.append(&mut source, 50).unwrap(), 7);
        assert_eq!(buf.append(&mut source, 50).unwrap(), 0);
        assert!(buf.last_appended().is_empty());
    }

    #[test]
    fn source_errors_propagate() {
        let mut buf = RingBuffer::new();
        buf.allocate(100).unwrap();
        let mut source = ScriptedSource::new();
        source.fail_next_poll();

        assert!(matches!(
            buf.append(&mut source, 10),
            Err(CaptureError::SourceReadTransient(_))
        ));
        assert_eq!(buf.valid_bytes(), 0);
    }

    #[test]
    fn reallocation_discards_content() {
        let mut buf = filled(100, &counting(0..150));
        buf.allocate(200).unwrap();

        assert_eq!(buf.stats(), BufferStats {
            valid_bytes: 0,
            capacity: 200,
            overwriting: false,
            total_bytes_written: 0,
        });

        buf.allocate(0).unwrap();
        assert_eq!(buf.capacity(), 0);
    }

    #[test]
    fn trailing_window_selection() {
        assert_eq!(TrailingWindow::select(3000, 10000), TrailingWindow { skip: 0, len: 3000 });
        assert_eq!(TrailingWindow::select(3000, 1000), TrailingWindow { skip: 2000, len: 1000 });
        assert_eq!(TrailingWindow::select(3000, 0), TrailingWindow { skip: 3000, len: 0 });
        assert_eq!(TrailingWindow::select(0, 50), TrailingWindow { skip: 0, len: 0 });
    }

    #[test]
    fn dump_trailing_returns_newest_bytes() {
        let data = counting(0..1500);
        let buf = filled(1000, &data);

        let mut sink = MemorySink::new();
        let window = buf.dump_trailing(250, &mut sink).unwrap();
        assert_eq!(window, TrailingWindow { skip: 750, len: 250 });
        assert_eq!(sink.contents(), &data[1250..]);

        let mut sink = MemorySink::new();
        buf.dump_trailing(u64::MAX, &mut sink).unwrap();
        assert_eq!(sink.contents(), &data[500..]);

        let mut sink = MemorySink::new();
        buf.dump_trailing(0, &mut sink).unwrap();
        assert!(sink.contents().is_empty());
    }
}
