use bytes::{Bytes, BytesMut};

/// Accumulates reads of arbitrary size into fixed-size chunks.
///
/// The most recently completed chunk is held back until at least one more
/// byte arrives, so every chunk returned by [`ChunkBuffer::feed`] is known not
/// to be the last one, and [`ChunkBuffer::finish`] always yields the last
/// chunk, sized `1..=chunk_size`. An input that is an exact multiple of the
/// chunk size therefore ends with a full-size final chunk and never with an
/// empty one.
#[derive(Debug)]
pub struct ChunkBuffer {
    chunk_size: usize,
    pending: BytesMut,
}

impl ChunkBuffer {
    pub fn new(chunk_size: usize) -> Self {
        assert!(chunk_size > 0, "chunk size must be positive");
        Self {
            chunk_size,
            pending: BytesMut::new(),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Bytes received but not yet handed out.
    pub fn buffered(&self) -> usize {
        self.pending.len()
    }

    /// Appends `data` and returns the chunks that are complete and not last.
    pub fn feed(&mut self, data: &[u8]) -> Vec<Bytes> {
        self.pending.extend_from_slice(data);
        let mut ready = Vec::new();
        while self.pending.len() > self.chunk_size {
            ready.push(self.pending.split_to(self.chunk_size).freeze());
        }
        ready
    }

    /// Ends the stream, returning the final chunk if any byte was received.
    pub fn finish(self) -> Option<Bytes> {
        if self.pending.is_empty() {
            None
        } else {
            Some(self.pending.freeze())
        }
    }
}
