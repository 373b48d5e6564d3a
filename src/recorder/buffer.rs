//! Chunk buffer
//!
//! Append-only, ordered store of encoded chunks for one recording. The buffer
//! is shared between the session and its stop coordinator, which drains it at
//! the instant finalization happens.

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::time::Instant;

/// An opaque, time-ordered slice of encoded data
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// Position in arrival order, starting at 0
    pub sequence: u64,
    pub data: Vec<u8>,
    pub received_at: Instant,
}

impl Chunk {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[derive(Default)]
struct BufferInner {
    chunks: Vec<Chunk>,
    next_sequence: u64,
    bytes: usize,
}

/// Shared handle to a session's chunk buffer
#[derive(Clone, Default)]
pub struct ChunkBuffer {
    inner: Arc<Mutex<BufferInner>>,
}

impl ChunkBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return its sequence number
    pub fn append(&self, data: Vec<u8>) -> u64 {
        let mut inner = self.inner.lock();
        let sequence = inner.next_sequence;
        inner.next_sequence += 1;
        inner.bytes += data.len();
        inner.chunks.push(Chunk {
            sequence,
            data,
            received_at: Instant::now(),
        });
        sequence
    }

    pub fn len(&self) -> usize {
        self.inner.lock().chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().chunks.is_empty()
    }

    /// Total bytes across all buffered chunks
    pub fn total_bytes(&self) -> usize {
        self.inner.lock().bytes
    }

    /// Remove and return every chunk in arrival order
    pub fn take(&self) -> Vec<Chunk> {
        let mut inner = self.inner.lock();
        inner.bytes = 0;
        std::mem::take(&mut inner.chunks)
    }

    /// Discard all chunks and restart sequence numbering
    pub fn clear(&self) {
        *self.inner.lock() = BufferInner::default();
    }
}
