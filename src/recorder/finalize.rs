//! Container assembly
//!
//! Finalization is byte concatenation plus a declared content type. Chunks
//! are never re-encoded.

use super::buffer::Chunk;

/// A finalized recording
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Container {
    mime_type: String,
    data: Vec<u8>,
    chunk_count: usize,
}

impl Container {
    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Number of chunks the container was assembled from
    pub fn chunk_count(&self) -> usize {
        self.chunk_count
    }
}

/// Finalizer collaborator
pub trait Finalizer: Send + Sync {
    fn assemble(&self, chunks: Vec<Chunk>, mime_type: &str) -> Container;
}

/// Concatenates chunk payloads in arrival order
#[derive(Debug, Default, Clone, Copy)]
pub struct ConcatFinalizer;

impl Finalizer for ConcatFinalizer {
    fn assemble(&self, chunks: Vec<Chunk>, mime_type: &str) -> Container {
        let chunk_count = chunks.len();
        let total: usize = chunks.iter().map(Chunk::len).sum();
        let mut data = Vec::with_capacity(total);
        for chunk in chunks {
            data.extend_from_slice(&chunk.data);
        }

        tracing::debug!(
            "Assembled {} bytes from {} chunks as {}",
            data.len(),
            chunk_count,
            mime_type
        );

        Container {
            mime_type: mime_type.to_string(),
            data,
            chunk_count,
        }
    }
}
