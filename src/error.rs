//! Error types for arena growth and heap operations.

use thiserror::Error;

/// Failure reported by the arena-growth primitive.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ArenaError {
  /// The backing region cannot grow by the requested amount.
  #[error("arena exhausted: requested {requested} bytes, {available} bytes available")]
  Exhausted {
    /// Bytes the heap asked for.
    requested: usize,
    /// Bytes left before the arena limit.
    available: usize,
  },
}

/// Errors surfaced by [`Heap`](crate::Heap) operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AllocError {
  /// The arena could not be extended to satisfy a request.
  #[error("out of memory: {0}")]
  OutOfMemory(#[from] ArenaError),

  /// The adjusted block size does not fit in a boundary tag.
  #[error("request of {requested} bytes exceeds the largest encodable block")]
  RequestTooLarge {
    /// Payload bytes requested by the caller.
    requested: usize,
  },

  /// Chunk size must be a multiple of 8 and at least one minimum block.
  #[error("invalid chunk size {chunk_size}: must be a multiple of 8 and at least 16")]
  InvalidChunkSize {
    /// The rejected value.
    chunk_size: usize,
  },
}
