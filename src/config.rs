//! Heap configuration parameters.

use crate::{
  block::{DSIZE, MIN_BLOCK_SIZE},
  error::AllocError,
};

/// Where the free-space scan starts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SearchMode {
  /// Resume at the search cursor and wrap around the arena once.
  #[default]
  NextFit,
  /// Always scan from the first block after the prologue.
  FirstFit,
}

/// Configuration for a [`Heap`](crate::Heap).
///
/// Validated when the heap is constructed; immutable afterwards.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeapConfig {
  /// Minimum number of bytes requested from the arena when no free block
  /// fits. Also the size of the first free region created by `initialize`.
  ///
  /// Default: 4096. Must be a multiple of 8 and at least 16.
  pub chunk_size: usize,

  /// Free-space search policy. Default: [`SearchMode::NextFit`].
  pub search: SearchMode,
}

impl HeapConfig {
  /// Default growth chunk in bytes.
  pub const DEFAULT_CHUNK_SIZE: usize = 1 << 12;

  pub fn new(chunk_size: usize) -> Self {
    Self {
      chunk_size,
      search: SearchMode::default(),
    }
  }

  /// Sets the search policy.
  pub fn with_search(
    mut self,
    search: SearchMode,
  ) -> Self {
    self.search = search;
    self
  }

  /// Rejects chunk sizes that would break alignment or the minimum block size.
  pub fn validate(&self) -> Result<(), AllocError> {
    if self.chunk_size < MIN_BLOCK_SIZE || self.chunk_size % DSIZE != 0 {
      return Err(AllocError::InvalidChunkSize {
        chunk_size: self.chunk_size,
      });
    }
    Ok(())
  }
}

impl Default for HeapConfig {
  fn default() -> Self {
    Self::new(Self::DEFAULT_CHUNK_SIZE)
  }
}
