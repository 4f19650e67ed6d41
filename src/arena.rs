//! The growable byte region the heap lives in.
//!
//! [`Arena`] is the growth primitive the heap consumes, in the shape of
//! `sbrk(2)`: extend the region and hand back where the new bytes begin, or
//! refuse. The heap never learns the arena's limit except through that
//! refusal.
//!
//! ```text
//!   0                                   len              limit
//!   ├───────────────────────────────────┼──────────────────┤
//!   │          managed bytes            │  not yet grown   │
//!   └───────────────────────────────────┴──────────────────┘
//!                                       ▲
//!                                       └── break: grow(n) returns this
//! ```

use tracing::trace;

use crate::error::ArenaError;

/// Largest arena a boundary tag can describe in one block.
pub const MAX_ARENA_BYTES: usize = (u32::MAX & !0x7) as usize;

/// A contiguous byte region that can only grow.
pub trait Arena {
  /// Extends the region by `incr` bytes and returns the offset where the new
  /// bytes start (the old break).
  fn grow(
    &mut self,
    incr: usize,
  ) -> Result<usize, ArenaError>;

  /// Drops every byte, leaving an empty region.
  fn reset(&mut self);

  fn bytes(&self) -> &[u8];

  fn bytes_mut(&mut self) -> &mut [u8];

  /// Current break, in bytes from the start of the region.
  fn len(&self) -> usize {
    self.bytes().len()
  }

  fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

/// A heap-backed arena with a fixed upper bound.
#[derive(Debug, Clone)]
pub struct BoundedArena {
  buf: Vec<u8>,
  limit: usize,
}

impl BoundedArena {
  /// Default bound: 20 MiB.
  pub const DEFAULT_LIMIT: usize = 20 * (1 << 20);

  /// Creates an empty arena that refuses to grow past `limit` bytes.
  ///
  /// The limit is clamped to [`MAX_ARENA_BYTES`].
  pub fn new(limit: usize) -> Self {
    Self {
      buf: Vec::new(),
      limit: limit.min(MAX_ARENA_BYTES),
    }
  }

  pub fn limit(&self) -> usize {
    self.limit
  }

  /// Bytes still available before the limit is hit.
  pub fn remaining(&self) -> usize {
    self.limit - self.buf.len()
  }
}

impl Default for BoundedArena {
  fn default() -> Self {
    Self::new(Self::DEFAULT_LIMIT)
  }
}

impl Arena for BoundedArena {
  fn grow(
    &mut self,
    incr: usize,
  ) -> Result<usize, ArenaError> {
    let old_brk = self.buf.len();

    if incr > self.remaining() {
      return Err(ArenaError::Exhausted {
        requested: incr,
        available: self.remaining(),
      });
    }

    self.buf.resize(old_brk + incr, 0);
    trace!(incr, old_brk, new_brk = self.buf.len(), "arena grown");

    Ok(old_brk)
  }

  fn reset(&mut self) {
    self.buf.clear();
  }

  fn bytes(&self) -> &[u8] {
    &self.buf
  }

  fn bytes_mut(&mut self) -> &mut [u8] {
    &mut self.buf
  }
}
