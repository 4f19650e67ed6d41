//! Free-space search and placement.

use tracing::trace;

use crate::{
  arena::Arena,
  block::{self, MIN_BLOCK_SIZE},
  config::SearchMode,
  heap::{FIRST_BLOCK, Heap},
};

impl<A: Arena> Heap<A> {
  /// Finds a free block of at least `asize` bytes and moves the cursor to it.
  ///
  /// Next-fit scans from the cursor to the epilogue, then wraps to the first
  /// block and stops once it is back at the cursor.
  pub(crate) fn find_fit(
    &mut self,
    asize: usize,
  ) -> Option<usize> {
    let start = match self.config.search {
      SearchMode::NextFit => self.cursor,
      SearchMode::FirstFit => FIRST_BLOCK,
    };

    let found = self
      .scan(start, None, asize)
      .or_else(|| self.scan(FIRST_BLOCK, Some(start), asize))?;

    self.cursor = found;
    Some(found)
  }

  /// Walks from `from` until the epilogue or `until`, whichever comes first.
  fn scan(
    &self,
    from: usize,
    until: Option<usize>,
    asize: usize,
  ) -> Option<usize> {
    let mem = self.arena.bytes();
    let mut bp = from;

    loop {
      if until == Some(bp) {
        return None;
      }

      let tag = block::get(mem, block::header_addr(bp));
      if tag.size() == 0 {
        return None;
      }
      if !tag.is_allocated() && tag.size() >= asize {
        return Some(bp);
      }
      bp += tag.size();
    }
  }

  /// Marks `asize` bytes at the start of free block `bp` allocated. A
  /// remainder of at least one minimum block is split off as a new free
  /// block; anything smaller stays inside the allocation.
  pub(crate) fn place(
    &mut self,
    bp: usize,
    asize: usize,
  ) {
    let mem = self.arena.bytes_mut();
    let size = block::get(mem, block::header_addr(bp)).size();

    if size - asize < MIN_BLOCK_SIZE {
      block::set_tags(mem, bp, size, true);
      return;
    }

    block::set_tags(mem, bp, asize, true);
    block::set_tags(mem, bp + asize, size - asize, false);
    trace!(at = bp, asize, remainder = size - asize, "split free block");
  }
}
