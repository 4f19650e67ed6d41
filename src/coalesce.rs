//! Boundary-tag coalescing.
//!
//! ```text
//!   prev   bp     next        result
//!   [a]   [f]    [a]    ->   [a][f][a]          (no merge)
//!   [a]   [f]    [f]    ->   [a][f      ]       (absorb next)
//!   [f]   [f]    [a]    ->   [f      ][a]       (absorbed by prev)
//!   [f]   [f]    [f]    ->   [f          ]      (all three)
//! ```

use tracing::trace;

use crate::{
  arena::Arena,
  block::{self, DSIZE},
  heap::Heap,
};

impl<A: Arena> Heap<A> {
  /// Merges free block `bp` with free neighbours and returns the resulting
  /// block. The search cursor is left on the returned block, so a block
  /// absorbed by the merge can never remain the cursor.
  pub(crate) fn coalesce(
    &mut self,
    bp: usize,
  ) -> usize {
    let mem = self.arena.bytes_mut();
    let next = block::next_block(mem, bp);
    let prev_tag = block::get(mem, bp - DSIZE);
    let next_tag = block::get(mem, block::header_addr(next));
    let mut size = block::get(mem, block::header_addr(bp)).size();

    let merged = match (prev_tag.is_allocated(), next_tag.is_allocated()) {
      (true, true) => bp,
      (true, false) => {
        size += next_tag.size();
        block::set_tags(mem, bp, size, false);
        bp
      }
      (false, true) => {
        let prev = block::prev_block(mem, bp);
        size += prev_tag.size();
        block::set_tags(mem, prev, size, false);
        prev
      }
      (false, false) => {
        let prev = block::prev_block(mem, bp);
        size += prev_tag.size() + next_tag.size();
        block::set_tags(mem, prev, size, false);
        prev
      }
    };

    trace!(at = merged, size, "coalesced");
    self.cursor = merged;
    merged
  }
}
