use tracing::{debug, trace, warn};

use crate::{
  align,
  arena::{Arena, BoundedArena},
  block::{self, Blocks, DSIZE, MIN_BLOCK_SIZE, OVERHEAD, Payload, Tag, WSIZE},
  config::HeapConfig,
  error::AllocError,
};

/// Payload offset of the prologue block.
pub(crate) const PROLOGUE: usize = DSIZE;

/// Payload offset of the first regular block.
pub(crate) const FIRST_BLOCK: usize = PROLOGUE + MIN_BLOCK_SIZE;

/// Bytes taken by alignment pad, prologue and the initial epilogue.
const INITIAL_WORDS: usize = 6;

/// Boundary-tag allocator over a single growable arena.
///
/// The heap keeps no index besides the tags themselves: blocks are walked
/// positionally, and the only extra state is the next-fit search cursor.
///
/// ```text
///   ┌─────┬──────────────┬─────────┬─────────┬─────┬──────────┐
///   │ pad │ prologue 16:a│ block   │ block   │ ... │ epi 0:a  │
///   └─────┴──────────────┴─────────┴─────────┴─────┴──────────┘
///   0     4              24                        len-4     len
/// ```
///
/// Not thread-safe; callers serialize every call.
#[derive(Debug)]
pub struct Heap<A: Arena = BoundedArena> {
  pub(crate) arena: A,
  pub(crate) config: HeapConfig,
  /// Payload offset of the block the next scan starts from.
  pub(crate) cursor: usize,
}

impl<A: Arena> Heap<A> {
  /// Creates a heap on `arena` with the default configuration and runs
  /// [`initialize`](Self::initialize).
  pub fn new(arena: A) -> Result<Self, AllocError> {
    Self::with_config(arena, HeapConfig::default())
  }

  pub fn with_config(
    arena: A,
    config: HeapConfig,
  ) -> Result<Self, AllocError> {
    config.validate()?;

    let mut heap = Self {
      arena,
      config,
      cursor: FIRST_BLOCK,
    };
    heap.initialize()?;
    Ok(heap)
  }

  /// Resets the arena and lays out prologue, epilogue and a first free
  /// chunk. Every payload handed out before is invalidated.
  pub fn initialize(&mut self) -> Result<(), AllocError> {
    self.arena.reset();

    let start = self.arena.grow(INITIAL_WORDS * WSIZE)?;
    let mem = self.arena.bytes_mut();
    block::put(mem, start, Tag::pack(0, false));
    block::set_tags(mem, start + PROLOGUE, MIN_BLOCK_SIZE, true);
    block::put(mem, start + FIRST_BLOCK - WSIZE, Tag::pack(0, true));

    let bp = self.extend(self.config.chunk_size / WSIZE)?;
    self.cursor = bp;

    debug!(
      chunk_size = self.config.chunk_size,
      arena_len = self.arena.len(),
      "heap initialized"
    );
    Ok(())
  }

  /// Grows the arena by `words` (rounded up to an even count), formats the
  /// new bytes as one free block followed by a fresh epilogue, and merges it
  /// with a trailing free block. Returns the resulting free block.
  pub(crate) fn extend(
    &mut self,
    words: usize,
  ) -> Result<usize, AllocError> {
    let size = align!(words * WSIZE);
    if size > u32::MAX as usize {
      return Err(AllocError::RequestTooLarge { requested: size });
    }

    let bp = match self.arena.grow(size) {
      Ok(bp) => bp,
      Err(err) => {
        warn!(%err, requested = size, "arena growth failed");
        return Err(err.into());
      }
    };

    // The old epilogue becomes the new block's header.
    let mem = self.arena.bytes_mut();
    block::set_tags(mem, bp, size, false);
    block::put(mem, bp + size - WSIZE, Tag::pack(0, true));
    debug!(bytes = size, at = bp, arena_len = self.arena.len(), "arena extended");

    Ok(self.coalesce(bp))
  }

  /// Allocates a block with at least `size` payload bytes.
  ///
  /// Returns `Ok(None)` for a zero-size request without touching the arena.
  /// The returned payload offset is always 8-byte aligned.
  pub fn allocate(
    &mut self,
    size: usize,
  ) -> Result<Option<Payload>, AllocError> {
    if size == 0 {
      return Ok(None);
    }

    let asize = adjusted_size(size)?;

    if let Some(bp) = self.find_fit(asize) {
      self.place(bp, asize);
      trace!(size, asize, at = bp, "allocated from free block");
      return Ok(Some(Payload(bp)));
    }

    let extend = asize.max(self.config.chunk_size);
    let bp = self.extend(extend / WSIZE)?;
    self.place(bp, asize);
    self.cursor = bp;
    trace!(size, asize, at = bp, "allocated after growth");

    Ok(Some(Payload(bp)))
  }

  /// Returns a block to the free space.
  ///
  /// `payload` must come from [`allocate`](Self::allocate) or
  /// [`resize`](Self::resize) on this heap and must not have been released
  /// since. Violations are not detected here; they corrupt the tags and
  /// surface only through [`check`](Self::check).
  pub fn release(
    &mut self,
    payload: Payload,
  ) {
    let bp = payload.0;
    let mem = self.arena.bytes_mut();
    let size = block::get(mem, block::header_addr(bp)).size();

    block::set_tags(mem, bp, size, false);
    trace!(at = bp, size, "released");

    self.coalesce(bp);
  }

  /// Moves a payload into a block of `size` bytes, keeping the first
  /// `min(size, usable_size)` bytes.
  ///
  /// `size == 0` releases the block and returns `Ok(None)`. If no block of
  /// the new size can be obtained, the error is returned and the original
  /// block stays allocated with its contents unchanged.
  pub fn resize(
    &mut self,
    payload: Payload,
    size: usize,
  ) -> Result<Option<Payload>, AllocError> {
    if size == 0 {
      self.release(payload);
      return Ok(None);
    }

    let Some(new) = self.allocate(size)? else {
      return Ok(None);
    };

    let len = size.min(self.usable_size(payload));
    self.arena.bytes_mut().copy_within(payload.0..payload.0 + len, new.0);
    self.release(payload);
    trace!(from = payload.0, to = new.0, copied = len, "resized");

    Ok(Some(new))
  }

  /// Payload bytes available in an allocated block.
  pub fn usable_size(
    &self,
    payload: Payload,
  ) -> usize {
    block::get(self.arena.bytes(), block::header_addr(payload.0)).size() - OVERHEAD
  }

  pub fn payload(
    &self,
    payload: Payload,
  ) -> &[u8] {
    let len = self.usable_size(payload);
    &self.arena.bytes()[payload.0..payload.0 + len]
  }

  pub fn payload_mut(
    &mut self,
    payload: Payload,
  ) -> &mut [u8] {
    let len = self.usable_size(payload);
    &mut self.arena.bytes_mut()[payload.0..payload.0 + len]
  }

  /// Every block between prologue and epilogue, in address order.
  pub fn blocks(&self) -> Blocks<'_> {
    Blocks::new(self.arena.bytes(), FIRST_BLOCK)
  }

  /// Payload offset of the block the next search starts from.
  pub fn cursor(&self) -> usize {
    self.cursor
  }

  pub fn config(&self) -> &HeapConfig {
    &self.config
  }

  pub fn arena(&self) -> &A {
    &self.arena
  }
}

/// Block size for a request: payload plus overhead, rounded to a double
/// word, never below the minimum block.
fn adjusted_size(size: usize) -> Result<usize, AllocError> {
  size
    .checked_add(OVERHEAD + DSIZE - 1)
    .map(|n| (n & !(DSIZE - 1)).max(MIN_BLOCK_SIZE))
    .filter(|&asize| asize <= u32::MAX as usize)
    .ok_or(AllocError::RequestTooLarge { requested: size })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{config::SearchMode, error::ArenaError};
  use proptest::prelude::*;

  /// Records every growth request before forwarding it.
  #[derive(Default)]
  struct RecordingArena {
    inner: BoundedArena,
    requests: Vec<usize>,
  }

  impl RecordingArena {
    fn with_limit(limit: usize) -> Self {
      Self {
        inner: BoundedArena::new(limit),
        requests: Vec::new(),
      }
    }
  }

  impl Arena for RecordingArena {
    fn grow(
      &mut self,
      incr: usize,
    ) -> Result<usize, ArenaError> {
      self.requests.push(incr);
      self.inner.grow(incr)
    }

    fn reset(&mut self) {
      self.requests.clear();
      self.inner.reset();
    }

    fn bytes(&self) -> &[u8] {
      self.inner.bytes()
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
      self.inner.bytes_mut()
    }
  }

  fn heap() -> Heap<RecordingArena> {
    Heap::new(RecordingArena::default()).unwrap()
  }

  fn alloc<A: Arena>(
    heap: &mut Heap<A>,
    size: usize,
  ) -> Payload {
    heap.allocate(size).unwrap().unwrap()
  }

  fn assert_clean<A: Arena>(heap: &Heap<A>) {
    let report = heap.check(false);
    assert!(report.is_ok(), "heap check failed: {:?}", report.issues);
  }

  #[test]
  fn initialize_lays_out_one_free_chunk() {
    let heap = heap();

    assert_eq!(heap.arena().requests, vec![24, 4096]);
    assert_eq!(heap.arena().len(), 24 + 4096);
    assert_eq!(heap.cursor(), FIRST_BLOCK);

    let blocks: Vec<_> = heap.blocks().collect();
    assert_eq!(blocks.len(), 1);
    assert_eq!(blocks[0].size, 4096);
    assert!(!blocks[0].allocated);
    assert_clean(&heap);
  }

  #[test]
  fn initialize_fails_when_the_arena_is_too_small() {
    let err = Heap::new(BoundedArena::new(16)).unwrap_err();
    assert!(matches!(err, AllocError::OutOfMemory(_)));

    let err = Heap::new(BoundedArena::new(1024)).unwrap_err();
    assert!(matches!(err, AllocError::OutOfMemory(_)));
  }

  #[test]
  fn initialize_rejects_invalid_config() {
    let err = Heap::with_config(BoundedArena::default(), HeapConfig::new(12)).unwrap_err();
    assert_eq!(err, AllocError::InvalidChunkSize { chunk_size: 12 });
  }

  #[test]
  fn reinitialize_discards_previous_blocks() {
    let mut heap = heap();
    alloc(&mut heap, 5000);
    alloc(&mut heap, 10);

    heap.initialize().unwrap();

    assert_eq!(heap.arena().len(), 24 + 4096);
    assert_eq!(heap.blocks().count(), 1);
    assert_clean(&heap);
  }

  #[test]
  fn zero_size_allocation_is_a_no_op() {
    let mut heap = heap();
    let before = heap.arena().bytes().to_vec();

    assert_eq!(heap.allocate(0), Ok(None));
    assert_eq!(heap.arena().bytes(), &before[..]);
  }

  #[test]
  fn adjusted_size_rounds_and_adds_overhead() {
    assert_eq!(adjusted_size(1), Ok(16));
    assert_eq!(adjusted_size(8), Ok(16));
    assert_eq!(adjusted_size(9), Ok(24));
    assert_eq!(adjusted_size(100), Ok(112));
    assert_eq!(adjusted_size(200), Ok(208));
    assert_eq!(
      adjusted_size(usize::MAX),
      Err(AllocError::RequestTooLarge { requested: usize::MAX })
    );
    assert!(adjusted_size(u32::MAX as usize).is_err());
  }

  #[test]
  fn allocations_are_aligned_and_sized() {
    let mut heap = heap();

    for size in [1, 7, 8, 9, 15, 16, 17, 100, 255, 1000] {
      let p = alloc(&mut heap, size);
      assert_eq!(p.offset() % DSIZE, 0);
      assert!(heap.usable_size(p) >= size);
      assert_eq!(heap.payload(p).len(), heap.usable_size(p));
    }
    assert_clean(&heap);
  }

  #[test]
  fn freed_block_is_reused() {
    let mut heap = heap();

    let p1 = alloc(&mut heap, 100);
    let p2 = alloc(&mut heap, 200);
    heap.release(p1);
    let grows = heap.arena().requests.len();

    let p3 = alloc(&mut heap, 50);

    assert_eq!(p3, p1);
    assert_eq!(heap.arena().requests.len(), grows);

    // 112-byte block split into 64 allocated + 48 free.
    let blocks: Vec<_> = heap.blocks().collect();
    assert_eq!(blocks[0].size, align!(50 + OVERHEAD));
    assert!(blocks[0].allocated);
    assert_eq!(blocks[1].size, 48);
    assert!(!blocks[1].allocated);
    assert_eq!(blocks[2].payload, p2);
    assert_clean(&heap);
  }

  #[test]
  fn small_remainder_is_absorbed() {
    let mut heap = heap();

    let p1 = alloc(&mut heap, 16);
    let _p2 = alloc(&mut heap, 16);
    heap.release(p1);

    // 24-byte block; a 16-byte request would leave 8, below the minimum.
    let p3 = alloc(&mut heap, 8);
    assert_eq!(p3, p1);
    assert_eq!(heap.usable_size(p3), 16);
    assert_clean(&heap);
  }

  #[test]
  fn no_fit_grows_by_at_least_a_chunk() {
    let mut heap = heap();
    alloc(&mut heap, 4000);

    alloc(&mut heap, 200);
    assert_eq!(heap.arena().requests.last(), Some(&4096));

    alloc(&mut heap, 10_000);
    assert_eq!(heap.arena().requests.last(), Some(&adjusted_size(10_000).unwrap()));
    assert_clean(&heap);
  }

  #[test]
  fn growth_merges_with_trailing_free_block() {
    let mut heap = heap();
    alloc(&mut heap, 1000);

    let p = alloc(&mut heap, 5000);

    // The trailing free remainder and the new region form one block, so the
    // allocation starts where the remainder did.
    assert_eq!(p.offset(), FIRST_BLOCK + adjusted_size(1000).unwrap());
    assert_clean(&heap);
  }

  #[test]
  fn exhaustion_is_reported_and_heap_stays_usable() {
    let mut heap = Heap::new(RecordingArena::with_limit(24 + 4096 + 4096)).unwrap();

    let err = heap.allocate(10_000).unwrap_err();
    assert!(matches!(err, AllocError::OutOfMemory(ArenaError::Exhausted { .. })));
    assert_clean(&heap);

    let p = alloc(&mut heap, 4000);
    assert_eq!(p.offset(), FIRST_BLOCK);
    alloc(&mut heap, 3000);
    assert_eq!(heap.arena().len(), 24 + 4096 + 4096);

    assert!(heap.allocate(4000).is_err());
    assert_clean(&heap);
  }

  #[test]
  fn coalescing_recovers_adjacent_blocks_in_any_order() {
    let orders = [[0, 1, 2], [0, 2, 1], [1, 0, 2], [1, 2, 0], [2, 0, 1], [2, 1, 0]];
    let sizes = [40, 72, 120];

    for order in orders {
      let mut heap = heap();
      let blocks: Vec<_> = sizes.iter().map(|&s| alloc(&mut heap, s)).collect();
      let _fence = alloc(&mut heap, 8);
      let grows = heap.arena().requests.len();

      for i in order {
        heap.release(blocks[i]);
        assert_clean(&heap);
      }

      let merged = alloc(&mut heap, sizes.iter().sum::<usize>() - 8);
      assert_eq!(merged, blocks[0]);
      assert_eq!(heap.arena().requests.len(), grows);
      assert_clean(&heap);
    }
  }

  #[test]
  fn resize_preserves_prefix() {
    let mut heap = heap();
    let p = alloc(&mut heap, 64);
    for (i, byte) in heap.payload_mut(p).iter_mut().enumerate() {
      *byte = i as u8;
    }

    let smaller = heap.resize(p, 20).unwrap().unwrap();
    assert_eq!(&heap.payload(smaller)[..20], &(0..20).collect::<Vec<u8>>()[..]);

    let larger = heap.resize(smaller, 500).unwrap().unwrap();
    assert_eq!(&heap.payload(larger)[..20], &(0..20).collect::<Vec<u8>>()[..]);
    assert!(heap.usable_size(larger) >= 500);
    assert_clean(&heap);
  }

  #[test]
  fn resize_to_zero_releases() {
    let mut heap = heap();
    let p = alloc(&mut heap, 64);
    let _q = alloc(&mut heap, 64);

    assert_eq!(heap.resize(p, 0), Ok(None));

    let first = heap.blocks().next().unwrap();
    assert_eq!(first.payload, p);
    assert!(!first.allocated);
    assert_clean(&heap);
  }

  #[test]
  fn failed_resize_keeps_original_intact() {
    let mut heap = Heap::new(BoundedArena::new(24 + 4096)).unwrap();
    let p = alloc(&mut heap, 100);
    heap.payload_mut(p).fill(0x5A);

    let err = heap.resize(p, 8000).unwrap_err();

    assert!(matches!(err, AllocError::OutOfMemory(_)));
    assert!(heap.payload(p).iter().all(|&b| b == 0x5A));
    let first = heap.blocks().next().unwrap();
    assert_eq!(first.payload, p);
    assert!(first.allocated);
    assert_clean(&heap);
  }

  #[test]
  fn next_fit_wraps_to_earlier_blocks() {
    let mut heap = heap();
    let a = alloc(&mut heap, 200);
    let _b = alloc(&mut heap, 8);
    // Use up the rest of the chunk so the only free block is `a`.
    let tail = heap.blocks().last().unwrap();
    alloc(&mut heap, tail.size - OVERHEAD);
    heap.release(a);

    // Park the cursor past `a`.
    heap.cursor = heap.blocks().last().unwrap().payload.offset();
    let grows = heap.arena().requests.len();

    let p = alloc(&mut heap, 100);
    assert_eq!(p, a);
    assert_eq!(heap.arena().requests.len(), grows);
    assert_clean(&heap);
  }

  #[test]
  fn first_fit_prefers_lowest_block() {
    let config = HeapConfig::default().with_search(SearchMode::FirstFit);
    let mut heap = Heap::with_config(BoundedArena::default(), config).unwrap();

    let a = alloc(&mut heap, 32);
    let _b = alloc(&mut heap, 32);
    let c = alloc(&mut heap, 32);
    let _d = alloc(&mut heap, 32);
    heap.release(c);
    heap.release(a);

    // First-fit ignores the cursor.
    heap.cursor = c.offset();
    assert_eq!(alloc(&mut heap, 16), a);
  }

  #[derive(Clone, Debug)]
  enum Op {
    Alloc(usize),
    Free(usize),
    Resize(usize, usize),
  }

  fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
      3 => (1usize..600).prop_map(Op::Alloc),
      2 => any::<usize>().prop_map(Op::Free),
      1 => (any::<usize>(), 0usize..900).prop_map(|(i, s)| Op::Resize(i, s)),
    ]
  }

  fn fill_byte(payload: Payload) -> u8 {
    (payload.offset() / DSIZE) as u8
  }

  proptest! {
    #[test]
    fn random_traffic_keeps_heap_consistent(
      ops in proptest::collection::vec(arb_op(), 1..120),
      first_fit in any::<bool>(),
    ) {
      let search = if first_fit { SearchMode::FirstFit } else { SearchMode::NextFit };
      let config = HeapConfig::new(512).with_search(search);
      let mut heap = Heap::with_config(BoundedArena::new(1 << 16), config).unwrap();
      let mut live: Vec<(Payload, usize)> = Vec::new();

      for op in ops {
        match op {
          Op::Alloc(size) => {
            if let Ok(Some(p)) = heap.allocate(size) {
              prop_assert_eq!(p.offset() % DSIZE, 0);
              let byte = fill_byte(p);
              heap.payload_mut(p)[..size].fill(byte);
              live.push((p, size));
            }
          }
          Op::Free(i) if !live.is_empty() => {
            let (p, _) = live.swap_remove(i % live.len());
            heap.release(p);
          }
          Op::Resize(i, size) if !live.is_empty() => {
            let idx = i % live.len();
            let (p, old) = live[idx];
            match heap.resize(p, size) {
              Ok(Some(q)) => {
                let kept = old.min(size);
                prop_assert!(heap.payload(q)[..kept].iter().all(|&b| b == fill_byte(p)));
                let byte = fill_byte(q);
                heap.payload_mut(q)[..size].fill(byte);
                live[idx] = (q, size);
              }
              Ok(None) => {
                live.swap_remove(idx);
              }
              Err(_) => {
                prop_assert!(heap.payload(p)[..old].iter().all(|&b| b == fill_byte(p)));
              }
            }
          }
          _ => {}
        }

        let report = heap.check(false);
        prop_assert!(report.is_ok(), "{:?}", report.issues);
        for &(p, size) in &live {
          let byte = fill_byte(p);
          prop_assert!(heap.payload(p)[..size].iter().all(|&b| b == byte));
        }
      }
    }
  }
}
