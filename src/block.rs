//! Boundary-tag encoding and positional block arithmetic.
//!
//! A block is addressed by the offset of its payload (`bp`). Its header word
//! sits one word before `bp`, its footer one double word before the next
//! block. Nothing here stores a neighbour offset; every neighbour is found by
//! reading a size out of a tag.
//!
//! ```text
//!   ┌──────────┬──────────────────────────────┬──────────┐
//!   │ hdr      │ payload / free space         │ ftr      │
//!   │ size | a │                              │ size | a │
//!   └──────────┴──────────────────────────────┴──────────┘
//!              ▲
//!              └── bp
//! ```

use std::fmt;

/// Word size in bytes. Headers and footers are one word each.
pub const WSIZE: usize = 4;

/// Double word size in bytes, the alignment of every block.
pub const DSIZE: usize = 8;

/// Bytes of header + footer carried by every block.
pub const OVERHEAD: usize = 2 * WSIZE;

/// Smallest block the heap will ever create: overhead plus one double word.
pub const MIN_BLOCK_SIZE: usize = 2 * DSIZE;

const SIZE_MASK: u32 = !0x7;
const ALLOC_BIT: u32 = 0x1;

/// A header or footer word: block size with the allocated flag in bit 0.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Tag(u32);

impl Tag {
  /// Packs a size and allocated flag into a tag. The low three bits of
  /// `size` are discarded.
  pub const fn pack(
    size: u32,
    allocated: bool,
  ) -> Self {
    Self((size & SIZE_MASK) | allocated as u32)
  }

  /// Block size in bytes, overhead included.
  pub const fn size(self) -> usize {
    (self.0 & SIZE_MASK) as usize
  }

  pub const fn is_allocated(self) -> bool {
    self.0 & ALLOC_BIT != 0
  }

  /// The raw word as stored in the arena.
  pub const fn raw(self) -> u32 {
    self.0
  }
}

impl fmt::Display for Tag {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    let state = if self.is_allocated() { 'a' } else { 'f' };
    write!(f, "[{}:{}]", self.size(), state)
  }
}

/// Handle to an allocated payload: its byte offset inside the arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Payload(pub(crate) usize);

impl Payload {
  /// Offset of the first payload byte from the start of the arena.
  pub const fn offset(self) -> usize {
    self.0
  }
}

impl fmt::Display for Payload {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    write!(f, "{:#x}", self.0)
  }
}

/// Reads the word at `at`.
pub(crate) fn get(
  mem: &[u8],
  at: usize,
) -> Tag {
  let mut word = [0u8; WSIZE];
  word.copy_from_slice(&mem[at..at + WSIZE]);
  Tag(u32::from_le_bytes(word))
}

/// Like [`get`], but `None` when the word lies outside `mem`.
pub(crate) fn try_get(
  mem: &[u8],
  at: usize,
) -> Option<Tag> {
  let bytes = mem.get(at..at.checked_add(WSIZE)?)?;
  let mut word = [0u8; WSIZE];
  word.copy_from_slice(bytes);
  Some(Tag(u32::from_le_bytes(word)))
}

/// Writes `tag` at `at`.
pub(crate) fn put(
  mem: &mut [u8],
  at: usize,
  tag: Tag,
) {
  mem[at..at + WSIZE].copy_from_slice(&tag.0.to_le_bytes());
}

pub(crate) const fn header_addr(bp: usize) -> usize {
  bp - WSIZE
}

/// Footer offset, derived from the size currently in the block's header.
pub(crate) fn footer_addr(
  mem: &[u8],
  bp: usize,
) -> usize {
  bp + get(mem, header_addr(bp)).size() - DSIZE
}

pub(crate) fn next_block(
  mem: &[u8],
  bp: usize,
) -> usize {
  bp + get(mem, header_addr(bp)).size()
}

/// Previous block, found through the footer that ends right before our header.
pub(crate) fn prev_block(
  mem: &[u8],
  bp: usize,
) -> usize {
  bp - get(mem, bp - DSIZE).size()
}

/// Writes the same tag to a block's header and footer.
pub(crate) fn set_tags(
  mem: &mut [u8],
  bp: usize,
  size: usize,
  allocated: bool,
) {
  let tag = Tag::pack(size as u32, allocated);
  put(mem, header_addr(bp), tag);
  let footer = footer_addr(mem, bp);
  put(mem, footer, tag);
}

/// One block as seen by a heap walk.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockInfo {
  pub payload: Payload,
  /// Block size in bytes, overhead included.
  pub size: usize,
  pub allocated: bool,
}

/// Walks blocks in address order, stopping at the epilogue.
pub struct Blocks<'a> {
  mem: &'a [u8],
  bp: usize,
}

impl<'a> Blocks<'a> {
  pub(crate) fn new(
    mem: &'a [u8],
    first: usize,
  ) -> Self {
    Self { mem, bp: first }
  }
}

impl Iterator for Blocks<'_> {
  type Item = BlockInfo;

  fn next(&mut self) -> Option<BlockInfo> {
    let tag = try_get(self.mem, header_addr(self.bp))?;
    if tag.size() == 0 {
      return None;
    }

    let info = BlockInfo {
      payload: Payload(self.bp),
      size: tag.size(),
      allocated: tag.is_allocated(),
    };
    self.bp += tag.size();
    Some(info)
  }
}
