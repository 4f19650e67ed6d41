//! # tagalloc - A Boundary-Tag Heap Allocator
//!
//! This crate provides a dynamic memory allocator that manages one contiguous,
//! growable byte arena using **implicit free lists**, **next-fit** placement
//! and **boundary-tag coalescing**.
//!
//! ## Overview
//!
//! Every block carries its size and allocated bit twice, in a header word
//! before the payload and a footer word after it. Those tags are the only
//! metadata: free blocks are found by walking the arena block by block, and
//! a block's neighbours are found by reading the neighbouring tags.
//!
//! ```text
//!   Heap Layout:
//!
//!   ┌─────┬────────────┬───────────┬──────────────┬─────┬─────────┐
//!   │ pad │ prologue   │ block     │ block        │ ... │ epilogue│
//!   │     │ [16:a]     │ [112:a]   │ [3984:f]     │     │ [0:a]   │
//!   └─────┴────────────┴───────────┴──────────────┴─────┴─────────┘
//!                                  ▲                     ▲
//!                                  │                     │
//!                            search cursor          moves on growth
//!
//!   Allocated prologue and epilogue remove the edge cases from
//!   neighbour lookups: every real block has a tag on both sides.
//! ```
//!
//! ## Crate Structure
//!
//! ```text
//!   tagalloc
//!   ├── align      - align! macro (double-word rounding)
//!   ├── arena      - Arena growth primitive + BoundedArena
//!   ├── block      - Boundary-tag codec, Payload handle, block walk
//!   ├── config     - HeapConfig, SearchMode
//!   ├── error      - AllocError, ArenaError
//!   ├── heap       - Heap: initialize/allocate/release/resize, growth
//!   ├── fit        - next-fit scan and block placement (split)
//!   ├── coalesce   - four-case boundary-tag merge
//!   └── check      - consistency checker
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use tagalloc::{BoundedArena, Heap};
//!
//! # fn main() -> Result<(), tagalloc::AllocError> {
//! let mut heap = Heap::new(BoundedArena::default())?;
//!
//! let p = heap.allocate(100)?.expect("non-zero request");
//! heap.payload_mut(p)[..5].copy_from_slice(b"hello");
//!
//! let p = heap.resize(p, 400)?.expect("non-zero request");
//! assert_eq!(&heap.payload(p)[..5], b"hello");
//!
//! heap.release(p);
//! assert!(heap.check(false).is_ok());
//! # Ok(())
//! # }
//! ```
//!
//! ## How It Works
//!
//! ```text
//!   allocate(n)
//!     │  asize = max(16, align(n + 8))
//!     ▼
//!   find_fit ──miss──▶ extend(max(asize, chunk)) ──▶ coalesce
//!     │ hit                      │
//!     ▼                          ▼
//!   place: split if remainder ≥ 16 bytes
//!
//!   release(p)
//!     │  mark header + footer free
//!     ▼
//!   coalesce with free neighbours
//! ```
//!
//! ## Limitations
//!
//! - **Single-threaded only**: callers serialize every call
//! - **Never shrinks**: freed space stays in the arena
//! - **O(n) search**: the free list is implicit in the block sequence
//! - **Unchecked release**: double or foreign releases corrupt the heap and
//!   are only visible through [`Heap::check`]
//!
//! ## Safety
//!
//! Blocks are addressed by byte offset into a safe buffer, so the crate
//! contains no `unsafe` code. Misuse corrupts the heap's tags, not the
//! process's memory.

#![deny(unsafe_code)]

pub mod align;
pub mod arena;
pub mod block;
mod check;
mod coalesce;
pub mod config;
pub mod error;
mod fit;
mod heap;

pub use arena::{Arena, BoundedArena};
pub use block::{BlockInfo, Blocks, Payload, Tag};
pub use check::{HeapIssue, HeapReport};
pub use config::{HeapConfig, SearchMode};
pub use error::{AllocError, ArenaError};
pub use heap::Heap;
