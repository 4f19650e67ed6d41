//! Heap consistency checking.
//!
//! The checker only reads. Every tag is fetched with a bounds check, so a
//! heap with garbage tags yields findings instead of a panic.

use std::fmt;

use thiserror::Error;
use tracing::{debug, warn};

use crate::{
  arena::Arena,
  block::{self, DSIZE, MIN_BLOCK_SIZE, Tag, WSIZE},
  heap::{FIRST_BLOCK, Heap, PROLOGUE},
};

/// A structural problem found by [`Heap::check`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HeapIssue {
  #[error("bad prologue: expected [16:a] header and footer, found {header:?} / {footer:?}")]
  BadPrologue {
    header: Option<u32>,
    footer: Option<u32>,
  },

  #[error("bad epilogue at {at:#x}: {tag}")]
  BadEpilogue { at: usize, tag: Tag },

  #[error("epilogue at {at:#x} is not the last word of a {len}-byte arena")]
  EpilogueNotAtEnd { at: usize, len: usize },

  #[error("block {at:#x} is not doubleword aligned")]
  Misaligned { at: usize },

  #[error("block {at:#x} is {size} bytes, below the 16-byte minimum")]
  TooSmall { at: usize, size: usize },

  #[error("block {at:#x}: header {header} does not match footer {footer}")]
  TagMismatch { at: usize, header: Tag, footer: Tag },

  #[error("blocks {prev:#x} and {at:#x} are both free")]
  AdjacentFree { prev: usize, at: usize },

  /// A tag points outside the arena; the walk stops here.
  #[error("block {at:#x} runs past the end of the arena")]
  Truncated { at: usize },

  #[error("search cursor {cursor:#x} is not the start of a block")]
  CursorNotOnBlock { cursor: usize },
}

/// Outcome of a heap walk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeapReport {
  pub issues: Vec<HeapIssue>,
  /// One line per block; empty unless the check was verbose.
  pub dump: Vec<String>,
}

impl HeapReport {
  pub fn is_ok(&self) -> bool {
    self.issues.is_empty()
  }
}

impl fmt::Display for HeapReport {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    for line in &self.dump {
      writeln!(f, "{line}")?;
    }
    for issue in &self.issues {
      writeln!(f, "error: {issue}")?;
    }
    Ok(())
  }
}

impl<A: Arena> Heap<A> {
  /// Walks the heap from prologue to epilogue and reports every structural
  /// problem found. With `verbose`, the report also carries a dump of each
  /// block's header and footer.
  ///
  /// Never mutates the heap and never panics on corrupted tags.
  pub fn check(
    &self,
    verbose: bool,
  ) -> HeapReport {
    let mem = self.arena.bytes();
    let mut report = HeapReport::default();

    if verbose {
      report.dump.push(format!("heap ({} bytes):", mem.len()));
    }

    let header = block::try_get(mem, block::header_addr(PROLOGUE));
    let footer = block::try_get(mem, PROLOGUE + MIN_BLOCK_SIZE - DSIZE);
    let prologue = Tag::pack(MIN_BLOCK_SIZE as u32, true);
    if header != Some(prologue) || footer != Some(prologue) {
      report.issues.push(HeapIssue::BadPrologue {
        header: header.map(Tag::raw),
        footer: footer.map(Tag::raw),
      });
    }

    let mut bp = FIRST_BLOCK;
    let mut prev_free: Option<usize> = None;
    let mut cursor_seen = false;

    loop {
      let Some(header) = block::try_get(mem, block::header_addr(bp)) else {
        report.issues.push(HeapIssue::Truncated { at: bp });
        break;
      };

      if header.size() == 0 {
        if verbose {
          report.dump.push(format!("{bp:#x}: EOL"));
        }
        if !header.is_allocated() {
          report.issues.push(HeapIssue::BadEpilogue { at: bp, tag: header });
        }
        if block::header_addr(bp) + WSIZE != mem.len() {
          report.issues.push(HeapIssue::EpilogueNotAtEnd {
            at: bp,
            len: mem.len(),
          });
        }
        break;
      }

      cursor_seen |= bp == self.cursor;

      let Some(footer) = (bp + header.size())
        .checked_sub(DSIZE)
        .and_then(|at| block::try_get(mem, at))
      else {
        report.issues.push(HeapIssue::Truncated { at: bp });
        break;
      };

      if verbose {
        report.dump.push(format!("{bp:#x}: header: {header} footer: {footer}"));
      }
      if bp % DSIZE != 0 {
        report.issues.push(HeapIssue::Misaligned { at: bp });
      }
      if header.size() < MIN_BLOCK_SIZE {
        report.issues.push(HeapIssue::TooSmall {
          at: bp,
          size: header.size(),
        });
      }
      if header != footer {
        report.issues.push(HeapIssue::TagMismatch { at: bp, header, footer });
      }

      if header.is_allocated() {
        prev_free = None;
      } else {
        if let Some(prev) = prev_free {
          report.issues.push(HeapIssue::AdjacentFree { prev, at: bp });
        }
        prev_free = Some(bp);
      }

      bp += header.size();
    }

    if !cursor_seen {
      report.issues.push(HeapIssue::CursorNotOnBlock {
        cursor: self.cursor,
      });
    }

    for line in &report.dump {
      debug!("{line}");
    }
    for issue in &report.issues {
      warn!(%issue, "heap check");
    }

    report
  }
}
