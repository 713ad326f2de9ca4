//! Heap consistency checker.
//!
//! Walks the block sequence from the prologue to the epilogue, then the
//! explicit free list if there is one, and cross-checks the two. Meant for
//! tests and debugging; nothing on the allocation path calls it.

use thiserror::Error;

use crate::{
  align::is_aligned,
  block::{DSIZE, Links, MIN_BLOCK_SIZE, Tag, WSIZE, footer_of, header_of},
  config::{FitStrategy, ListOrder},
  heap::Heap,
  region::Region,
};

/// A broken heap invariant, named by the payload offset of the offending block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Violation {
  #[error("heap is not initialized")]
  Uninitialized,
  #[error("prologue is damaged")]
  BadPrologue,
  #[error("block {bp} extends past the end of the heap")]
  OutOfBounds { bp: usize },
  #[error("block {bp} payload is misaligned")]
  Misaligned { bp: usize },
  #[error("block {bp} has invalid size {size}")]
  BadSize { bp: usize, size: usize },
  #[error("block {bp} header {header:?} does not match footer {footer:?}")]
  TagMismatch { bp: usize, header: Tag, footer: Tag },
  #[error("blocks {prev} and {bp} are both free")]
  Uncoalesced { prev: usize, bp: usize },
  #[error("epilogue at {bp} does not end the heap")]
  BadEpilogue { bp: usize },
  #[error("next-fit cursor {cursor} is not at a block boundary")]
  StrayCursor { cursor: usize },
  #[error("free list node {bp} is not a free block")]
  NotFree { bp: usize },
  #[error("free list node {bp} has prev link {found:?}, expected {expected:?}")]
  BrokenLink {
    bp: usize,
    expected: Option<usize>,
    found: Option<usize>,
  },
  #[error("free list is not in address order at {bp}")]
  Unordered { bp: usize },
  #[error("free list has a cycle")]
  Cycle,
  #[error("free list has {listed} nodes, heap has {walked} free blocks")]
  ListCount { listed: usize, walked: usize },
  #[error("free block counter is {counted}, heap has {walked} free blocks")]
  Counter { counted: usize, walked: usize },
}

/// Summary of a heap that passed [`Heap::verify`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HeapReport {
  pub blocks: usize,
  pub free_blocks: usize,
  pub free_bytes: usize,
  pub allocated_blocks: usize,
  pub allocated_bytes: usize,
  pub heap_size: usize,
}

impl<R: Region> Heap<R> {
  /// Checks every heap invariant.
  ///
  /// # Panics
  ///
  /// Panics on the first violation. A heap that fails this check cannot be
  /// trusted for any further operation.
  pub fn check(&self) {
    if let Err(violation) = self.verify() {
      panic!("heap consistency check failed: {violation}");
    }
  }

  /// Non-panicking form of [`Heap::check`].
  ///
  /// # Errors
  ///
  /// Returns the first invariant violation found.
  pub fn verify(&self) -> Result<HeapReport, Violation> {
    if !self.initialized {
      return Err(Violation::Uninitialized);
    }

    let prologue = self.prologue();
    let allocated = Some(Tag::allocated(DSIZE).pack());
    if self.try_get(header_of(prologue)) != allocated
      || self.try_get(footer_of(prologue, DSIZE)) != allocated
    {
      return Err(Violation::BadPrologue);
    }

    let top = self.region.len();
    let mut report = HeapReport {
      heap_size: top,
      ..HeapReport::default()
    };
    let mut free = Vec::new();
    let mut cursor_seen = self.cursor == prologue;
    let mut prev_free = None;
    let mut bp = self.first_block();

    loop {
      if bp == self.cursor {
        cursor_seen = true;
      }
      if !is_aligned(bp) {
        return Err(Violation::Misaligned { bp });
      }
      let header = self
        .try_get(header_of(bp))
        .map(Tag::unpack)
        .ok_or(Violation::OutOfBounds { bp })?;

      if header.size() == 0 {
        if !header.is_allocated() || bp != top {
          return Err(Violation::BadEpilogue { bp });
        }
        break;
      }

      let size = header.size();
      if size < MIN_BLOCK_SIZE || !is_aligned(size) {
        return Err(Violation::BadSize { bp, size });
      }
      // The block must end at or before the epilogue header.
      if header_of(bp) + size > top - WSIZE {
        return Err(Violation::OutOfBounds { bp });
      }
      let footer = self
        .try_get(footer_of(bp, size))
        .map(Tag::unpack)
        .ok_or(Violation::OutOfBounds { bp })?;
      if header != footer {
        return Err(Violation::TagMismatch { bp, header, footer });
      }

      report.blocks += 1;
      if header.is_free() {
        if let Some(prev) = prev_free {
          return Err(Violation::Uncoalesced { prev, bp });
        }
        prev_free = Some(bp);
        free.push(bp);
        report.free_bytes += size;
      } else {
        prev_free = None;
        report.allocated_blocks += 1;
        report.allocated_bytes += size;
      }

      bp += size;
    }
    report.free_blocks = free.len();

    if self.config.strategy == FitStrategy::NextFit && !cursor_seen {
      return Err(Violation::StrayCursor {
        cursor: self.cursor,
      });
    }
    if self.free_blocks != free.len() {
      return Err(Violation::Counter {
        counted: self.free_blocks,
        walked: free.len(),
      });
    }
    if let FitStrategy::ExplicitList(order) = self.config.strategy {
      self.verify_list(order, &free)?;
    }

    Ok(report)
  }

  /// `free` holds the free blocks found by the heap walk, in address order.
  fn verify_list(
    &self,
    order: ListOrder,
    free: &[usize],
  ) -> Result<(), Violation> {
    let mut listed = 0;
    let mut prev = None;
    let mut node = self.free_head;

    while let Some(bp) = node {
      if listed == free.len() {
        // More nodes than free blocks: either a cycle or a node that is not free.
        return Err(if free.binary_search(&bp).is_ok() {
          Violation::Cycle
        } else {
          Violation::NotFree { bp }
        });
      }
      if free.binary_search(&bp).is_err() {
        return Err(Violation::NotFree { bp });
      }

      let links = Links {
        next: self.try_get(bp + Links::NEXT).and_then(Links::decode),
        prev: self.try_get(bp + Links::PREV).and_then(Links::decode),
      };
      if links.prev != prev {
        return Err(Violation::BrokenLink {
          bp,
          expected: prev,
          found: links.prev,
        });
      }
      if order == ListOrder::AddressOrdered && prev.is_some_and(|prev| prev >= bp) {
        return Err(Violation::Unordered { bp });
      }

      listed += 1;
      prev = Some(bp);
      node = links.next;
    }

    if listed != free.len() {
      return Err(Violation::ListCount {
        listed,
        walked: free.len(),
      });
    }
    Ok(())
  }
}
