//! Free-space index: finding a block for a request and keeping track of
//! which blocks are free.
//!
//! The implicit strategies need no bookkeeping beyond the boundary tags and
//! the next-fit cursor. The explicit strategy threads a doubly linked list
//! through the payloads of the free blocks.

use crate::{
  config::{FitStrategy, ListOrder},
  heap::Heap,
  region::Region,
};

impl<R: Region> Heap<R> {
  /// Returns the first free block of at least `asize` bytes in search order.
  pub(crate) fn find_fit(
    &mut self,
    asize: usize,
  ) -> Option<usize> {
    match self.config.strategy {
      FitStrategy::FirstFit => self.scan(self.first_block(), None, asize),
      FitStrategy::NextFit => {
        let start = self.cursor;
        let found = self
          .scan(start, None, asize)
          .or_else(|| self.scan(self.first_block(), Some(start), asize));
        if let Some(bp) = found {
          self.cursor = bp;
        }
        found
      }
      FitStrategy::ExplicitList(_) => {
        let mut node = self.free_head;
        while let Some(bp) = node {
          if self.block_size(bp) >= asize {
            return Some(bp);
          }
          node = self.links(bp).next;
        }
        None
      }
    }
  }

  /// Walks blocks from `from` until the epilogue or until `until` is reached.
  fn scan(
    &self,
    from: usize,
    until: Option<usize>,
    asize: usize,
  ) -> Option<usize> {
    let mut bp = from;
    loop {
      if until.is_some_and(|until| bp >= until) {
        return None;
      }
      let tag = self.tag(bp);
      if tag.size() == 0 {
        return None;
      }
      if tag.is_free() && tag.size() >= asize {
        return Some(bp);
      }
      bp += tag.size();
    }
  }

  /// Registers a block that has just become free and is not yet indexed.
  pub(crate) fn index_insert(
    &mut self,
    bp: usize,
  ) {
    debug_assert!(self.tag(bp).is_free());
    self.free_blocks += 1;

    match self.config.strategy {
      FitStrategy::ExplicitList(ListOrder::Lifo) => self.link_after(None, bp),
      FitStrategy::ExplicitList(ListOrder::AddressOrdered) => {
        let mut prev = None;
        let mut node = self.free_head;
        while let Some(current) = node {
          if current > bp {
            break;
          }
          prev = Some(current);
          node = self.links(current).next;
        }
        self.link_after(prev, bp);
      }
      FitStrategy::NextFit | FitStrategy::FirstFit => {}
    }
  }

  /// Forgets a free block that is about to be allocated or merged away.
  pub(crate) fn index_remove(
    &mut self,
    bp: usize,
  ) {
    debug_assert!(self.tag(bp).is_free());
    debug_assert!(self.free_blocks > 0);
    self.free_blocks -= 1;

    if !self.uses_list() {
      return;
    }

    let links = self.links(bp);
    match links.prev {
      Some(prev) => self.set_next_link(prev, links.next),
      None => self.free_head = links.next,
    }
    if let Some(next) = links.next {
      self.set_prev_link(next, links.prev);
    }
  }

  /// Splices `bp` into the list right after `prev`, or at the head if `prev` is `None`.
  fn link_after(
    &mut self,
    prev: Option<usize>,
    bp: usize,
  ) {
    let next = match prev {
      Some(prev) => self.links(prev).next,
      None => self.free_head,
    };

    self.set_prev_link(bp, prev);
    self.set_next_link(bp, next);
    match prev {
      Some(prev) => self.set_next_link(prev, Some(bp)),
      None => self.free_head = Some(bp),
    }
    if let Some(next) = next {
      self.set_prev_link(next, Some(bp));
    }
  }

  /// Payload offsets of the free list, head first. Empty unless the heap
  /// uses [`FitStrategy::ExplicitList`].
  pub fn free_list(&self) -> Vec<usize> {
    let mut nodes = Vec::with_capacity(self.free_blocks);
    let mut node = self.free_head;
    while let Some(bp) = node {
      nodes.push(bp);
      node = self.links(bp).next;
    }
    nodes
  }

  /// Number of free blocks on the heap.
  pub fn free_block_count(&self) -> usize {
    self.free_blocks
  }
}
