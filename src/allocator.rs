use tracing::{trace, warn};

use crate::{
  align::checked_align,
  block::{DSIZE, MAX_BLOCK_SIZE, MIN_BLOCK_SIZE, Tag, WSIZE, payload_capacity},
  config::FitStrategy,
  heap::{Heap, Payload},
  region::Region,
};

/// Total block size needed to hold `size` payload bytes, or `None` if it
/// cannot be represented.
pub(crate) fn adjusted_size(size: usize) -> Option<usize> {
  if size <= DSIZE {
    return Some(MIN_BLOCK_SIZE);
  }
  checked_align(size.checked_add(DSIZE)?).filter(|&asize| asize <= MAX_BLOCK_SIZE)
}

impl<R: Region> Heap<R> {
  /// Allocates a block with at least `size` usable bytes.
  ///
  /// Returns `None` for a zero-size request, without touching the heap, and
  /// when the region cannot grow far enough.
  pub fn allocate(
    &mut self,
    size: usize,
  ) -> Option<Payload> {
    self.assert_initialized();
    if size == 0 {
      return None;
    }

    let Some(asize) = adjusted_size(size) else {
      warn!(size, "allocation request too large");
      return None;
    };

    let bp = match self.find_fit(asize) {
      Some(bp) => bp,
      None => {
        let extend = asize.max(self.config.chunk_size);
        match self.extend(extend / WSIZE) {
          Ok(bp) => bp,
          Err(err) => {
            warn!(size, %err, "allocation failed");
            return None;
          }
        }
      }
    };

    self.place(bp, asize);
    trace!(size, asize, payload = bp, "allocate");
    Some(Payload::new(bp))
  }

  /// Returns a block to the heap, merging it with free neighbors.
  ///
  /// # Panics
  ///
  /// Panics if `payload` does not name a currently allocated block.
  pub fn release(
    &mut self,
    payload: Payload,
  ) {
    self.assert_initialized();
    let bp = payload.offset();
    let tag = self.allocated_tag(bp, "release");

    self.set_block(bp, Tag::free(tag.size()));
    let merged = self.coalesce(bp);
    trace!(payload = bp, size = tag.size(), merged, "release");
  }

  /// Resizes an allocation, preserving the first `min(old, new)` payload bytes.
  ///
  /// `None` as input behaves as [`Heap::allocate`], a zero `size` as
  /// [`Heap::release`]. On failure the original block is left untouched
  /// and `None` is returned.
  pub fn resize(
    &mut self,
    payload: Option<Payload>,
    size: usize,
  ) -> Option<Payload> {
    self.assert_initialized();
    let Some(payload) = payload else {
      return self.allocate(size);
    };
    if size == 0 {
      self.release(payload);
      return None;
    }

    let Some(asize) = adjusted_size(size) else {
      warn!(size, "resize request too large");
      return None;
    };

    let bp = payload.offset();
    let tag = self.allocated_tag(bp, "resize");

    if self.config.in_place_resize && self.resize_in_place(bp, tag.size(), asize) {
      trace!(payload = bp, size, "resize in place");
      return Some(payload);
    }

    let new = self.allocate(size)?;
    let keep = payload_capacity(tag.size()).min(size);
    self
      .region
      .bytes_mut()
      .copy_within(bp..bp + keep, new.offset());
    self.release(payload);
    trace!(from = bp, to = new.offset(), size, "resize by copy");
    Some(new)
  }

  fn resize_in_place(
    &mut self,
    bp: usize,
    csize: usize,
    asize: usize,
  ) -> bool {
    if asize <= csize {
      if csize - asize >= MIN_BLOCK_SIZE {
        self.set_block(bp, Tag::allocated(asize));
        let rest = bp + asize;
        self.set_block(rest, Tag::free(csize - asize));
        self.coalesce(rest);
      }
      return true;
    }

    let next = self.next_block(bp);
    let next_tag = self.tag(next);
    if next_tag.is_allocated() || csize + next_tag.size() < asize {
      return false;
    }

    self.index_remove(next);
    let total = csize + next_tag.size();
    self.split_allocated(bp, total, asize);
    let end = self.next_block(bp);
    if self.config.strategy == FitStrategy::NextFit && self.cursor > bp && self.cursor < end {
      self.cursor = end;
    }
    true
  }

  /// Allocates `asize` bytes out of the free block at `bp`.
  fn place(
    &mut self,
    bp: usize,
    asize: usize,
  ) {
    let csize = self.block_size(bp);
    debug_assert!(asize <= csize);

    self.index_remove(bp);
    self.split_allocated(bp, csize, asize);

    if self.config.strategy == FitStrategy::NextFit {
      self.cursor = self.next_block(bp);
    }
  }

  /// Marks the `csize` bytes at `bp` allocated, carving a free remainder off
  /// the end when it is large enough to stand as a block of its own.
  ///
  /// The span must be followed by an allocated block, so the remainder never
  /// needs coalescing.
  fn split_allocated(
    &mut self,
    bp: usize,
    csize: usize,
    asize: usize,
  ) {
    if csize - asize >= MIN_BLOCK_SIZE {
      self.set_block(bp, Tag::allocated(asize));
      let rest = bp + asize;
      self.set_block(rest, Tag::free(csize - asize));
      self.index_insert(rest);
      trace!(payload = bp, asize, remainder = csize - asize, "split");
    } else {
      self.set_block(bp, Tag::allocated(csize));
    }
  }

  /// Merges the free, unindexed block at `bp` with its free neighbors,
  /// indexes the result and returns its payload offset.
  pub(crate) fn coalesce(
    &mut self,
    bp: usize,
  ) -> usize {
    let prev_alloc = self.prev_is_allocated(bp);
    let next = self.next_block(bp);
    let next_alloc = self.tag(next).is_allocated();
    let mut size = self.block_size(bp);
    let original = size;

    let start = match (prev_alloc, next_alloc) {
      (true, true) => bp,
      (true, false) => {
        self.index_remove(next);
        size += self.block_size(next);
        bp
      }
      (false, true) => {
        let prev = self.prev_block(bp);
        self.index_remove(prev);
        size += self.block_size(prev);
        prev
      }
      (false, false) => {
        let prev = self.prev_block(bp);
        self.index_remove(prev);
        self.index_remove(next);
        size += self.block_size(prev) + self.block_size(next);
        prev
      }
    };

    self.set_block(start, Tag::free(size));
    self.index_insert(start);

    // A cursor pointing into an absorbed block would name a header that no longer exists.
    let end = start + size;
    if self.config.strategy == FitStrategy::NextFit && self.cursor > start && self.cursor < end {
      self.cursor = start;
    }

    if size != original {
      trace!(payload = start, size, "coalesce");
    }
    start
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    config::{HeapConfig, ListOrder},
    region::ArenaRegion,
  };

  const STRATEGIES: [FitStrategy; 4] = [
    FitStrategy::NextFit,
    FitStrategy::FirstFit,
    FitStrategy::ExplicitList(ListOrder::Lifo),
    FitStrategy::ExplicitList(ListOrder::AddressOrdered),
  ];

  fn heap_with(strategy: FitStrategy) -> Heap {
    let mut heap = Heap::with_region(
      ArenaRegion::with_capacity(1 << 16),
      HeapConfig::new().with_strategy(strategy),
    );
    heap.init().unwrap();
    heap
  }

  #[test]
  fn test_adjusted_size() {
    assert_eq!(adjusted_size(1), Some(16));
    assert_eq!(adjusted_size(8), Some(16));
    assert_eq!(adjusted_size(9), Some(24));
    assert_eq!(adjusted_size(40), Some(48));
    assert_eq!(adjusted_size(100), Some(112));
    assert_eq!(adjusted_size(usize::MAX), None);
    assert_eq!(adjusted_size(MAX_BLOCK_SIZE), None);
  }

  #[test]
  fn test_allocate_zero() {
    for strategy in STRATEGIES {
      let mut heap = heap_with(strategy);
      let before = heap.region().bytes().to_vec();
      assert_eq!(heap.allocate(0), None);
      assert_eq!(heap.region().bytes(), &before[..]);
    }
  }

  #[test]
  fn test_split_and_no_split() {
    let mut heap = heap_with(FitStrategy::FirstFit);

    // 256 - 240 = 16 is still a block.
    let a = heap.allocate(232).unwrap();
    assert_eq!(heap.payload_size(a), 232);
    assert_eq!(heap.free_block_count(), 1);
    heap.release(a);

    // 256 - 248 = 8 is not, so the whole block is handed out.
    let b = heap.allocate(240).unwrap();
    assert_eq!(heap.payload_size(b), 248);
    assert_eq!(heap.free_block_count(), 0);
    heap.check();
  }

  #[test]
  fn test_coalesce_cases() {
    for strategy in STRATEGIES {
      let mut heap = heap_with(strategy);
      let blocks: Vec<_> = (0..5).map(|_| heap.allocate(24).unwrap()).collect();
      let free_before = heap.free_block_count();

      // Both neighbors allocated.
      heap.release(blocks[1]);
      assert_eq!(heap.free_block_count(), free_before + 1);
      heap.check();

      // Only the previous neighbor free.
      heap.release(blocks[2]);
      assert_eq!(heap.free_block_count(), free_before + 1);
      assert_eq!(heap.block_size(blocks[1].offset()), 64);
      heap.check();

      // Only the next neighbor free.
      heap.release(blocks[0]);
      assert_eq!(heap.free_block_count(), free_before + 1);
      assert_eq!(heap.block_size(blocks[0].offset()), 96);
      heap.check();

      // Both neighbors free: merges with the tail remainder.
      heap.release(blocks[4]);
      heap.release(blocks[3]);
      assert_eq!(heap.free_block_count(), 1);
      assert_eq!(heap.block_size(blocks[0].offset()), 256);
      heap.check();
    }
  }

  #[test]
  fn test_coalesce_relocates_cursor() {
    let mut heap = heap_with(FitStrategy::NextFit);
    let a = heap.allocate(24).unwrap();
    let b = heap.allocate(24).unwrap();
    let c = heap.allocate(24).unwrap();
    let _d = heap.allocate(24).unwrap();

    heap.release(c);
    // Point the cursor at `c`, then absorb it into `b`.
    heap.cursor = c.offset();
    heap.release(b);
    assert_eq!(heap.cursor, b.offset());
    heap.check();

    heap.release(a);
    assert_eq!(heap.cursor, a.offset());
    heap.check();
  }

  #[test]
  fn test_allocate_grows_heap() {
    for strategy in STRATEGIES {
      let mut heap = heap_with(strategy);
      let top = heap.region().len();

      let big = heap.allocate(1000).unwrap();
      assert!(heap.payload_size(big) >= 1000);
      assert!(heap.region().len() > top);
      heap.check();
    }
  }

  #[test]
  fn test_payload_is_writable() {
    for strategy in STRATEGIES {
      let mut heap = heap_with(strategy);
      let a = heap.allocate(20).unwrap();
      let b = heap.allocate(20).unwrap();

      heap.payload_mut(a).fill(0xAA);
      heap.payload_mut(b).fill(0xBB);
      heap.check();
      assert!(heap.payload(a).iter().all(|&byte| byte == 0xAA));
      assert!(heap.payload(b).iter().all(|&byte| byte == 0xBB));
    }
  }

  #[test]
  fn test_resize_in_place_grow() {
    let mut heap = heap_with(FitStrategy::ExplicitList(ListOrder::Lifo));
    let a = heap.allocate(24).unwrap();
    let b = heap.allocate(24).unwrap();
    let _c = heap.allocate(24).unwrap();
    heap.payload_mut(a)[..4].copy_from_slice(b"tags");
    heap.release(b);

    let grown = heap.resize(Some(a), 48).unwrap();
    assert_eq!(grown, a);
    assert_eq!(heap.payload_size(grown), 56);
    assert_eq!(&heap.payload(grown)[..4], b"tags");
    heap.check();
  }

  #[test]
  fn test_resize_in_place_shrink() {
    let mut heap = heap_with(FitStrategy::NextFit);
    let a = heap.allocate(100).unwrap();
    let free_before = heap.free_block_count();

    let shrunk = heap.resize(Some(a), 10).unwrap();
    assert_eq!(shrunk, a);
    assert_eq!(heap.payload_size(shrunk), 16);
    assert_eq!(heap.block_size(a.offset() + 24), 232);
    // The cut-off tail merged with the free remainder.
    assert_eq!(heap.free_block_count(), free_before);
    heap.check();
  }

  #[test]
  fn test_resize_in_place_absorbs_cursor() {
    let mut heap = heap_with(FitStrategy::NextFit);
    let a = heap.allocate(24).unwrap();
    let b = heap.allocate(24).unwrap();
    let _c = heap.allocate(24).unwrap();
    heap.release(b);
    heap.cursor = b.offset();

    assert_eq!(heap.resize(Some(a), 48), Some(a));
    assert!(heap.cursor >= a.offset() + heap.block_size(a.offset()));
    heap.check();
  }

  #[test]
  fn test_resize_by_copy() {
    let mut heap = Heap::with_region(
      ArenaRegion::with_capacity(1 << 16),
      HeapConfig::new().with_in_place_resize(false),
    );
    heap.init().unwrap();

    let a = heap.allocate(16).unwrap();
    heap.payload_mut(a).copy_from_slice(&[7; 16]);

    let b = heap.resize(Some(a), 64).unwrap();
    assert_ne!(a, b);
    assert_eq!(&heap.payload(b)[..16], &[7; 16]);
    heap.check();
  }

  #[test]
  fn test_resize_null_and_zero() {
    let mut heap = heap_with(FitStrategy::FirstFit);

    let a = heap.resize(None, 32).unwrap();
    assert!(heap.payload_size(a) >= 32);

    assert_eq!(heap.resize(Some(a), 0), None);
    assert_eq!(heap.free_block_count(), 1);
    heap.check();
  }

  #[test]
  #[should_panic(expected = "not an allocated block")]
  fn test_double_release() {
    let mut heap = heap_with(FitStrategy::FirstFit);
    let a = heap.allocate(8).unwrap();
    heap.release(a);
    heap.release(a);
  }

  #[test]
  #[should_panic(expected = "before init")]
  fn test_allocate_before_init() {
    let mut heap = Heap::new();
    heap.allocate(8);
  }
}
