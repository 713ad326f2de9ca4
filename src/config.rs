use crate::block::{ALIGNMENT, MAX_BLOCK_SIZE, MIN_BLOCK_SIZE};

/// Bytes requested from the region whenever the heap runs out of free space.
pub const DEFAULT_CHUNK_SIZE: usize = 1 << 8;

/// Insertion policy of the explicit free list.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ListOrder {
  /// Freed blocks are pushed at the head.
  #[default]
  Lifo,
  /// The list is kept sorted by address.
  AddressOrdered,
}

/// How a request is matched against free blocks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FitStrategy {
  /// Walk every block, resuming after the last placement and wrapping once.
  NextFit,
  /// Walk every block from the start of the heap.
  FirstFit,
  /// Walk only the free blocks, threaded through their payloads.
  ExplicitList(ListOrder),
}

impl Default for FitStrategy {
  fn default() -> Self {
    Self::ExplicitList(ListOrder::Lifo)
  }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HeapConfig {
  pub chunk_size: usize,
  pub strategy: FitStrategy,
  /// Try to shrink and grow blocks without moving them.
  pub in_place_resize: bool,
}

impl HeapConfig {
  pub const fn new() -> Self {
    Self {
      chunk_size: DEFAULT_CHUNK_SIZE,
      strategy: FitStrategy::ExplicitList(ListOrder::Lifo),
      in_place_resize: true,
    }
  }

  pub const fn with_chunk_size(
    mut self,
    chunk_size: usize,
  ) -> Self {
    self.chunk_size = chunk_size;
    self
  }

  pub const fn with_strategy(
    mut self,
    strategy: FitStrategy,
  ) -> Self {
    self.strategy = strategy;
    self
  }

  pub const fn with_in_place_resize(
    mut self,
    enabled: bool,
  ) -> Self {
    self.in_place_resize = enabled;
    self
  }

  pub(crate) const fn is_valid(&self) -> bool {
    self.chunk_size >= MIN_BLOCK_SIZE
      && self.chunk_size <= MAX_BLOCK_SIZE
      && self.chunk_size % ALIGNMENT == 0
  }
}

impl Default for HeapConfig {
  fn default() -> Self {
    Self::new()
  }
}
