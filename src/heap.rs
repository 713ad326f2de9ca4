use std::ptr::NonNull;

use tracing::debug;

use crate::{
  block::{
    BlockInfo, BlockView, DSIZE, Links, MAX_BLOCK_SIZE, Tag, WSIZE, footer_of, header_of, next_of,
    payload_capacity, prev_footer_of,
  },
  config::{FitStrategy, HeapConfig},
  error::{HeapError, Result},
  region::{ArenaRegion, Region},
};

/// Links are 4-byte offsets, so no block may start past this point.
pub(crate) const MAX_REGION_SIZE: usize = u32::MAX as usize;

/// Payload offset of the prologue block.
const PROLOGUE: usize = DSIZE;
/// Payload offset of the first regular block.
const FIRST_BLOCK: usize = PROLOGUE + DSIZE;

/// A live allocation, named by the offset of its payload within the heap region.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Payload(usize);

impl Payload {
  pub(crate) const fn new(bp: usize) -> Self {
    Self(bp)
  }

  pub const fn offset(self) -> usize {
    self.0
  }
}

/// A boundary-tagged heap over a growable [`Region`].
///
/// ```text
///   offset 0    4          8          12                            top
///   ┌──────────┬──────────┬──────────┬─────────────────────┬─────┬──────────┐
///   │ padding  │ prologue │ prologue │ block ...           │ ... │ epilogue │
///   │          │ hdr 8/a  │ ftr 8/a  │ hdr | payload | ftr │     │ hdr 0/a  │
///   └──────────┴──────────┴──────────┴─────────────────────┴─────┴──────────┘
/// ```
///
/// All allocator state (cursor, free-list head, counters) lives in this
/// value, so independent heaps can coexist.
#[derive(Debug)]
pub struct Heap<R = ArenaRegion> {
  pub(crate) region: R,
  pub(crate) config: HeapConfig,
  pub(crate) initialized: bool,
  /// Next-fit cursor: payload offset of the block the next search starts at.
  pub(crate) cursor: usize,
  /// Head of the explicit free list.
  pub(crate) free_head: Option<usize>,
  /// Number of free blocks, kept for every strategy.
  pub(crate) free_blocks: usize,
}

impl Heap<ArenaRegion> {
  /// A heap over a default-sized [`ArenaRegion`].
  pub fn new() -> Self {
    Self::with_region(ArenaRegion::new(), HeapConfig::default())
  }
}

impl Default for Heap<ArenaRegion> {
  fn default() -> Self {
    Self::new()
  }
}

impl<R: Region> Heap<R> {
  /// Creates an uninitialized heap. [`Heap::init`] must run before anything else.
  pub fn with_region(
    region: R,
    config: HeapConfig,
  ) -> Self {
    Self {
      region,
      config,
      initialized: false,
      cursor: PROLOGUE,
      free_head: None,
      free_blocks: 0,
    }
  }

  pub fn config(&self) -> &HeapConfig {
    &self.config
  }

  pub fn region(&self) -> &R {
    &self.region
  }

  pub fn is_initialized(&self) -> bool {
    self.initialized
  }

  /// Lays down the prologue and epilogue and seeds the first free block.
  ///
  /// # Errors
  ///
  /// - `HeapError::AlreadyInitialized` on a second call
  /// - `HeapError::InvalidChunkSize` if the configured chunk size is unusable
  /// - `HeapError::Region` if the region cannot provide the initial extent
  pub fn init(&mut self) -> Result<()> {
    if self.initialized {
      return Err(HeapError::AlreadyInitialized);
    }
    if !self.config.is_valid() {
      return Err(HeapError::InvalidChunkSize(self.config.chunk_size));
    }

    let base = self.region.grow(4 * WSIZE)?;
    assert_eq!(base, 0, "heap region must be empty before init");

    self.put(0, 0);
    self.put_tag(header_of(PROLOGUE), Tag::allocated(DSIZE));
    self.put_tag(footer_of(PROLOGUE, DSIZE), Tag::allocated(DSIZE));
    self.put_tag(header_of(FIRST_BLOCK), Tag::epilogue());
    self.cursor = PROLOGUE;
    self.initialized = true;

    let chunk = self.config.chunk_size;
    self.extend(chunk / WSIZE)?;

    debug!(
      chunk_size = chunk,
      strategy = ?self.config.strategy,
      "heap initialized"
    );
    Ok(())
  }

  /// Grows the heap by `words` words (rounded up to an even count) and
  /// returns the resulting free block after coalescing it with its lower neighbor.
  pub(crate) fn extend(
    &mut self,
    words: usize,
  ) -> Result<usize> {
    let words = words + words % 2;
    let size = words
      .checked_mul(WSIZE)
      .filter(|&size| size <= MAX_BLOCK_SIZE)
      .ok_or(HeapError::TooLarge(words.saturating_mul(WSIZE)))?;
    if self.region.len() + size > MAX_REGION_SIZE {
      return Err(HeapError::TooLarge(size));
    }

    // The new block's header overwrites the old epilogue.
    let bp = self.region.grow(size)?;

    self.put_tag(header_of(bp), Tag::free(size));
    self.put_tag(footer_of(bp, size), Tag::free(size));
    self.put_tag(header_of(next_of(bp, size)), Tag::epilogue());
    debug!(size, top = self.region.len(), "heap extended");

    Ok(self.coalesce(bp))
  }

  /// Usable bytes of an allocation. At least what was requested for it.
  ///
  /// # Panics
  ///
  /// Panics if `payload` does not name a currently allocated block. The same
  /// holds for [`Heap::payload`], [`Heap::payload_mut`] and [`Heap::as_ptr`].
  pub fn payload_size(
    &self,
    payload: Payload,
  ) -> usize {
    payload_capacity(self.allocated_tag(payload.offset(), "access").size())
  }

  pub fn payload(
    &self,
    payload: Payload,
  ) -> &[u8] {
    let bp = payload.offset();
    let len = self.payload_size(payload);
    &self.region.bytes()[bp..bp + len]
  }

  pub fn payload_mut(
    &mut self,
    payload: Payload,
  ) -> &mut [u8] {
    let bp = payload.offset();
    let len = self.payload_size(payload);
    &mut self.region.bytes_mut()[bp..bp + len]
  }

  /// Raw address of an allocation. Valid until the heap is dropped or the
  /// payload is released.
  pub fn as_ptr(
    &mut self,
    payload: Payload,
  ) -> NonNull<u8> {
    NonNull::from(self.payload_mut(payload)).cast::<u8>()
  }

  /// Walks every block between the prologue and the epilogue.
  pub fn blocks(&self) -> Blocks<'_, R> {
    Blocks {
      heap: self,
      bp: if self.initialized { FIRST_BLOCK } else { 0 },
    }
  }

  pub(crate) const fn prologue(&self) -> usize {
    PROLOGUE
  }

  pub(crate) const fn first_block(&self) -> usize {
    FIRST_BLOCK
  }

  pub(crate) fn uses_list(&self) -> bool {
    matches!(self.config.strategy, FitStrategy::ExplicitList(_))
  }

  pub(crate) fn view(
    &self,
    bp: usize,
  ) -> BlockView {
    if self.tag(bp).is_allocated() {
      BlockView::Allocated
    } else if self.uses_list() {
      BlockView::Free {
        links: Some(self.links(bp)),
      }
    } else {
      BlockView::Free { links: None }
    }
  }

  pub(crate) fn get(
    &self,
    offset: usize,
  ) -> u32 {
    let bytes = self.region.bytes();
    assert!(
      offset + WSIZE <= bytes.len(),
      "word at {offset} outside heap of {} bytes",
      bytes.len()
    );
    let mut word = [0; WSIZE];
    word.copy_from_slice(&bytes[offset..offset + WSIZE]);
    u32::from_ne_bytes(word)
  }

  pub(crate) fn put(
    &mut self,
    offset: usize,
    value: u32,
  ) {
    let bytes = self.region.bytes_mut();
    assert!(
      offset + WSIZE <= bytes.len(),
      "word at {offset} outside heap of {} bytes",
      bytes.len()
    );
    bytes[offset..offset + WSIZE].copy_from_slice(&value.to_ne_bytes());
  }

  /// Non-panicking read, for the validator.
  pub(crate) fn try_get(
    &self,
    offset: usize,
  ) -> Option<u32> {
    let bytes = self.region.bytes().get(offset..offset.checked_add(WSIZE)?)?;
    Some(u32::from_ne_bytes(bytes.try_into().ok()?))
  }

  pub(crate) fn put_tag(
    &mut self,
    offset: usize,
    tag: Tag,
  ) {
    self.put(offset, tag.pack());
  }

  /// Header tag of the block at `bp`.
  pub(crate) fn tag(
    &self,
    bp: usize,
  ) -> Tag {
    Tag::unpack(self.get(header_of(bp)))
  }

  pub(crate) fn block_size(
    &self,
    bp: usize,
  ) -> usize {
    self.tag(bp).size()
  }

  /// Writes matching header and footer tags for the block at `bp`.
  pub(crate) fn set_block(
    &mut self,
    bp: usize,
    tag: Tag,
  ) {
    self.put_tag(header_of(bp), tag);
    self.put_tag(footer_of(bp, tag.size()), tag);
  }

  pub(crate) fn next_block(
    &self,
    bp: usize,
  ) -> usize {
    next_of(bp, self.block_size(bp))
  }

  pub(crate) fn prev_block(
    &self,
    bp: usize,
  ) -> usize {
    let size = Tag::unpack(self.get(prev_footer_of(bp))).size();
    assert!(size <= bp, "block before {bp} claims {size} bytes");
    bp - size
  }

  pub(crate) fn prev_is_allocated(
    &self,
    bp: usize,
  ) -> bool {
    Tag::unpack(self.get(prev_footer_of(bp))).is_allocated()
  }

  pub(crate) fn links(
    &self,
    bp: usize,
  ) -> Links {
    Links {
      next: Links::decode(self.get(bp + Links::NEXT)),
      prev: Links::decode(self.get(bp + Links::PREV)),
    }
  }

  pub(crate) fn set_next_link(
    &mut self,
    bp: usize,
    next: Option<usize>,
  ) {
    self.put(bp + Links::NEXT, Links::encode(next));
  }

  pub(crate) fn set_prev_link(
    &mut self,
    bp: usize,
    prev: Option<usize>,
  ) {
    self.put(bp + Links::PREV, Links::encode(prev));
  }

  /// Header tag of the allocated block at `bp`. `op` names the caller in the panic message.
  pub(crate) fn allocated_tag(
    &self,
    bp: usize,
    op: &str,
  ) -> Tag {
    assert!(
      bp > PROLOGUE && bp < self.region.len(),
      "{op} of {bp} outside the heap"
    );
    let tag = self.tag(bp);
    assert!(
      tag.is_allocated() && tag.size() > 0,
      "{op} of {bp}, which is not an allocated block"
    );
    tag
  }

  pub(crate) fn assert_initialized(&self) {
    assert!(self.initialized, "heap used before init()");
  }
}

/// Iterator returned by [`Heap::blocks`].
pub struct Blocks<'a, R> {
  heap: &'a Heap<R>,
  bp: usize,
}

impl<R: Region> Iterator for Blocks<'_, R> {
  type Item = BlockInfo;

  fn next(&mut self) -> Option<Self::Item> {
    if self.bp == 0 {
      return None;
    }

    let tag = self.heap.tag(self.bp);
    if tag.size() == 0 {
      self.bp = 0;
      return None;
    }

    let info = BlockInfo {
      payload: self.bp,
      size: tag.size(),
      view: self.heap.view(self.bp),
    };
    self.bp = next_of(self.bp, tag.size());
    Some(info)
  }
}
