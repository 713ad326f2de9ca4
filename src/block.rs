//! On-heap block encoding.
//!
//! Every block is bracketed by two identical boundary tags:
//!
//! ```text
//!   allocated: [header | payload ...........| footer]
//!   free:      [header | next | prev | ......| footer]
//!              ^       ^
//!              |       bp (payload offset, 8-byte aligned)
//!              bp - WSIZE
//! ```
//!
//! A tag is one 4-byte word: the block size with the low bit doubling as the
//! allocated flag. Sizes are always multiples of [`ALIGNMENT`], so the three
//! low bits are free for flags.

/// Width of a header, footer or free-list link in bytes.
pub const WSIZE: usize = 4;
/// Header plus footer.
pub const DSIZE: usize = 8;
/// Payload alignment and size granularity.
pub const ALIGNMENT: usize = 8;
/// Smallest block that can exist on the heap. Large enough for both free-list links.
pub const MIN_BLOCK_SIZE: usize = 2 * DSIZE;
/// Largest size representable in a tag.
pub const MAX_BLOCK_SIZE: usize = (u32::MAX as usize) & !(ALIGNMENT - 1);

const _: () = assert!(MIN_BLOCK_SIZE >= DSIZE + 2 * WSIZE);

const ALLOC_BIT: u32 = 0x1;
const SIZE_MASK: u32 = !0x7;

/// Decoded boundary tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Tag {
  size: usize,
  allocated: bool,
}

impl Tag {
  pub const fn new(
    size: usize,
    allocated: bool,
  ) -> Self {
    assert!(size % ALIGNMENT == 0, "tag size is not a multiple of the alignment");
    assert!(size <= MAX_BLOCK_SIZE, "tag size does not fit in a word");
    Self { size, allocated }
  }

  pub const fn free(size: usize) -> Self {
    Self::new(size, false)
  }

  pub const fn allocated(size: usize) -> Self {
    Self::new(size, true)
  }

  /// The zero-size allocated tag that terminates the heap.
  pub const fn epilogue() -> Self {
    Self::new(0, true)
  }

  #[inline]
  pub const fn size(self) -> usize {
    self.size
  }

  #[inline]
  pub const fn is_allocated(self) -> bool {
    self.allocated
  }

  #[inline]
  pub const fn is_free(self) -> bool {
    !self.allocated
  }

  /// Both fields are validated by [`Tag::new`] and [`Tag::unpack`], so the
  /// size always fits the word.
  #[inline]
  pub const fn pack(self) -> u32 {
    let flag = if self.allocated { ALLOC_BIT } else { 0 };
    self.size as u32 | flag
  }

  #[inline]
  pub const fn unpack(word: u32) -> Self {
    Self {
      size: (word & SIZE_MASK) as usize,
      allocated: word & ALLOC_BIT != 0,
    }
  }
}

/// Header offset of the block whose payload starts at `bp`.
#[inline]
pub const fn header_of(bp: usize) -> usize {
  bp - WSIZE
}

/// Footer offset of a block of `size` bytes with payload at `bp`.
#[inline]
pub const fn footer_of(
  bp: usize,
  size: usize,
) -> usize {
  bp + size - DSIZE
}

/// Payload offset of the block following one of `size` bytes at `bp`.
#[inline]
pub const fn next_of(
  bp: usize,
  size: usize,
) -> usize {
  bp + size
}

/// Footer offset of the block preceding `bp`.
#[inline]
pub const fn prev_footer_of(bp: usize) -> usize {
  bp - DSIZE
}

/// Usable payload bytes in a block of `size` bytes.
#[inline]
pub const fn payload_capacity(size: usize) -> usize {
  size - DSIZE
}

/// Intrusive links stored in the payload of a free block.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Links {
  pub next: Option<usize>,
  pub prev: Option<usize>,
}

impl Links {
  /// Offset of the `next` link inside a free block.
  pub const NEXT: usize = 0;
  /// Offset of the `prev` link inside a free block.
  pub const PREV: usize = WSIZE;

  /// Links are stored as payload offsets, 0 meaning none (no block lives at offset 0).
  #[inline]
  pub const fn encode(link: Option<usize>) -> u32 {
    match link {
      Some(bp) => bp as u32,
      None => 0,
    }
  }

  #[inline]
  pub const fn decode(word: u32) -> Option<usize> {
    match word {
      0 => None,
      bp => Some(bp as usize),
    }
  }
}

/// The two shapes a block can take over the same bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockView {
  Allocated,
  /// `links` is only populated when free blocks are threaded on an explicit list.
  Free { links: Option<Links> },
}

impl BlockView {
  pub const fn is_free(&self) -> bool {
    matches!(self, Self::Free { .. })
  }
}

/// A block as seen by [`Heap::blocks`](crate::Heap::blocks).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockInfo {
  pub payload: usize,
  pub size: usize,
  pub view: BlockView,
}
