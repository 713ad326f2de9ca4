//! The growth primitive the heap draws its memory from.
//!
//! A region only ever grows, at its top, by whole byte counts. The heap never
//! holds addresses into it; every block is named by its offset from the
//! region's base, so the base itself is free to be wherever the backing store
//! put it as long as it is 8-byte aligned.

use std::{fmt, slice};

use libc::{c_void, intptr_t, sbrk};

use crate::{block::ALIGNMENT, error::RegionError};

/// Capacity of an [`ArenaRegion`] created with [`ArenaRegion::new`] (20 MiB).
pub const DEFAULT_CAPACITY: usize = 20 * (1 << 20);

pub trait Region {
  /// Extends the region by `extra` bytes and returns the offset at which the new bytes begin.
  ///
  /// # Errors
  ///
  /// Returns an error if the backing store cannot provide `extra` more bytes.
  /// A failed call leaves the region unchanged.
  fn grow(
    &mut self,
    extra: usize,
  ) -> Result<usize, RegionError>;

  /// The region's current extent. Its first byte is 8-byte aligned.
  fn bytes(&self) -> &[u8];

  fn bytes_mut(&mut self) -> &mut [u8];

  fn len(&self) -> usize {
    self.bytes().len()
  }

  fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

/// A fixed-capacity, in-process region.
///
/// The whole capacity is reserved up front; growth only moves the high-water
/// mark, and fails once it would pass the capacity.
pub struct ArenaRegion {
  // u64 storage keeps the base 8-byte aligned.
  words: Box<[u64]>,
  len: usize,
}

impl ArenaRegion {
  pub fn new() -> Self {
    Self::with_capacity(DEFAULT_CAPACITY)
  }

  /// Creates a region that can grow to `capacity` bytes, rounded down to the alignment.
  pub fn with_capacity(capacity: usize) -> Self {
    Self {
      words: vec![0u64; capacity / ALIGNMENT].into_boxed_slice(),
      len: 0,
    }
  }

  pub fn capacity(&self) -> usize {
    self.words.len() * ALIGNMENT
  }
}

impl Default for ArenaRegion {
  fn default() -> Self {
    Self::new()
  }
}

impl fmt::Debug for ArenaRegion {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    f.debug_struct("ArenaRegion")
      .field("len", &self.len)
      .field("capacity", &self.capacity())
      .finish()
  }
}

impl Region for ArenaRegion {
  fn grow(
    &mut self,
    extra: usize,
  ) -> Result<usize, RegionError> {
    let available = self.capacity() - self.len;
    if extra > available {
      return Err(RegionError::Exhausted {
        requested: extra,
        available,
      });
    }

    let offset = self.len;
    self.len += extra;
    Ok(offset)
  }

  fn bytes(&self) -> &[u8] {
    // SAFETY: `len` never exceeds the byte length of `words`, and any bit
    // pattern is a valid `u8`.
    unsafe { slice::from_raw_parts(self.words.as_ptr().cast::<u8>(), self.len) }
  }

  fn bytes_mut(&mut self) -> &mut [u8] {
    // SAFETY: as in `bytes`, and `&mut self` guarantees exclusive access.
    unsafe { slice::from_raw_parts_mut(self.words.as_mut_ptr().cast::<u8>(), self.len) }
  }
}

/// A region carved out of the process data segment with `sbrk(2)`.
///
/// The region assumes it owns every byte between its base and the program
/// break. If anything else moves the break in between two growths the next
/// growth is refused with [`RegionError::Discontiguous`].
#[derive(Debug)]
pub struct SbrkRegion {
  base: *mut u8,
  len: usize,
  limit: usize,
}

impl SbrkRegion {
  /// Starts a region at the current program break, without a size limit.
  ///
  /// # Errors
  ///
  /// Fails if the break cannot be queried or aligned.
  pub fn new() -> Result<Self, RegionError> {
    Self::with_limit(usize::MAX)
  }

  /// Starts a region at the current program break that refuses to grow past `limit` bytes.
  ///
  /// # Errors
  ///
  /// Fails if the break cannot be queried or aligned.
  pub fn with_limit(limit: usize) -> Result<Self, RegionError> {
    let brk = unsafe { sbrk(0) };
    if brk == usize::MAX as *mut c_void {
      return Err(RegionError::Sbrk);
    }

    let brk = brk.cast::<u8>();
    let padding = brk.align_offset(ALIGNMENT);
    if padding > 0 {
      let address = unsafe { sbrk(padding as intptr_t) };
      if address == usize::MAX as *mut c_void {
        return Err(RegionError::Sbrk);
      }
      if address.cast::<u8>() != brk {
        return Err(RegionError::Discontiguous);
      }
    }

    Ok(Self {
      base: brk.wrapping_add(padding),
      len: 0,
      limit,
    })
  }

  /// The first byte of the region.
  pub fn base(&self) -> *mut u8 {
    self.base
  }

  /// The current program break, as reported by `sbrk(0)`.
  pub fn program_break() -> *mut u8 {
    unsafe { sbrk(0) }.cast::<u8>()
  }
}

impl Region for SbrkRegion {
  fn grow(
    &mut self,
    extra: usize,
  ) -> Result<usize, RegionError> {
    let available = self.limit - self.len;
    let exhausted = RegionError::Exhausted {
      requested: extra,
      available,
    };
    if extra > available {
      return Err(exhausted);
    }
    let increment = intptr_t::try_from(extra).map_err(|_| exhausted)?;

    let address = unsafe { sbrk(increment) };
    if address == usize::MAX as *mut c_void {
      return Err(RegionError::Sbrk);
    }

    if address.cast::<u8>() != self.base.wrapping_add(self.len) {
      // Hand the stray bytes back; the break is still ours to move.
      unsafe { sbrk(-increment) };
      return Err(RegionError::Discontiguous);
    }

    let offset = self.len;
    self.len += extra;
    Ok(offset)
  }

  fn bytes(&self) -> &[u8] {
    // SAFETY: `base..base + len` lies below the program break, was handed to
    // this region by `sbrk` and is not shared with anyone else.
    unsafe { slice::from_raw_parts(self.base, self.len) }
  }

  fn bytes_mut(&mut self) -> &mut [u8] {
    // SAFETY: as in `bytes`, and `&mut self` guarantees exclusive access.
    unsafe { slice::from_raw_parts_mut(self.base, self.len) }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_arena_grow() {
    let mut region = ArenaRegion::with_capacity(64);
    assert!(region.is_empty());

    assert_eq!(region.grow(16), Ok(0));
    assert_eq!(region.grow(32), Ok(16));
    assert_eq!(region.len(), 48);
    assert_eq!(region.bytes().as_ptr().addr() % ALIGNMENT, 0);

    region.bytes_mut()[47] = 0xAB;
    assert_eq!(region.bytes()[47], 0xAB);
  }

  #[test]
  fn test_arena_exhausted() {
    let mut region = ArenaRegion::with_capacity(64);
    region.grow(48).unwrap();

    assert_eq!(
      region.grow(32),
      Err(RegionError::Exhausted {
        requested: 32,
        available: 16,
      })
    );
    assert_eq!(region.len(), 48);
    assert_eq!(region.grow(16), Ok(48));
  }

  #[test]
  fn test_arena_capacity_rounds_down() {
    assert_eq!(ArenaRegion::with_capacity(100).capacity(), 96);
  }
}
