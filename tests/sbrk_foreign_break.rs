//! A program break moved behind the region's back. Kept in its own test
//! binary, like `sbrk.rs`, so no other test moves the break meanwhile.

use libc::{c_void, sbrk};
use tagalloc::{Region, RegionError, SbrkRegion};

#[test]
fn test_foreign_break_move_is_refused() {
  let mut region = SbrkRegion::with_limit(1 << 12).unwrap();
  assert_eq!(region.grow(64), Ok(0));
  region.bytes_mut().fill(0x11);

  let foreign = unsafe { sbrk(32) };
  assert_ne!(foreign, usize::MAX as *mut c_void);
  assert_eq!(foreign.cast::<u8>(), region.base().wrapping_add(64));
  let moved = SbrkRegion::program_break();

  // The growth is rolled back, leaving the foreign bytes where they were.
  assert_eq!(region.grow(64), Err(RegionError::Discontiguous));
  assert_eq!(SbrkRegion::program_break(), moved);
  assert_eq!(region.len(), 64);
  assert!(region.bytes().iter().all(|&byte| byte == 0x11));

  unsafe { sbrk(-32) };
  assert_eq!(SbrkRegion::program_break(), region.base().wrapping_add(64));
  assert_eq!(region.grow(64), Ok(64));
  assert_eq!(region.len(), 128);
}
