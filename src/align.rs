use crate::block::ALIGNMENT;

/// Rounds a byte count up to the heap's double-word alignment, or `None` on overflow.
///
/// # Examples
///
/// ```rust
/// use tagalloc::align::checked_align;
///
/// assert_eq!(checked_align(13), Some(16));
/// assert_eq!(checked_align(16), Some(16));
/// assert_eq!(checked_align(17), Some(24));
/// ```
#[inline]
pub const fn checked_align(value: usize) -> Option<usize> {
  match value.checked_add(ALIGNMENT - 1) {
    Some(v) => Some(v & !(ALIGNMENT - 1)),
    None => None,
  }
}

#[inline]
pub const fn is_aligned(value: usize) -> bool {
  value & (ALIGNMENT - 1) == 0
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_align() {
    let mut alignments = Vec::new();

    for i in 0..10 {
      let sizes = (ALIGNMENT * i + 1)..=(ALIGNMENT * (i + 1));

      let expected_alignment = ALIGNMENT * (i + 1);

      alignments.push((sizes, expected_alignment));
    }

    for (sizes, expected) in alignments {
      for size in sizes {
        assert_eq!(Some(expected), checked_align(size));
      }
    }
  }

  #[test]
  fn test_checked_align_overflow() {
    assert_eq!(checked_align(0), Some(0));
    assert_eq!(checked_align(usize::MAX), None);
    assert_eq!(checked_align(usize::MAX - 7), Some(usize::MAX - 7));
  }

  #[test]
  fn test_is_aligned() {
    assert!(is_aligned(0));
    assert!(is_aligned(64));
    assert!(!is_aligned(4));
    assert!(!is_aligned(12));
  }
}
