//! Runs the heap on the real program break. Kept in its own test binary so
//! that nothing else in the process is moving the break concurrently.

use tagalloc::{FitStrategy, Heap, HeapConfig, ListOrder, Region, SbrkRegion};

#[test]
fn test_sbrk_backed_heap() {
  let region = SbrkRegion::with_limit(1 << 16).unwrap();
  let base = region.base();
  assert_eq!(base.addr() % 8, 0);

  let config = HeapConfig::new().with_strategy(FitStrategy::ExplicitList(ListOrder::AddressOrdered));
  let mut heap = Heap::with_region(region, config);
  heap.init().unwrap();
  assert!(SbrkRegion::program_break() >= base.wrapping_add(heap.region().len()));

  let a = heap.allocate(100).unwrap();
  let b = heap.allocate(3000).unwrap();
  heap.check();

  let ptr = heap.as_ptr(a);
  assert_eq!(ptr.as_ptr().addr() % 8, 0);
  unsafe { ptr.as_ptr().write_bytes(0xCD, 100) };
  assert!(heap.payload(a)[..100].iter().all(|&byte| byte == 0xCD));

  heap.release(a);
  let b = heap.resize(Some(b), 6000).unwrap();
  heap.check();

  // Past the limit the region refuses to grow and the heap stays usable.
  assert_eq!(heap.allocate(1 << 17), None);
  heap.check();

  heap.release(b);
  assert_eq!(heap.verify().unwrap().blocks, 1);
}
