use std::io::Read;

use tagalloc::{BlockView, FitStrategy, Heap, HeapConfig, Region, SbrkRegion};

/// Waits until the user presses ENTER when the demo runs with `--step`.
/// Useful when you want to inspect the program break with tools like `pmap`
/// or `gdb` between steps.
fn block_until_enter_pressed(step: bool) {
  if !step {
    return;
  }
  println!("\n>>> Press ENTER to continue...");
  let _ = std::io::stdin().bytes().next();
}

fn print_program_break(label: &str) {
  println!(
    "[{}] PID = {}, program break (sbrk(0)) = {:?}",
    label,
    std::process::id(),
    SbrkRegion::program_break(),
  );
}

/// Prints every block between the prologue and the epilogue.
fn print_heap<R: Region>(heap: &Heap<R>) {
  for block in heap.blocks() {
    let state = match block.view {
      BlockView::Allocated => "allocated".to_string(),
      BlockView::Free { links: Some(links) } => {
        format!("free (next = {:?}, prev = {:?})", links.next, links.prev)
      }
      BlockView::Free { links: None } => "free".to_string(),
    };
    println!("    {:>6} | {:>6} bytes | {}", block.payload, block.size, state);
  }

  let report = heap.verify().expect("heap is consistent");
  println!(
    "    {} blocks, {} free ({} bytes), heap size {} bytes",
    report.blocks, report.free_blocks, report.free_bytes, report.heap_size
  );
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
  tracing_subscriber::fmt()
    .with_max_level(tracing::Level::TRACE)
    .init();

  let step = std::env::args().any(|arg| arg == "--step");

  print_program_break("start");

  let region = SbrkRegion::with_limit(1 << 20)?;
  println!("Region base = {:?}", region.base());

  let config = HeapConfig::new().with_strategy(FitStrategy::NextFit);
  let mut heap = Heap::with_region(region, config);
  heap.init()?;

  print_program_break("after init");
  print_heap(&heap);
  block_until_enter_pressed(step);

  // --------------------------------------------------------------------
  // 1) Two allocations carved out of the initial chunk.
  // --------------------------------------------------------------------
  let a = heap.allocate(100).ok_or("out of memory")?;
  let b = heap.allocate(48).ok_or("out of memory")?;
  heap.payload_mut(a).fill(0xAB);
  let address = heap.as_ptr(a);
  println!("\n[1] a = {:?} at {:?}, b = {:?}", a, address, b);
  print_heap(&heap);
  block_until_enter_pressed(step);

  // --------------------------------------------------------------------
  // 2) Release `a` and allocate something smaller.
  //    With next fit the search resumes after `b`, so the hole left by `a`
  //    is only reused once the tail runs out.
  // --------------------------------------------------------------------
  heap.release(a);
  let c = heap.allocate(40).ok_or("out of memory")?;
  println!(
    "\n[2] c = {:?} (reused a's block? {})",
    c,
    if c == a { "yes" } else { "no" }
  );
  print_heap(&heap);
  block_until_enter_pressed(step);

  // --------------------------------------------------------------------
  // 3) Grow `b` past the end of the initial chunk.
  // --------------------------------------------------------------------
  print_program_break("before resize");
  let b = heap.resize(Some(b), 4096).ok_or("out of memory")?;
  println!("\n[3] b moved to {:?}", b);
  print_program_break("after resize");
  print_heap(&heap);
  block_until_enter_pressed(step);

  // --------------------------------------------------------------------
  // 4) Release everything: the heap collapses into a single free block.
  // --------------------------------------------------------------------
  heap.release(b);
  heap.release(c);
  println!("\n[4] released everything");
  print_heap(&heap);

  println!("\nEnd of example. Process will exit and the OS will reclaim all memory.");
  Ok(())
}
