//! # tagalloc - A Boundary-Tag Heap Allocator
//!
//! This crate provides a malloc-style allocator over a single contiguous
//! region that can only grow at its top, the way a program break grows under
//! `sbrk(2)`. Freed space is reused, oversized blocks are split and
//! neighbouring free blocks are merged eagerly.
//!
//! ## Overview
//!
//! ```text
//!   Heap Region:
//!
//!   ┌──────────────────────────────────────────────────────────────────────┐
//!   │ pad │ prologue │  A1  │  free  │  A2  │  A3  │   free    │ epilogue │
//!   └──────────────────────────────────────────────────────────────────────┘
//!         ▲                                                     ▲          ▲
//!         │                                                     │          │
//!     always allocated,                                  merged on free  region
//!     never merged                                                        top
//! ```
//!
//! Every block carries its size and allocated bit twice, in a header word
//! before the payload and a footer word after it:
//!
//! ```text
//!   Single Block:
//!   ┌──────────┬────────────────────────────────────┬──────────┐
//!   │  header  │              payload               │  footer  │
//!   │ size | a │  (free: next/prev list offsets)    │ size | a │
//!   └──────────┴────────────────────────────────────┴──────────┘
//!     4 bytes  ▲                                      4 bytes
//!              └── 8-byte aligned, returned to the caller
//! ```
//!
//! The footer lets `release` find the previous block in constant time, so
//! merging with either neighbour needs no other index.
//!
//! ## Crate Structure
//!
//! ```text
//!   tagalloc
//!   ├── align      - Alignment helpers
//!   ├── block      - Boundary tag encoding and block offset arithmetic
//!   ├── region     - Growth primitive: in-process arena and sbrk(2)
//!   ├── heap       - Heap context, init and extend
//!   ├── index      - Fit search and the explicit free list
//!   ├── allocator  - allocate / release / resize, splitting, coalescing
//!   └── check      - Heap consistency checker
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use tagalloc::{ArenaRegion, FitStrategy, Heap, HeapConfig};
//!
//! let config = HeapConfig::new().with_strategy(FitStrategy::NextFit);
//! let mut heap = Heap::with_region(ArenaRegion::with_capacity(1 << 16), config);
//! heap.init().unwrap();
//!
//! let a = heap.allocate(100).unwrap();
//! heap.payload_mut(a)[..5].copy_from_slice(b"hello");
//!
//! let a = heap.resize(Some(a), 400).unwrap();
//! assert_eq!(&heap.payload(a)[..5], b"hello");
//!
//! heap.release(a);
//! heap.check();
//! ```
//!
//! ## Search Strategies
//!
//! - **Next fit**: scan all blocks starting after the last placement, wrapping once
//! - **First fit**: scan all blocks from the start of the heap
//! - **Explicit list**: scan only free blocks, linked through their payloads,
//!   in LIFO or address order (the default is LIFO)
//!
//! ## Limitations
//!
//! - **Single-threaded only**: wrap the heap in a lock to share it
//! - **Grow-only**: memory is never returned to the region
//! - **4 GiB**: tags and links are 32-bit offsets

pub mod align;
mod allocator;
mod block;
mod check;
mod config;
mod error;
mod heap;
mod index;
mod region;

pub use block::{ALIGNMENT, BlockInfo, BlockView, DSIZE, Links, MIN_BLOCK_SIZE, Tag, WSIZE};
pub use check::{HeapReport, Violation};
pub use config::{DEFAULT_CHUNK_SIZE, FitStrategy, HeapConfig, ListOrder};
pub use error::{HeapError, RegionError, Result};
pub use heap::{Blocks, Heap, Payload};
pub use region::{ArenaRegion, DEFAULT_CAPACITY, Region, SbrkRegion};
