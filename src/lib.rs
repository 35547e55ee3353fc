//! # heapcraft: a best-fit heap allocator over `sbrk` and `mmap`
//!
//! This crate implements the classical malloc family (`allocate`, `free`,
//! `zeroed_allocate`, `resize`) on top of two virtual-memory primitives:
//! program-break growth (`sbrk`) and anonymous mapping (`mmap`). Its value
//! is the bookkeeping discipline, not the primitives themselves: block
//! metadata, splitting, coalescing, best-fit selection, size-thresholded
//! placement, and in-place growth.
//!
//! ## Overview
//!
//! ```text
//!   HEAP MEMORY (the arena, grown via sbrk)
//!
//!   ┌──────────┬──────────┬──────────┬───────────────────────────────────┐
//!   │ Alloc    │ Free     │ Alloc    │             Free tail             │
//!   └──────────┴──────────┴──────────┴───────────────────────────────────┘
//!        ▲                                                  ▲
//!        │                                                  │
//!   global_base                                      program break
//!
//!   Requests at or above MMAP_THRESHOLD bypass the arena entirely and get
//!   a standalone mmap'd region instead, never linked into this chain.
//! ```
//!
//! ## Crate Structure
//!
//! ```text
//!   heapcraft
//!   ├── align        - fixed 8-byte alignment macro/fn
//!   ├── block        - block header, status, size thresholds
//!   ├── sys          - sbrk/mmap/munmap wrappers
//!   ├── registry     - forward-only chain traversal
//!   ├── placement    - best-fit, split, coalesce
//!   ├── acquisition  - arena-vs-mapping acquisition policy
//!   ├── heap         - HeapAllocator: the four public operations
//!   ├── global       - GlobalAlloc adapter
//!   └── error        - AllocatorError + fatal reporter
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use heapcraft::heap::HeapAllocator;
//!
//! let heap = HeapAllocator::new();
//!
//! unsafe {
//!     let p = heap.allocate(64).unwrap();
//!     *p.as_ptr() = 0xAB;
//!     heap.free(Some(p));
//! }
//! ```
//!
//! Or install it as the process allocator:
//!
//! ```rust,ignore
//! #[global_allocator]
//! static GLOBAL: heapcraft::global::SystemHeap = heapcraft::global::SystemHeap;
//! ```
//!
//! ## Concurrency
//!
//! Single-threaded cooperative: there is no internal synchronization.
//! `global_base` and the program break are process-global resources;
//! callers must serialize access externally.
//!
//! ## Safety
//!
//! This crate is inherently unsafe as it deals with raw memory management
//! and direct syscalls. Every allocation and deallocation operation
//! requires an `unsafe` block.

pub mod acquisition;
pub mod align;
pub mod block;
pub mod error;
pub mod global;
pub mod heap;
pub mod placement;
pub mod registry;
pub mod sys;

pub use block::{BlockHeader, Status, CALLOC_THRESHOLD, MMAP_THRESHOLD};
pub use error::AllocatorError;
pub use global::SystemHeap;
pub use heap::HeapAllocator;

use std::ptr::NonNull;

/// Allocates `size` bytes from the process-wide allocator instance. See
/// [`HeapAllocator::allocate`].
///
/// # Safety
/// Must be externally serialized with every other call into the
/// process-wide instance.
pub unsafe fn allocate(size: usize) -> Option<NonNull<u8>> {
  unsafe { heap::instance().allocate(size) }
}

/// Frees a payload pointer from the process-wide allocator instance. See
/// [`HeapAllocator::free`].
///
/// # Safety
/// `ptr`, if present, must have been returned by one of this module's free
/// functions and must not already have been freed.
pub unsafe fn free(ptr: Option<NonNull<u8>>) {
  unsafe { heap::instance().free(ptr) }
}

/// Zero-initialized allocation from the process-wide allocator instance.
/// See [`HeapAllocator::zeroed_allocate`].
///
/// # Safety
/// Same requirements as [`allocate`].
pub unsafe fn zeroed_allocate(nmemb: usize, size: usize) -> Option<NonNull<u8>> {
  unsafe { heap::instance().zeroed_allocate(nmemb, size) }
}

/// Resizes a payload pointer from the process-wide allocator instance. See
/// [`HeapAllocator::resize`].
///
/// # Safety
/// Same requirements as [`free`].
pub unsafe fn resize(ptr: Option<NonNull<u8>>, size: usize) -> Option<NonNull<u8>> {
  unsafe { heap::instance().resize(ptr, size) }
}
