//! # Heap Allocator
//!
//! The four public operations (`allocate`, `free`, `zeroed_allocate`,
//! `resize`), layered over the registry, placement, and acquisition engines.
//!
//! ## Overview
//!
//! Unlike a pure bump allocator, this allocator reuses freed arena blocks
//! via best-fit search and coalesces adjacent free blocks before every
//! reuse attempt. Large requests bypass the arena entirely and go straight
//! to an anonymous mapping, so the registry never has to account for them.
//!
//! ```text
//!   allocate(size)
//!          │
//!          ▼
//!   size < MMAP_THRESHOLD? ──no──► map_anon(align(size + header))
//!          │ yes
//!          ▼
//!   registry empty? ──yes──► acquire_first_arena() [+ split if leftover permits]
//!          │ no
//!          ▼
//!   coalesce(global_base)
//!   best_fit(global_base, size) ──hit──► done
//!          │ miss
//!          ▼
//!   acquire_arena_tail(global_base, size)
//! ```
//!
//! ## Safety
//!
//! Every operation here is unsafe: it dereferences raw header pointers and
//! mutates process-global state (the program break, and `global_base`).
//! Callers must serialize access externally; see the crate's concurrency
//! model documentation.

use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicPtr, Ordering};
use std::sync::OnceLock;

use crate::acquisition::{acquire_arena_tail, acquire_first_arena, acquire_mapped};
use crate::align::align;
use crate::block::{BlockHeader, Status, CALLOC_THRESHOLD, MMAP_THRESHOLD};
use crate::error::{report_fatal, AllocatorError};
use crate::placement::{best_fit, coalesce, coalesce_for_resize, min_split_leftover, split};
use crate::sys::unmap;

/// The allocator's process-wide registry root and public operations.
///
/// A process normally uses the single shared instance returned by
/// [`instance`] rather than constructing its own: the program break is a
/// process-global resource, so two independent `HeapAllocator`s would
/// silently race over it (see [`crate`] module docs on the concurrency
/// model).
pub struct HeapAllocator {
  global_base: AtomicPtr<BlockHeader>,
}

impl Default for HeapAllocator {
  fn default() -> Self {
    Self::new()
  }
}

impl HeapAllocator {
  pub const fn new() -> Self {
    Self {
      global_base: AtomicPtr::new(ptr::null_mut()),
    }
  }

  fn base(&self) -> *mut BlockHeader {
    self.global_base.load(Ordering::Relaxed)
  }

  fn set_base(&self, block: *mut BlockHeader) {
    self.global_base.store(block, Ordering::Relaxed);
  }

  /// Acquires a block of `size` usable bytes, deciding between the arena
  /// and the mapping primitive according to `arena_path` (the caller has
  /// already evaluated the size-vs-threshold test, since `allocate` and
  /// `zeroed_allocate` use different formulas).
  unsafe fn acquire(&self, size: usize, arena_path: bool) -> Result<*mut BlockHeader, AllocatorError> {
    unsafe {
      if self.base().is_null() {
        if arena_path {
          let block = acquire_first_arena()?;
          self.set_base(block);
          let leftover = align((*block).size) - align(size);
          if leftover >= min_split_leftover() {
            split(block, size);
          }
          Ok(block)
        } else {
          acquire_mapped(size)
        }
      } else if arena_path {
        coalesce(self.base());
        let found = best_fit(self.base(), size);
        if !found.is_null() {
          Ok(found)
        } else {
          acquire_arena_tail(self.base(), size)
        }
      } else {
        acquire_mapped(size)
      }
    }
  }

  /// Allocates `size` bytes. Returns `None` for a zero-size request.
  ///
  /// # Safety
  /// Must be externally serialized with every other call into this
  /// instance (see the crate's concurrency model).
  pub unsafe fn allocate(&self, size: usize) -> Option<NonNull<u8>> {
    unsafe {
      if size == 0 {
        return None;
      }

      let arena_path = size < MMAP_THRESHOLD;
      let block = self.acquire(size, arena_path).unwrap_or_else(|e| report_fatal(e));
      Some(NonNull::new_unchecked(BlockHeader::payload(block)))
    }
  }

  /// Frees a payload pointer previously returned by this allocator. A no-op
  /// on `None`. Mapped blocks are unmapped immediately; arena blocks are
  /// only flipped to `Free` (coalescing is deferred to the next placement
  /// attempt).
  ///
  /// # Safety
  /// `ptr`, if present, must have been returned by `allocate`,
  /// `zeroed_allocate`, or `resize` on this same instance, and must not
  /// already have been freed.
  pub unsafe fn free(&self, ptr: Option<NonNull<u8>>) {
    unsafe {
      let Some(ptr) = ptr else { return };
      let block = BlockHeader::from_payload(ptr.as_ptr());

      if (*block).is_mapped() {
        let mapped_bytes = align((*block).size + BlockHeader::header_size());
        if let Err(e) = unmap(block as *mut u8, mapped_bytes) {
          report_fatal(e);
        }
      } else {
        (*block).status = Status::Free;
      }
    }
  }

  /// Allocates `nmemb * size` zero-filled bytes. Returns `None` if either
  /// factor is zero or the product overflows `usize`.
  ///
  /// Uses [`CALLOC_THRESHOLD`] rather than [`MMAP_THRESHOLD`] to decide
  /// between the arena and the mapping primitive, since mapped pages
  /// already arrive zero-filled from the kernel and only need zeroing
  /// again for uniformity (a policy choice, not a correctness requirement).
  ///
  /// # Safety
  /// Same requirements as [`HeapAllocator::allocate`].
  pub unsafe fn zeroed_allocate(&self, nmemb: usize, size: usize) -> Option<NonNull<u8>> {
    unsafe {
      if nmemb == 0 || size == 0 {
        return None;
      }

      let total = nmemb.checked_mul(size)?;
      // checked_mul rejects any nmemb*size product that overflows usize.

      let arena_path = align(total + BlockHeader::header_size()) < CALLOC_THRESHOLD;
      let block = self.acquire(total, arena_path).unwrap_or_else(|e| report_fatal(e));
      let payload = BlockHeader::payload(block);
      ptr::write_bytes(payload, 0, total);
      Some(NonNull::new_unchecked(payload))
    }
  }

  /// Resizes the allocation at `ptr` to `size` bytes: an absent pointer
  /// behaves as `allocate`, zero size behaves as `free`, a `Free` header is
  /// a signal of misuse and returns `None`, a `Mapped` block always moves,
  /// and arena blocks grow in place when coalescing can satisfy the request
  /// or shrink in place via split.
  ///
  /// # Safety
  /// Same requirements as [`HeapAllocator::free`] for `ptr`.
  pub unsafe fn resize(&self, ptr: Option<NonNull<u8>>, size: usize) -> Option<NonNull<u8>> {
    unsafe {
      let Some(ptr) = ptr else {
        return self.allocate(size);
      };

      if size == 0 {
        self.free(Some(ptr));
        return None;
      }

      let block = BlockHeader::from_payload(ptr.as_ptr());

      if (*block).is_free() {
        return None;
      }

      if (*block).is_mapped() {
        return self.resize_mapped(block, size);
      }

      let old_size = align((*block).size);
      let new_size = align(size);

      if new_size > old_size {
        self.grow_in_place_or_move(block, size)
      } else if new_size < old_size {
        split(block, size);
        Some(NonNull::new_unchecked(BlockHeader::payload(block)))
      } else {
        Some(ptr)
      }
    }
  }

  unsafe fn resize_mapped(&self, block: *mut BlockHeader, size: usize) -> Option<NonNull<u8>> {
    unsafe {
      let old_size = (*block).size;
      let new_ptr = self.allocate(size)?;
      let copy_len = old_size.min(size);
      ptr::copy_nonoverlapping(BlockHeader::payload(block), new_ptr.as_ptr(), copy_len);

      let mapped_bytes = align(old_size + BlockHeader::header_size());
      if let Err(e) = unmap(block as *mut u8, mapped_bytes) {
        report_fatal(e);
      }

      Some(new_ptr)
    }
  }

  unsafe fn grow_in_place_or_move(&self, block: *mut BlockHeader, size: usize) -> Option<NonNull<u8>> {
    unsafe {
      coalesce_for_resize(block, size);

      if align((*block).size) >= align(size) {
        return Some(NonNull::new_unchecked(BlockHeader::payload(block)));
      }

      // Unlike `allocate`, growing out of place does not re-run
      // coalesce/best-fit over the whole registry: it goes straight to
      // acquisition, walking forward from `block` itself to find the tail.
      let old_size = (*block).size;
      let new_block = if size >= MMAP_THRESHOLD {
        acquire_mapped(size)
      } else {
        acquire_arena_tail(block, size)
      }
      .unwrap_or_else(|e| report_fatal(e));
      ptr::copy_nonoverlapping(
        BlockHeader::payload(block),
        BlockHeader::payload(new_block),
        old_size,
      );
      (*block).status = Status::Free;

      Some(NonNull::new_unchecked(BlockHeader::payload(new_block)))
    }
  }
}

/// The process-wide instance used by the free functions in [`crate`] and by
/// [`crate::global::SystemHeap`].
pub fn instance() -> &'static HeapAllocator {
  static INSTANCE: OnceLock<HeapAllocator> = OnceLock::new();
  INSTANCE.get_or_init(HeapAllocator::new)
}

#[cfg(test)]
mod tests {
  use super::*;

  // Each test below constructs its own `HeapAllocator`, but all of them
  // still share the process's one real program break (`libc::sbrk` is a
  // genuine OS resource, not something this instance owns exclusively).

  #[test]
  fn zero_size_allocate_returns_none() {
    let heap = HeapAllocator::new();
    unsafe {
      assert!(heap.allocate(0).is_none());
    }
  }

  #[test]
  fn free_of_none_is_a_noop() {
    let heap = HeapAllocator::new();
    unsafe {
      heap.free(None);
    }
  }

  #[test]
  fn allocate_then_free_then_reuse_smaller_returns_same_pointer() {
    let heap = HeapAllocator::new();
    unsafe {
      let p = heap.allocate(100).expect("allocate(100) should succeed");
      heap.free(Some(p));
      let q = heap.allocate(50).expect("allocate(50) should reuse the freed block");
      assert_eq!(p, q, "best-fit should reuse the exact freed block");
    }
  }

  #[test]
  fn payload_is_aligned_and_header_size_matches() {
    let heap = HeapAllocator::new();
    unsafe {
      for size in [1usize, 7, 8, 9, 100, 4095] {
        let p = heap.allocate(size).expect("allocate should succeed");
        assert_eq!(p.as_ptr() as usize % crate::align::ALIGNMENT, 0);
        let header = BlockHeader::from_payload(p.as_ptr());
        assert_eq!((*header).size, align(size));
        heap.free(Some(p));
      }
    }
  }

  #[test]
  fn large_allocation_bypasses_the_arena() {
    let heap = HeapAllocator::new();
    unsafe {
      let p = heap
        .allocate(MMAP_THRESHOLD + 1)
        .expect("large allocate should succeed via mmap");
      let header = BlockHeader::from_payload(p.as_ptr());
      assert_eq!((*header).status, Status::Mapped);
      heap.free(Some(p));
    }
  }

  #[test]
  fn zeroed_allocate_rejects_zero_factors() {
    let heap = HeapAllocator::new();
    unsafe {
      assert!(heap.zeroed_allocate(0, 16).is_none());
      assert!(heap.zeroed_allocate(16, 0).is_none());
    }
  }

  #[test]
  fn zeroed_allocate_rejects_overflowing_product() {
    let heap = HeapAllocator::new();
    unsafe {
      assert!(heap.zeroed_allocate(usize::MAX, 2).is_none());
    }
  }

  #[test]
  fn zeroed_allocate_is_all_zero() {
    let heap = HeapAllocator::new();
    unsafe {
      let p = heap.zeroed_allocate(10, 16).expect("zeroed_allocate should succeed");
      let bytes = std::slice::from_raw_parts(p.as_ptr(), 160);
      assert!(bytes.iter().all(|&b| b == 0));
      heap.free(Some(p));
    }
  }

  #[test]
  fn resize_of_none_behaves_as_allocate() {
    let heap = HeapAllocator::new();
    unsafe {
      let p = heap.resize(None, 64).expect("resize(None, _) should allocate");
      heap.free(Some(p));
    }
  }

  #[test]
  fn resize_to_zero_frees_and_returns_none() {
    let heap = HeapAllocator::new();
    unsafe {
      let p = heap.allocate(64).unwrap();
      assert!(heap.resize(Some(p), 0).is_none());
    }
  }

  #[test]
  fn resize_of_freed_block_returns_none() {
    let heap = HeapAllocator::new();
    unsafe {
      let p = heap.allocate(64).unwrap();
      heap.free(Some(p));
      assert!(heap.resize(Some(p), 32).is_none());
    }
  }

  #[test]
  fn resize_shrink_returns_same_pointer() {
    let heap = HeapAllocator::new();
    unsafe {
      let p = heap.allocate(50).unwrap();
      let q = heap.resize(Some(p), 30).unwrap();
      assert_eq!(p, q);
    }
  }

  #[test]
  fn resize_mapped_block_moves_and_unmaps() {
    let heap = HeapAllocator::new();
    unsafe {
      let p = heap.allocate(MMAP_THRESHOLD + 10).unwrap();
      let q = heap.resize(Some(p), MMAP_THRESHOLD + 20).unwrap();
      assert_ne!(p, q, "resizing a mapped block always moves");
      heap.free(Some(q));
    }
  }

  #[test]
  fn resize_noop_when_size_unchanged_after_alignment() {
    let heap = HeapAllocator::new();
    unsafe {
      let p = heap.allocate(40).unwrap();
      let q = heap.resize(Some(p), 40).unwrap();
      assert_eq!(p, q);
      heap.free(Some(p));
    }
  }
}

#[cfg(test)]
mod proptests {
  use super::*;
  use proptest::prelude::*;

  proptest! {
    /// P1: every allocation is aligned and its header records `align(s)`.
    #[test]
    fn p1_alignment(size in 1usize..65536) {
      let heap = HeapAllocator::new();
      unsafe {
        let p = heap.allocate(size).unwrap();
        prop_assert_eq!(p.as_ptr() as usize % crate::align::ALIGNMENT, 0);
        let header = BlockHeader::from_payload(p.as_ptr());
        prop_assert_eq!((*header).size, align(size));
        heap.free(Some(p));
      }
    }

    /// P2: zeroed allocations read back as all-zero.
    #[test]
    fn p2_zeroed(nmemb in 1usize..64, size in 1usize..256) {
      let heap = HeapAllocator::new();
      unsafe {
        if let Some(p) = heap.zeroed_allocate(nmemb, size) {
          let total = nmemb * size;
          let bytes = std::slice::from_raw_parts(p.as_ptr(), total);
          prop_assert!(bytes.iter().all(|&b| b == 0));
          heap.free(Some(p));
        }
      }
    }

    /// P4: freeing then reusing with an equal-or-smaller request gives the
    /// same payload pointer back.
    #[test]
    fn p4_free_then_reuse(size in 8usize..4096, shrink in 0usize..8) {
      let heap = HeapAllocator::new();
      unsafe {
        let smaller = size.saturating_sub(shrink).max(1);
        let p = heap.allocate(size).unwrap();
        heap.free(Some(p));
        let q = heap.allocate(smaller).unwrap();
        prop_assert_eq!(p, q);
      }
    }
  }

  /// P3: the overflow guard rejects any product that would overflow `usize`.
  #[test]
  fn p3_overflow_guard() {
    let heap = HeapAllocator::new();
    unsafe {
      assert!(heap.zeroed_allocate(usize::MAX / 2 + 2, 2).is_none());
    }
  }

  /// P6: the mmap/arena split is reflected in registry membership.
  #[test]
  fn p6_threshold_split() {
    let heap = HeapAllocator::new();
    unsafe {
      let small = heap.allocate(128).unwrap();
      let small_header = BlockHeader::from_payload(small.as_ptr());
      assert_ne!((*small_header).status, Status::Mapped);

      let large = heap.allocate(MMAP_THRESHOLD + 1).unwrap();
      let large_header = BlockHeader::from_payload(large.as_ptr());
      assert_eq!((*large_header).status, Status::Mapped);

      heap.free(Some(small));
      heap.free(Some(large));
    }
  }
}
