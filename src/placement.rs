//! Best-fit search, splitting, and coalescing over the block registry.

use crate::align::{align, ALIGNMENT};
use crate::block::{write_header, BlockHeader, Status};
use std::ptr;

/// Walks the registry from `start` and returns the smallest `Free` block
/// whose aligned size is at least `align(request)`, or null if none fits.
/// Ties are broken by first encountered. The returned block is marked
/// `Alloc` and split if the leftover permits (see [`split`]).
///
/// # Safety
/// `start` must be null or point into a valid, acyclic chain.
pub unsafe fn best_fit(start: *mut BlockHeader, request: usize) -> *mut BlockHeader {
  unsafe {
    let request = align(request);
    let mut current = start;
    let mut best: *mut BlockHeader = ptr::null_mut();
    let mut best_size = 0usize;

    while !current.is_null() {
      let size = align((*current).size);
      if (*current).is_free() && size >= request {
        if best.is_null() || size < best_size {
          best = current;
          best_size = size;
        }
      }
      current = (*current).next;
    }

    if best.is_null() {
      return best;
    }

    (*best).status = Status::Alloc;
    tracing::trace!(block = ?best, request, best_size, "best_fit hit");

    if best_size - request >= BlockHeader::header_size() + align(1) {
      split(best, request);
    }

    best
  }
}

/// Partitions `block` (aligned size `B`) into an `Alloc` prefix of aligned
/// size `S` and a `Free` suffix, where `B >= S + header + align(1)`.
///
/// # Safety
/// `block` must be a live block with `align(block.size) >= size +
/// BlockHeader::header_size() + align(1)`.
pub unsafe fn split(block: *mut BlockHeader, size: usize) {
  unsafe {
    let size = align(size);
    let header = BlockHeader::header_size();
    let original_size = align((*block).size);

    let free_at = (block as *mut u8).add(header + size);
    let free_size = align(original_size - size - header);
    let inherited_next = (*block).next;

    let free_block = write_header(free_at, free_size, Status::Free, inherited_next);

    (*block).size = size;
    (*block).status = Status::Alloc;
    (*block).next = free_block;

    tracing::trace!(block = ?block, free_block = ?free_block, size, free_size, "split");
  }
}

/// Forward sweep merging every run of two-or-more adjacent `Free` blocks
/// into one. Re-checks the merged block's new successor before advancing,
/// so a run of N free blocks collapses in a single pass.
///
/// # Safety
/// `start` must be null or point into a valid, acyclic chain.
pub unsafe fn coalesce(start: *mut BlockHeader) {
  unsafe {
    let mut current = start;
    while !current.is_null() {
      if (*current).is_free() && !(*current).next.is_null() && (*(*current).next).is_free() {
        merge_with_next(current);
        continue;
      }
      current = (*current).next;
    }
  }
}

/// Greedily merges `block` with its immediate `Free` successor, one or more
/// times, until either `block`'s aligned size reaches `target` or the
/// successor is `Alloc`/absent. Used by resize's in-place growth path; walks
/// only forward from `block`, unlike [`coalesce`]'s full sweep.
///
/// # Safety
/// `block` must be a live block reachable from the registry root.
pub unsafe fn coalesce_for_resize(block: *mut BlockHeader, target: usize) {
  unsafe {
    let target = align(target);
    while align((*block).size) < target {
      let next = (*block).next;
      if next.is_null() || !(*next).is_free() {
        break;
      }
      merge_with_next(block);
    }
  }
}

/// Merges `block` with its immediate successor in place: `block.size`
/// becomes `align(block.size) + align(next.size) + header`, and `block.next`
/// adopts `next.next`.
///
/// # Safety
/// `block.next` must be non-null.
unsafe fn merge_with_next(block: *mut BlockHeader) {
  unsafe {
    let next = (*block).next;
    let merged_size = align((*block).size) + align((*next).size) + BlockHeader::header_size();
    (*block).size = merged_size;
    (*block).next = (*next).next;
    tracing::trace!(block = ?block, merged_size, "coalesce merge");
  }
}

/// The smallest aligned leftover that still justifies a split: one header
/// plus at least one aligned byte of usable payload.
pub const fn min_split_leftover() -> usize {
  // `BlockHeader::header_size()` plus `align(1)`, computed without calling
  // the non-const `align` fn so this stays usable in const contexts.
  BlockHeader::header_size() + ALIGNMENT
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::block::write_header;
  use std::alloc::Layout;

  unsafe fn alloc_raw(payload_and_header: usize) -> *mut u8 {
    unsafe { std::alloc::alloc(Layout::from_size_align(payload_and_header, 8).unwrap()) }
  }

  #[test]
  fn best_fit_picks_smallest_adequate_free_block() {
    unsafe {
      let header = BlockHeader::header_size();
      let mem = alloc_raw(header * 3 + 256);

      let a = write_header(mem, 32, Status::Free, ptr::null_mut());
      let b = write_header(mem.add(header + 32), 128, Status::Free, ptr::null_mut());
      (*a).next = b;
      let c = write_header(mem.add(header + 32 + header + 128), 64, Status::Free, ptr::null_mut());
      (*b).next = c;

      let fit = best_fit(a, 48);
      assert_eq!(fit, c, "64-byte free block is the tightest fit for a 48-byte request");
      assert_eq!((*fit).status, Status::Alloc);
    }
  }

  #[test]
  fn coalesce_merges_adjacent_free_run() {
    unsafe {
      let header = BlockHeader::header_size();
      let mem = alloc_raw(header * 3 + 96);

      let a = write_header(mem, 16, Status::Free, ptr::null_mut());
      let b = write_header(mem.add(header + 16), 16, Status::Free, ptr::null_mut());
      (*a).next = b;
      let c = write_header(mem.add(header + 16 + header + 16), 16, Status::Alloc, ptr::null_mut());
      (*b).next = c;

      coalesce(a);

      assert_eq!((*a).next, c);
      assert_eq!((*a).size, align(16) + align(16) + header);
      assert_eq!((*a).status, Status::Free);
    }
  }
}
