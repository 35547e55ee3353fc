//! The block registry: a singly-linked chain of arena headers.
//!
//! Mapped blocks are never linked in; only blocks carved from the program
//! break's arena appear here. The chain is traversed forward only, always
//! starting from the allocator's `global_base`.

use crate::block::BlockHeader;
use std::ptr;

/// Walks from `start` and returns the last reachable block.
///
/// # Safety
/// `start` must be null or point into a valid, acyclic chain.
pub unsafe fn find_tail(start: *mut BlockHeader) -> *mut BlockHeader {
  unsafe {
    debug_assert!(!start.is_null(), "find_tail requires a non-empty chain");
    let mut current = start;
    while !(*current).next.is_null() {
      current = (*current).next;
    }
    current
  }
}

/// Links `new` directly after `tail`, terminating `new`'s own chain.
///
/// # Safety
/// `tail` must be a live block reachable from `global_base`; `new` must not
/// already appear in the chain.
pub unsafe fn append_after(tail: *mut BlockHeader, new: *mut BlockHeader) {
  unsafe {
    (*tail).next = new;
    (*new).next = ptr::null_mut();
  }
}
