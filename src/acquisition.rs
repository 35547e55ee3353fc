//! Choosing between program-break growth and anonymous mapping, including
//! the first-use preallocation and tail-extension policies.

use crate::align::align;
use crate::block::{write_header, BlockHeader, Status, MMAP_THRESHOLD};
use crate::error::AllocatorError;
use crate::registry::find_tail;
use crate::sys::{break_grow, map_anon};
use std::ptr;

/// First arena allocation ever: grows the break by a full
/// [`MMAP_THRESHOLD`] regardless of the request size, creating one large
/// `Alloc` block. Callers are responsible for splitting the leftover and
/// installing `global_base`.
///
/// # Safety
/// Must only be called when the registry is empty.
pub unsafe fn acquire_first_arena() -> Result<*mut BlockHeader, AllocatorError> {
  unsafe {
    let raw = break_grow(MMAP_THRESHOLD as isize)?;
    let payload_size = MMAP_THRESHOLD - BlockHeader::header_size();
    let block = write_header(raw, payload_size, Status::Alloc, ptr::null_mut());
    tracing::debug!(block = ?block, payload_size, "first-use arena preallocation");
    Ok(block)
  }
}

/// Subsequent arena allocation: walks to the registry's tail. If the tail is
/// `Free`, extends the break in place ([`tail_extend`]); otherwise grows by
/// exactly `align(request) + header` and appends a fresh `Alloc` block.
///
/// # Safety
/// `start` must be a non-null, valid chain root.
pub unsafe fn acquire_arena_tail(
  start: *mut BlockHeader,
  request: usize,
) -> Result<*mut BlockHeader, AllocatorError> {
  unsafe {
    let tail = find_tail(start);
    if (*tail).is_free() {
      return tail_extend(tail, request);
    }

    let request = align(request);
    let grow_by = request + BlockHeader::header_size();
    let raw = break_grow(grow_by as isize)?;
    let block = write_header(raw, request, Status::Alloc, ptr::null_mut());
    (*tail).next = block;
    tracing::debug!(tail = ?tail, block = ?block, grow_by, "appended fresh arena block");
    Ok(block)
  }
}

/// Extends the program break by exactly the shortfall between the `Free`
/// tail's current size and the request, then upgrades the tail in place to
/// `Alloc`. Avoids allocating a wasted header for the common "grow the last
/// block" case.
///
/// # Safety
/// `tail` must be the registry's actual last block and must be `Free`.
unsafe fn tail_extend(
  tail: *mut BlockHeader,
  request: usize,
) -> Result<*mut BlockHeader, AllocatorError> {
  unsafe {
    let request = align(request);
    let shortfall = request - align((*tail).size);
    break_grow(shortfall as isize)?;
    (*tail).size = request;
    (*tail).status = Status::Alloc;
    tracing::debug!(tail = ?tail, shortfall, request, "tail-extended arena block");
    Ok(tail)
  }
}

/// Requests a standalone mapped block sized to hold `payload_size` bytes.
/// Never linked into the registry.
pub unsafe fn acquire_mapped(payload_size: usize) -> Result<*mut BlockHeader, AllocatorError> {
  unsafe {
    let mapped_bytes = align(payload_size + BlockHeader::header_size());
    let raw = map_anon(mapped_bytes)?;
    let block = write_header(raw, align(payload_size), Status::Mapped, ptr::null_mut());
    tracing::debug!(block = ?block, mapped_bytes, "mapped standalone block");
    Ok(block)
  }
}
