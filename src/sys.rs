//! The two virtual-memory primitives the allocator is built on: program-break
//! growth and anonymous mapping.

use std::io;
use std::os::raw::c_void;
use std::ptr;

use libc::{MAP_ANONYMOUS, MAP_PRIVATE, PROT_READ, PROT_WRITE};

use crate::error::AllocatorError;

/// Returns the current program break (`delta == 0`) or advances it by
/// `delta` bytes, returning the break *before* the move (matching
/// `sbrk(2)`).
///
/// # Safety
/// Mutates process-global state; callers must serialize externally (see the
/// crate's concurrency model).
pub unsafe fn break_grow(delta: isize) -> Result<*mut u8, AllocatorError> {
  unsafe {
    tracing::trace!(delta, "sbrk");
    let prev = libc::sbrk(delta);
    if prev == usize::MAX as *mut c_void {
      return Err(AllocatorError::BreakGrow {
        requested: delta,
        source: io::Error::last_os_error(),
      });
    }
    Ok(prev as *mut u8)
  }
}

/// Requests `bytes` of fresh, zero-filled, page-aligned anonymous memory.
///
/// # Safety
/// The returned pointer must eventually be released with [`unmap`] using
/// the same `bytes` length, or leaked for the life of the process.
pub unsafe fn map_anon(bytes: usize) -> Result<*mut u8, AllocatorError> {
  unsafe {
    tracing::trace!(bytes, "mmap");
    let ptr = libc::mmap(
      ptr::null_mut(),
      bytes,
      PROT_READ | PROT_WRITE,
      MAP_PRIVATE | MAP_ANONYMOUS,
      -1,
      0,
    );
    if ptr == libc::MAP_FAILED {
      return Err(AllocatorError::MapAnon {
        requested: bytes,
        source: io::Error::last_os_error(),
      });
    }
    Ok(ptr as *mut u8)
  }
}

/// Releases `bytes` of memory previously obtained from [`map_anon`].
///
/// # Safety
/// `addr`/`bytes` must exactly describe a live mapping from [`map_anon`].
pub unsafe fn unmap(addr: *mut u8, bytes: usize) -> Result<(), AllocatorError> {
  unsafe {
    tracing::trace!(addr = ?addr, bytes, "munmap");
    let ret = libc::munmap(addr as *mut c_void, bytes);
    if ret == -1 {
      return Err(AllocatorError::Unmap {
        addr: addr as usize,
        len: bytes,
        source: io::Error::last_os_error(),
      });
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn current_break_does_not_error() {
    unsafe {
      assert!(break_grow(0).is_ok());
    }
  }

  #[test]
  fn map_and_unmap_roundtrip() {
    let page = 4096;
    unsafe {
      let ptr = map_anon(page).expect("mmap should succeed for a page");
      assert!(!ptr.is_null());
      // Freshly mapped anonymous memory is zero-filled by the kernel.
      assert_eq!(*ptr, 0);
      unmap(ptr, page).expect("munmap should succeed");
    }
  }
}
