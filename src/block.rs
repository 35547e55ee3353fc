//! Block metadata: the fixed header that precedes every managed region.

use std::ptr;

/// Allocation above this many bytes goes straight to [`crate::sys::map_anon`]
/// instead of the program-break arena.
pub const MMAP_THRESHOLD: usize = 128 * 1024;

/// [`crate::heap::HeapAllocator::zeroed_allocate`] uses this threshold in
/// place of [`MMAP_THRESHOLD`], since page-mapped memory already arrives
/// zero-filled from the kernel.
pub const CALLOC_THRESHOLD: usize = 4096;

/// Lifecycle state of a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
  /// Reusable; eligible for best-fit search and coalescing.
  Free,
  /// Carved from the arena and currently handed to a caller.
  Alloc,
  /// A standalone `mmap` region. Never enters the registry chain.
  Mapped,
}

/// Metadata header placed immediately before every payload.
///
/// `size` is always a multiple of [`crate::align::ALIGNMENT`]. `next` links
/// arena blocks into the process-wide registry; `Mapped` blocks leave it
/// null because they are never linked in.
#[repr(C)]
pub struct BlockHeader {
  pub size: usize,
  pub status: Status,
  pub next: *mut BlockHeader,
}

impl BlockHeader {
  pub fn new(size: usize, status: Status, next: *mut BlockHeader) -> Self {
    Self { size, status, next }
  }

  /// Aligned size of the header itself, as it appears in every offset
  /// computation throughout this crate.
  pub const fn header_size() -> usize {
    crate::align!(std::mem::size_of::<BlockHeader>())
  }

  /// Payload pointer for a block whose header lives at `block`.
  ///
  /// # Safety
  /// `block` must point at a live, properly initialized `BlockHeader`.
  pub unsafe fn payload(block: *mut BlockHeader) -> *mut u8 {
    unsafe { (block as *mut u8).add(Self::header_size()) }
  }

  /// Recovers the header for a payload pointer previously returned by
  /// [`BlockHeader::payload`].
  ///
  /// # Safety
  /// `payload` must have been returned by this allocator's public API.
  pub unsafe fn from_payload(payload: *mut u8) -> *mut BlockHeader {
    unsafe { payload.sub(Self::header_size()) as *mut BlockHeader }
  }

  pub fn is_free(&self) -> bool {
    self.status == Status::Free
  }

  pub fn is_mapped(&self) -> bool {
    self.status == Status::Mapped
  }
}

/// Writes a fresh header at `at`, returning the header pointer.
///
/// # Safety
/// `at` must point at writable memory at least [`BlockHeader::header_size`]
/// bytes long.
pub unsafe fn write_header(
  at: *mut u8,
  size: usize,
  status: Status,
  next: *mut BlockHeader,
) -> *mut BlockHeader {
  unsafe {
    let header = at as *mut BlockHeader;
    ptr::write(header, BlockHeader::new(size, status, next));
    header
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn header_size_is_aligned() {
    assert_eq!(BlockHeader::header_size() % crate::align::ALIGNMENT, 0);
  }

  #[test]
  fn payload_roundtrips_through_header() {
    let mut buf = vec![0u8; BlockHeader::header_size() + 64];
    unsafe {
      let header = write_header(buf.as_mut_ptr(), 64, Status::Alloc, ptr::null_mut());
      let payload = BlockHeader::payload(header);
      assert_eq!(BlockHeader::from_payload(payload), header);
    }
  }
}
