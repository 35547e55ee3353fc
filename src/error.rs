//! The fatal-error reporter.
//!
//! The allocator never retries a failed syscall and never propagates a
//! syscall failure to the caller as a `Result`. Instead every primitive in
//! [`crate::sys`] returns `Result<_, AllocatorError>` internally, and
//! [`report_fatal`] is the single place that turns a failure into a logged,
//! aborted process.

use thiserror::Error;

/// Failure modes of the two syscalls this allocator depends on.
#[derive(Debug, Error)]
pub enum AllocatorError {
  #[error("sbrk({requested}) failed: {source}")]
  BreakGrow {
    requested: isize,
    #[source]
    source: std::io::Error,
  },

  #[error("mmap({requested} bytes) failed: {source}")]
  MapAnon {
    requested: usize,
    #[source]
    source: std::io::Error,
  },

  #[error("munmap({len} bytes at {addr:#x}) failed: {source}")]
  Unmap {
    addr: usize,
    len: usize,
    #[source]
    source: std::io::Error,
  },
}

/// Logs `err` and aborts the process. Never returns.
///
/// A syscall failure is not recoverable input, so it is always treated as
/// fatal (compare out-of-memory handling).
pub fn report_fatal(err: AllocatorError) -> ! {
  tracing::error!(error = %err, "allocator syscall failed, aborting");
  std::process::abort();
}
