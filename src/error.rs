use std::{io, process};

use log::error;
use thiserror::Error;

use crate::heap::MAX_ALLOC_SIZE;

/// A [`Result`] type with [`AllocError`] as the error type.
pub type AllocResult<T> = Result<T, AllocError>;

/// Recoverable allocation failures. None of them leaves a trace in the heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AllocError {
  /// Zero bytes, or more than the per-request limit.
  #[error("invalid allocation size {size} (expected 1..={max})", max = MAX_ALLOC_SIZE)]
  InvalidSize { size: usize },

  /// `count * size` does not fit in `usize`.
  #[error("zeroed allocation of {count} x {size} bytes overflows")]
  SizeOverflow { count: usize, size: usize },

  /// No free block is left in the arena, or the mapping primitive failed.
  #[error("out of memory serving {size} bytes")]
  Exhausted { size: usize },

  /// The header behind the pointer already says the block is free.
  #[error("block at {addr:#x} is not allocated")]
  NotAllocated { addr: usize },
}

/// Conditions after which the heap can no longer be trusted.
#[derive(Debug, Error)]
pub enum FatalError {
  #[error("failed to extend the program break by {requested} bytes for the buddy arena")]
  ArenaInit { requested: usize },

  #[error("corrupted block header at {addr:#x}: guard token mismatch")]
  CorruptedMetadata { addr: usize },

  #[error("failed to unmap {len} bytes at {addr:#x}: {source}")]
  Unmap {
    addr: usize,
    len: usize,
    #[source]
    source: io::Error,
  },
}

/// Logs `err` and aborts the process.
#[cold]
pub fn fatal(err: FatalError) -> ! {
  error!("rbuddy: {err}");
  process::abort()
}
