//! The two OS primitives the heap is built on: growing a contiguous break and
//! mapping anonymous memory.

use std::{
  io,
  ptr::{self, NonNull},
};

use libc::{c_void, intptr_t, sbrk};
use log::debug;

use crate::buddy::{ARENA_ALIGNMENT, ARENA_SIZE};

/// Source of raw memory for a [`Heap`](crate::Heap).
pub trait OsMemory {
  /// Current end of the contiguous break region.
  fn current_break(&mut self) -> usize;

  /// Moves the break up by `increment` bytes and returns the previous break,
  /// or `None` if the region cannot grow.
  fn extend_break(
    &mut self,
    increment: usize,
  ) -> Option<NonNull<u8>>;

  /// Maps `len` fresh, writable bytes.
  fn map(
    &mut self,
    len: usize,
  ) -> Option<NonNull<u8>>;

  /// Releases a region obtained from [`OsMemory::map`].
  ///
  /// # Safety
  ///
  /// `addr` and `len` must describe exactly one earlier `map` result that has
  /// not been unmapped yet.
  unsafe fn unmap(
    &mut self,
    addr: NonNull<u8>,
    len: usize,
  ) -> io::Result<()>;
}

fn os_mmap(len: usize) -> Option<NonNull<u8>> {
  let addr = unsafe {
    libc::mmap(
      ptr::null_mut(),
      len,
      libc::PROT_READ | libc::PROT_WRITE,
      libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
      -1,
      0,
    )
  };

  if addr == libc::MAP_FAILED {
    None
  } else {
    NonNull::new(addr.cast::<u8>())
  }
}

unsafe fn os_munmap(
  addr: NonNull<u8>,
  len: usize,
) -> io::Result<()> {
  if unsafe { libc::munmap(addr.as_ptr().cast(), len) } == 0 {
    Ok(())
  } else {
    Err(io::Error::last_os_error())
  }
}

/// The process break (`sbrk`) and `mmap`.
///
/// The break is shared by the whole process, so at most one heap should use
/// this backend, and nothing else should move the break concurrently.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemMemory;

impl OsMemory for SystemMemory {
  fn current_break(&mut self) -> usize {
    unsafe { sbrk(0) as usize }
  }

  fn extend_break(
    &mut self,
    increment: usize,
  ) -> Option<NonNull<u8>> {
    let increment = intptr_t::try_from(increment).ok()?;
    let address = unsafe { sbrk(increment) };

    if address == usize::MAX as *mut c_void {
      return None;
    }

    NonNull::new(address.cast::<u8>())
  }

  fn map(
    &mut self,
    len: usize,
  ) -> Option<NonNull<u8>> {
    os_mmap(len)
  }

  unsafe fn unmap(
    &mut self,
    addr: NonNull<u8>,
    len: usize,
  ) -> io::Result<()> {
    unsafe { os_munmap(addr, len) }
  }
}

/// A private break emulated inside one reserved anonymous mapping.
///
/// Lets several heaps coexist in one process (and tests run in parallel)
/// without touching the real program break. Large blocks are still mapped
/// individually. The reservation is released on drop, so every pointer the
/// heap handed out from the break region dies with it.
#[derive(Debug)]
pub struct ReservedMemory {
  base: NonNull<u8>,
  len: usize,
  used: usize,
}

impl ReservedMemory {
  /// Reserves `len` bytes of address space for the emulated break.
  pub fn new(len: usize) -> io::Result<Self> {
    let addr = unsafe {
      libc::mmap(
        ptr::null_mut(),
        len,
        libc::PROT_READ | libc::PROT_WRITE,
        libc::MAP_PRIVATE | libc::MAP_ANONYMOUS | libc::MAP_NORESERVE,
        -1,
        0,
      )
    };

    if addr == libc::MAP_FAILED {
      return Err(io::Error::last_os_error());
    }

    let base = NonNull::new(addr.cast::<u8>()).ok_or_else(|| io::Error::other("mmap returned null"))?;
    debug!("reserved {len} bytes at {:p} for an emulated break", base);

    Ok(Self { base, len, used: 0 })
  }

  /// Reserves enough room for an arena wherever the alignment padding falls.
  pub fn with_arena_room() -> io::Result<Self> {
    Self::new(ARENA_ALIGNMENT + ARENA_SIZE)
  }

  /// Bytes the emulated break has moved so far.
  pub fn used(&self) -> usize {
    self.used
  }

  pub fn capacity(&self) -> usize {
    self.len
  }
}

impl OsMemory for ReservedMemory {
  fn current_break(&mut self) -> usize {
    self.base.as_ptr() as usize + self.used
  }

  fn extend_break(
    &mut self,
    increment: usize,
  ) -> Option<NonNull<u8>> {
    if increment > self.len - self.used {
      debug!(
        "emulated break exhausted: {} of {} bytes used, {increment} requested",
        self.used, self.len
      );
      return None;
    }

    let previous = unsafe { self.base.add(self.used) };
    self.used += increment;
    Some(previous)
  }

  fn map(
    &mut self,
    len: usize,
  ) -> Option<NonNull<u8>> {
    os_mmap(len)
  }

  unsafe fn unmap(
    &mut self,
    addr: NonNull<u8>,
    len: usize,
  ) -> io::Result<()> {
    unsafe { os_munmap(addr, len) }
  }
}

impl Drop for ReservedMemory {
  fn drop(&mut self) {
    if let Err(err) = unsafe { os_munmap(self.base, self.len) } {
      debug!("failed to release reservation at {:p}: {err}", self.base);
    }
  }
}
