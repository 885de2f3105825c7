//! Shared helpers for the integration tests.

#![allow(dead_code)]

use std::{cell::Cell, io, ptr::NonNull};

use rbuddy::{Heap, OsMemory, ReservedMemory};

/// Emulated break plus a log of every OS call the heap makes.
///
/// `fail_maps` and `fail_unmaps` make the matching calls fail while set,
/// without touching any memory. Failed calls are still logged.
pub struct CountingMemory {
  inner: ReservedMemory,
  pub break_extensions: Vec<usize>,
  pub maps: Vec<usize>,
  pub unmaps: Vec<usize>,
  pub fail_maps: Cell<bool>,
  pub fail_unmaps: Cell<bool>,
}

impl CountingMemory {
  pub fn new() -> Self {
    Self {
      inner: ReservedMemory::with_arena_room().expect("reserve address space"),
      break_extensions: Vec::new(),
      maps: Vec::new(),
      unmaps: Vec::new(),
      fail_maps: Cell::new(false),
      fail_unmaps: Cell::new(false),
    }
  }
}

impl OsMemory for CountingMemory {
  fn current_break(&mut self) -> usize {
    self.inner.current_break()
  }

  fn extend_break(
    &mut self,
    increment: usize,
  ) -> Option<NonNull<u8>> {
    self.break_extensions.push(increment);
    self.inner.extend_break(increment)
  }

  fn map(
    &mut self,
    len: usize,
  ) -> Option<NonNull<u8>> {
    self.maps.push(len);
    if self.fail_maps.get() {
      return None;
    }
    self.inner.map(len)
  }

  unsafe fn unmap(
    &mut self,
    addr: NonNull<u8>,
    len: usize,
  ) -> io::Result<()> {
    self.unmaps.push(len);
    if self.fail_unmaps.get() {
      return Err(io::Error::from_raw_os_error(libc::EINVAL));
    }
    unsafe { self.inner.unmap(addr, len) }
  }
}

pub fn heap() -> Heap<CountingMemory> {
  Heap::with_os(CountingMemory::new())
}

/// Offset of `ptr` from the arena base of `heap`.
pub fn arena_offset<M: OsMemory>(
  heap: &Heap<M>,
  ptr: NonNull<u8>,
) -> usize {
  let base = heap.manager().buddy().arena_base().expect("arena initialized");
  ptr.as_ptr() as usize - base
}
