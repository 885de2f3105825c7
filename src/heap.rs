use std::ptr::{self, NonNull};

use log::{trace, warn};

use crate::{
  block::{BlockState, HEADER_SIZE},
  error::{AllocError, AllocResult},
  guard::GuardToken,
  manager::MemoryManager,
  order::{MAX_BLOCK_SIZE, order_for, size_to_order},
  os::{OsMemory, SystemMemory},
  stats::HeapStats,
};

/// Largest request accepted by [`Heap::allocate`] and [`Heap::reallocate`].
pub const MAX_ALLOC_SIZE: usize = 100_000_000;

fn check_size(size: usize) -> AllocResult<()> {
  if size == 0 || size > MAX_ALLOC_SIZE {
    return Err(AllocError::InvalidSize { size });
  }
  Ok(())
}

/// A complete allocator: the buddy arena for requests up to
/// [`MAX_BLOCK_SIZE`] bytes (header included) and one mapping per larger
/// request.
///
/// Not thread safe. Wrap it in a lock to share it.
pub struct Heap<M: OsMemory = SystemMemory> {
  os: M,
  manager: MemoryManager,
}

impl Heap<SystemMemory> {
  /// A heap growing the process break.
  pub fn new() -> Self {
    Self::with_os(SystemMemory)
  }
}

impl Default for Heap<SystemMemory> {
  fn default() -> Self {
    Self::new()
  }
}

impl<M: OsMemory> Heap<M> {
  pub fn with_os(os: M) -> Self {
    Self {
      os,
      manager: MemoryManager::new(),
    }
  }

  pub fn with_os_and_guard(
    os: M,
    guard: GuardToken,
  ) -> Self {
    Self {
      os,
      manager: MemoryManager::with_guard(guard),
    }
  }

  pub fn os(&self) -> &M {
    &self.os
  }

  pub fn manager(&self) -> &MemoryManager {
    &self.manager
  }

  /// Whether the arena has been carved yet. Happens on the first valid allocation.
  pub fn is_initialized(&self) -> bool {
    self.manager.buddy.is_initialized()
  }

  /// Returns at least `size` usable bytes.
  pub fn allocate(
    &mut self,
    size: usize,
  ) -> AllocResult<NonNull<u8>> {
    check_size(size)?;
    self.manager.buddy.initialize(&mut self.os);

    let block = match order_for(size + HEADER_SIZE) {
      Some(order) => self.manager.buddy.allocate(order),
      None => self.manager.mapping.allocate(&mut self.os, size),
    };

    match block {
      Some(block) => {
        trace!("allocate({size}) -> {:p}", block.user_ptr());
        Ok(block.user_ptr())
      }
      None => {
        warn!("allocate({size}) failed: out of memory");
        Err(AllocError::Exhausted { size })
      }
    }
  }

  /// Allocates `count * size` bytes, all zero.
  pub fn allocate_zeroed(
    &mut self,
    count: usize,
    size: usize,
  ) -> AllocResult<NonNull<u8>> {
    let total = count
      .checked_mul(size)
      .ok_or(AllocError::SizeOverflow { count, size })?;

    let ptr = self.allocate(total)?;
    unsafe { ptr.as_ptr().write_bytes(0, total) };
    Ok(ptr)
  }

  /// Releases a block. Null pointers and blocks that are already free are ignored.
  ///
  /// # Safety
  ///
  /// `ptr` must be null or a pointer returned by this heap whose block has not
  /// been handed back to the OS (mapped blocks are unmapped on free).
  pub unsafe fn free(
    &mut self,
    ptr: *mut u8,
  ) {
    let Some(user) = NonNull::new(ptr) else {
      return;
    };
    let block = unsafe { self.manager.recover(user) };

    if block.is_free() {
      warn!("free({user:p}): block already free, ignored");
      return;
    }

    trace!("free({user:p}): {} byte block", block.size());
    if block.size() > MAX_BLOCK_SIZE {
      debug_assert_eq!(block.state(), BlockState::Mapped);
      unsafe { self.manager.mapping.free(&mut self.os, block) };
    } else {
      self.manager.buddy.free(block, size_to_order(block.size()));
    }
  }

  /// Resizes a block, keeping its contents.
  ///
  /// Never shrinks: if the block already holds `size` bytes the same pointer
  /// comes back with its capacity unchanged. Otherwise a buddy block first
  /// tries to absorb its free buddies; failing that the contents move to a
  /// fresh block and the old one is freed. On error the old block is intact.
  ///
  /// # Safety
  ///
  /// Same contract as [`Heap::free`].
  pub unsafe fn reallocate(
    &mut self,
    ptr: *mut u8,
    size: usize,
  ) -> AllocResult<NonNull<u8>> {
    let Some(old) = NonNull::new(ptr) else {
      return self.allocate(size);
    };
    check_size(size)?;

    let block = unsafe { self.manager.recover(old) };
    if block.is_free() {
      return Err(AllocError::NotAllocated { addr: old.as_ptr() as usize });
    }

    let required = size + HEADER_SIZE;
    if block.size() >= required {
      return Ok(old);
    }

    if block.size() <= MAX_BLOCK_SIZE {
      if let Some(to) = order_for(required) {
        let from = size_to_order(block.size());
        if let Some(grown) = self.manager.buddy.grow_in_place(block, from, to) {
          trace!("reallocate({old:p}, {size}) grew in place -> {:p}", grown.user_ptr());
          return Ok(grown.user_ptr());
        }
      }
    }

    let len = block.capacity();
    let fresh = self.allocate(size)?;
    unsafe {
      ptr::copy_nonoverlapping(old.as_ptr(), fresh.as_ptr(), len);
      self.free(old.as_ptr());
    }

    trace!("reallocate({old:p}, {size}) moved -> {fresh:p}");
    Ok(fresh)
  }

  /// Total size (header included) of the block behind `ptr`.
  ///
  /// # Safety
  ///
  /// `ptr` must be a live pointer returned by this heap.
  pub unsafe fn block_size(
    &self,
    ptr: NonNull<u8>,
  ) -> usize {
    unsafe { self.manager.recover(ptr) }.size()
  }

  pub fn stats(&self) -> HeapStats {
    self.manager.stats()
  }

  /// Free buddy blocks.
  pub fn free_block_count(&self) -> usize {
    self.stats().free_blocks
  }

  /// Payload bytes in free buddy blocks.
  pub fn free_byte_count(&self) -> usize {
    self.stats().free_bytes
  }

  /// Buddy blocks, free or not, plus live mapped blocks.
  pub fn allocated_block_count(&self) -> usize {
    self.stats().allocated_blocks
  }

  /// Payload bytes across all counted blocks.
  pub fn allocated_byte_count(&self) -> usize {
    self.stats().allocated_bytes
  }

  pub fn metadata_byte_count(&self) -> usize {
    self.stats().metadata_bytes
  }

  pub fn metadata_size(&self) -> usize {
    HEADER_SIZE
  }
}
