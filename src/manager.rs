use std::ptr::NonNull;

use crate::{
  block::Block,
  buddy::BuddyAllocator,
  guard::GuardToken,
  mapping::MappingAllocator,
  stats::HeapStats,
};

/// The buddy arena and the mapping list under one guard token.
pub struct MemoryManager {
  guard: GuardToken,
  pub(crate) buddy: BuddyAllocator,
  pub(crate) mapping: MappingAllocator,
}

impl MemoryManager {
  pub fn new() -> Self {
    Self::with_guard(GuardToken::random())
  }

  /// Uses a fixed token instead of a random one.
  pub fn with_guard(guard: GuardToken) -> Self {
    Self {
      guard,
      buddy: BuddyAllocator::new(guard),
      mapping: MappingAllocator::new(guard),
    }
  }

  pub fn guard(&self) -> GuardToken {
    self.guard
  }

  pub fn buddy(&self) -> &BuddyAllocator {
    &self.buddy
  }

  pub fn mapping(&self) -> &MappingAllocator {
    &self.mapping
  }

  pub fn stats(&self) -> HeapStats {
    HeapStats::from_counters(self.buddy.counters(), self.mapping.counters())
  }

  /// Header of a pointer handed out by either allocator, guard checked.
  ///
  /// # Safety
  ///
  /// `user` must come from this manager and its block must still be mapped.
  pub(crate) unsafe fn recover(
    &self,
    user: NonNull<u8>,
  ) -> Block {
    self.guard.verify(unsafe { Block::from_user_ptr(user) })
  }
}

impl Default for MemoryManager {
  fn default() -> Self {
    Self::new()
  }
}
