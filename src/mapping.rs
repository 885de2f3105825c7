use log::debug;

use crate::{
  block::{Block, BlockHeader, BlockState, HEADER_SIZE},
  error::{FatalError, fatal},
  guard::GuardToken,
  os::OsMemory,
  stats::BlockCounters,
};

/// Requests too large for the arena, one mapping each.
///
/// Live blocks hang off an unordered doubly linked list; nothing is ever split
/// or merged here.
pub struct MappingAllocator {
  guard: GuardToken,
  head: Option<Block>,
  tail: Option<Block>,
  counters: BlockCounters,
}

impl MappingAllocator {
  pub const fn new(guard: GuardToken) -> Self {
    Self {
      guard,
      head: None,
      tail: None,
      counters: BlockCounters::new(),
    }
  }

  pub fn counters(&self) -> &BlockCounters {
    &self.counters
  }

  /// Number of live mapped blocks.
  pub fn len(&self) -> usize {
    self.counters.blocks
  }

  pub fn is_empty(&self) -> bool {
    self.head.is_none()
  }

  /// Maps `user_size + HEADER_SIZE` bytes and appends the block to the list.
  pub(crate) fn allocate(
    &mut self,
    os: &mut impl OsMemory,
    user_size: usize,
  ) -> Option<Block> {
    let len = user_size + HEADER_SIZE;
    let Some(addr) = os.map(len) else {
      debug!("mapping: mmap of {len} bytes failed");
      return None;
    };

    let block = unsafe { Block::write(addr, BlockHeader::new(self.guard, len, BlockState::Mapped)) };

    let tail = self.guard.verify_opt(self.tail);
    block.set_prev(tail);
    match tail {
      Some(tail) => tail.set_next(Some(block)),
      None => self.head = Some(block),
    }
    self.tail = Some(block);

    self.counters.add_block(user_size);
    debug!("mapping: mapped {len} bytes at {:#x}", block.addr());
    Some(block)
  }

  /// Unlinks `block` and unmaps its whole length. Aborts if the unmap fails.
  ///
  /// # Safety
  ///
  /// `block` must be a live block of this allocator. Its memory is gone once
  /// this returns.
  pub(crate) unsafe fn free(
    &mut self,
    os: &mut impl OsMemory,
    block: Block,
  ) {
    self.unlink(block);

    let len = block.size();
    self.counters.remove_block(len - HEADER_SIZE);

    if let Err(source) = unsafe { os.unmap(block.as_non_null(), len) } {
      fatal(FatalError::Unmap {
        addr: block.addr(),
        len,
        source,
      });
    }
    debug!("mapping: unmapped {len} bytes at {:#x}", block.addr());
  }

  fn unlink(
    &mut self,
    block: Block,
  ) {
    let prev = self.guard.verify_opt(block.prev());
    let next = self.guard.verify_opt(block.next());

    match prev {
      Some(prev) => prev.set_next(next),
      None => self.head = next,
    }
    match next {
      Some(next) => next.set_prev(prev),
      None => self.tail = prev,
    }

    block.detach();
  }
}
