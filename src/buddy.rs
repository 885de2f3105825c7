use std::ptr::{self, NonNull};

use log::{debug, trace};

use crate::{
  align_to,
  block::{Block, BlockHeader, BlockState},
  error::{FatalError, fatal},
  guard::GuardToken,
  order::{MAX_BLOCK_SIZE, MAX_ORDER, order_to_size, size_to_order},
  os::OsMemory,
  stats::BlockCounters,
};

/// The arena starts on a multiple of this, so XOR-ing an address with a block
/// size always lands inside the arena.
pub const ARENA_ALIGNMENT: usize = 4 * 1024 * 1024;

/// Number of order-10 blocks carved at initialization.
pub const INITIAL_BLOCKS: usize = 32;

pub const ARENA_SIZE: usize = INITIAL_BLOCKS * MAX_BLOCK_SIZE;

/// Power-of-two allocator over a single arena carved from the break.
///
/// Each order has a doubly linked free list threaded through the headers and
/// sorted by address, so a buddy lookup can stop at the first block past the
/// target address.
pub struct BuddyAllocator {
  guard: GuardToken,
  free_lists: [Option<Block>; MAX_ORDER + 1],
  arena: Option<NonNull<u8>>,
  counters: BlockCounters,
}

impl BuddyAllocator {
  pub const fn new(guard: GuardToken) -> Self {
    Self {
      guard,
      free_lists: [None; MAX_ORDER + 1],
      arena: None,
      counters: BlockCounters::new(),
    }
  }

  pub fn is_initialized(&self) -> bool {
    self.arena.is_some()
  }

  /// First byte of the arena, once it exists.
  pub fn arena_base(&self) -> Option<usize> {
    self.arena.map(|base| base.as_ptr() as usize)
  }

  pub fn counters(&self) -> &BlockCounters {
    &self.counters
  }

  /// Carves the arena out of the break on first use. Later calls do nothing.
  ///
  /// Aborts the process if the break cannot be extended.
  pub fn initialize(
    &mut self,
    os: &mut impl OsMemory,
  ) {
    if self.arena.is_some() {
      return;
    }

    let current = os.current_break();
    let padding = align_to!(current, ARENA_ALIGNMENT) - current;
    let requested = padding + ARENA_SIZE;

    let Some(previous) = os.extend_break(requested) else {
      fatal(FatalError::ArenaInit { requested });
    };
    debug_assert_eq!(previous.as_ptr() as usize, current);

    let base = unsafe { previous.add(padding) };
    let mut tail: Option<Block> = None;

    for i in 0..INITIAL_BLOCKS {
      let header = BlockHeader::new(self.guard, MAX_BLOCK_SIZE, BlockState::Free {
        order: MAX_ORDER as u8,
      });
      let block = unsafe { Block::write(base.add(i * MAX_BLOCK_SIZE), header) };

      block.set_prev(tail);
      match tail {
        Some(last) => last.set_next(Some(block)),
        None => self.free_lists[MAX_ORDER] = Some(block),
      }
      tail = Some(block);

      self.counters.add_block(block.capacity());
      self.counters.mark_free(block.capacity());
    }

    self.arena = Some(base);
    debug!(
      "buddy arena at {:p}: {} blocks of {} bytes ({} bytes of padding)",
      base, INITIAL_BLOCKS, MAX_BLOCK_SIZE, padding
    );
  }

  /// Detaches an in-use block of exactly `order`, splitting a larger one if
  /// needed. `None` once every order up to the maximum is empty.
  pub(crate) fn allocate(
    &mut self,
    order: usize,
  ) -> Option<Block> {
    let found = (order..=MAX_ORDER).find(|&o| self.free_lists[o].is_some())?;
    let block = self.guard.verify(self.free_lists[found]?);
    self.unlink(block, found);

    for lower in (order..found).rev() {
      let upper = self.split(block);
      self.insert(upper, lower);
    }

    trace!("buddy: allocated order {order} at {:#x} (taken from order {found})", block.addr());
    Some(block)
  }

  /// Returns an in-use block of `order` to the free lists, merging it with its
  /// buddy for as long as the buddy is free.
  pub(crate) fn free(
    &mut self,
    block: Block,
    order: usize,
  ) {
    let mut block = block;
    let mut order = order;

    while order < MAX_ORDER {
      debug_assert_eq!(block.size(), order_to_size(order));
      let Some(buddy) = self.find(order, block.buddy_addr()) else {
        break;
      };

      self.unlink(buddy, order);
      block = self.merge(block, buddy);
      order += 1;
      trace!("buddy: merged into order {order} at {:#x}", block.addr());
    }

    self.insert(block, order);
  }

  /// Whether every buddy on the way from `from` to `to` is sitting free.
  pub(crate) fn can_grow_in_place(
    &self,
    block: Block,
    from: usize,
    to: usize,
  ) -> bool {
    if to > MAX_ORDER {
      return false;
    }

    let mut addr = block.addr();
    for order in from..to {
      let buddy = addr ^ order_to_size(order);
      if self.find(order, buddy).is_none() {
        return false;
      }
      addr = addr.min(buddy);
    }

    true
  }

  /// Absorbs the free buddies of an in-use block until it reaches `to`, then
  /// moves the payload to the front of the merged block.
  ///
  /// Leaves everything untouched and returns `None` if the chain is not free.
  pub(crate) fn grow_in_place(
    &mut self,
    block: Block,
    from: usize,
    to: usize,
  ) -> Option<Block> {
    if !self.can_grow_in_place(block, from, to) {
      return None;
    }

    let source = block.user_ptr();
    let len = block.capacity();
    let mut merged = block;

    for order in from..to {
      let buddy = self.find(order, merged.buddy_addr())?;
      self.unlink(buddy, order);
      merged = self.merge(merged, buddy);
    }

    merged.set_state(BlockState::InUse);
    unsafe { ptr::copy(source.as_ptr(), merged.user_ptr().as_ptr(), len) };

    trace!(
      "buddy: grew {:#x} from order {from} to {to}, now at {:#x}",
      block.addr(),
      merged.addr()
    );
    Some(merged)
  }

  /// Length of the free list of `order`.
  pub fn free_blocks_at(
    &self,
    order: usize,
  ) -> usize {
    let mut count = 0;
    let mut cursor = self.guard.verify_opt(self.free_lists.get(order).copied().flatten());

    while let Some(current) = cursor {
      count += 1;
      cursor = self.guard.verify_opt(current.next());
    }

    count
  }

  /// Free block of `order` starting at `addr`, if any.
  fn find(
    &self,
    order: usize,
    addr: usize,
  ) -> Option<Block> {
    let mut cursor = self.guard.verify_opt(self.free_lists[order]);

    while let Some(current) = cursor {
      if current.addr() == addr {
        return Some(current);
      }
      if current.addr() > addr {
        return None;
      }
      cursor = self.guard.verify_opt(current.next());
    }

    None
  }

  /// Links `block` into the free list of `order`, keeping addresses ascending.
  fn insert(
    &mut self,
    block: Block,
    order: usize,
  ) {
    let mut prev = None;
    let mut cursor = self.guard.verify_opt(self.free_lists[order]);

    while let Some(current) = cursor {
      if block < current {
        break;
      }
      prev = Some(current);
      cursor = self.guard.verify_opt(current.next());
    }

    block.set_prev(prev);
    block.set_next(cursor);
    match prev {
      Some(prev) => prev.set_next(Some(block)),
      None => self.free_lists[order] = Some(block),
    }
    if let Some(next) = cursor {
      next.set_prev(Some(block));
    }

    block.set_state(BlockState::Free { order: order as u8 });
    self.counters.mark_free(block.capacity());
  }

  /// Takes a free block out of its list and marks it in use.
  fn unlink(
    &mut self,
    block: Block,
    order: usize,
  ) {
    let prev = self.guard.verify_opt(block.prev());
    let next = self.guard.verify_opt(block.next());

    match prev {
      Some(prev) => prev.set_next(next),
      None => self.free_lists[order] = next,
    }
    if let Some(next) = next {
      next.set_prev(prev);
    }

    block.detach();
    block.set_state(BlockState::InUse);
    self.counters.mark_used(block.capacity());
  }

  /// Halves `block` and returns the upper half as a new detached block.
  fn split(
    &mut self,
    block: Block,
  ) -> Block {
    let half = block.size() / 2;
    block.set_size(half);

    let header = BlockHeader::new(self.guard, half, BlockState::InUse);
    let upper = unsafe { Block::write(block.as_non_null().add(half), header) };

    self.counters.split();
    upper
  }

  /// Joins two detached buddies; the lower address survives.
  ///
  /// The upper header stays behind inside the merged block, tagged free so a
  /// stale pointer to it is seen as already released.
  fn merge(
    &mut self,
    block: Block,
    buddy: Block,
  ) -> Block {
    let half = block.size();
    let merged = block.min(buddy);
    let absorbed = block.max(buddy);

    absorbed.set_state(BlockState::Free {
      order: size_to_order(half) as u8,
    });
    absorbed.detach();
    merged.set_size(half * 2);
    merged.detach();

    self.counters.merge();
    merged
  }
}
