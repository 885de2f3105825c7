use std::{
  mem,
  ptr::{self, NonNull},
};

use crate::{align, guard::GuardToken};

/// Bytes taken by a header in front of every block.
pub const HEADER_SIZE: usize = align!(mem::size_of::<BlockHeader>());

/// Which list, if any, currently owns a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockState {
  /// Handed out by the buddy arena, linked into no list.
  InUse,
  /// Linked into the buddy free list of `order`.
  Free { order: u8 },
  /// Live mapped block, linked into the mapping list.
  Mapped,
}

/// Metadata stored immediately before every user region.
#[repr(C)]
pub struct BlockHeader {
  guard: GuardToken,
  size: usize,
  state: BlockState,
  next: *mut BlockHeader,
  prev: *mut BlockHeader,
}

impl BlockHeader {
  pub fn new(
    guard: GuardToken,
    size: usize,
    state: BlockState,
  ) -> Self {
    Self {
      guard,
      size,
      state,
      next: ptr::null_mut(),
      prev: ptr::null_mut(),
    }
  }
}

/// Handle to a live header.
///
/// Every pointer computation on headers goes through this type. A `Block` can
/// only be built by the unsafe constructors below, whose callers promise that
/// the address holds (or is about to hold) a header inside memory the heap owns.
/// The accessors rely on that promise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Block(NonNull<BlockHeader>);

impl Block {
  /// Writes `header` at `addr` and returns a handle to it.
  ///
  /// # Safety
  ///
  /// `addr` must be word aligned and valid for writes of `header.size` bytes.
  pub unsafe fn write(
    addr: NonNull<u8>,
    header: BlockHeader,
  ) -> Self {
    let raw = addr.cast::<BlockHeader>();
    unsafe { raw.as_ptr().write(header) };
    Self(raw)
  }

  /// Recovers the header sitting right before a user pointer.
  ///
  /// # Safety
  ///
  /// `user` must have been returned by [`Block::user_ptr`] on a block that is
  /// still mapped. The guard token is *not* checked here.
  pub unsafe fn from_user_ptr(user: NonNull<u8>) -> Self {
    let header = unsafe { user.as_ptr().sub(HEADER_SIZE) };
    Self(unsafe { NonNull::new_unchecked(header) }.cast())
  }

  /// # Safety
  ///
  /// `raw` must be null or point at a header written by [`Block::write`].
  unsafe fn from_raw(raw: *mut BlockHeader) -> Option<Self> {
    NonNull::new(raw).map(Self)
  }

  pub fn addr(self) -> usize {
    self.0.as_ptr() as usize
  }

  pub fn as_non_null(self) -> NonNull<u8> {
    self.0.cast()
  }

  /// First byte after the header.
  pub fn user_ptr(self) -> NonNull<u8> {
    unsafe { NonNull::new_unchecked(self.0.as_ptr().cast::<u8>().add(HEADER_SIZE)) }
  }

  /// Address of the block's buddy, assuming the block is `self.size()` bytes
  /// and lives inside a region aligned to something larger.
  pub fn buddy_addr(self) -> usize {
    self.addr() ^ self.size()
  }

  /// Bytes available to the caller.
  pub fn capacity(self) -> usize {
    self.size() - HEADER_SIZE
  }

  pub fn guard(self) -> GuardToken {
    unsafe { (*self.0.as_ptr()).guard }
  }

  pub fn size(self) -> usize {
    unsafe { (*self.0.as_ptr()).size }
  }

  pub fn set_size(
    self,
    size: usize,
  ) {
    unsafe { (*self.0.as_ptr()).size = size };
  }

  pub fn state(self) -> BlockState {
    unsafe { (*self.0.as_ptr()).state }
  }

  pub fn set_state(
    self,
    state: BlockState,
  ) {
    unsafe { (*self.0.as_ptr()).state = state };
  }

  pub fn is_free(self) -> bool {
    matches!(self.state(), BlockState::Free { .. })
  }

  /// Raw successor link. Callers traversing a list must verify the guard of
  /// the returned block before reading anything else from it.
  pub fn next(self) -> Option<Block> {
    unsafe { Self::from_raw((*self.0.as_ptr()).next) }
  }

  pub fn prev(self) -> Option<Block> {
    unsafe { Self::from_raw((*self.0.as_ptr()).prev) }
  }

  pub fn set_next(
    self,
    next: Option<Block>,
  ) {
    unsafe { (*self.0.as_ptr()).next = next.map_or(ptr::null_mut(), |b| b.0.as_ptr()) };
  }

  pub fn set_prev(
    self,
    prev: Option<Block>,
  ) {
    unsafe { (*self.0.as_ptr()).prev = prev.map_or(ptr::null_mut(), |b| b.0.as_ptr()) };
  }

  /// Drops both links.
  pub fn detach(self) {
    self.set_next(None);
    self.set_prev(None);
  }
}
