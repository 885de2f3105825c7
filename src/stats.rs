//! Block and byte counters.
//!
//! Byte counts are payload bytes: a block of `size` bytes contributes
//! `size - HEADER_SIZE`. Buddy blocks count as allocated whether they are free
//! or in use; the free counters are a subset of the allocated ones.

use crate::block::HEADER_SIZE;

/// Running counters kept by one allocator.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BlockCounters {
  pub blocks: usize,
  pub bytes: usize,
  pub free_blocks: usize,
  pub free_bytes: usize,
}

impl BlockCounters {
  pub const fn new() -> Self {
    Self {
      blocks: 0,
      bytes: 0,
      free_blocks: 0,
      free_bytes: 0,
    }
  }

  pub fn add_block(
    &mut self,
    payload: usize,
  ) {
    self.blocks += 1;
    self.bytes += payload;
  }

  pub fn remove_block(
    &mut self,
    payload: usize,
  ) {
    self.blocks -= 1;
    self.bytes -= payload;
  }

  pub fn mark_free(
    &mut self,
    payload: usize,
  ) {
    self.free_blocks += 1;
    self.free_bytes += payload;
  }

  pub fn mark_used(
    &mut self,
    payload: usize,
  ) {
    self.free_blocks -= 1;
    self.free_bytes -= payload;
  }

  /// One block became two; the new header eats into the payload.
  pub fn split(&mut self) {
    self.blocks += 1;
    self.bytes -= HEADER_SIZE;
  }

  /// Two blocks became one; a header's worth of bytes returns to the payload.
  pub fn merge(&mut self) {
    self.blocks -= 1;
    self.bytes += HEADER_SIZE;
  }
}

/// Snapshot of a heap's counters across both allocators.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct HeapStats {
  /// Free buddy blocks.
  pub free_blocks: usize,
  /// Payload bytes in free buddy blocks.
  pub free_bytes: usize,
  /// Buddy blocks (free or not) plus live mapped blocks.
  pub allocated_blocks: usize,
  /// Payload bytes in all counted blocks.
  pub allocated_bytes: usize,
  /// Bytes taken by the headers of all counted blocks.
  pub metadata_bytes: usize,
  /// Size of a single header.
  pub metadata_size: usize,
}

impl HeapStats {
  pub fn from_counters(
    buddy: &BlockCounters,
    mapping: &BlockCounters,
  ) -> Self {
    let allocated_blocks = buddy.blocks + mapping.blocks;

    Self {
      free_blocks: buddy.free_blocks,
      free_bytes: buddy.free_bytes,
      allocated_blocks,
      allocated_bytes: buddy.bytes + mapping.bytes,
      metadata_bytes: allocated_blocks * HEADER_SIZE,
      metadata_size: HEADER_SIZE,
    }
  }

  /// Blocks currently handed out to callers.
  pub fn used_blocks(&self) -> usize {
    self.allocated_blocks - self.free_blocks
  }
}
