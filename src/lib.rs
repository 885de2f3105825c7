//! # rbuddy - A Buddy-System Memory Allocator
//!
//! This crate provides a user-space allocator that manages its own memory
//! straight from the OS: one arena carved out of the program break (`sbrk`)
//! for small requests, and one anonymous mapping (`mmap`) per large request.
//!
//! ## Overview
//!
//! Small requests are served by a **buddy allocator**. Every block is a power
//! of two between 128 bytes (order 0) and 128 KiB (order 10), header included:
//!
//! ```text
//!   Splitting an order-2 block to serve an order-0 request:
//!
//!   ┌───────────────────────────────────────────────┐
//!   │                 order 2 (512)                 │
//!   └───────────────────────────────────────────────┘
//!                          │ split
//!   ┌───────────────────────┬───────────────────────┐
//!   │     order 1 (256)     │  order 1 (256) → free │
//!   └───────────────────────┴───────────────────────┘
//!                │ split
//!   ┌───────────┬───────────┐
//!   │ order 0 ◄ │ order 0 → │  returned / free
//!   └───────────┴───────────┘
//!
//!   Freeing walks back up: a block merges with its buddy
//!   (address XOR size) for as long as the buddy is free.
//! ```
//!
//! Requests whose block would exceed 128 KiB get their own mapping, sized
//! exactly `request + header`, and are unmapped as soon as they are freed.
//!
//! ## Crate Structure
//!
//! ```text
//!   rbuddy
//!   ├── align      - Alignment macros (align!, align_to!)
//!   ├── block      - Block header and the handle wrapping header pointers
//!   ├── order      - Size classes
//!   ├── guard      - Corruption guard token
//!   ├── error      - AllocError, FatalError
//!   ├── os         - OsMemory trait, SystemMemory, ReservedMemory
//!   ├── stats      - Block and byte counters
//!   ├── buddy      - BuddyAllocator
//!   ├── mapping    - MappingAllocator
//!   ├── manager    - MemoryManager (both allocators, one guard)
//!   └── heap       - Heap, the public entry point
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rbuddy::Heap;
//!
//! let mut heap = Heap::new();
//!
//! let ptr = heap.allocate(100).unwrap();
//! unsafe {
//!     ptr.as_ptr().write_bytes(0x2a, 100);
//!
//!     let ptr = heap.reallocate(ptr.as_ptr(), 1000).unwrap();
//!     heap.free(ptr.as_ptr());
//! }
//!
//! assert_eq!(heap.allocated_block_count(), heap.free_block_count());
//! ```
//!
//! ## How It Works
//!
//! The first valid allocation carves the arena: the break is pushed up to the
//! next 4 MiB boundary and then by 32 blocks of order 10.
//!
//! ```text
//!   Program break at first allocation:
//!
//!   ──────┬──────────┬────────┬────────┬─────┬────────┬──────
//!    heap │ padding  │ 128KiB │ 128KiB │ ... │ 128KiB │
//!   ──────┴──────────┴────────┴────────┴─────┴────────┴──────
//!         ▲          ▲                                ▲
//!    old break   4 MiB aligned                    new break
//!                arena base
//! ```
//!
//! The arena never grows past those 4 MiB. Every block starts with a header:
//!
//! ```text
//!   ┌───────────────────────┬────────────────────────────────┐
//!   │    Block Header       │         User Data              │
//!   │  ┌─────────────────┐  │                                │
//!   │  │ guard token     │  │  ┌──────────────────────────┐  │
//!   │  │ size            │  │  │                          │  │
//!   │  │ state           │  │  │  size - header usable    │  │
//!   │  │ next / prev     │  │  │                          │  │
//!   │  └─────────────────┘  │  └──────────────────────────┘  │
//!   └───────────────────────┴────────────────────────────────┘
//!                           ▲
//!                           └── Pointer returned to user
//! ```
//!
//! The guard token is random per heap. It is checked every time a list link
//! is followed and every time a user pointer is turned back into a header; a
//! mismatch means something wrote over metadata and the process is aborted.
//!
//! ## Limitations
//!
//! - **Single-threaded only**: No synchronization primitives
//! - **Fixed arena**: 4 MiB of small blocks, no growth past that
//! - **No shrinking**: `reallocate` to a smaller size keeps the block as is
//! - **Unix-only**: Requires `libc`, `sbrk` and `mmap`
//!
//! ## Safety
//!
//! Handing memory out is safe; taking it back is not. [`Heap::free`] and
//! [`Heap::reallocate`] trust that the pointer came from the same heap.

pub mod align;
mod block;
mod buddy;
mod error;
mod guard;
mod heap;
mod manager;
mod mapping;
mod order;
mod os;
mod stats;

pub use block::HEADER_SIZE;
pub use buddy::{ARENA_ALIGNMENT, ARENA_SIZE, BuddyAllocator, INITIAL_BLOCKS};
pub use error::{AllocError, AllocResult, FatalError};
pub use guard::GuardToken;
pub use heap::{Heap, MAX_ALLOC_SIZE};
pub use manager::MemoryManager;
pub use mapping::MappingAllocator;
pub use order::{
  MAX_BLOCK_SIZE, MAX_ORDER, MIN_BLOCK_SIZE, next_power_of_two, order_to_size, size_to_order,
};
pub use os::{OsMemory, ReservedMemory, SystemMemory};
pub use stats::{BlockCounters, HeapStats};
