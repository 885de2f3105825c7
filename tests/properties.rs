//! Property tests over sizes and random operation sequences.

mod common;

use std::ptr::{self, NonNull};

use common::{arena_offset, heap};
use proptest::prelude::*;
use rbuddy::{HEADER_SIZE, Heap, INITIAL_BLOCKS, MAX_BLOCK_SIZE, ReservedMemory, next_power_of_two};

const SMALL: std::ops::RangeInclusive<usize> = 1..=MAX_BLOCK_SIZE - HEADER_SIZE;

#[derive(Debug, Clone)]
enum Op {
  Allocate(usize),
  Zeroed(usize, usize),
  Free(usize),
  Reallocate(usize, usize),
}

fn op() -> impl Strategy<Value = Op> {
  prop_oneof![
    4 => (1usize..20_000).prop_map(Op::Allocate),
    1 => (130_000usize..300_000).prop_map(Op::Allocate),
    1 => (1usize..64, 1usize..64).prop_map(|(count, size)| Op::Zeroed(count, size)),
    3 => any::<usize>().prop_map(Op::Free),
    2 => (any::<usize>(), 1usize..40_000).prop_map(|(i, size)| Op::Reallocate(i, size)),
  ]
}

fn assert_invariants<M: rbuddy::OsMemory>(
  heap: &Heap<M>,
  live: usize,
) {
  let stats = heap.stats();
  assert_eq!(stats.allocated_blocks, stats.free_blocks + live);
  assert!(stats.allocated_bytes >= stats.free_bytes);
  assert_eq!(stats.metadata_bytes, stats.allocated_blocks * HEADER_SIZE);
}

proptest! {
  #[test]
  fn small_requests_get_smallest_power_of_two(size in SMALL) {
    let mut heap = heap();
    let ptr = heap.allocate(size).unwrap();

    prop_assert_eq!(unsafe { heap.block_size(ptr) }, next_power_of_two(size + HEADER_SIZE));
    prop_assert!(heap.os().maps.is_empty());
  }

  #[test]
  fn large_requests_map_exact_length(size in MAX_BLOCK_SIZE - HEADER_SIZE + 1..2_000_000usize) {
    let mut heap = heap();
    let ptr = heap.allocate(size).unwrap();

    prop_assert_eq!(unsafe { heap.block_size(ptr) }, size + HEADER_SIZE);
    unsafe { heap.free(ptr.as_ptr()) };
    prop_assert_eq!(&heap.os().maps, &vec![size + HEADER_SIZE]);
    prop_assert_eq!(&heap.os().unmaps, &vec![size + HEADER_SIZE]);
  }

  #[test]
  fn reallocate_null_matches_allocate(sizes in prop::collection::vec(SMALL, 1..8)) {
    let mut direct = Heap::with_os(ReservedMemory::with_arena_room().unwrap());
    let mut via_null = Heap::with_os(ReservedMemory::with_arena_room().unwrap());

    for size in sizes {
      let a = direct.allocate(size).unwrap();
      let b = unsafe { via_null.reallocate(ptr::null_mut(), size) }.unwrap();

      prop_assert_eq!(arena_offset(&direct, a), arena_offset(&via_null, b));
      prop_assert_eq!(unsafe { direct.block_size(a) }, unsafe { via_null.block_size(b) });
    }
    prop_assert_eq!(direct.stats(), via_null.stats());
  }

  #[test]
  fn shrinking_reallocate_keeps_pointer_and_contents(size in SMALL, shrink in 1usize..=MAX_BLOCK_SIZE) {
    let shrink = shrink.min(size);
    let mut heap = heap();
    let ptr = heap.allocate(size).unwrap();
    unsafe {
      for i in 0..size {
        ptr.as_ptr().add(i).write(i as u8);
      }
    }
    let before = heap.stats();

    let same = unsafe { heap.reallocate(ptr.as_ptr(), shrink) }.unwrap();

    prop_assert_eq!(same, ptr);
    prop_assert_eq!(heap.stats(), before);
    let bytes = unsafe { std::slice::from_raw_parts(same.as_ptr(), size) };
    prop_assert!(bytes.iter().enumerate().all(|(i, &b)| b == i as u8));
  }

  #[test]
  fn random_operations_keep_counters_consistent(ops in prop::collection::vec(op(), 1..60)) {
    let mut heap = heap();
    let mut live: Vec<(NonNull<u8>, usize, u8)> = Vec::new();

    for (step, op) in ops.into_iter().enumerate() {
      let tag = step as u8;
      match op {
        Op::Allocate(size) => {
          if let Ok(ptr) = heap.allocate(size) {
            unsafe { ptr.as_ptr().write_bytes(tag, size) };
            live.push((ptr, size, tag));
          }
        }
        Op::Zeroed(count, size) => {
          if let Ok(ptr) = heap.allocate_zeroed(count, size) {
            let bytes = unsafe { std::slice::from_raw_parts(ptr.as_ptr(), count * size) };
            prop_assert!(bytes.iter().all(|&b| b == 0));
            live.push((ptr, count * size, 0));
          }
        }
        Op::Free(i) if !live.is_empty() => {
          let (ptr, _, _) = live.swap_remove(i % live.len());
          unsafe { heap.free(ptr.as_ptr()) };
        }
        Op::Reallocate(i, size) if !live.is_empty() => {
          let index = i % live.len();
          let (ptr, old_size, fill) = live[index];
          if let Ok(moved) = unsafe { heap.reallocate(ptr.as_ptr(), size) } {
            let kept = old_size.min(size);
            let bytes = unsafe { std::slice::from_raw_parts(moved.as_ptr(), kept) };
            prop_assert!(bytes.iter().all(|&b| b == fill));
            unsafe { moved.as_ptr().write_bytes(tag, size) };
            live[index] = (moved, size, tag);
          }
        }
        _ => {}
      }

      assert_invariants(&heap, live.len());
      for &(ptr, size, fill) in &live {
        let bytes = unsafe { std::slice::from_raw_parts(ptr.as_ptr(), size) };
        prop_assert!(bytes.iter().all(|&b| b == fill));
      }
    }

    for (ptr, _, _) in live.drain(..) {
      unsafe { heap.free(ptr.as_ptr()) };
    }
    prop_assert_eq!(heap.free_block_count(), INITIAL_BLOCKS);
    prop_assert_eq!(heap.allocated_block_count(), INITIAL_BLOCKS);
    prop_assert_eq!(heap.os().maps.len(), heap.os().unmaps.len());
  }
}
