use std::io::Read;

use libc::sbrk;
use rbuddy::{Heap, OsMemory, order_to_size};

/// Waits until the user presses ENTER.
/// Useful when you want to inspect memory state with tools like `pmap`, `htop`,
/// `gdb`, or just visually track how the arena and mappings appear.
fn block_until_enter_pressed() {
  println!("\n>>> Press ENTER to continue...");
  let _ = std::io::stdin().bytes().next();
}

/// Prints the current program break using `sbrk(0)`.
unsafe fn print_program_break(label: &str) {
  println!(
    "[{}] PID = {}, program break (sbrk(0)) = {:?}",
    label,
    std::process::id(),
    unsafe { sbrk(0) },
  );
}

fn print_stats<M: OsMemory>(heap: &Heap<M>) {
  let stats = heap.stats();
  println!(
    "    blocks: {} allocated / {} free, bytes: {} allocated / {} free, metadata: {} bytes",
    stats.allocated_blocks, stats.free_blocks, stats.allocated_bytes, stats.free_bytes, stats.metadata_bytes
  );
}

fn main() {
  env_logger::init();

  let mut heap = Heap::new();

  unsafe {
    print_program_break("start");
    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 1) First allocation. The break jumps to the next 4 MiB boundary plus
    //    4 MiB of arena, then an order-10 block is split down to order 1.
    // --------------------------------------------------------------------
    let first = heap.allocate(100).unwrap();
    println!("\n[1] allocate(100) -> {:p}, block of {} bytes", first, heap.block_size(first));
    print_program_break("after first allocation");
    print_stats(&heap);
    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 2) Its buddy is the next order-1 block.
    // --------------------------------------------------------------------
    let second = heap.allocate(100).unwrap();
    println!(
      "\n[2] allocate(100) -> {:p}, {} bytes after the first",
      second,
      second.as_ptr() as usize - first.as_ptr() as usize
    );
    print_stats(&heap);
    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 3) Free both. They merge all the way back to order 10.
    // --------------------------------------------------------------------
    heap.free(first.as_ptr());
    heap.free(second.as_ptr());
    println!("\n[3] freed both");
    print_stats(&heap);
    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 4) Grow a block in place by absorbing its free buddies.
    // --------------------------------------------------------------------
    let small = heap.allocate(20).unwrap();
    small.as_ptr().write_bytes(0xAB, 20);
    let grown = heap.reallocate(small.as_ptr(), order_to_size(4) - heap.metadata_size()).unwrap();
    println!(
      "\n[4] reallocate {:p} -> {:p}, block of {} bytes, first byte = 0x{:X}",
      small,
      grown,
      heap.block_size(grown),
      grown.as_ptr().read()
    );
    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 5) Large requests bypass the arena and get their own mapping.
    //    Watch it appear in /proc/<pid>/maps.
    // --------------------------------------------------------------------
    print_program_break("before large alloc");
    let big = heap.allocate(1024 * 1024).unwrap();
    println!("\n[5] allocate(1 MiB) -> {:p}", big);
    print_program_break("after large alloc");
    print_stats(&heap);
    block_until_enter_pressed();

    heap.free(big.as_ptr());
    heap.free(grown.as_ptr());
    println!("\n[6] End of example. The arena stays until the process exits.");
    print_stats(&heap);
  }
}
