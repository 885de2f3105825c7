//! Power-of-two size classes served by the buddy arena.

/// Smallest buddy block, header included.
pub const MIN_BLOCK_SIZE: usize = 128;

/// Highest order; order `k` blocks are `MIN_BLOCK_SIZE << k` bytes.
pub const MAX_ORDER: usize = 10;

/// Largest block the buddy path serves (131072 bytes).
pub const MAX_BLOCK_SIZE: usize = order_to_size(MAX_ORDER);

pub const fn order_to_size(order: usize) -> usize {
  MIN_BLOCK_SIZE << order
}

/// Inverse of [`order_to_size`] for valid buddy sizes; rounds down otherwise.
pub const fn size_to_order(size: usize) -> usize {
  let classes = size / MIN_BLOCK_SIZE;
  if classes == 0 { 0 } else { classes.ilog2() as usize }
}

/// Rounds `n` up to a power of two, never below [`MIN_BLOCK_SIZE`].
pub const fn next_power_of_two(n: usize) -> usize {
  let rounded = n.next_power_of_two();
  if rounded > MIN_BLOCK_SIZE { rounded } else { MIN_BLOCK_SIZE }
}

/// Smallest order whose blocks hold `total` bytes, or `None` when `total`
/// belongs on the mapping path.
pub const fn order_for(total: usize) -> Option<usize> {
  if total > MAX_BLOCK_SIZE {
    None
  } else {
    Some(size_to_order(next_power_of_two(total)))
  }
}
