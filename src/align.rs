/// Rounds `value` up to the machine word size.
///
/// # Examples
///
/// ```rust
/// use rbuddy::align;
///
/// match std::mem::size_of::<usize>() {
///     8 => assert_eq!(align!(13), 16), // 64 bit machine.
///     4 => assert_eq!(align!(11), 12), // 32 bit machine.
///     _ => {},
/// };
/// ```
#[macro_export]
macro_rules! align {
  ($value:expr) => {
    (($value) + ::core::mem::size_of::<usize>() - 1) & !(::core::mem::size_of::<usize>() - 1)
  };
}

/// Rounds `value` up to the next multiple of `align`, which must be a power of two.
///
/// ```rust
/// use rbuddy::align_to;
///
/// assert_eq!(align_to!(0x40_0001, 0x40_0000), 0x80_0000);
/// assert_eq!(align_to!(0x80_0000, 0x40_0000), 0x80_0000);
/// ```
#[macro_export]
macro_rules! align_to {
  ($value:expr, $align:expr) => {
    (($value) + ($align) - 1) & !(($align) - 1)
  };
}
