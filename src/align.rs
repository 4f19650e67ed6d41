/// Rounds a byte count up to the next double word (8 bytes).
///
/// Every block size and every payload offset in the heap is a multiple of
/// this alignment.
///
/// # Examples
///
/// ```rust
/// use tagalloc::align;
///
/// assert_eq!(align!(13), 16);
/// assert_eq!(align!(16), 16);
/// assert_eq!(align!(0), 0);
/// ```
#[macro_export]
macro_rules! align {
  ($value:expr) => {
    ($value + $crate::block::DSIZE - 1) & !($crate::block::DSIZE - 1)
  };
}
