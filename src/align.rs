/// Rounds the given byte count up to the machine word.
///
/// Every size the allocator records in a block header or asks a
/// [`Grower`](crate::Grower) for goes through this macro first, so headers and
/// payloads stay word aligned.
///
/// # Examples
///
/// ```rust
/// use fitalloc::align;
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
    ($value + ::core::mem::size_of::<usize>() - 1) & !(::core::mem::size_of::<usize>() - 1)
  };
}

/// Like [`align!`](crate::align!), but `None` when rounding up would overflow.
pub const fn checked_align(value: usize) -> Option<usize> {
  if value > usize::MAX - (::core::mem::size_of::<usize>() - 1) {
    None
  } else {
    Some(align!(value))
  }
}
