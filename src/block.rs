use std::{
  mem,
  ptr::NonNull,
};

/// Allocator-owned metadata sitting directly in front of every payload.
///
/// ```text
///   ┌─────────────────────────┬──────────────────────────────┐
///   │  Block (HEADER_SIZE)    │  payload (payload_size)      │
///   └─────────────────────────┴──────────────────────────────┘
///   ▲                         ▲
///   header address            Block::payload(header)
/// ```
#[repr(C)]
pub(crate) struct Block {
  pub payload_size: usize,
  pub free: bool,
  pub next: Option<NonNull<Block>>,
}

/// Width of a block header in bytes. A payload always starts exactly this far
/// past its header.
pub const HEADER_SIZE: usize = mem::size_of::<Block>();

const _: () = assert!(HEADER_SIZE % mem::align_of::<usize>() == 0);

impl Block {
  /// Writes a fresh, unlinked header at the start of `span`.
  ///
  /// This is the only place raw memory becomes a `Block`.
  ///
  /// # Safety
  ///
  /// `span` must be owned by the allocator, aligned for `Block`, and at least
  /// `HEADER_SIZE + payload_size` bytes long.
  pub unsafe fn claim(
    span: NonNull<u8>,
    payload_size: usize,
    free: bool,
  ) -> NonNull<Block> {
    debug_assert_eq!(
      span.as_ptr() as usize % mem::align_of::<Block>(),
      0,
      "span {span:?} is not aligned for a block header"
    );

    let block = span.cast::<Block>();
    unsafe {
      block.as_ptr().write(Block {
        payload_size,
        free,
        next: None,
      });
    }
    block
  }

  pub fn payload(block: NonNull<Block>) -> NonNull<u8> {
    let address = block.as_ptr().cast::<u8>().wrapping_add(HEADER_SIZE);
    // a header never ends at the top of the address space
    unsafe { NonNull::new_unchecked(address) }
  }

  /// Steps back from a payload to the header in front of it. Only computes the
  /// address, nothing is read.
  pub fn from_payload(payload: NonNull<u8>) -> Option<NonNull<Block>> {
    NonNull::new(payload.as_ptr().wrapping_sub(HEADER_SIZE).cast::<Block>())
  }

  /// Shrinks `block` to `size` payload bytes and turns the remainder of its
  /// payload into a free block linked right after it.
  ///
  /// # Safety
  ///
  /// `block` must be a live header, `size` must be word aligned, and
  /// `size + HEADER_SIZE` must be strictly below the block's payload size.
  pub unsafe fn split(
    block: NonNull<Block>,
    size: usize,
  ) -> NonNull<Block> {
    unsafe {
      let header = block.as_ptr();
      debug_assert!((*header).payload_size > size + HEADER_SIZE);

      let rest_size = (*header).payload_size - HEADER_SIZE - size;
      let rest = Block::claim(Block::payload(block).add(size), rest_size, true);

      (*rest.as_ptr()).next = (*header).next;
      (*header).next = Some(rest);
      (*header).payload_size = size;

      rest
    }
  }
}
