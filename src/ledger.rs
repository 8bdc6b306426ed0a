use std::{
  marker::PhantomData,
  ptr::NonNull,
};

use crate::block::Block;

/// The chain of every block the allocator has ever catalogued, free or lent.
///
/// Holds no policy: it only knows how to walk, push at the head and unlink.
pub(crate) struct Ledger {
  head: Option<NonNull<Block>>,
}

impl Ledger {
  pub const fn new() -> Self {
    Self { head: None }
  }

  pub fn head(&self) -> Option<NonNull<Block>> {
    self.head
  }

  /// Links `block` after `tail`, or makes it the head when there is no tail.
  ///
  /// # Safety
  ///
  /// `tail` must be the last block of this ledger and `block` must not be in it.
  pub unsafe fn append(
    &mut self,
    tail: Option<NonNull<Block>>,
    block: NonNull<Block>,
  ) {
    match tail {
      Some(tail) => unsafe { (*tail.as_ptr()).next = Some(block) },
      None => self.head = Some(block),
    }
  }

  /// # Safety
  ///
  /// `block` must be a live header that is not currently in the ledger.
  pub unsafe fn push_front(
    &mut self,
    block: NonNull<Block>,
  ) {
    unsafe { (*block.as_ptr()).next = self.head };
    self.head = Some(block);
  }

  /// Removes `block` from the chain. Returns `false`, leaving everything
  /// untouched, when no block at that address is catalogued.
  ///
  /// Candidates are compared by address only, so `block` itself is never read
  /// unless it turns out to be in the chain.
  pub fn unlink(
    &mut self,
    block: NonNull<Block>,
  ) -> bool {
    let Some(head) = self.head else {
      return false;
    };

    unsafe {
      if head == block {
        self.head = (*head.as_ptr()).next;
        return true;
      }

      let mut current = head;
      while let Some(next) = (*current.as_ptr()).next {
        if next == block {
          (*current.as_ptr()).next = (*next.as_ptr()).next;
          return true;
        }
        current = next;
      }
    }

    false
  }

  pub fn iter(&self) -> Iter<'_> {
    Iter {
      current: self.head(),
      _ledger: PhantomData,
    }
  }
}

pub(crate) struct Iter<'a> {
  current: Option<NonNull<Block>>,
  _ledger: PhantomData<&'a Ledger>,
}

impl Iterator for Iter<'_> {
  type Item = NonNull<Block>;

  fn next(&mut self) -> Option<Self::Item> {
    let block = self.current?;
    self.current = unsafe { (*block.as_ptr()).next };
    Some(block)
  }
}
