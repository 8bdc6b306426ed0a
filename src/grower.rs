//! Sources of fresh memory for the allocator.
//!
//! ```text
//!   Allocator ──grow(bytes)──▶ Grower ──▶ sbrk(2) / fixed arena / ...
//! ```

use std::{
  alloc::{self, Layout},
  mem,
  ptr::NonNull,
};

use log::{debug, warn};

use crate::{align, align::checked_align};

/// Something that can hand out new, contiguous spans of memory.
///
/// The allocator calls [`Grower::grow`] at most once per request, only when
/// no catalogued block can serve it.
///
/// # Safety
///
/// A returned span must be at least `bytes` long, aligned to the machine word,
/// and exclusively owned by the caller for as long as the grower is alive. It
/// must never overlap a span returned earlier.
pub unsafe trait Grower {
  /// Returns a fresh span of `bytes` bytes, or `None` once the backing region
  /// is exhausted.
  fn grow(
    &mut self,
    bytes: usize,
  ) -> Option<NonNull<u8>>;
}

/// Grows the process data segment with `sbrk(2)`.
#[cfg(unix)]
#[derive(Debug, Default, Clone, Copy)]
pub struct SbrkGrower;

#[cfg(unix)]
impl SbrkGrower {
  pub const fn new() -> Self {
    Self
  }

  /// Current program break, as reported by `sbrk(0)`.
  pub fn program_break() -> *mut u8 {
    unsafe { libc::sbrk(0) as *mut u8 }
  }
}

#[cfg(unix)]
unsafe impl Grower for SbrkGrower {
  fn grow(
    &mut self,
    bytes: usize,
  ) -> Option<NonNull<u8>> {
    use libc::{c_void, intptr_t, sbrk};

    let failed = usize::MAX as *mut c_void;

    unsafe {
      let current = sbrk(0);
      if current == failed {
        warn!("sbrk(0) failed, program break unknown");
        return None;
      }

      // someone else may have left the break unaligned
      let padding = align!(current as usize) - current as usize;
      let increment = bytes
        .checked_add(padding)
        .and_then(|total| intptr_t::try_from(total).ok())?;

      let address = sbrk(increment);
      if address == failed {
        warn!("sbrk({increment}) failed, data segment cannot grow");
        return None;
      }

      debug!("sbrk grew the data segment by {increment} bytes at {address:?}");

      NonNull::new((address as *mut u8).add(padding))
    }
  }
}

/// Hands out a fixed, zero-initialized region front to back.
///
/// The region is released when the grower is dropped, which invalidates every
/// span it ever returned.
#[derive(Debug)]
pub struct ArenaGrower {
  base: NonNull<u8>,
  capacity: usize,
  used: usize,
}

impl ArenaGrower {
  /// Reserves `capacity` bytes, rounded up to the machine word.
  ///
  /// # Panics
  ///
  /// Panics if the region cannot be reserved from the global allocator.
  pub fn with_capacity(capacity: usize) -> Self {
    let capacity = align!(capacity);

    if capacity == 0 {
      return Self {
        base: NonNull::<usize>::dangling().cast(),
        capacity,
        used: 0,
      };
    }

    let layout = Self::layout(capacity);
    let base = unsafe { alloc::alloc_zeroed(layout) };
    let Some(base) = NonNull::new(base) else {
      alloc::handle_alloc_error(layout);
    };

    Self {
      base,
      capacity,
      used: 0,
    }
  }

  pub fn capacity(&self) -> usize {
    self.capacity
  }

  /// Bytes already handed out.
  pub fn used(&self) -> usize {
    self.used
  }

  pub fn remaining(&self) -> usize {
    self.capacity - self.used
  }

  fn layout(capacity: usize) -> Layout {
    match Layout::from_size_align(capacity, mem::align_of::<usize>()) {
      Ok(layout) => layout,
      Err(_) => panic!("arena capacity {capacity} overflows isize"),
    }
  }
}

unsafe impl Grower for ArenaGrower {
  fn grow(
    &mut self,
    bytes: usize,
  ) -> Option<NonNull<u8>> {
    let bytes = checked_align(bytes)?;

    if bytes > self.remaining() {
      warn!(
        "arena exhausted: {bytes} bytes requested, {} of {} left",
        self.remaining(),
        self.capacity
      );
      return None;
    }

    let span = unsafe { self.base.add(self.used) };
    self.used += bytes;

    debug!("arena handed out {bytes} bytes at {span:?}, {} left", self.remaining());

    Some(span)
  }
}

impl Drop for ArenaGrower {
  fn drop(&mut self) {
    if self.capacity > 0 {
      unsafe { alloc::dealloc(self.base.as_ptr(), Self::layout(self.capacity)) };
    }
  }
}
