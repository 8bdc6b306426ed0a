use std::ptr::NonNull;

use log::{debug, trace, warn};

#[cfg(unix)]
use crate::grower::SbrkGrower;
use crate::{
  align,
  block::{Block, HEADER_SIZE},
  error::AllocError,
  grower::Grower,
  ledger::Ledger,
};

/// A catalogued block as seen from outside the allocator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
  pub header: NonNull<u8>,
  pub payload: NonNull<u8>,
  pub payload_size: usize,
  pub free: bool,
}

/// Totals over every block in the ledger. Header bytes are not counted.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LedgerStats {
  pub blocks: usize,
  pub free_blocks: usize,
  pub free_bytes: usize,
  pub used_bytes: usize,
}

enum Search {
  Found(NonNull<Block>),
  Exhausted { tail: Option<NonNull<Block>> },
}

/// First-fit allocator over a single chain of blocks.
///
/// Every block the grower ever provided stays in the chain. Lent blocks are
/// flagged, released ones move to the head so they are checked first.
pub struct Allocator<G: Grower> {
  ledger: Ledger,
  grower: G,
}

#[cfg(unix)]
impl Allocator<SbrkGrower> {
  /// An allocator growing the process data segment.
  pub const fn with_sbrk() -> Self {
    Self::new(SbrkGrower::new())
  }
}

#[cfg(unix)]
impl Default for Allocator<SbrkGrower> {
  fn default() -> Self {
    Self::with_sbrk()
  }
}

impl<G: Grower> Allocator<G> {
  pub const fn new(grower: G) -> Self {
    Self {
      ledger: Ledger::new(),
      grower,
    }
  }

  /// Shared access to the grower. The ledger points into memory the grower
  /// owns, so it can never be swapped out or replaced:
  ///
  /// ```rust,compile_fail
  /// use fitalloc::{Allocator, ArenaGrower};
  ///
  /// let mut allocator = Allocator::new(ArenaGrower::with_capacity(64));
  /// *allocator.grower() = ArenaGrower::with_capacity(128);
  /// ```
  pub fn grower(&self) -> &G {
    &self.grower
  }

  fn find_free_block(
    &self,
    size: usize,
  ) -> Search {
    let mut tail = None;

    for block in self.ledger.iter() {
      let header = unsafe { block.as_ref() };
      if header.free && header.payload_size >= size {
        return Search::Found(block);
      }
      tail = Some(block);
    }

    Search::Exhausted { tail }
  }

  /// Lends out a word-aligned span of at least `size` bytes.
  ///
  /// The first free block large enough is reused, and split when what is left
  /// over can hold another header plus at least one byte. Only when no block
  /// fits is the grower asked for `align!(size) + HEADER_SIZE` bytes.
  ///
  /// # Errors
  ///
  /// [`AllocError::InvalidRequest`] for a negative `size`, before anything is
  /// touched. [`AllocError::OutOfMemory`] when the grower gives up.
  pub fn acquire(
    &mut self,
    size: isize,
  ) -> Result<NonNull<u8>, AllocError> {
    let Ok(requested) = usize::try_from(size) else {
      debug!("rejecting request for {size} bytes");
      return Err(AllocError::InvalidRequest { size });
    };
    let size = align!(requested);

    match self.find_free_block(size) {
      Search::Found(block) => Ok(unsafe { self.reuse(block, size) }),
      Search::Exhausted { tail } => self.grow(size, tail),
    }
  }

  unsafe fn reuse(
    &mut self,
    block: NonNull<Block>,
    size: usize,
  ) -> NonNull<u8> {
    unsafe {
      let header = block.as_ptr();
      (*header).free = false;

      if (*header).payload_size > size + HEADER_SIZE {
        let rest = Block::split(block, size);
        trace!(
          "split {block:?}: {size} bytes lent, {} bytes left free at {rest:?}",
          (*rest.as_ptr()).payload_size
        );
      } else {
        trace!(
          "reusing {block:?} whole ({} bytes for a {size} byte request)",
          (*header).payload_size
        );
      }
    }

    Block::payload(block)
  }

  fn grow(
    &mut self,
    size: usize,
    tail: Option<NonNull<Block>>,
  ) -> Result<NonNull<u8>, AllocError> {
    let requested = size
      .checked_add(HEADER_SIZE)
      .ok_or(AllocError::OutOfMemory { requested: usize::MAX })?;

    debug!("no free block holds {size} bytes, growing by {requested}");

    let Some(span) = self.grower.grow(requested) else {
      warn!("grower refused {requested} bytes");
      return Err(AllocError::OutOfMemory { requested });
    };

    unsafe {
      let block = Block::claim(span, size, false);
      self.ledger.append(tail, block);
      trace!("appended {block:?} with {size} bytes after {tail:?}");
      Ok(Block::payload(block))
    }
  }

  /// Takes back a span lent by [`acquire`](Self::acquire) and puts its block
  /// at the head of the ledger. A null pointer is ignored.
  ///
  /// Adjacent free blocks are not merged.
  ///
  /// # Safety
  ///
  /// `payload` must have been returned by `acquire` on this allocator and not
  /// released since, and the caller must stop using the span.
  pub unsafe fn release(
    &mut self,
    payload: *mut u8,
  ) {
    let Some(payload) = NonNull::new(payload) else {
      return;
    };

    let Some(block) = Block::from_payload(payload) else {
      warn!("release of {payload:?} ignored: no block header fits in front of it");
      return;
    };

    if !self.ledger.unlink(block) {
      warn!("release of {payload:?} ignored: not a span of this allocator");
      return;
    }

    unsafe {
      (*block.as_ptr()).free = true;
      self.ledger.push_front(block);
    }

    trace!("released {block:?}, now at the head of the ledger");
  }

  /// Walks the ledger from its head.
  pub fn blocks(&self) -> impl Iterator<Item = BlockInfo> + '_ {
    self.ledger.iter().map(|block| {
      let header = unsafe { block.as_ref() };
      BlockInfo {
        header: block.cast(),
        payload: Block::payload(block),
        payload_size: header.payload_size,
        free: header.free,
      }
    })
  }

  pub fn stats(&self) -> LedgerStats {
    self.blocks().fold(LedgerStats::default(), |mut stats, block| {
      stats.blocks += 1;
      if block.free {
        stats.free_blocks += 1;
        stats.free_bytes += block.payload_size;
      } else {
        stats.used_bytes += block.payload_size;
      }
      stats
    })
  }
}

#[cfg(test)]
mod tests {
  use std::{collections::HashSet, mem, ptr};

  use super::*;
  use crate::grower::ArenaGrower;

  const WORD: usize = mem::size_of::<usize>();

  /// Arena that remembers every request it was given.
  struct Recording {
    arena: ArenaGrower,
    requests: Vec<usize>,
  }

  unsafe impl Grower for Recording {
    fn grow(
      &mut self,
      bytes: usize,
    ) -> Option<NonNull<u8>> {
      self.requests.push(bytes);
      self.arena.grow(bytes)
    }
  }

  fn allocator(capacity: usize) -> Allocator<Recording> {
    Allocator::new(Recording {
      arena: ArenaGrower::with_capacity(capacity),
      requests: Vec::new(),
    })
  }

  fn requests(allocator: &Allocator<Recording>) -> &[usize] {
    &allocator.grower().requests
  }

  fn assert_ledger_consistent<G: Grower>(allocator: &Allocator<G>) {
    let mut seen = HashSet::new();

    for block in allocator.blocks() {
      assert!(seen.insert(block.header), "block {:?} reachable twice", block.header);
      assert_eq!(block.payload.as_ptr() as usize - block.header.as_ptr() as usize, HEADER_SIZE);
      assert_eq!(block.payload.as_ptr() as usize % WORD, 0);
      assert_eq!(block.payload_size % WORD, 0);
    }
  }

  fn overlaps(
    a: (usize, usize),
    b: (usize, usize),
  ) -> bool {
    a.0 < b.0 + b.1 && b.0 < a.0 + a.1
  }

  #[test]
  fn test_acquire_then_use() {
    let mut allocator = allocator(64 * 1024);

    for size in 0..=100usize {
      let span = allocator.acquire(size as isize).unwrap();

      unsafe {
        for i in 0..size {
          span.as_ptr().add(i).write(i as u8);
        }
        for i in 0..size {
          assert_eq!(*span.as_ptr().add(i), i as u8);
        }
      }
    }

    assert_ledger_consistent(&allocator);
  }

  #[test]
  fn test_no_aliasing_between_live_spans() {
    let mut allocator = allocator(64 * 1024);
    let mut spans: Vec<(usize, usize)> = Vec::new();

    for size in [1, 7, 8, 24, 0, 100, 3, 64] {
      let span = allocator.acquire(size).unwrap();
      let range = (span.as_ptr() as usize, size as usize);

      for other in &spans {
        assert!(!overlaps(range, *other), "{range:?} overlaps {other:?}");
      }
      spans.push(range);
    }
  }

  #[test]
  fn test_no_aliasing_after_split() {
    let mut allocator = allocator(4096);

    let big = allocator.acquire(256).unwrap();
    unsafe { allocator.release(big.as_ptr()) };

    let first = allocator.acquire(32).unwrap();
    let second = allocator.acquire(32).unwrap();

    unsafe {
      ptr::write_bytes(first.as_ptr(), 0x11, 32);
      ptr::write_bytes(second.as_ptr(), 0x22, 32);

      assert!(!overlaps((first.as_ptr() as usize, 32), (second.as_ptr() as usize, 32)));
      assert_eq!(*first.as_ptr().add(31), 0x11);
      assert_eq!(*second.as_ptr(), 0x22);
    }

    assert_eq!(requests(&allocator).len(), 1);
    assert_ledger_consistent(&allocator);
  }

  #[test]
  fn test_reuse_after_release() {
    let mut allocator = allocator(4096);

    let first = allocator.acquire(16).unwrap();
    unsafe { allocator.release(first.as_ptr()) };
    let second = allocator.acquire(8).unwrap();

    assert_eq!(first, second);
    assert_eq!(requests(&allocator).len(), 1);
  }

  #[test]
  fn test_exact_fit_is_reused() {
    let mut allocator = allocator(4096);

    let first = allocator.acquire(48).unwrap();
    unsafe { allocator.release(first.as_ptr()) };
    let second = allocator.acquire(48).unwrap();

    assert_eq!(first, second);
    assert_eq!(requests(&allocator), &[48 + HEADER_SIZE]);
  }

  #[test]
  fn test_split_leaves_free_remainder() {
    let mut allocator = allocator(4096);

    let big = allocator.acquire(96).unwrap();
    unsafe { allocator.release(big.as_ptr()) };

    assert!(96 >= 40 + HEADER_SIZE + 1);
    let small = allocator.acquire(40).unwrap();
    assert_eq!(small, big);

    let blocks: Vec<BlockInfo> = allocator.blocks().collect();
    assert_eq!(blocks.len(), 2);

    assert_eq!(blocks[0].payload, small);
    assert_eq!(blocks[0].payload_size, 40);
    assert!(!blocks[0].free);

    assert_eq!(blocks[1].header.as_ptr(), unsafe { small.as_ptr().add(40) });
    assert_eq!(blocks[1].payload_size, 96 - 40 - HEADER_SIZE);
    assert!(blocks[1].free);

    assert_eq!(requests(&allocator).len(), 1);
  }

  #[test]
  fn test_no_split_below_margin() {
    let mut allocator = allocator(4096);

    let block = allocator.acquire(40).unwrap();
    unsafe { allocator.release(block.as_ptr()) };

    assert!(40 < 39 + HEADER_SIZE + 1);
    let again = allocator.acquire(39).unwrap();

    assert_eq!(again, block);
    let blocks: Vec<BlockInfo> = allocator.blocks().collect();
    assert_eq!(blocks.len(), 1);
    assert_eq!(blocks[0].payload_size, 40);
    assert!(!blocks[0].free);
  }

  #[test]
  fn test_growth_on_exhaustion() {
    let mut allocator = allocator(4096);

    allocator.acquire(32).unwrap();
    assert_eq!(requests(&allocator), &[32 + HEADER_SIZE]);

    let small = allocator.acquire(16).unwrap();
    unsafe { allocator.release(small.as_ptr()) };

    allocator.acquire(64).unwrap();
    assert_eq!(
      requests(&allocator),
      &[32 + HEADER_SIZE, 16 + HEADER_SIZE, 64 + HEADER_SIZE]
    );
  }

  #[test]
  fn test_growth_request_is_word_rounded() {
    let mut allocator = allocator(4096);

    allocator.acquire(1).unwrap();
    allocator.acquire(WORD as isize + 1).unwrap();

    assert_eq!(requests(&allocator), &[WORD + HEADER_SIZE, 2 * WORD + HEADER_SIZE]);
  }

  #[test]
  fn test_growth_appends_to_tail() {
    let mut allocator = allocator(4096);

    let first = allocator.acquire(8).unwrap();
    let second = allocator.acquire(16).unwrap();
    let third = allocator.acquire(24).unwrap();

    let payloads: Vec<NonNull<u8>> = allocator.blocks().map(|block| block.payload).collect();
    assert_eq!(payloads, vec![first, second, third]);
  }

  #[test]
  fn test_negative_size_rejected() {
    let mut allocator = allocator(4096);

    assert_eq!(
      allocator.acquire(-1),
      Err(AllocError::InvalidRequest { size: -1 })
    );
    assert_eq!(
      allocator.acquire(isize::MIN),
      Err(AllocError::InvalidRequest { size: isize::MIN })
    );

    assert!(requests(&allocator).is_empty());
    assert_eq!(allocator.blocks().count(), 0);
  }

  #[test]
  fn test_out_of_memory_leaves_ledger_untouched() {
    let mut allocator = allocator(128);

    allocator.acquire(16).unwrap();
    let before = allocator.stats();

    assert_eq!(
      allocator.acquire(128),
      Err(AllocError::OutOfMemory {
        requested: 128 + HEADER_SIZE
      })
    );
    assert_eq!(allocator.stats(), before);
    assert_ledger_consistent(&allocator);
  }

  #[test]
  fn test_null_release_is_noop() {
    let mut allocator = allocator(4096);

    let span = allocator.acquire(32).unwrap();
    let before: Vec<BlockInfo> = allocator.blocks().collect();

    unsafe { allocator.release(ptr::null_mut()) };

    assert_eq!(allocator.blocks().collect::<Vec<_>>(), before);
    assert_eq!(before[0].payload, span);
  }

  #[test]
  fn test_release_is_lifo() {
    let mut allocator = allocator(4096);

    let a = allocator.acquire(32).unwrap();
    let b = allocator.acquire(32).unwrap();
    let c = allocator.acquire(32).unwrap();

    unsafe {
      allocator.release(a.as_ptr());
      allocator.release(c.as_ptr());
    }

    let head: Vec<NonNull<u8>> = allocator.blocks().map(|block| block.payload).collect();
    assert_eq!(head, vec![c, a, b]);

    assert_eq!(allocator.acquire(32).unwrap(), c);
    assert_eq!(allocator.acquire(32).unwrap(), a);
    assert_eq!(requests(&allocator).len(), 3);
    assert_ledger_consistent(&allocator);
  }

  #[test]
  fn test_foreign_release_is_ignored() {
    let mut allocator = allocator(4096);
    allocator.acquire(32).unwrap();
    let before = allocator.stats();

    let mut foreign = [0usize; 16];
    unsafe {
      allocator.release(foreign.as_mut_ptr().cast::<u8>().add(HEADER_SIZE));
    }

    assert_eq!(allocator.stats(), before);
    assert!(foreign.iter().all(|&word| word == 0));
  }

  #[test]
  fn test_repeated_release_keeps_chain_acyclic() {
    let mut allocator = allocator(4096);

    let a = allocator.acquire(32).unwrap();
    allocator.acquire(32).unwrap();

    unsafe {
      allocator.release(a.as_ptr());
      allocator.release(a.as_ptr());
    }

    assert_eq!(allocator.blocks().count(), 2);
    assert_ledger_consistent(&allocator);
  }

  #[test]
  fn test_zero_sized_spans() {
    let mut allocator = allocator(4096);

    let first = allocator.acquire(0).unwrap();
    let second = allocator.acquire(0).unwrap();

    assert_ne!(first, second);
    assert_eq!(requests(&allocator), &[HEADER_SIZE, HEADER_SIZE]);
  }

  #[test]
  fn test_stats_track_lent_and_free_bytes() {
    let mut allocator = allocator(4096);

    let big = allocator.acquire(128).unwrap();
    allocator.acquire(16).unwrap();
    unsafe { allocator.release(big.as_ptr()) };
    allocator.acquire(32).unwrap();

    assert_eq!(
      allocator.stats(),
      LedgerStats {
        blocks: 3,
        free_blocks: 1,
        free_bytes: 128 - 32 - HEADER_SIZE,
        used_bytes: 32 + 16,
      }
    );
  }

  #[test]
  fn test_blocks_stay_valid_while_grower_is_observed() {
    let mut allocator = allocator(4096);

    let span = allocator.acquire(64).unwrap();
    unsafe { allocator.release(span.as_ptr()) };

    let used = allocator.grower().arena.used();
    let header = allocator.blocks().next().unwrap().header;

    allocator.acquire(128).unwrap();

    assert_eq!(allocator.grower().arena.used(), used + 128 + HEADER_SIZE);
    assert_eq!(allocator.blocks().next().unwrap().header, header);
    assert_eq!(allocator.blocks().count(), 2);
    assert_ledger_consistent(&allocator);
  }

  #[cfg(unix)]
  #[test]
  fn test_sbrk_allocator_reuses_released_span() {
    let mut allocator = Allocator::with_sbrk();

    let first = allocator.acquire(32).unwrap();
    unsafe {
      ptr::write_bytes(first.as_ptr(), 0x5A, 32);
      assert_eq!(*first.as_ptr().add(31), 0x5A);

      allocator.release(first.as_ptr());
    }

    let second = allocator.acquire(32).unwrap();

    assert_eq!(first, second);
    assert_eq!(allocator.blocks().count(), 1);
    assert_ledger_consistent(&allocator);
  }

  #[test]
  fn test_end_to_end() {
    let mut allocator = allocator(4096);

    unsafe {
      let first = allocator.acquire(4).unwrap().cast::<u32>();
      first.as_ptr().write(0xDEADBEEF);
      assert_eq!(first.as_ptr().read(), 0xDEADBEEF);

      allocator.release(first.as_ptr().cast());

      let second = allocator.acquire(4).unwrap().cast::<u32>();
      assert_eq!(first, second);
    }
  }

  #[test]
  fn test_mixed_workload_stays_consistent() {
    let mut allocator = allocator(256 * 1024);
    let mut live: Vec<(NonNull<u8>, usize, u8)> = Vec::new();

    for round in 0..200usize {
      let size = (round * 37) % 300;
      let tag = round as u8;
      let span = allocator.acquire(size as isize).unwrap();
      unsafe { ptr::write_bytes(span.as_ptr(), tag, size) };
      live.push((span, size, tag));

      if round % 3 == 0 {
        let (span, _, _) = live.remove(round % live.len());
        unsafe { allocator.release(span.as_ptr()) };
      }
    }

    for (span, size, tag) in &live {
      for i in 0..*size {
        assert_eq!(unsafe { *span.as_ptr().add(i) }, *tag);
      }
    }
    assert_ledger_consistent(&allocator);
  }
}
