//! # fitalloc - A First-Fit Memory Allocator Library
//!
//! This crate provides a **first-fit free-list allocator** that manages raw
//! memory obtained from a pluggable [`Grower`], by default the `sbrk` system
//! call, without relying on `malloc`/`free`.
//!
//! ## Overview
//!
//! Every span handed out is a *block*: a fixed-size header owned by the
//! allocator, followed by the payload the caller may use.
//!
//! ```text
//!   Single Block:
//!   ┌───────────────────────┬────────────────────────────────┐
//!   │    Block Header       │         Payload                │
//!   │  ┌─────────────────┐  │                                │
//!   │  │ payload_size: N │  │  ┌──────────────────────────┐  │
//!   │  │ free: false     │  │  │                          │  │
//!   │  │ next: ptr/None  │  │  │     N bytes usable       │  │
//!   │  └─────────────────┘  │  │                          │  │
//!   │     HEADER_SIZE       │  └──────────────────────────┘  │
//!   └───────────────────────┴────────────────────────────────┘
//!                           ▲
//!                           └── Pointer returned to user
//! ```
//!
//! All blocks ever created are chained in one ledger. Released blocks move to
//! the head of the chain, so the most recently freed memory is tried first:
//!
//! ```text
//!   Ledger:
//!
//!   head ──▶ ┌──────────┐    ┌──────────┐    ┌──────────┐
//!            │ free 64  │──▶ │ used 16  │──▶ │ used 128 │──▶ None
//!            └──────────┘    └──────────┘    └──────────┘
//! ```
//!
//! ## Crate Structure
//!
//! ```text
//!   fitalloc
//!   ├── align      - Word alignment macro (align!)
//!   ├── allocator  - Allocator: acquire / release
//!   ├── block      - Block header and payload offsets (internal)
//!   ├── error      - AllocError
//!   ├── grower     - Grower trait, SbrkGrower, ArenaGrower
//!   └── ledger     - The block chain (internal)
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use fitalloc::{Allocator, ArenaGrower};
//!
//! let mut allocator = Allocator::new(ArenaGrower::with_capacity(4096));
//!
//! let span = allocator.acquire(8).unwrap().cast::<u64>();
//! unsafe {
//!     span.as_ptr().write(42);
//!     assert_eq!(span.as_ptr().read(), 42);
//!
//!     allocator.release(span.as_ptr().cast());
//! }
//!
//! // The block just released is the first one tried.
//! assert_eq!(allocator.acquire(8).unwrap(), span.cast::<u8>());
//! ```
//!
//! ## How It Works
//!
//! `acquire(size)` rounds `size` up to the machine word and walks the ledger:
//!
//! - The first free block with at least `size` payload bytes is taken.
//! - If that block could also hold another header plus one byte past `size`,
//!   it is split and the remainder is linked after it as a new free block.
//! - If no block fits, the grower is asked for `size + HEADER_SIZE` bytes and
//!   the new block is appended to the tail of the ledger.
//!
//! `release(ptr)` steps back one header from `ptr`, marks the block free and
//! moves it to the head of the ledger.
//!
//! ## Limitations
//!
//! - **Single-threaded only**: `Allocator` is neither `Send` nor `Sync`
//! - **No coalescing**: neighbouring free blocks are never merged
//! - **Word alignment only**: larger alignments are not honoured
//! - **Memory is never returned**: the ledger only grows
//!
//! ## Safety
//!
//! Releasing a span twice or a pointer the allocator never produced is a
//! caller bug, which is why [`Allocator::release`] is `unsafe`.

pub mod align;
mod allocator;
mod block;
mod error;
mod grower;
mod ledger;

pub use allocator::{Allocator, BlockInfo, LedgerStats};
pub use block::HEADER_SIZE;
pub use error::AllocError;
#[cfg(unix)]
pub use grower::SbrkGrower;
pub use grower::{ArenaGrower, Grower};
