use std::{io::Read, ptr::NonNull};

use anyhow::Result;
use fitalloc::{Allocator, HEADER_SIZE, SbrkGrower};
use log::info;

/// Waits until the user presses ENTER.
/// Useful when you want to inspect memory state with tools like `pmap`, `htop`,
/// `gdb`, or just visually track how allocations change the program break.
fn block_until_enter_pressed() {
  println!("\n>>> Press ENTER to continue...");
  let _ = std::io::stdin().bytes().next();
}

/// Prints the current program break.
fn print_program_break(label: &str) {
  println!(
    "[{}] PID = {}, program break (sbrk(0)) = {:?}",
    label,
    std::process::id(),
    SbrkGrower::program_break(),
  );
}

fn print_acquire(
  size: isize,
  span: NonNull<u8>,
) {
  println!(
    "Acquired {} bytes, payload = {:?}, header = {} bytes before, program break = {:?}",
    size,
    span,
    HEADER_SIZE,
    SbrkGrower::program_break()
  );
}

fn print_ledger(allocator: &Allocator<SbrkGrower>) {
  println!("Ledger, head first:");
  for block in allocator.blocks() {
    println!(
      "  {:?}  {:>6} bytes  {}",
      block.payload,
      block.payload_size,
      if block.free { "free" } else { "used" }
    );
  }
  println!("{:?}", allocator.stats());
}

fn main() -> Result<()> {
  pretty_env_logger::init();

  let mut allocator = Allocator::with_sbrk();

  print_program_break("start");
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 1) Acquire 4 bytes and store a u32 in them.
  // --------------------------------------------------------------------
  let first = allocator.acquire(4)?;
  println!("\n[1] Acquire 4 bytes");
  print_acquire(4, first);

  let first_ptr = first.cast::<u32>().as_ptr();
  unsafe {
    first_ptr.write(0xDEADBEEF);
    println!("[1] Value written = 0x{:X}", first_ptr.read());
  }

  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 2) Acquire 12 bytes. The request is rounded up to the machine word.
  // --------------------------------------------------------------------
  let second = allocator.acquire(12)?;
  println!("\n[2] Acquire 12 bytes");
  print_acquire(12, second);
  unsafe { second.as_ptr().write_bytes(0xAB, 12) };
  print_ledger(&allocator);

  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 3) Release the first span and acquire 4 bytes again: the block just
  //    released sits at the head of the ledger and is reused.
  // --------------------------------------------------------------------
  unsafe { allocator.release(first.as_ptr()) };
  println!("\n[3] Released {:?}", first);

  let reused = allocator.acquire(4)?;
  print_acquire(4, reused);
  println!(
    "[3] reused == first? {}",
    if reused == first {
      "Yes, it reused the released block"
    } else {
      "No, it grew somewhere else"
    }
  );

  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 4) Acquire and release a 1 KiB span, then carve a 64 byte span out of
  //    it. The remainder stays in the ledger as a free block.
  // --------------------------------------------------------------------
  let big = allocator.acquire(1024)?;
  unsafe { allocator.release(big.as_ptr()) };

  let carved = allocator.acquire(64)?;
  println!("\n[4] Acquire 64 bytes out of a released 1 KiB block");
  print_acquire(64, carved);
  print_ledger(&allocator);

  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 5) A negative size is rejected before anything is touched.
  // --------------------------------------------------------------------
  match allocator.acquire(-1) {
    Ok(span) => println!("\n[5] Unexpectedly acquired {:?}", span),
    Err(err) => println!("\n[5] acquire(-1) failed: {err}"),
  }

  // --------------------------------------------------------------------
  // 6) Acquire a large span to observe the program break moving.
  // --------------------------------------------------------------------
  print_program_break("before large acquire");

  let large = allocator.acquire(64 * 1024)?;
  println!("\n[6] Acquire large 64 KiB span");
  print_acquire(64 * 1024, large);

  print_program_break("after large acquire");
  info!("{:?}", allocator.stats());

  // --------------------------------------------------------------------
  // 7) End of demo. Memory is never handed back to the OS; it is reclaimed
  //    when the process exits.
  // --------------------------------------------------------------------
  println!("\n[7] End of example. Process will exit and the OS will reclaim all memory.");

  Ok(())
}
