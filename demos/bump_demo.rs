use std::io::Read;

use heapcraft::HeapAllocator;
use libc::sbrk;

/// Waits until the user presses ENTER.
/// Useful when you want to inspect memory state with tools like `pmap`, `htop`,
/// `gdb`, or just visually track how allocations change the program break.
fn block_until_enter_pressed() {
  println!("\n>>> Press ENTER to continue...");
  let _ = std::io::stdin().bytes().next();
}

/// Prints the current program break using `sbrk(0)`.
/// The program break is the upper boundary of the heap managed via brk/sbrk.
unsafe fn print_program_break(label: &str) {
  println!(
    "[{}] PID = {}, program break (sbrk(0)) = {:?}",
    label,
    std::process::id(),
    unsafe { sbrk(0) },
  );
}

fn main() {
  let heap = HeapAllocator::new();

  unsafe {
    // Initial heap state
    print_program_break("start");
    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 1) Allocate 4 bytes. First allocation ever: preallocates a full
    //    MMAP_THRESHOLD arena and splits off the remainder as a free tail.
    // --------------------------------------------------------------------
    let first_block = heap.allocate(4).expect("allocate(4) should succeed");
    println!("\n[1] Allocate 4 bytes (first-use arena preallocation)");
    print_program_break("after first alloc");

    let first_ptr = first_block.as_ptr() as *mut u32;
    first_ptr.write(0xDEADBEEF);
    println!("[1] Value written to first_block = 0x{:X}", first_ptr.read());

    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 2) Allocate 12 bytes. Reuses the arena's free tail; no new syscall.
    // --------------------------------------------------------------------
    let second_block = heap.allocate(12).expect("allocate(12) should succeed");
    println!("\n[2] Allocate 12 bytes (reuses the free tail, no syscall)");

    std::ptr::write_bytes(second_block.as_ptr(), 0xAB, 12);
    println!("[2] Initialized second block with 0xAB");

    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 3) Allocate 8 bytes and observe 8-byte alignment.
    // --------------------------------------------------------------------
    let third_block = heap.allocate(8).expect("allocate(8) should succeed");
    println!("\n[3] Allocate 8 bytes (observe alignment)");

    let third_ptr = third_block.as_ptr() as *mut u64;
    third_ptr.write(0x1122334455667788);
    println!(
      "[3] Address = {:#x}, addr % 8 = {}",
      third_block.as_ptr() as usize,
      third_block.as_ptr() as usize % 8,
    );

    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 4) Free the first block, then allocate something smaller: best-fit
    //    should hand back the very same pointer.
    // --------------------------------------------------------------------
    heap.free(Some(first_block));
    println!("\n[4] Freed first_block at {:?}", first_block.as_ptr());

    let reused = heap.allocate(2).expect("allocate(2) should reuse the freed block");
    println!(
      "[4] reused == first_block? {}",
      if reused == first_block {
        "yes, best-fit reused the freed block"
      } else {
        "no, allocated elsewhere"
      }
    );

    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 5) Allocate a block at or above MMAP_THRESHOLD: bypasses the arena
    //    entirely and goes straight to mmap, so the break does not move.
    // --------------------------------------------------------------------
    print_program_break("before large alloc");
    let big_block = heap
      .allocate(heapcraft::MMAP_THRESHOLD + 1)
      .expect("large allocate should succeed via mmap");
    println!("\n[5] Allocate a block just over MMAP_THRESHOLD");
    print_program_break("after large alloc (unchanged: mmap, not sbrk)");

    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 6) zeroed_allocate and resize, then free everything.
    // --------------------------------------------------------------------
    let zeroed = heap
      .zeroed_allocate(10, 16)
      .expect("zeroed_allocate(10, 16) should succeed");
    let bytes = std::slice::from_raw_parts(zeroed.as_ptr(), 160);
    println!(
      "\n[6] zeroed_allocate(10, 16): all zero? {}",
      bytes.iter().all(|&b| b == 0)
    );

    let grown = heap.resize(Some(zeroed), 256).expect("resize growth should succeed");
    println!("[6] resize(zeroed, 256) -> {:?}", grown.as_ptr());

    heap.free(Some(second_block));
    heap.free(Some(third_block));
    heap.free(Some(reused));
    heap.free(Some(big_block));
    heap.free(Some(grown));

    println!("\n[7] End of demo. All blocks freed.");
  }
}
