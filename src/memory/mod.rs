/*
 * Memory Management
 *
 * Two allocators, two customers:
 *
 * - heap: a general-purpose kernel heap behind Rust's allocation APIs,
 *   used by test fixtures and anything that wants a Box.
 * - page_alloc: page-granular allocation from a static arena, used for
 *   thread control block pages. Thread pages never come from the heap;
 *   the TCB-at-page-base layout (and the stack-overflow sentinel that
 *   depends on it) requires page alignment.
 *
 * TERN runs identity-mapped with paging left as the bootloader set it
 * up; there is no virtual memory layer. The `activate` hook below is
 * the seam where an address-space layer would plug in.
 */

pub mod heap;
pub mod page_alloc;

pub use page_alloc::{AllocFlags, PAGE_SIZE};

use crate::scheduler::thread::Thread;

/// Initialize memory management (the kernel heap; the page arena needs
/// no setup beyond its static).
pub fn init() {
    log::info!("Initializing memory management...");
    heap::init();
}

/// Address-space activation hook, called by the scheduler on every
/// context switch before the new thread resumes.
///
/// Kernel threads all share the boot address space, so this is a no-op;
/// a user-process layer would reload the page-table root here.
#[inline]
pub fn activate(_next: &Thread) {}

/// Rounds `addr` down to the base of its page.
pub fn page_round_down(addr: usize) -> usize {
    addr & !(PAGE_SIZE - 1)
}
