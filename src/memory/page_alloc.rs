/*
 * Page Allocator
 *
 * Hands out 4 KiB pages from a static, page-aligned arena. Every
 * thread's control block and kernel stack share one page from here;
 * the scheduler requests a zeroed page per spawn and returns it when
 * the thread is destroyed.
 *
 * The allocator is a free list threaded through the free pages
 * themselves: a free page's first word points at the next free page.
 * Pages never handed out yet are carved off the high-water mark, so
 * there is no setup cost at boot.
 *
 * Locking: a spin mutex guards the pool, and every entry point also
 * masks interrupts for its critical section. The mask is required, not
 * belt-and-suspenders: schedule() frees dying threads' pages with
 * interrupts already disabled, and a spin lock held by preempted
 * thread-context code would deadlock against that path on a single
 * CPU.
 */

use core::ptr::NonNull;

use bitflags::bitflags;
use spin::Mutex;

use crate::arch::x86_64::interrupts;

/// Size of one allocation unit.
pub const PAGE_SIZE: usize = 4096;

/// Number of pages in the arena. Bounds the number of live threads.
pub const PAGE_COUNT: usize = 128;

bitflags! {
    /// Page allocation options.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct AllocFlags: u32 {
        /// Zero the page before returning it.
        const ZERO = 1;
    }
}

#[repr(C, align(4096))]
struct Arena([u8; PAGE_COUNT * PAGE_SIZE]);

static mut ARENA: Arena = Arena([0; PAGE_COUNT * PAGE_SIZE]);

struct Pool {
    /// Head of the free list (first word of each free page is the next
    /// link), or null.
    free_head: *mut usize,
    /// Index of the first page never yet handed out.
    high_water: usize,
    /// Live allocations, for diagnostics.
    in_use: usize,
}

unsafe impl Send for Pool {}

static POOL: Mutex<Pool> = Mutex::new(Pool {
    free_head: core::ptr::null_mut(),
    high_water: 0,
    in_use: 0,
});

fn arena_base() -> *mut u8 {
    &raw mut ARENA as *mut u8
}

/// Allocates one page. Returns None when the arena is exhausted; the
/// caller decides whether that is fatal.
pub fn alloc(flags: AllocFlags) -> Option<NonNull<u8>> {
    let page = interrupts::without_interrupts(|| {
        let mut pool = POOL.lock();
        let page = if !pool.free_head.is_null() {
            let page = pool.free_head as *mut u8;
            pool.free_head = unsafe { *pool.free_head } as *mut usize;
            page
        } else if pool.high_water < PAGE_COUNT {
            let page = unsafe { arena_base().add(pool.high_water * PAGE_SIZE) };
            pool.high_water += 1;
            page
        } else {
            return None;
        };
        pool.in_use += 1;
        Some(page)
    })?;

    if flags.contains(AllocFlags::ZERO) {
        unsafe { core::ptr::write_bytes(page, 0, PAGE_SIZE) };
    }
    NonNull::new(page)
}

/// Returns a page to the pool.
///
/// # Safety
/// `page` must have come from [`alloc`] and must not be used again.
pub unsafe fn free(page: NonNull<u8>) {
    let addr = page.as_ptr() as usize;
    let base = arena_base() as usize;
    assert_eq!(addr % PAGE_SIZE, 0, "freeing unaligned page {:#x}", addr);
    assert!(
        addr >= base && addr < base + PAGE_COUNT * PAGE_SIZE,
        "freeing page {:#x} outside the arena",
        addr
    );

    interrupts::without_interrupts(|| {
        let mut pool = POOL.lock();
        let link = page.as_ptr() as *mut usize;
        unsafe { *link = pool.free_head as usize };
        pool.free_head = link;
        pool.in_use -= 1;
    });
}

/// Pages currently allocated.
pub fn pages_in_use() -> usize {
    interrupts::without_interrupts(|| POOL.lock().in_use)
}
