/*
 * Kernel Heap Allocator
 *
 * Dynamic memory for the kernel, built on the linked_list_allocator
 * crate. The heap lives in a static region inside the kernel image;
 * with no virtual memory layer there is nothing to map, the allocator
 * is simply initialized over the region at boot.
 *
 * Allocation failures panic (alloc_error_handler): kernel OOM is fatal
 * by policy, matching the rest of the error-handling design.
 */

use linked_list_allocator::LockedHeap;

/// Size of the kernel heap in bytes.
pub const HEAP_SIZE: usize = 256 * 1024;

#[repr(C, align(4096))]
struct HeapRegion([u8; HEAP_SIZE]);

static mut HEAP_REGION: HeapRegion = HeapRegion([0; HEAP_SIZE]);

/// Global allocator instance used by Rust's allocation APIs.
#[global_allocator]
static ALLOCATOR: LockedHeap = LockedHeap::empty();

/// Initialize the kernel heap over its static region.
///
/// Must be called exactly once, before the first allocation.
pub fn init() {
    let start = &raw mut HEAP_REGION as *mut u8;
    log::info!(
        "Heap range: {:p} - {:p} ({} KiB)",
        start,
        start.wrapping_add(HEAP_SIZE),
        HEAP_SIZE / 1024
    );
    unsafe {
        ALLOCATOR.lock().init(start, HEAP_SIZE);
    }
}

#[alloc_error_handler]
fn alloc_error(layout: core::alloc::Layout) -> ! {
    panic!("kernel heap allocation failed: {:?}", layout);
}
