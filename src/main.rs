/*
 * TERN Kernel Main Entry Point
 *
 * TERN is a small teaching kernel built around one subsystem worth
 * studying closely: a preemptive priority scheduler with nested
 * priority donation. Everything else in the image - boot, interrupts,
 * memory, logging - exists to give that scheduler a real machine to
 * run on and a test suite to prove itself against.
 *
 * Boot is deliberately minimal. `_start` does exactly one interesting
 * thing: it parks the boot stack at the top of a page-aligned,
 * page-sized static. That page later becomes the initial thread's
 * control block - the scheduler adopts the running code as its first
 * thread by rounding the stack pointer down to the page base, the same
 * layout every spawned thread gets.
 *
 * Initialization order matters and is spelled out in kmain: serial
 * console first (so everything can log), then GDT/IDT, then memory,
 * then the threading system, and only then the timer - once a tick can
 * fire, the scheduler must already be coherent.
 */

#![no_std]
#![no_main]
#![feature(abi_x86_interrupt)]
#![feature(alloc_error_handler)]
#![allow(dead_code)]

extern crate alloc;
extern crate rlibc;

use core::panic::PanicInfo;

mod arch;
mod collections;
mod drivers;
mod memory;
mod scheduler;
mod tests;
mod utils;

use arch::x86_64::interrupts;

/// The boot stack and, once the scheduler adopts it, the initial
/// thread's page: TCB at the base, stack growing down from the top.
#[repr(C, align(4096))]
pub struct BootThreadPage([u8; memory::PAGE_SIZE]);

#[unsafe(no_mangle)]
pub static mut BOOT_THREAD_PAGE: BootThreadPage = BootThreadPage([0; memory::PAGE_SIZE]);

/// Entry point. Moves onto the boot thread page and enters Rust.
#[unsafe(naked)]
#[unsafe(no_mangle)]
pub unsafe extern "C" fn _start() -> ! {
    core::arch::naked_asm!(
        // Stack pointer to the top of the boot thread page; the page
        // base stays reserved for the initial thread's control block.
        "lea rax, [rip + BOOT_THREAD_PAGE]",
        "add rax, {page_size}",
        "mov rsp, rax",
        "jmp kmain",
        page_size = const memory::PAGE_SIZE,
    );
}

/// Rust kernel entry point, running on the boot thread page.
#[unsafe(no_mangle)]
pub extern "C" fn kmain() -> ! {
    // Step 1: console and logging, so every later step can report.
    drivers::serial::init();
    utils::logger::init();
    log::info!("TERN kernel starting...");

    // Step 2: CPU tables. The IDT must be in place before anything can
    // fault or interrupt.
    arch::x86_64::gdt::init();
    arch::x86_64::idt::init();

    // Step 3: memory management (heap; the page arena is static).
    memory::init();

    // Step 4: threading. Adopts this very execution as the initial
    // thread; interrupts are still off.
    scheduler::init();

    // Step 5: the preemption clock, then scheduling. start() enables
    // interrupts, so from here on this thread can be preempted.
    arch::x86_64::pit::init(utils::timer::TIMER_FREQ);
    scheduler::start();

    // Exercise the threading core.
    tests::run_all();

    scheduler::print_stats();
    log::info!("Boot thread done; halting");
    loop {
        x86_64::instructions::hlt();
    }
}

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    interrupts::disable();
    // The console lock may be held by whoever panicked; break it so
    // the diagnostic gets out.
    unsafe { drivers::serial::COM1.force_unlock() };
    serial_println!("KERNEL PANIC: {}", info);
    loop {
        x86_64::instructions::hlt();
    }
}
