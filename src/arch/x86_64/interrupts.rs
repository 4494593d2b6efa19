/*
 * Interrupt Management Module
 *
 * This module provides utilities for managing CPU interrupts: enabling
 * and disabling them, checking interrupt status, and the RAII guard
 * that implements the kernel's one and only synchronization discipline
 * for scheduler state.
 *
 * Why this is important:
 * - Every scheduler structure (ready queue, sleep list, waiter lists,
 *   donation lists, thread status words) is protected by disabling
 *   interrupts, not by locks. The InterruptGuard expresses the
 *   save-disable-restore pattern and nests correctly.
 * - The timer interrupt handler must not call into the scheduler's
 *   suspension points directly. It records a deferred yield request
 *   here, and the handler honors it on its way out.
 *
 * The interrupt-context marker lets the scheduler assert that `block`,
 * `yield_now`, and `exit` are never reached from inside a handler.
 */

use core::sync::atomic::{AtomicBool, Ordering};

use x86_64::instructions::interrupts;

/// True while the CPU is executing the external-interrupt path (the
/// timer handler). Single CPU, so one flag suffices.
static IN_INTERRUPT: AtomicBool = AtomicBool::new(false);

/// Set when the tick handler decides the current thread's quantum is up
/// or a higher-priority thread became ready; honored on handler exit.
static YIELD_ON_RETURN: AtomicBool = AtomicBool::new(false);

/// Enable interrupts globally.
///
/// Should only be called after the IDT has been properly initialized.
pub fn enable() {
    interrupts::enable();
}

/// Disable interrupts globally.
pub fn disable() {
    interrupts::disable();
}

/// Check if interrupts are currently enabled.
pub fn are_enabled() -> bool {
    interrupts::are_enabled()
}

/// Atomically enable interrupts and halt until the next one arrives.
///
/// The idle thread depends on this being a single atomic pair: an
/// interrupt delivered between "enable" and "halt" would otherwise be
/// absorbed while the CPU still goes to sleep, wasting up to a full
/// tick.
pub fn enable_and_hlt() {
    interrupts::enable_and_hlt();
}

/// Execute a closure with interrupts disabled, restoring the previous
/// interrupt level afterwards.
pub fn without_interrupts<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    interrupts::without_interrupts(f)
}

/// RAII guard that disables interrupts for its lifetime.
///
/// Interrupts are disabled when the guard is created and the *previous*
/// level is restored when it drops, so guards nest: taking a guard
/// inside an already-disabled section is a no-op on both ends. This is
/// the critical-section pattern every scheduler entry point uses.
pub struct InterruptGuard {
    were_enabled: bool,
}

impl InterruptGuard {
    pub fn new() -> Self {
        let were_enabled = are_enabled();
        if were_enabled {
            disable();
        }
        Self { were_enabled }
    }
}

impl Drop for InterruptGuard {
    fn drop(&mut self) {
        if self.were_enabled {
            enable();
        }
    }
}

/// True while executing inside an external interrupt handler.
///
/// Suspension points (`block`, `yield_now`, `exit`, `preempt_if_needed`)
/// assert this is false.
pub fn in_interrupt_context() -> bool {
    IN_INTERRUPT.load(Ordering::Relaxed)
}

/// Marks entry into the external-interrupt path. Called by the IRQ
/// handler before any kernel work.
pub fn enter_interrupt() {
    debug_assert!(!in_interrupt_context());
    IN_INTERRUPT.store(true, Ordering::Relaxed);
}

/// Marks exit from the external-interrupt path and returns whether a
/// deferred yield was requested during the handler. After this returns
/// the handler is an ordinary kernel path again and may call
/// `yield_now` on behalf of the interrupted thread.
pub fn leave_interrupt() -> bool {
    debug_assert!(in_interrupt_context());
    IN_INTERRUPT.store(false, Ordering::Relaxed);
    YIELD_ON_RETURN.swap(false, Ordering::Relaxed)
}

/// Requests that the interrupted thread yield once the current
/// interrupt handler returns. Only meaningful from interrupt context;
/// this is how the tick handler enforces preemption without calling a
/// suspension point itself.
pub fn yield_on_return() {
    debug_assert!(in_interrupt_context());
    YIELD_ON_RETURN.store(true, Ordering::Relaxed);
}
