/*
 * System Timer
 *
 * Owns the monotonic tick counter and the per-tick entry point called
 * from the IRQ0 handler. One tick is one PIT period: with the PIT at
 * 100 Hz, 10 ms.
 *
 * The counter is the time base for everything in the kernel: sleep
 * deadlines are absolute tick values against this counter, and the
 * scheduler's quantum accounting is denominated in ticks.
 */

use core::sync::atomic::{AtomicI64, Ordering};

use crate::scheduler;

/// Timer interrupts (and thus ticks) per second.
pub const TIMER_FREQ: u32 = 100;

/// Ticks elapsed since the timer started.
static TICKS: AtomicI64 = AtomicI64::new(0);

/// Current value of the monotonic tick counter.
pub fn ticks() -> i64 {
    TICKS.load(Ordering::Relaxed)
}

/// Ticks elapsed since `then`, which should be a previous `ticks()`
/// result.
pub fn elapsed(then: i64) -> i64 {
    ticks() - then
}

/// Timer interrupt entry point. Called exactly once per tick, in
/// interrupt context, by the IRQ0 handler.
pub fn on_tick() {
    TICKS.fetch_add(1, Ordering::Relaxed);
    scheduler::tick(ticks());
}

/// Suspends the current thread for approximately `duration` ticks.
///
/// The wakeup is deadline-based, not busy-waiting: the thread leaves
/// the ready queue entirely and the tick handler unblocks it once the
/// deadline passes.
pub fn sleep(duration: i64) {
    if duration <= 0 {
        return;
    }
    let start = ticks();
    scheduler::sleep_until(start + duration);
}
