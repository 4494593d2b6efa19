/*
 * Multilevel Feedback Queue Hooks
 *
 * Compiled in under the `mlfqs` cargo feature. This module carries the
 * state and accessor surface the multilevel feedback queue policy
 * needs - per-thread niceness and recent-CPU, a system load average -
 * without the policy computation itself; in this mode priority
 * donation is bypassed (the policy owns priorities) and the base
 * scheduler keeps running on the stored priority values.
 */

use core::sync::atomic::{AtomicI64, Ordering};

use crate::arch::x86_64::interrupts::InterruptGuard;

use super::current_ptr;

/// System load average, fixed-point, maintained by the policy.
static LOAD_AVG: AtomicI64 = AtomicI64::new(0);

/// Sets the running thread's nice value, in [-20, 20].
pub fn set_nice(nice: i32) {
    assert!((-20..=20).contains(&nice), "nice {} out of range", nice);
    let _guard = InterruptGuard::new();
    unsafe { (*current_ptr().as_ptr()).nice = nice };
}

/// The running thread's nice value.
pub fn get_nice() -> i32 {
    let _guard = InterruptGuard::new();
    unsafe { (*current_ptr().as_ptr()).nice }
}

/// 100 times the running thread's recent-CPU estimate.
pub fn get_recent_cpu() -> i64 {
    let _guard = InterruptGuard::new();
    unsafe { (*current_ptr().as_ptr()).recent_cpu * 100 }
}

/// 100 times the system load average.
pub fn get_load_avg() -> i64 {
    LOAD_AVG.load(Ordering::Relaxed) * 100
}
