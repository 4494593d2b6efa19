/*
 * Timed Sleep
 *
 * Deadline-based sleep with no busy-waiting. A sleeping thread records
 * its absolute wakeup tick, enters the sleep list at its deadline
 * position, and blocks; the tick handler walks the list head and
 * unblocks every thread whose deadline has arrived.
 *
 * The sleep list is ordered by wakeup tick, soonest first, so the tick
 * handler's walk stops at the first thread still in the future - the
 * per-tick cost is proportional to the number of threads actually due,
 * not to the number asleep. Equal deadlines stay FIFO (ordered insert
 * puts new entries behind equal ones); threads waking together then
 * contend by priority once they reach the ready queue.
 */

use core::ptr::NonNull;

use crate::arch::x86_64::interrupts::{self, InterruptGuard};
use crate::collections::{ListElem, list};
use crate::list_entry;

use super::thread::{Priority, Thread, ThreadStatus};
use super::{block, current_ptr, sched, unblock};

/// Sleep-list comparator: earliest wakeup tick first.
unsafe fn wakeup_earlier(a: *const ListElem, b: *const ListElem, _aux: *const ()) -> bool {
    unsafe {
        let ta = list_entry!(a as *mut ListElem, Thread, elem);
        let tb = list_entry!(b as *mut ListElem, Thread, elem);
        (*ta).wakeup_tick < (*tb).wakeup_tick
    }
}

/// Blocks the current thread until the tick counter reaches `wakeup`.
///
/// A deadline at or before the current tick still takes the full path;
/// the very next tick releases the thread, so "sleep for zero ticks"
/// returns promptly without special cases.
///
/// The idle thread must never sleep: it has to be runnable whenever
/// the ready queue is empty.
pub fn sleep_until(wakeup: i64) {
    assert!(!interrupts::in_interrupt_context());

    let cur = current_ptr().as_ptr();
    let _guard = InterruptGuard::new();
    unsafe {
        let s = sched();
        assert!(
            Some(cur) != s.idle.map(NonNull::as_ptr),
            "the idle thread cannot sleep"
        );

        (*cur).wakeup_tick = wakeup;
        s.sleepers
            .insert_ordered(&raw mut (*cur).elem, wakeup_earlier, core::ptr::null());
    }
    block();
}

/// Wakes every sleeper whose deadline is at or before `now`. Called by
/// the tick handler in interrupt context.
///
/// Returns the highest priority among the woken threads, so the caller
/// can decide whether the running thread should be preempted on
/// interrupt return.
pub(super) fn wake_due(now: i64) -> Option<Priority> {
    let mut woken_max: Option<Priority> = None;

    loop {
        // Detach one due sleeper, ending the scheduler borrow before
        // unblock() re-enters.
        let due = unsafe {
            let s = sched();
            if s.sleepers.is_empty() {
                None
            } else {
                let t = list_entry!(s.sleepers.front(), Thread, elem);
                if (*t).wakeup_tick <= now {
                    debug_assert_eq!((*t).status, ThreadStatus::Blocked);
                    list::remove(&raw mut (*t).elem);
                    Some(NonNull::new_unchecked(t))
                } else {
                    // Sorted list: everything further out is later still.
                    None
                }
            }
        };

        let Some(t) = due else {
            return woken_max;
        };

        unsafe {
            unblock(t);
            let p = (*t.as_ptr()).priority;
            if woken_max.is_none_or(|m| p > m) {
                woken_max = Some(p);
            }
        }
    }
}
