/*
 * Condition Variable
 *
 * Lets a thread atomically release a lock and wait for a condition
 * that other threads signal under that same lock.
 *
 * Each waiter brings its own semaphore: the wait enqueues a record
 * holding a fresh zero-valued semaphore, releases the lock, and downs
 * that private semaphore; signal pops the record of the
 * highest-priority waiter and ups it. The record lives on the waiting
 * thread's stack for exactly the duration of the wait, so the
 * condition variable itself is nothing but a list head.
 *
 * Signal does not hand over the lock. The woken thread re-acquires it
 * through ordinary contention, which also means the condition it
 * waited for must be re-checked by the caller (the classic
 * while-not-condition-wait loop).
 */

use core::cell::UnsafeCell;
use core::ptr::NonNull;

use crate::arch::x86_64::interrupts::{self, InterruptGuard};
use crate::collections::{List, ListElem};
use crate::list_entry;
use crate::scheduler::current_ptr;
use crate::scheduler::thread::Thread;

use super::{Lock, Semaphore};

/// Per-wait record: one private semaphore, one back-reference to the
/// waiting thread so the list can be ordered by its current priority.
struct Waiter {
    elem: ListElem,
    semaphore: Semaphore,
    thread: NonNull<Thread>,
}

/// Orders waiter records by their threads' effective priority, highest
/// first.
unsafe fn waiter_priority_greater(
    a: *const ListElem,
    b: *const ListElem,
    _aux: *const (),
) -> bool {
    unsafe {
        let wa = list_entry!(a as *mut ListElem, Waiter, elem);
        let wb = list_entry!(b as *mut ListElem, Waiter, elem);
        (*(*wa).thread.as_ptr()).priority > (*(*wb).thread.as_ptr()).priority
    }
}

/// A condition variable.
///
/// Must be initialized in place with [`Condition::init`] and not moved
/// afterwards.
pub struct Condition {
    waiters: UnsafeCell<List>,
}

// Shared across threads; exclusivity comes from interrupt masking.
unsafe impl Sync for Condition {}
unsafe impl Send for Condition {}

impl Condition {
    /// Creates a condition variable. Call `init` before first use.
    pub const fn new() -> Self {
        Self {
            waiters: UnsafeCell::new(List::new()),
        }
    }

    /// Links the waiter list. Must run once the condition variable is
    /// at its final address.
    pub fn init(&self) {
        unsafe { (*self.waiters.get()).init() };
    }

    /// Atomically releases `lock` and waits to be signalled; the lock
    /// is re-acquired before returning.
    ///
    /// The caller must hold `lock`. Not callable from an interrupt
    /// handler (it sleeps).
    pub fn wait(&self, lock: &Lock) {
        assert!(!interrupts::in_interrupt_context());
        assert!(lock.held_by_current(), "cond wait without holding the lock");

        // Lives on this stack until the wait completes; the list only
        // references it while it is enqueued.
        let mut waiter = Waiter {
            elem: ListElem::new(),
            semaphore: Semaphore::new(0),
            thread: current_ptr(),
        };
        waiter.semaphore.init();
        let elem = &raw mut waiter.elem;

        {
            let _guard = InterruptGuard::new();
            unsafe {
                (*self.waiters.get()).insert_ordered(
                    elem,
                    waiter_priority_greater,
                    core::ptr::null(),
                );
            }
        }

        lock.release();
        waiter.semaphore.down();
        lock.acquire();
    }

    /// Wakes the highest-priority waiter, if there is one. The caller
    /// must hold `lock`.
    ///
    /// The waiter list is re-sorted first: waiters' priorities can
    /// have changed (donation, set_priority) since they enqueued.
    pub fn signal(&self, lock: &Lock) {
        assert!(lock.held_by_current(), "cond signal without holding the lock");

        let waiter = {
            let _guard = InterruptGuard::new();
            let waiters = unsafe { &mut *self.waiters.get() };
            if waiters.is_empty() {
                None
            } else {
                unsafe {
                    waiters.sort(waiter_priority_greater, core::ptr::null());
                    Some(list_entry!(waiters.pop_front(), Waiter, elem))
                }
            }
        };

        if let Some(w) = waiter {
            // Off the list now; only the woken thread still owns it.
            unsafe { (*w).semaphore.up() };
        }
    }

    /// Wakes every waiter. The caller must hold `lock`.
    pub fn broadcast(&self, lock: &Lock) {
        loop {
            {
                let _guard = InterruptGuard::new();
                if unsafe { (*self.waiters.get()).is_empty() } {
                    return;
                }
            }
            self.signal(lock);
        }
    }
}

impl core::fmt::Debug for Condition {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Condition").finish_non_exhaustive()
    }
}
