/*
 * Lock
 *
 * A lock is a semaphore with an initial value of one plus an owner.
 * The owner makes two things possible that a bare semaphore cannot do:
 * asserting that only the holder releases, and priority donation -
 * a contender knows exactly which thread stands in its way and can
 * lend it its priority for the duration.
 *
 * Locks are not recursive: a holder that tries to re-acquire has
 * deadlocked by definition, and the kernel treats it as a fatal bug.
 */

use core::cell::Cell;
use core::ptr::NonNull;

use crate::arch::x86_64::interrupts::{self, InterruptGuard};
use crate::scheduler::thread::{Thread, donation_greater};
use crate::scheduler::{current_ptr, donation};

use super::Semaphore;

/// A mutual-exclusion lock with priority donation.
///
/// Must be initialized in place with [`Lock::init`] and not moved
/// afterwards (the embedded semaphore carries an intrusive list).
pub struct Lock {
    holder: Cell<Option<NonNull<Thread>>>,
    semaphore: Semaphore,
}

// Shared across threads; exclusivity comes from interrupt masking.
unsafe impl Sync for Lock {}
unsafe impl Send for Lock {}

impl Lock {
    /// Creates an unheld lock. Call `init` before first use.
    pub const fn new() -> Self {
        Self {
            holder: Cell::new(None),
            semaphore: Semaphore::new(1),
        }
    }

    /// Links the waiter list. Must run once the lock is at its final
    /// address.
    pub fn init(&self) {
        self.semaphore.init();
    }

    /// Acquires the lock, sleeping until it is available.
    ///
    /// On contention the caller donates its effective priority to the
    /// holder - and transitively to whatever the holder is itself
    /// waiting on - before going to sleep, so the chain in front of it
    /// runs at least at the caller's priority until the lock frees up.
    ///
    /// Must not be called from an interrupt handler or by the current
    /// holder.
    pub fn acquire(&self) {
        assert!(!interrupts::in_interrupt_context());
        assert!(!self.held_by_current(), "locks are not recursive");

        let cur = current_ptr();
        let _guard = InterruptGuard::new();

        #[cfg(not(feature = "mlfqs"))]
        if let Some(holder) = self.holder.get() {
            unsafe {
                (*cur.as_ptr()).wait_on_lock = Some(NonNull::from(self));
                (*holder.as_ptr()).donations.insert_ordered(
                    &raw mut (*cur.as_ptr()).donation_elem,
                    donation_greater,
                    core::ptr::null(),
                );
                donation::donate_chain(cur);
            }
        }

        self.semaphore.down();

        unsafe { (*cur.as_ptr()).wait_on_lock = None };
        self.holder.set(Some(cur));
    }

    /// Acquires the lock only if it is free right now; returns whether
    /// it was acquired. Never donates and never sleeps.
    pub fn try_acquire(&self) -> bool {
        let _guard = InterruptGuard::new();
        if self.semaphore.try_down() {
            self.holder.set(Some(current_ptr()));
            true
        } else {
            false
        }
    }

    /// Releases the lock and wakes the highest-priority contender.
    ///
    /// Donations attributable to this lock are dropped first and the
    /// releaser's effective priority recomputed, so by the time the
    /// woken contender is ranked against the releaser both carry their
    /// own priorities again.
    ///
    /// Only the holder may release; anything else is a fatal bug.
    pub fn release(&self) {
        assert!(self.held_by_current(), "lock released by a non-holder");

        let cur = current_ptr();
        let _guard = InterruptGuard::new();

        #[cfg(not(feature = "mlfqs"))]
        unsafe {
            donation::remove_donations_for(cur, NonNull::from(self));
            donation::refresh_priority(cur);
        }

        self.holder.set(None);
        self.semaphore.up();
    }

    /// True if the running thread holds this lock.
    pub fn held_by_current(&self) -> bool {
        self.holder.get() == Some(current_ptr())
    }

    /// The holding thread, if any. Read by the donation walk.
    pub(crate) fn holder(&self) -> Option<NonNull<Thread>> {
        self.holder.get()
    }
}

impl core::fmt::Debug for Lock {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Lock")
            .field("held", &self.holder.get().is_some())
            .finish_non_exhaustive()
    }
}
