/*
 * Priority Donation
 *
 * When a thread blocks on a lock held by a lower-priority thread, the
 * holder inherits the waiter's priority for as long as the wait lasts;
 * otherwise a middle-priority thread could starve the holder and,
 * through it, the high-priority waiter (priority inversion).
 *
 * The bookkeeping lives on the threads themselves. Every contender
 * appears in its holder's donation list (via `donation_elem`), and
 * carries `wait_on_lock` pointing at the lock it wants. Donation is
 * transitive: if the holder is itself blocked on another lock, the
 * walk continues through `wait_on_lock -> holder` links, raising each
 * holder along the way, bounded by DONATION_DEPTH_MAX.
 *
 * Restoration happens on release: the donations attributable to the
 * released lock are dropped, and the holder's effective priority is
 * recomputed from its base priority and whatever donors remain (for
 * other locks it still holds).
 *
 * Everything here runs with interrupts disabled, under the guard taken
 * by the lock operations that call in.
 */

use core::ptr::NonNull;

use crate::collections::list;
use crate::list_entry;

use super::sync::Lock;
use super::thread::Thread;

/// Bound on the waits-on chain walk. Chains deeper than this stop
/// inheriting; bounds the work done inside a lock acquire.
pub const DONATION_DEPTH_MAX: usize = 8;

/// Propagates `donor`'s priority along its waits-on chain: each holder
/// whose priority is below its waiter's is raised to match, following
/// `wait_on_lock -> holder` links up to DONATION_DEPTH_MAX hops.
///
/// # Safety
/// Interrupts must be disabled; `donor` must be a live thread whose
/// `wait_on_lock` bookkeeping is current.
pub(super) unsafe fn donate_chain(donor: NonNull<Thread>) {
    unsafe {
        let mut t = donor.as_ptr();
        for _ in 0..DONATION_DEPTH_MAX {
            let Some(lock) = (*t).wait_on_lock else {
                break;
            };
            let Some(holder) = lock.as_ref().holder() else {
                break;
            };
            let holder = holder.as_ptr();
            debug_assert!(holder != t, "thread waiting on a lock it holds");

            if (*holder).priority < (*t).priority {
                (*holder).priority = (*t).priority;
            }
            t = holder;
        }
    }
}

/// Drops from `holder`'s donation list every donor that was waiting on
/// `lock`. Called on release, just before the semaphore wakes one of
/// those donors.
///
/// # Safety
/// Interrupts must be disabled; `holder` must be the thread releasing
/// `lock`.
pub(super) unsafe fn remove_donations_for(holder: NonNull<Thread>, lock: NonNull<Lock>) {
    unsafe {
        let donations = &mut (*holder.as_ptr()).donations;
        let mut e = donations.begin();
        while e != donations.end() {
            let donor = list_entry!(e, Thread, donation_elem);
            if (*donor).wait_on_lock == Some(lock) {
                e = list::remove(e);
            } else {
                e = list::next(e);
            }
        }
    }
}

/// Recomputes a thread's effective priority: its base priority, raised
/// to the highest remaining donation if one is higher.
///
/// The donation list is scanned rather than trusted for order: it was
/// ordered at insertion time, but donors' priorities move underneath
/// it as donations cascade, and a scan is immune to that.
///
/// # Safety
/// Interrupts must be disabled; `t` must be a live thread.
pub(super) unsafe fn refresh_priority(t: NonNull<Thread>) {
    unsafe {
        let t = t.as_ptr();
        (*t).priority = (*t).init_priority;

        let donations = &mut (*t).donations;
        let mut e = donations.begin();
        while e != donations.end() {
            let donor = list_entry!(e, Thread, donation_elem);
            if (*donor).priority > (*t).priority {
                (*t).priority = (*donor).priority;
            }
            e = list::next(e);
        }
    }
}
