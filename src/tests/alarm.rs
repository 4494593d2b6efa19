/*
 * Timed Sleep Tests
 *
 * Five threads go to sleep with staggered absolute deadlines; they
 * must wake in deadline order and never before their deadline. A
 * second case covers the degenerate sleeps: a deadline already in the
 * past and a zero-length sleep.
 */

use core::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};

use spin::Mutex;

use crate::scheduler::{self, Priority, Semaphore};
use crate::utils::timer;

use super::{check, leak_semaphore};

const SLEEPERS: usize = 5;
const SPACING: i64 = 10;

/// Tick the deadlines are computed from.
static START_TICK: AtomicI64 = AtomicI64::new(0);

/// Completion semaphore, leaked per run.
static DONE: AtomicUsize = AtomicUsize::new(0);

/// Indices of the sleepers, in the order they woke.
static WAKE_ORDER: Mutex<heapless::Vec<usize, SLEEPERS>> = Mutex::new(heapless::Vec::new());

/// Cleared if any sleeper returns before its deadline.
static ALL_ON_TIME: AtomicBool = AtomicBool::new(true);

fn done_sema() -> &'static Semaphore {
    unsafe { &*(DONE.load(Ordering::Acquire) as *const Semaphore) }
}

/// Sleeper body: index `i` sleeps until START + (i+1)*SPACING.
fn sleeper(i: usize) {
    let deadline = START_TICK.load(Ordering::Relaxed) + ((i as i64) + 1) * SPACING;
    scheduler::sleep_until(deadline);

    if timer::ticks() < deadline {
        ALL_ON_TIME.store(false, Ordering::Relaxed);
    }
    WAKE_ORDER.lock().push(i).expect("wake order overflow");
    done_sema().up();
}

pub fn run() {
    log::info!("--- alarm tests ---");

    let done = leak_semaphore(0);
    DONE.store(done as *const Semaphore as usize, Ordering::Release);
    WAKE_ORDER.lock().clear();
    ALL_ON_TIME.store(true, Ordering::Relaxed);
    START_TICK.store(timer::ticks(), Ordering::Relaxed);

    // Same priority as the driver: the sleepers only run once we block
    // below, and their deadlines are absolute, so spawn latency does
    // not reorder them.
    for i in 0..SLEEPERS {
        scheduler::spawn("sleeper", Priority::DEFAULT, sleeper, i)
            .expect("failed to spawn sleeper");
    }
    for _ in 0..SLEEPERS {
        done.down();
    }

    let order = WAKE_ORDER.lock();
    let in_order = order.iter().copied().eq(0..SLEEPERS);
    check("alarm: wake order follows deadlines", in_order);
    drop(order);
    check(
        "alarm: no sleeper woke before its deadline",
        ALL_ON_TIME.load(Ordering::Relaxed),
    );

    // A deadline in the past still parks the thread only until the
    // next tick boundary.
    let t0 = timer::ticks();
    scheduler::sleep_until(t0);
    check("alarm: past-deadline sleep returns promptly", timer::elapsed(t0) <= 2);

    // Zero-length sleep does not block at all.
    let t0 = timer::ticks();
    timer::sleep(0);
    check("alarm: zero-tick sleep returns immediately", timer::elapsed(t0) <= 1);
}
