/*
 * Priority Scheduling Tests
 *
 * The contract under test: the highest-priority ready thread runs,
 * always; equal priorities run FIFO; a spawn that creates a
 * higher-priority thread is itself a scheduling decision; and
 * set_priority takes effect (and preempts) immediately.
 */

use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use spin::Mutex;

use crate::scheduler::{self, Priority, Semaphore};

use super::{check, leak_semaphore};

/// Set by the child in the spawn-preemption test.
static MARK: AtomicBool = AtomicBool::new(false);

/// Shared wake/run order buffer.
static ORDER: Mutex<heapless::Vec<usize, 8>> = Mutex::new(heapless::Vec::new());

/// Handoff pointer to the current test's semaphore.
static SEMA: AtomicUsize = AtomicUsize::new(0);

fn sema() -> &'static Semaphore {
    unsafe { &*(SEMA.load(Ordering::Acquire) as *const Semaphore) }
}

fn marker(_aux: usize) {
    MARK.store(true, Ordering::Relaxed);
}

/// Downs the shared semaphore, then records its index on wakeup.
fn sema_waiter(i: usize) {
    sema().down();
    ORDER.lock().push(i).expect("order overflow");
}

/// Records its index immediately.
fn recorder(i: usize) {
    ORDER.lock().push(i).expect("order overflow");
}

pub fn run() {
    log::info!("--- priority tests ---");

    spawn_preempts();
    set_priority_round_trip();
    fifo_among_equals();
    highest_ready_runs_first();
    semaphore_wakes_highest();
}

/// Spawning a higher-priority thread runs it before spawn returns.
fn spawn_preempts() {
    MARK.store(false, Ordering::Relaxed);
    scheduler::spawn("marker", Priority(32), marker, 0).expect("spawn failed");
    check(
        "priority: higher-priority spawn runs before spawn returns",
        MARK.load(Ordering::Relaxed),
    );
}

/// With no donations in play, set_priority is exactly get_priority.
fn set_priority_round_trip() {
    let original = scheduler::get_priority();
    scheduler::set_priority(Priority(40));
    let observed = scheduler::get_priority();
    scheduler::set_priority(original);
    check(
        "priority: set_priority round-trips through get_priority",
        observed == Priority(40) && scheduler::get_priority() == original,
    );
}

/// Equal-priority semaphore waiters wake in the order they downed.
fn fifo_among_equals() {
    let sema = leak_semaphore(0);
    SEMA.store(sema as *const Semaphore as usize, Ordering::Release);
    ORDER.lock().clear();

    // Each waiter outranks us, so it runs - and blocks on the
    // semaphore - inside its spawn call, fixing the queue order.
    for i in 0..3 {
        scheduler::spawn("fifo-waiter", Priority(32), sema_waiter, i).expect("spawn failed");
    }
    // Each up wakes one waiter, which outranks us and finishes
    // immediately.
    for _ in 0..3 {
        sema.up();
    }

    let order = ORDER.lock();
    check(
        "priority: equal-priority waiters wake FIFO",
        order.iter().copied().eq(0..3),
    );
}

/// Ready threads run strictly by priority once the driver stops
/// outranking them.
fn highest_ready_runs_first() {
    ORDER.lock().clear();

    let original = scheduler::get_priority();
    scheduler::set_priority(Priority::MAX);

    // None of these can run yet; they stack up in the ready queue.
    scheduler::spawn("rec-40", Priority(40), recorder, 40).expect("spawn failed");
    scheduler::spawn("rec-50", Priority(50), recorder, 50).expect("spawn failed");
    scheduler::spawn("rec-45", Priority(45), recorder, 45).expect("spawn failed");

    // Dropping back releases them all; they must run 50, 45, 40.
    scheduler::set_priority(original);

    let order = ORDER.lock();
    check(
        "priority: ready queue drains highest-first",
        order.iter().copied().eq([50, 45, 40]),
    );
}

/// up() wakes the highest-priority waiter, not the first to arrive.
fn semaphore_wakes_highest() {
    let sema = leak_semaphore(0);
    SEMA.store(sema as *const Semaphore as usize, Ordering::Release);
    ORDER.lock().clear();

    scheduler::spawn("w-32", Priority(32), sema_waiter, 32).expect("spawn failed");
    scheduler::spawn("w-34", Priority(34), sema_waiter, 34).expect("spawn failed");
    scheduler::spawn("w-33", Priority(33), sema_waiter, 33).expect("spawn failed");

    for _ in 0..3 {
        sema.up();
    }

    let order = ORDER.lock();
    check(
        "priority: semaphore up wakes highest-priority waiter",
        order.iter().copied().eq([34, 33, 32]),
    );
}
