/*
 * Condition Variable Tests
 *
 * Waiters park on a condition in one order and must be released in
 * priority order - the waiter list is re-ranked at signal time, so
 * arrival order must not matter. Covered once with three individual
 * signals and once with a broadcast.
 */

use core::sync::atomic::{AtomicUsize, Ordering};

use spin::Mutex;

use crate::scheduler::{self, Condition, Lock, Priority, Semaphore};

use super::{check, leak_lock, leak_semaphore};

/// Handoff pointers for the current scenario.
static LOCK: AtomicUsize = AtomicUsize::new(0);
static COND: AtomicUsize = AtomicUsize::new(0);
static DONE: AtomicUsize = AtomicUsize::new(0);

/// Priorities of the waiters, in wake order.
static ORDER: Mutex<heapless::Vec<i32, 4>> = Mutex::new(heapless::Vec::new());

fn lock() -> &'static Lock {
    unsafe { &*(LOCK.load(Ordering::Acquire) as *const Lock) }
}

fn cond() -> &'static Condition {
    unsafe { &*(COND.load(Ordering::Acquire) as *const Condition) }
}

fn done() -> &'static Semaphore {
    unsafe { &*(DONE.load(Ordering::Acquire) as *const Semaphore) }
}

fn leak_condition() -> &'static Condition {
    let cond: &'static Condition = alloc::boxed::Box::leak(alloc::boxed::Box::new(Condition::new()));
    cond.init();
    cond
}

/// Waiter body: waits on the condition, then records its priority.
fn cond_waiter(priority: usize) {
    let l = lock();
    l.acquire();
    cond().wait(l);
    ORDER.lock().push(priority as i32).expect("order overflow");
    l.release();
    done().up();
}

pub fn run() {
    log::info!("--- condition variable tests ---");

    signal_wakes_by_priority();
    broadcast_wakes_by_priority();
}

fn setup() {
    LOCK.store(leak_lock() as *const Lock as usize, Ordering::Release);
    COND.store(leak_condition() as *const Condition as usize, Ordering::Release);
    DONE.store(
        leak_semaphore(0) as *const Semaphore as usize,
        Ordering::Release,
    );
    ORDER.lock().clear();

    // Each waiter outranks the driver, so it reaches its wait before
    // the next spawn: arrival order is 32, 33, 34 - deliberately not
    // priority order.
    for p in [32, 33, 34] {
        scheduler::spawn("cond-waiter", Priority(p), cond_waiter, p as usize)
            .expect("spawn failed");
    }
}

fn signal_wakes_by_priority() {
    setup();

    let l = lock();
    l.acquire();
    for _ in 0..3 {
        cond().signal(l);
    }
    l.release();

    for _ in 0..3 {
        done().down();
    }
    let order = ORDER.lock();
    check(
        "condvar: signal wakes waiters in priority order",
        order.iter().copied().eq([34, 33, 32]),
    );
}

fn broadcast_wakes_by_priority() {
    setup();

    let l = lock();
    l.acquire();
    cond().broadcast(l);
    l.release();

    for _ in 0..3 {
        done().down();
    }
    let order = ORDER.lock();
    check(
        "condvar: broadcast wakes waiters in priority order",
        order.iter().copied().eq([34, 33, 32]),
    );
}
