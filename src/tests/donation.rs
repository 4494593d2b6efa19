/*
 * Priority Donation Tests
 *
 * The driver thread (priority 31) plays the low-priority lock holder
 * in each scenario and watches its own effective priority move as
 * higher-priority contenders arrive and leave:
 *
 * - single: one donor on one lock, full raise-and-restore cycle
 * - nested: a donation arriving at the middle of a lock chain
 *   propagates to the end, and unwinds lock by lock
 * - multiple: two donors through two locks held by one thread; each
 *   release sheds exactly that lock's donation
 */

use core::sync::atomic::{AtomicUsize, Ordering};

use spin::Mutex;

use crate::scheduler::{self, Lock, Priority};

use super::{check, leak_lock};

/// Handoff pointers to the current scenario's locks.
static LOCK_A: AtomicUsize = AtomicUsize::new(0);
static LOCK_B: AtomicUsize = AtomicUsize::new(0);

/// Milestone order, for asserting who ran when.
static ORDER: Mutex<heapless::Vec<&'static str, 8>> = Mutex::new(heapless::Vec::new());

fn lock_a() -> &'static Lock {
    unsafe { &*(LOCK_A.load(Ordering::Acquire) as *const Lock) }
}

fn lock_b() -> &'static Lock {
    unsafe { &*(LOCK_B.load(Ordering::Acquire) as *const Lock) }
}

fn mark(event: &'static str) {
    ORDER.lock().push(event).expect("order overflow");
}

pub fn run() {
    log::info!("--- donation tests ---");

    single_donation();
    nested_donation();
    multiple_donations();
}

/// Contender body for the single-donation case: takes lock A, which
/// the driver holds.
fn single_contender(_aux: usize) {
    lock_a().acquire();
    mark("contender-got-lock");
    lock_a().release();
}

fn single_donation() {
    let x = leak_lock();
    LOCK_A.store(x as *const Lock as usize, Ordering::Release);
    ORDER.lock().clear();

    let base = scheduler::get_priority();
    x.acquire();

    // The contender outranks us: it runs inside spawn, blocks on the
    // lock, and donates before control returns here.
    scheduler::spawn("contender", Priority(33), single_contender, 0).expect("spawn failed");
    check(
        "donation: holder inherits contender priority",
        scheduler::get_priority() == Priority(33),
    );

    x.release();
    check(
        "donation: holder priority restored on release",
        scheduler::get_priority() == base,
    );
    check(
        "donation: contender acquired after release",
        ORDER.lock().first() == Some(&"contender-got-lock"),
    );
}

/// Middle thread of the nested case: holds B while waiting on A, so a
/// later donation to it for B must flow onward to A's holder.
fn nested_middle(_aux: usize) {
    lock_b().acquire();
    lock_a().acquire();

    // Woken holding A. The high thread still waits on B, so its
    // donation is still in force here.
    mark("middle-got-a");
    check(
        "donation: middle still elevated while holding contested B",
        scheduler::get_priority() == Priority(33),
    );

    lock_b().release();
    check(
        "donation: middle falls back once B is released",
        scheduler::get_priority() == Priority(32),
    );

    lock_a().release();
}

/// High thread of the nested case: wants B, which the middle holds.
fn nested_high(_aux: usize) {
    lock_b().acquire();
    mark("high-got-b");
    lock_b().release();
}

fn nested_donation() {
    let a = leak_lock();
    let b = leak_lock();
    LOCK_A.store(a as *const Lock as usize, Ordering::Release);
    LOCK_B.store(b as *const Lock as usize, Ordering::Release);
    ORDER.lock().clear();

    let base = scheduler::get_priority();
    a.acquire();

    // Middle (32) takes B, then blocks on A: we inherit 32.
    scheduler::spawn("middle", Priority(32), nested_middle, 0).expect("spawn failed");
    check(
        "donation: direct donation through A",
        scheduler::get_priority() == Priority(32),
    );

    // High (33) blocks on B; the donation rides the chain B -> middle
    // -> A -> us.
    scheduler::spawn("high", Priority(33), nested_high, 0).expect("spawn failed");
    check(
        "donation: nested donation reaches the chain's end",
        scheduler::get_priority() == Priority(33),
    );

    // Releasing A sheds every donation that arrived through it,
    // including the nested one.
    a.release();
    check(
        "donation: nested donations drop with their lock",
        scheduler::get_priority() == base,
    );

    let order = ORDER.lock();
    check(
        "donation: chain unwound middle-then-high",
        order.iter().copied().eq(["middle-got-a", "high-got-b"]),
    );
}

/// Donor wanting lock A in the multiple-donations case.
fn wants_a(_aux: usize) {
    lock_a().acquire();
    mark("p-got-a");
    lock_a().release();
}

/// Donor wanting lock B in the multiple-donations case.
fn wants_b(_aux: usize) {
    lock_b().acquire();
    mark("q-got-b");
    lock_b().release();
}

fn multiple_donations() {
    let x = leak_lock();
    let y = leak_lock();
    LOCK_A.store(x as *const Lock as usize, Ordering::Release);
    LOCK_B.store(y as *const Lock as usize, Ordering::Release);
    ORDER.lock().clear();

    let base = scheduler::get_priority();
    x.acquire();
    y.acquire();

    scheduler::spawn("wants-a", Priority(32), wants_a, 0).expect("spawn failed");
    scheduler::spawn("wants-b", Priority(33), wants_b, 0).expect("spawn failed");
    check(
        "donation: holder carries the max of its donations",
        scheduler::get_priority() == Priority(33),
    );

    // Each release sheds only that lock's donors.
    y.release();
    check(
        "donation: releasing one lock drops only its donation",
        scheduler::get_priority() == Priority(32),
    );

    x.release();
    check(
        "donation: all donations cleared",
        scheduler::get_priority() == base,
    );
}
