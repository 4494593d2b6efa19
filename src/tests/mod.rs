/*
 * Test Suite for the TERN Kernel
 *
 * In-kernel tests for the threading core, run from the boot thread
 * after the scheduler starts. Each module exercises one slice of the
 * scheduler's contract:
 *
 * - alarm: timed sleep - deadline ordering, no early wakeups, the
 *   zero-tick edge case
 * - priority: strict priority scheduling - preemption on spawn, FIFO
 *   among equals, set_priority/get_priority, ready-queue ordering
 * - donation: priority donation - single, nested through a lock chain,
 *   and multiple donors on one holder
 * - condvar: condition variables - priority-ordered wakeup under
 *   signal and broadcast
 *
 * Tests report through the log and a pair of atomic counters; run_all
 * prints the summary. Cross-thread fixtures are module statics (shared
 * order buffers, handoff pointers to leaked primitives), the only
 * channel kernel threads have for talking to the test driver.
 */

pub mod alarm;
pub mod condvar;
pub mod donation;
pub mod priority;

use core::sync::atomic::{AtomicUsize, Ordering};

static TESTS_PASSED: AtomicUsize = AtomicUsize::new(0);
static TESTS_FAILED: AtomicUsize = AtomicUsize::new(0);

/// Records one test outcome. Callable from any thread.
pub(crate) fn check(name: &str, ok: bool) {
    if ok {
        TESTS_PASSED.fetch_add(1, Ordering::Relaxed);
        log::info!("[PASS] {}", name);
    } else {
        TESTS_FAILED.fetch_add(1, Ordering::Relaxed);
        log::error!("[FAIL] {}", name);
    }
}

/// Runs every suite and logs a summary. Called from the boot thread.
pub fn run_all() {
    log::info!("=== TERN threading test suite ===");

    alarm::run();
    priority::run();
    donation::run();
    condvar::run();

    let passed = TESTS_PASSED.load(Ordering::Relaxed);
    let failed = TESTS_FAILED.load(Ordering::Relaxed);
    if failed == 0 {
        log::info!("=== test suite complete: {} passed, 0 failed ===", passed);
    } else {
        log::error!(
            "=== test suite complete: {} passed, {} FAILED ===",
            passed,
            failed
        );
    }
}

/// Leaks a semaphore for a test run and hands back a static reference.
/// Test threads receive it through a static pointer or their aux
/// argument; a handful of leaked primitives per boot is fine.
pub(crate) fn leak_semaphore(value: u32) -> &'static crate::scheduler::Semaphore {
    let sema: &'static crate::scheduler::Semaphore =
        alloc::boxed::Box::leak(alloc::boxed::Box::new(crate::scheduler::Semaphore::new(
            value,
        )));
    sema.init();
    sema
}

/// Leaks a lock for a test run.
pub(crate) fn leak_lock() -> &'static crate::scheduler::Lock {
    let lock: &'static crate::scheduler::Lock =
        alloc::boxed::Box::leak(alloc::boxed::Box::new(crate::scheduler::Lock::new()));
    lock.init();
    lock
}
