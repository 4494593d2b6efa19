/*
 * Synchronization Primitives
 *
 * The blocking primitives threads coordinate with, layered bottom-up:
 *
 * - Semaphore: the base primitive; a counter plus a priority-ordered
 *   waiter list.
 * - Lock: a binary semaphore with an owner, wired into priority
 *   donation.
 * - Condition: condition variables built from per-waiter semaphores.
 *
 * All of them protect their state the way the scheduler does - by
 * disabling interrupts - and all of them wake the highest-priority
 * waiter first, re-sorting at wake time because donation can re-rank
 * waiters after they enqueue.
 */

pub mod condvar;
pub mod lock;
pub mod semaphore;

pub use condvar::Condition;
pub use lock::Lock;
pub use semaphore::Semaphore;
