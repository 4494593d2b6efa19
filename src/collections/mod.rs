/*
 * Kernel Collections
 *
 * Allocation-free data structures used by the scheduler. The only
 * resident so far is the intrusive doubly-linked list, which backs the
 * ready queue, the sleep list, semaphore waiter lists, and per-thread
 * donation lists.
 */

pub mod list;

pub use list::{List, ListElem};
