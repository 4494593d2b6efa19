/*
 * Thread Control Blocks
 *
 * This module defines the Thread structure and its identity types for
 * the preemptive priority scheduler.
 *
 * Each thread owns exactly one 4 KiB page. The Thread structure sits at
 * the bottom of the page and the thread's kernel stack grows downward
 * from the top, giving this picture:
 *
 *      4 kB +---------------------------------+
 *           |          kernel stack           |
 *           |                |                |
 *           |                v                |
 *           |         grows downward          |
 *           |                                 |
 *           +---------------------------------+
 *           |              magic              |
 *           |               ...               |
 *           |              status             |
 *           |               tid               |
 *      0 kB +---------------------------------+
 *
 * Two consequences follow. The Thread structure must stay small, or it
 * eats the stack. And the kernel stack must stay shallow, or it eats
 * the Thread structure - which is what `magic` is for: it is the last
 * field, so a runaway stack destroys it first, and every current()
 * call and context switch verifies it.
 */

use core::fmt;
use core::ptr::NonNull;

use crate::arch::x86_64::context::Context;
use crate::arch::x86_64::interrupts;
use crate::collections::{List, ListElem};
use crate::list_entry;

use super::sync::Lock;

/// Thread identifier. Positive and unique for live threads; never
/// reused within a boot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Tid(pub i32);

impl Tid {
    /// Sentinel for "no such thread" at flat-value call sites; spawn
    /// failures surface as a Result instead.
    pub const ERROR: Tid = Tid(-1);
}

impl fmt::Display for Tid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Thread({})", self.0)
    }
}

/// Thread priority. Higher values run first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Priority(pub i32);

impl Priority {
    /// Lowest priority (the idle thread).
    pub const MIN: Priority = Priority(0);

    /// Default priority for new threads.
    pub const DEFAULT: Priority = Priority(31);

    /// Highest priority.
    pub const MAX: Priority = Priority(63);

    pub fn is_valid(self) -> bool {
        Priority::MIN <= self && self <= Priority::MAX
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Thread states.
///
/// READY threads are exactly the members of the ready queue; BLOCKED
/// threads sit on at most one waiter or sleep list; DYING threads are
/// destroyed by the next scheduling decision after they leave the CPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadStatus {
    Running,
    Ready,
    Blocked,
    Dying,
}

/// Entry point of a kernel thread. The argument is whatever the
/// spawner passed, typically a pointer smuggled through usize.
pub type ThreadFunc = fn(usize);

/// Sentinel stored as the last TCB field to catch stack overflow.
pub(crate) const THREAD_MAGIC: u32 = 0x74c8_51fe;

/// A kernel thread's control block. Lives at the base of the thread's
/// page; never moved, never copied.
#[repr(C)]
pub struct Thread {
    pub(crate) tid: Tid,
    pub(crate) status: ThreadStatus,
    /// Debugging label, not an identity.
    pub(crate) name: heapless::String<15>,
    /// Current effective priority: the base priority possibly raised by
    /// donations from threads blocked on locks this thread holds.
    pub(crate) priority: Priority,
    /// Base priority, the value most recently set explicitly. Effective
    /// priority falls back to this as donations clear.
    pub(crate) init_priority: Priority,
    /// Absolute tick at which to wake; meaningful only on the sleep list.
    pub(crate) wakeup_tick: i64,
    /// The lock this thread is blocked acquiring, if any. The donation
    /// walk follows these links through successive holders.
    pub(crate) wait_on_lock: Option<NonNull<Lock>>,
    /// Queue membership handle: ready queue, one waiter list, the sleep
    /// list, or the destruction list. The state machine guarantees it
    /// is on at most one of them.
    pub(crate) elem: ListElem,
    /// Threads currently donating priority to this one, ordered by
    /// donor priority (highest first) as of insertion time.
    pub(crate) donations: List,
    /// Membership handle in some other thread's donation list.
    pub(crate) donation_elem: ListElem,
    /// Niceness, read by the multilevel feedback queue policy.
    #[cfg(feature = "mlfqs")]
    pub(crate) nice: i32,
    /// Recent CPU estimate, maintained by the mlfqs policy.
    #[cfg(feature = "mlfqs")]
    pub(crate) recent_cpu: i64,
    /// Suspended execution state; owned by the context switch.
    pub(crate) context: Context,
    /// Must equal THREAD_MAGIC. Placed last: the stack grows down
    /// toward it, so overflow corrupts it before anything else.
    pub(crate) magic: u32,
}

impl Thread {
    /// Initializes a blocked, off-queue thread in place at `t`
    /// (the base of its page). The TID is assigned separately by the
    /// spawn path; the context is installed by the caller.
    ///
    /// # Safety
    /// `t` must point at the base of a page-sized, writable allocation
    /// that will outlive the thread.
    pub(crate) unsafe fn init_at(t: *mut Thread, name: &str, priority: Priority) {
        assert!(!t.is_null());
        assert!(priority.is_valid(), "priority {} out of range", priority);

        unsafe {
            t.write(Thread {
                tid: Tid::ERROR,
                status: ThreadStatus::Blocked,
                name: bounded_name(name),
                priority,
                init_priority: priority,
                wakeup_tick: 0,
                wait_on_lock: None,
                elem: ListElem::new(),
                donations: List::new(),
                donation_elem: ListElem::new(),
                #[cfg(feature = "mlfqs")]
                nice: 0,
                #[cfg(feature = "mlfqs")]
                recent_cpu: 0,
                context: Context::zeroed(),
                magic: THREAD_MAGIC,
            });
            // The donation list holds pointers into itself; link it up
            // only now that the structure is at its final address.
            (*t).donations.init();
        }
    }

    pub fn tid(&self) -> Tid {
        self.tid
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }
}

impl fmt::Debug for Thread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Thread")
            .field("tid", &self.tid)
            .field("name", &self.name)
            .field("status", &self.status)
            .field("priority", &self.priority)
            .finish()
    }
}

/// True if `t` plausibly points at a live thread: non-null with an
/// intact overflow sentinel.
pub(crate) fn is_thread(t: *const Thread) -> bool {
    !t.is_null() && unsafe { (*t).magic == THREAD_MAGIC }
}

/// Truncates a label to the bounded on-TCB name.
fn bounded_name(name: &str) -> heapless::String<15> {
    let mut out = heapless::String::new();
    for c in name.chars() {
        if out.push(c).is_err() {
            break;
        }
    }
    out
}

/// Ready-queue / waiter-list comparator: orders by effective priority,
/// highest first. Equal priorities insert behind existing entries, so
/// ties stay FIFO.
pub(crate) unsafe fn priority_greater(
    a: *const ListElem,
    b: *const ListElem,
    _aux: *const (),
) -> bool {
    unsafe {
        let ta = list_entry!(a as *mut ListElem, Thread, elem);
        let tb = list_entry!(b as *mut ListElem, Thread, elem);
        (*ta).priority > (*tb).priority
    }
}

/// Donation-list comparator: same ordering as priority_greater, but for
/// the donation membership handle.
pub(crate) unsafe fn donation_greater(
    a: *const ListElem,
    b: *const ListElem,
    _aux: *const (),
) -> bool {
    unsafe {
        let ta = list_entry!(a as *mut ListElem, Thread, donation_elem);
        let tb = list_entry!(b as *mut ListElem, Thread, donation_elem);
        (*ta).priority > (*tb).priority
    }
}

/// First body of every spawned thread. Entered from the first-dispatch
/// trampoline with the scheduler's interrupts-off invariant still in
/// force; undoes it, runs the thread function, and exits on return.
pub(crate) extern "C" fn kernel_thread(function: ThreadFunc, aux: usize) -> ! {
    interrupts::enable(); // the scheduler runs with interrupts off
    function(aux);
    super::exit(); // if the function returns, kill the thread
}
