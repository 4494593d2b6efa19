/*
 * Preemptive Priority Scheduler
 *
 * This module owns thread lifecycles and the run queue for the TERN
 * kernel. It implements strict priority scheduling with FIFO among
 * equals, quantum-based preemption driven by the timer interrupt, timed
 * sleep without busy-waiting, and - through the sync and donation
 * submodules - priority donation across chains of contended locks.
 *
 * THREAD LIFECYCLE:
 *
 *              spawn                yield / quantum expiry
 *                |                 +------------------------+
 *                v                 v                        |
 *            Blocked ---------> Ready -----------------> Running
 *                ^    unblock          scheduler picks      |
 *                |                     queue head           |
 *                +------------------------------------------+
 *                     block / sleep_until / sema down          \
 *                                                               v
 *                                                             Dying
 *
 * A new thread starts Blocked and off every queue; spawn unblocks it
 * into the ready queue at its priority position. The scheduler always
 * runs the head of the ready queue, falling back to the idle thread
 * when the queue is empty. A thread that exits goes to Dying and is
 * destroyed by the next scheduling decision after it has left its own
 * stack.
 *
 * SYNCHRONIZATION DISCIPLINE:
 *
 * Every structure here - the ready queue, sleep list, destruction
 * list, waiter lists, donation lists, thread status words - is
 * protected by disabling interrupts, nothing else. On a single CPU the
 * timer interrupt is the only source of concurrency, so masking it
 * makes any section atomic. The InterruptGuard expresses the
 * save-disable-restore pattern and nests correctly; the tick handler
 * is the only code that touches scheduler state from interrupt
 * context, and it confines itself to waking sleepers and requesting a
 * deferred yield.
 *
 * The scheduler state itself is one Scheduler value in a module-private
 * cell, built during init() before interrupts are ever enabled. The
 * TID counter is deliberately NOT in there: it is guarded by an
 * ordinary Lock, as a worked example of the boundary between scheduler
 * state (interrupts) and everything else (locks).
 */

use core::cell::UnsafeCell;
use core::ptr::NonNull;
use core::sync::atomic::{AtomicBool, AtomicPtr, Ordering};

use crate::arch::x86_64::context;
use crate::arch::x86_64::interrupts::{self, InterruptGuard};
use crate::list_entry;
use crate::collections::List;
use crate::memory::{self, AllocFlags, PAGE_SIZE, page_alloc};

pub mod donation;
#[cfg(feature = "mlfqs")]
pub mod mlfqs;
pub mod sleep;
pub mod sync;
pub mod thread;

pub use sleep::sleep_until;
pub use sync::{Condition, Lock, Semaphore};
pub use thread::{Priority, ThreadFunc, Tid};

use thread::{Thread, ThreadStatus, is_thread, priority_greater};

/// Timer ticks each thread gets before involuntary yield.
pub const TIME_SLICE: u32 = 4;

/// Scheduler-wide state: the queues and the accounting. One instance,
/// constructed by init(), reachable only with interrupts disabled.
struct Scheduler {
    /// Runnable threads, effective priority order, highest first.
    ready: List,
    /// Sleeping threads, wakeup tick order, soonest first.
    sleepers: List,
    /// Dying threads whose pages are freed by the next schedule().
    destruction: List,
    /// The thread that runs when nothing else can. Never on `ready`.
    idle: Option<NonNull<Thread>>,
    /// The boot thread. Never destroyed; its page is a static.
    initial: Option<NonNull<Thread>>,
    /// Ticks the running thread has held the CPU this quantum.
    thread_ticks: u32,
    /// Ticks spent in the idle thread since boot.
    idle_ticks: u64,
    /// Ticks spent in ordinary kernel threads since boot.
    kernel_ticks: u64,
    /// Next TID to hand out. Guarded by TID_LOCK, not by this struct's
    /// interrupt discipline.
    next_tid: i32,
}

struct SchedCell(UnsafeCell<Option<Scheduler>>);

// Single CPU; all access happens with interrupts disabled.
unsafe impl Sync for SchedCell {}

static SCHEDULER: SchedCell = SchedCell(UnsafeCell::new(None));

/// The running thread. Updated inside schedule() with interrupts off;
/// read from anywhere.
static CURRENT: AtomicPtr<Thread> = AtomicPtr::new(core::ptr::null_mut());

/// Set once start() is ready for timer ticks to drive scheduling.
static STARTED: AtomicBool = AtomicBool::new(false);

struct LockCell(UnsafeCell<Lock>);
unsafe impl Sync for LockCell {}

/// Serializes TID allocation. An ordinary lock on purpose: the TID
/// counter is not scheduler state, so it gets the normal-world
/// synchronization primitive rather than the interrupt discipline.
static TID_LOCK: LockCell = LockCell(UnsafeCell::new(Lock::new()));

/// Scheduler state access. Interrupts must be disabled; the returned
/// borrow must end before any operation that can suspend or recurse
/// into the scheduler.
unsafe fn sched() -> &'static mut Scheduler {
    debug_assert!(!interrupts::are_enabled());
    unsafe {
        (*SCHEDULER.0.get())
            .as_mut()
            .expect("scheduler not initialized")
    }
}

/// Errors surfaced by spawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnError {
    /// The page arena is exhausted; no room for another TCB page.
    OutOfMemory,
}

impl core::fmt::Display for SpawnError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            SpawnError::OutOfMemory => write!(f, "out of thread pages"),
        }
    }
}

/// Initializes the threading system by adopting the currently running
/// code as the initial thread.
///
/// This works only because `_start` parked the boot stack inside a
/// page-aligned, page-sized region: rounding the stack pointer down to
/// a page boundary finds the spot where the initial thread's control
/// block belongs, exactly as it will later for every spawned thread.
///
/// Must run with interrupts disabled, before the page allocator is
/// asked for thread pages and before start().
pub fn init() {
    assert!(!interrupts::are_enabled());

    unsafe {
        let cell = &mut *SCHEDULER.0.get();
        assert!(cell.is_none(), "scheduler initialized twice");
        *cell = Some(Scheduler {
            ready: List::new(),
            sleepers: List::new(),
            destruction: List::new(),
            idle: None,
            initial: None,
            thread_ticks: 0,
            idle_ticks: 0,
            kernel_ticks: 0,
            next_tid: 1,
        });
        let s = cell.as_mut().unwrap();
        s.ready.init();
        s.sleepers.init();
        s.destruction.init();

        (*TID_LOCK.0.get()).init();

        // Adopt the running context: its stack already lives in a
        // page-aligned region usable as a TCB page.
        let rsp: usize;
        core::arch::asm!("mov {}, rsp", out(reg) rsp);
        let t = memory::page_round_down(rsp) as *mut Thread;

        Thread::init_at(t, "main", Priority::DEFAULT);
        (*t).status = ThreadStatus::Running;
        CURRENT.store(t, Ordering::Relaxed);
        sched().initial = NonNull::new(t);

        (*t).tid = allocate_tid();
    }

    log::info!("Threading system initialized, boot thread adopted as 'main'");
}

/// Starts preemptive scheduling: creates the idle thread and enables
/// interrupts. Returns once the idle thread has come up.
pub fn start() {
    // The idle thread reports in through this semaphore. It lives on
    // the boot stack; idle takes no reference beyond the handshake.
    let idle_started = Semaphore::new(0);
    idle_started.init();

    spawn(
        "idle",
        Priority::MIN,
        idle_thread,
        &idle_started as *const Semaphore as usize,
    )
    .expect("failed to create the idle thread");

    STARTED.store(true, Ordering::Release);

    // Start preemptive thread scheduling.
    interrupts::enable();

    // Wait for the idle thread to record itself.
    idle_started.down();

    log::info!("Scheduler started - preemptive multitasking active");
}

/// Creates a new kernel thread running `function(aux)` at `priority`
/// and puts it on the ready queue.
///
/// If the scheduler has started, the new thread may run - and even
/// exit - before spawn returns; in particular a higher-priority thread
/// preempts the spawner immediately. Use a semaphore to order against
/// the new thread.
pub fn spawn(
    name: &str,
    priority: Priority,
    function: ThreadFunc,
    aux: usize,
) -> Result<Tid, SpawnError> {
    assert!(priority.is_valid(), "priority {} out of range", priority);

    let page = page_alloc::alloc(AllocFlags::ZERO).ok_or(SpawnError::OutOfMemory)?;
    let t = page.as_ptr() as *mut Thread;

    let tid = unsafe {
        Thread::init_at(t, name, priority);

        // Arrange for the first dispatch to enter the trampoline with
        // the thread function and argument in hand.
        let stack_top = page.as_ptr().add(PAGE_SIZE);
        (*t).context = context::Context::prepare(stack_top, function as usize, aux);

        let tid = allocate_tid();
        (*t).tid = tid;
        tid
    };

    log::info!("Created thread '{}' ({})", name, tid);

    // Put it on the run queue, and get out of its way if it outranks us.
    unsafe { unblock(NonNull::new_unchecked(t)) };
    preempt_if_needed();

    Ok(tid)
}

/// Puts the current thread to sleep until unblock() is called on it.
///
/// The caller must already have disabled interrupts and placed itself
/// on whatever waiter list will produce the wakeup; blocking with no
/// planned wakeup parks the thread forever. Prefer the synchronization
/// primitives to calling this directly.
pub(crate) fn block() {
    assert!(!interrupts::in_interrupt_context());
    assert!(!interrupts::are_enabled(), "block() requires interrupts off");

    let cur = current_ptr();
    unsafe {
        (*cur.as_ptr()).status = ThreadStatus::Blocked;
        schedule();
    }
}

/// Moves a blocked thread to the ready queue at its priority position.
///
/// Does not preempt the running thread: an unblocker that has itself
/// disabled interrupts may need to atomically unblock and keep
/// mutating. Callers that want preemption follow up with
/// preempt_if_needed(), or rely on the tick handler's deferred yield.
pub(crate) unsafe fn unblock(t: NonNull<Thread>) {
    let t = t.as_ptr();
    assert!(is_thread(t), "unblock of a corrupt thread");

    let _guard = InterruptGuard::new();
    unsafe {
        assert_eq!(
            (*t).status,
            ThreadStatus::Blocked,
            "unblock of a thread that is not blocked"
        );
        sched()
            .ready
            .insert_ordered(&raw mut (*t).elem, priority_greater, core::ptr::null());
        (*t).status = ThreadStatus::Ready;
    }
}

/// Voluntarily yields the CPU. The current thread goes back into the
/// ready queue at its priority position and the scheduler runs; the
/// thread resumes whenever it next reaches the queue head.
pub fn yield_now() {
    assert!(!interrupts::in_interrupt_context());

    let cur = current_ptr().as_ptr();
    let _guard = InterruptGuard::new();
    unsafe {
        let s = sched();
        // The idle thread is selected specially, never queued.
        if Some(cur) != s.idle.map(NonNull::as_ptr) {
            s.ready
                .insert_ordered(&raw mut (*cur).elem, priority_greater, core::ptr::null());
        }
        (*cur).status = ThreadStatus::Ready;
        schedule();
    }
}

/// Terminates the current thread. Never returns.
///
/// The thread becomes DYING and its page is reclaimed by the next
/// scheduling decision - not here, because this stack is still the one
/// executing.
pub fn exit() -> ! {
    assert!(!interrupts::in_interrupt_context());

    let cur = current_ptr();
    log::info!(
        "Thread '{}' ({}) exiting",
        unsafe { (*cur.as_ptr()).name() },
        unsafe { (*cur.as_ptr()).tid() },
    );

    interrupts::disable();
    unsafe {
        (*cur.as_ptr()).status = ThreadStatus::Dying;
        schedule();
    }
    unreachable!("schedule() returned to a dying thread");
}

/// If the ready queue's head outranks the running thread, yield to it.
///
/// Called after any operation that can raise another thread's
/// effective priority above the current one (unblocking a waiter,
/// lowering our own priority, spawning). Not callable from interrupt
/// context - the tick handler uses the deferred yield flag instead.
pub fn preempt_if_needed() {
    assert!(!interrupts::in_interrupt_context());

    let should_yield = {
        let _guard = InterruptGuard::new();
        let s = unsafe { sched() };
        if s.ready.is_empty() {
            false
        } else {
            let front = list_entry!(s.ready.front(), Thread, elem);
            unsafe { (*front).priority > (*current_ptr().as_ptr()).priority }
        }
    };
    if should_yield {
        yield_now();
    }
}

/// Timer tick entry point. Runs in interrupt context, once per tick.
///
/// Wakes sleepers whose deadline has arrived, charges the tick to the
/// running thread's class, and requests a deferred yield when the
/// quantum is spent or a woken thread outranks the running one.
pub(crate) fn tick(now: i64) {
    if !STARTED.load(Ordering::Acquire) {
        return;
    }
    debug_assert!(interrupts::in_interrupt_context());

    let woken_max = sleep::wake_due(now);

    let cur = CURRENT.load(Ordering::Relaxed);
    unsafe {
        let s = sched();
        if Some(cur) == s.idle.map(NonNull::as_ptr) {
            s.idle_ticks += 1;
        } else {
            s.kernel_ticks += 1;
        }

        s.thread_ticks += 1;
        let quantum_spent = s.thread_ticks >= TIME_SLICE;
        let outranked = woken_max.is_some_and(|p| p > (*cur).priority);
        if quantum_spent || outranked {
            interrupts::yield_on_return();
        }
    }
}

/// The running thread, with the sanity checks that catch stack
/// overflow: the control block at the bottom of the current page must
/// still carry the magic sentinel and must claim to be running.
pub(crate) fn current_ptr() -> NonNull<Thread> {
    let t = CURRENT.load(Ordering::Relaxed);
    assert!(is_thread(t), "stack overflow clobbered the current TCB");
    unsafe {
        assert_eq!((*t).status, ThreadStatus::Running);
        NonNull::new_unchecked(t)
    }
}

/// TID of the running thread.
pub fn current_tid() -> Tid {
    unsafe { (*current_ptr().as_ptr()).tid() }
}

/// Name of the running thread (copied out; the TCB stays put).
pub fn current_name() -> heapless::String<15> {
    unsafe { (*current_ptr().as_ptr()).name.clone() }
}

/// Effective priority of the running thread.
pub fn get_priority() -> Priority {
    let _guard = InterruptGuard::new();
    unsafe { (*current_ptr().as_ptr()).priority }
}

/// Sets the running thread's base priority and recomputes its
/// effective priority. Lowering the base below an active donation
/// takes effect only once the donations clear. Yields immediately if
/// the change leaves a ready thread ranked higher.
pub fn set_priority(new: Priority) {
    assert!(new.is_valid(), "priority {} out of range", new);

    {
        let _guard = InterruptGuard::new();
        let cur = current_ptr().as_ptr();
        unsafe {
            (*cur).init_priority = new;
            #[cfg(not(feature = "mlfqs"))]
            donation::refresh_priority(NonNull::new_unchecked(cur));
            #[cfg(feature = "mlfqs")]
            {
                (*cur).priority = new;
            }
        }
    }
    preempt_if_needed();
}

/// Logs the per-class tick counters.
pub fn print_stats() {
    let (idle, kernel) = {
        let _guard = InterruptGuard::new();
        let s = unsafe { sched() };
        (s.idle_ticks, s.kernel_ticks)
    };
    log::info!("Thread: {} idle ticks, {} kernel ticks", idle, kernel);
}

/// Allocates the next TID. Serialized by an ordinary lock; see the
/// module comment for why this is pointedly not interrupt-guarded.
fn allocate_tid() -> Tid {
    let lock = unsafe { &*TID_LOCK.0.get() };
    lock.acquire();
    let tid = {
        let _guard = InterruptGuard::new();
        let s = unsafe { sched() };
        let tid = Tid(s.next_tid);
        s.next_tid += 1;
        tid
    };
    lock.release();
    tid
}

/// Picks the thread to run next and switches to it.
///
/// Preconditions: interrupts disabled, and the caller has already
/// moved the current thread out of the Running state (to Ready,
/// Blocked, or Dying) and onto whatever queue it belongs on.
///
/// Destruction of dead threads happens here, in two halves: a DYING
/// previous thread is queued now (after we are off its stack it cannot
/// queue itself), and queued pages are freed at the top of the *next*
/// schedule, when their stacks are guaranteed cold.
unsafe fn schedule() {
    debug_assert!(!interrupts::are_enabled());

    let cur = CURRENT.load(Ordering::Relaxed);
    assert!(is_thread(cur), "stack overflow clobbered the current TCB");

    let next = unsafe {
        let s = sched();

        // Free pages of threads that died before the previous switch.
        while !s.destruction.is_empty() {
            let e = s.destruction.pop_front();
            let victim = list_entry!(e, Thread, elem);
            debug_assert!(victim != cur);
            page_alloc::free(NonNull::new_unchecked(victim as *mut u8));
        }

        assert_ne!((*cur).status, ThreadStatus::Running);

        let next = s.next_thread_to_run();
        assert!(is_thread(next), "scheduled a corrupt thread");
        (*next).status = ThreadStatus::Running;

        // Start a fresh quantum.
        s.thread_ticks = 0;

        if cur != next
            && (*cur).status == ThreadStatus::Dying
            && Some(cur) != s.initial.map(NonNull::as_ptr)
        {
            // Queue the page for destruction; it is freed above on the
            // next schedule, once this stack is no longer in use.
            s.destruction.push_back(&raw mut (*cur).elem);
        }

        next
    };

    unsafe {
        memory::activate(&*next);

        if cur != next {
            CURRENT.store(next, Ordering::Relaxed);
            context::switch_to(&raw mut (*cur).context, &raw const (*next).context);
        }
    }
}

impl Scheduler {
    /// Head of the ready queue, or the idle thread if the queue is
    /// empty. (A running thread that can keep running is in the queue
    /// by the time this is called.)
    fn next_thread_to_run(&mut self) -> *mut Thread {
        if self.ready.is_empty() {
            self.idle
                .expect("ready queue empty before the idle thread exists")
                .as_ptr()
        } else {
            unsafe { list_entry!(self.ready.pop_front(), Thread, elem) }
        }
    }
}

/// The idle thread. Runs (by special-case selection, never via the
/// ready queue) when no other thread is runnable, and spends its life
/// blocked or halted.
fn idle_thread(handshake: usize) {
    let started = unsafe { &*(handshake as *const Semaphore) };

    {
        let _guard = InterruptGuard::new();
        unsafe { sched().idle = Some(current_ptr()) };
    }
    started.up();

    loop {
        // Let someone else run.
        interrupts::disable();
        block();

        // Re-enable interrupts and wait for the next one as a single
        // atomic pair; an interrupt slipping between the two would be
        // absorbed with the CPU still awake, wasting up to a tick.
        interrupts::enable_and_hlt();
    }
}
