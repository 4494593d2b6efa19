/*
 * Kernel Context Switch
 *
 * This module implements the one truly architecture-specific operation
 * in the threading core: transferring the CPU from one kernel stack to
 * another.
 *
 * The contract is deliberately tiny. A Context holds the callee-saved
 * registers plus the stack pointer; everything else (caller-saved
 * registers, the return address, whatever the thread had on its stack)
 * is already on the outgoing thread's stack by the time switch_to is
 * reached, because switch_to is an ordinary function call and the
 * System V ABI made the compiler spill around it.
 *
 * SWITCH MECHANICS:
 *
 * switch_to(out, in) saves callee-saved registers and RSP into *out,
 * then loads the same set from *in and returns. The "return" pops the
 * incoming thread's saved return address off the incoming thread's
 * stack, so execution resumes wherever that thread called switch_to
 * from. From each thread's point of view switch_to is just a slow
 * function call.
 *
 * FIRST DISPATCH:
 *
 * A brand-new thread has never called switch_to, so its creator
 * fabricates the state switch_to expects: the thread's stack holds a
 * single word - the address of thread_entry - and the context's R12/R13
 * carry the thread function and its argument (callee-saved registers
 * are the only ones that survive the switch, which is exactly why they
 * are used for the handoff). The first switch "returns" into
 * thread_entry, which moves the handoff into argument registers and
 * enters the portable thread shim.
 */

use crate::scheduler::thread::kernel_thread;

/// Callee-saved execution state of a suspended thread.
///
/// Field order is load-bearing: the offsets are hard-coded in the
/// assembly below.
#[derive(Debug, Default)]
#[repr(C)]
pub struct Context {
    rsp: u64,
    rbx: u64,
    rbp: u64,
    r12: u64,
    r13: u64,
    r14: u64,
    r15: u64,
}

impl Context {
    pub const fn zeroed() -> Self {
        Self {
            rsp: 0,
            rbx: 0,
            rbp: 0,
            r12: 0,
            r13: 0,
            r14: 0,
            r15: 0,
        }
    }

    /// Fabricates the initial context for a thread that has never run.
    ///
    /// `stack_top` must be the exclusive upper bound of the thread's
    /// stack, 16-byte aligned. The word below it receives the address
    /// of `thread_entry` so the first switch lands there; `function`
    /// and `aux` ride in R12/R13.
    ///
    /// # Safety
    /// `stack_top` must point just past writable memory owned by the
    /// new thread.
    pub unsafe fn prepare(stack_top: *mut u8, function: usize, aux: usize) -> Self {
        let slot = stack_top.wrapping_sub(8) as *mut u64;
        unsafe { slot.write(thread_entry as usize as u64) };
        Self {
            rsp: slot as u64,
            r12: function as u64,
            r13: aux as u64,
            ..Self::zeroed()
        }
    }
}

/// Suspends the calling thread into `out` and resumes the thread whose
/// state is in `in_ctx`. Returns when some other thread switches back.
///
/// # Safety
/// Must be called with interrupts disabled. `out` and `in_ctx` must
/// point to distinct, live Context values; `in_ctx` must describe a
/// stack that is not currently executing.
#[unsafe(naked)]
pub unsafe extern "C" fn switch_to(out: *mut Context, in_ctx: *const Context) {
    core::arch::naked_asm!(
        // Save outgoing thread. RSP still includes our return address,
        // so the eventual ret below (in some later switch back into
        // this thread) resumes at our caller.
        "mov [rdi + 0x00], rsp",
        "mov [rdi + 0x08], rbx",
        "mov [rdi + 0x10], rbp",
        "mov [rdi + 0x18], r12",
        "mov [rdi + 0x20], r13",
        "mov [rdi + 0x28], r14",
        "mov [rdi + 0x30], r15",
        // Restore incoming thread.
        "mov rsp, [rsi + 0x00]",
        "mov rbx, [rsi + 0x08]",
        "mov rbp, [rsi + 0x10]",
        "mov r12, [rsi + 0x18]",
        "mov r13, [rsi + 0x20]",
        "mov r14, [rsi + 0x28]",
        "mov r15, [rsi + 0x30]",
        // Pops the incoming thread's saved return address.
        "ret",
    )
}

/// First-dispatch landing pad for new threads.
///
/// Entered via the ret in switch_to with R12 = thread function and
/// R13 = argument (installed by Context::prepare). Moves them into the
/// argument registers and calls the portable shim; the call also fixes
/// stack alignment to what the ABI promises a function entry.
#[unsafe(naked)]
unsafe extern "C" fn thread_entry() {
    core::arch::naked_asm!(
        "mov rdi, r12",
        "mov rsi, r13",
        "call {shim}",
        // The shim never returns.
        "ud2",
        shim = sym kernel_thread,
    )
}
