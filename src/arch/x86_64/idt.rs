/*
 * Interrupt Descriptor Table (IDT) Implementation
 *
 * The IDT tells the CPU where to dispatch exceptions and hardware
 * interrupts. TERN installs handlers for the CPU exceptions that
 * indicate kernel bugs (they log and halt - the kernel's error policy
 * is that invariant violations are fatal) and one hardware interrupt:
 * IRQ0, the periodic timer that drives preemptive scheduling.
 *
 * The timer entry is the only place where interrupt context touches
 * scheduler state, and it does so through exactly two operations: wake
 * due sleepers and request a deferred yield. The yield itself happens
 * at the tail of the handler, after the end-of-interrupt signal, once
 * the handler has left interrupt context - at that point the handler
 * is just kernel code running on the interrupted thread's stack, and
 * switching away from it is safe. The interrupted thread resumes by
 * finishing the handler and executing iretq whenever the scheduler
 * picks it again.
 */

use lazy_static::lazy_static;
use pic8259::ChainedPics;
use spin::Mutex;
use x86_64::structures::idt::{InterruptDescriptorTable, InterruptStackFrame, PageFaultErrorCode};

use super::interrupts;
use crate::scheduler;
use crate::utils::timer;

/// Vector base for the remapped master PIC. IRQ0..7 land on 32..39.
pub const PIC_1_OFFSET: u8 = 32;
/// Vector base for the remapped slave PIC. IRQ8..15 land on 40..47.
pub const PIC_2_OFFSET: u8 = PIC_1_OFFSET + 8;

/// Both 8259 PICs, remapped above the CPU exception range.
pub static PICS: Mutex<ChainedPics> =
    Mutex::new(unsafe { ChainedPics::new(PIC_1_OFFSET, PIC_2_OFFSET) });

/// Hardware interrupt vectors in use.
#[derive(Debug, Clone, Copy)]
#[repr(u8)]
pub enum InterruptIndex {
    Timer = PIC_1_OFFSET,
}

impl InterruptIndex {
    fn as_u8(self) -> u8 {
        self as u8
    }
}

lazy_static! {
    static ref IDT: InterruptDescriptorTable = {
        let mut idt = InterruptDescriptorTable::new();

        idt.divide_error.set_handler_fn(divide_error_handler);
        idt.breakpoint.set_handler_fn(breakpoint_handler);
        idt.invalid_opcode.set_handler_fn(invalid_opcode_handler);
        unsafe {
            idt.double_fault
                .set_handler_fn(double_fault_handler)
                .set_stack_index(super::gdt::DOUBLE_FAULT_IST_INDEX);
        }
        idt.general_protection_fault
            .set_handler_fn(general_protection_fault_handler);
        idt.page_fault.set_handler_fn(page_fault_handler);

        idt[InterruptIndex::Timer.as_u8()].set_handler_fn(timer_interrupt_handler);

        idt
    };
}

/// Load the IDT and bring up the PICs with every line masked except the
/// timer. Interrupts stay globally disabled; the scheduler enables them
/// once it is ready to be preempted.
pub fn init() {
    log::info!("Loading IDT...");
    IDT.load();

    unsafe {
        let mut pics = PICS.lock();
        pics.initialize();
        // Only IRQ0 (timer) unmasked; TERN has no other device drivers.
        pics.write_masks(0xFE, 0xFF);
    }
    log::info!("IDT loaded, PIC remapped, timer IRQ unmasked");
}

/// IRQ0: the scheduling clock.
///
/// Runs once per tick in interrupt context. Ordering here is load
/// bearing: the tick work runs inside the interrupt-context markers so
/// the scheduler can tell it must defer preemption; the EOI goes out
/// before any yield so the next tick can preempt whichever thread runs
/// next; and the yield - if one was requested - is the very last thing,
/// on behalf of the interrupted thread.
extern "x86-interrupt" fn timer_interrupt_handler(_stack_frame: InterruptStackFrame) {
    interrupts::enter_interrupt();
    timer::on_tick();
    unsafe {
        PICS.lock()
            .notify_end_of_interrupt(InterruptIndex::Timer.as_u8());
    }
    let yield_requested = interrupts::leave_interrupt();
    if yield_requested {
        scheduler::yield_now();
    }
}

// Exception handlers. The error policy is uniform: log and halt.
// An exception in ring-0-only code is a kernel bug, not a recoverable
// condition.

extern "x86-interrupt" fn divide_error_handler(stack_frame: InterruptStackFrame) {
    panic!("EXCEPTION: DIVIDE ERROR\n{:#?}", stack_frame);
}

extern "x86-interrupt" fn breakpoint_handler(stack_frame: InterruptStackFrame) {
    log::warn!("EXCEPTION: BREAKPOINT\n{:#?}", stack_frame);
}

extern "x86-interrupt" fn invalid_opcode_handler(stack_frame: InterruptStackFrame) {
    panic!("EXCEPTION: INVALID OPCODE\n{:#?}", stack_frame);
}

extern "x86-interrupt" fn double_fault_handler(
    stack_frame: InterruptStackFrame,
    _error_code: u64,
) -> ! {
    panic!("EXCEPTION: DOUBLE FAULT\n{:#?}", stack_frame);
}

extern "x86-interrupt" fn general_protection_fault_handler(
    stack_frame: InterruptStackFrame,
    error_code: u64,
) {
    panic!(
        "EXCEPTION: GENERAL PROTECTION FAULT (error code {:#x})\n{:#?}",
        error_code, stack_frame
    );
}

extern "x86-interrupt" fn page_fault_handler(
    stack_frame: InterruptStackFrame,
    error_code: PageFaultErrorCode,
) {
    use x86_64::registers::control::Cr2;
    panic!(
        "EXCEPTION: PAGE FAULT at {:?} ({:?})\n{:#?}",
        Cr2::read(),
        error_code,
        stack_frame
    );
}
