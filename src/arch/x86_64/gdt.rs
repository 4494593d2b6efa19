/*
 * Global Descriptor Table (GDT) Implementation
 *
 * The GDT defines the memory segments the CPU can reference. TERN runs
 * entirely in ring 0 with a flat address space, so the table is small:
 * a kernel code segment, a kernel data segment, and a Task State
 * Segment.
 *
 * The TSS matters even without user mode because of its Interrupt
 * Stack Table: a double fault must run on a known-good stack. Kernel
 * thread stacks share a 4 KiB page with their control block, and the
 * stack-overflow failure mode is exactly the one that corrupts the
 * current stack - without a dedicated IST stack, a blown thread stack
 * would escalate a diagnosable double fault into a silent triple-fault
 * reset.
 */

use lazy_static::lazy_static;
use x86_64::VirtAddr;
use x86_64::instructions::segmentation::{CS, DS, ES, SS, Segment};
use x86_64::instructions::tables::load_tss;
use x86_64::structures::gdt::{Descriptor, GlobalDescriptorTable, SegmentSelector};
use x86_64::structures::tss::TaskStateSegment;

/// IST slot used by the double-fault handler.
pub const DOUBLE_FAULT_IST_INDEX: u16 = 0;

const IST_STACK_SIZE: usize = 4096 * 4;

lazy_static! {
    static ref TSS: TaskStateSegment = {
        let mut tss = TaskStateSegment::new();
        tss.interrupt_stack_table[DOUBLE_FAULT_IST_INDEX as usize] = {
            // Static stack for the double-fault handler. Never reentered:
            // a fault inside the handler is a triple fault anyway.
            static mut IST_STACK: [u8; IST_STACK_SIZE] = [0; IST_STACK_SIZE];

            let start = VirtAddr::from_ptr(&raw const IST_STACK);
            start + IST_STACK_SIZE as u64
        };
        tss
    };
    static ref GDT: (GlobalDescriptorTable, Selectors) = {
        let mut gdt = GlobalDescriptorTable::new();
        let code = gdt.append(Descriptor::kernel_code_segment());
        let data = gdt.append(Descriptor::kernel_data_segment());
        let tss = gdt.append(Descriptor::tss_segment(&TSS));
        (gdt, Selectors { code, data, tss })
    };
}

struct Selectors {
    code: SegmentSelector,
    data: SegmentSelector,
    tss: SegmentSelector,
}

/// Load the GDT and reload every segment register.
///
/// Must run before the IDT is loaded: the IDT entries reference the
/// kernel code selector established here.
pub fn init() {
    log::info!("Loading GDT...");
    GDT.0.load();
    unsafe {
        CS::set_reg(GDT.1.code);
        DS::set_reg(GDT.1.data);
        ES::set_reg(GDT.1.data);
        SS::set_reg(GDT.1.data);
        load_tss(GDT.1.tss);
    }
    log::info!("GDT loaded successfully");
}
