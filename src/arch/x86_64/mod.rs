/*
 * x86_64 Architecture Support
 *
 * CPU bring-up and low-level glue for the x86_64 target:
 *
 * - gdt: Global Descriptor Table and TSS (double-fault stack)
 * - idt: Interrupt Descriptor Table, exception handlers, IRQ0 timer entry
 * - interrupts: interrupt-flag control, RAII guard, deferred-yield flag
 * - pit: 8253/8254 programmable interval timer (the preemption clock)
 * - context: kernel context switch primitive and first-dispatch trampoline
 */

pub mod context;
pub mod gdt;
pub mod idt;
pub mod interrupts;
pub mod pit;
