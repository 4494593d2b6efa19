/*
 * Device Drivers
 *
 * TERN drives exactly two devices: the 16550 UART used as the logging
 * console (here) and the PIT preemption clock (under arch, because it
 * is wired directly into the interrupt plumbing).
 */

pub mod serial;
