/*
 * Programmable Interval Timer (8253/8254)
 *
 * The PIT is the preemption clock. Channel 0 is programmed as a square
 * wave whose rising edge raises IRQ0; the divisor scales the 1.19 MHz
 * base oscillator down to the kernel's tick frequency.
 */

use x86_64::instructions::port::Port;

/// PIT base oscillator frequency in Hz.
const PIT_BASE_HZ: u32 = 1_193_182;

const CHANNEL0_PORT: u16 = 0x40;
const COMMAND_PORT: u16 = 0x43;

/// Program channel 0 to fire IRQ0 at `frequency_hz`.
pub fn init(frequency_hz: u32) {
    let divisor = (PIT_BASE_HZ / frequency_hz) as u16;

    log::info!(
        "Programming PIT channel 0 for {} Hz ticks (divisor {})",
        frequency_hz,
        divisor
    );

    unsafe {
        let mut command = Port::<u8>::new(COMMAND_PORT);
        let mut channel0 = Port::<u8>::new(CHANNEL0_PORT);

        // 0x36: select channel 0, expect the divisor as low byte then
        // high byte, square-wave mode, binary counting.
        command.write(0x36);
        channel0.write((divisor & 0xFF) as u8);
        channel0.write((divisor >> 8) as u8);
    }
}
