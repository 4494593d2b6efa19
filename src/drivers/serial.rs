/*
 * Serial Communication Driver
 *
 * Minimal 16550 UART driver for the COM1 port, used as the kernel's
 * logging console. Output-only: TERN has no interactive input path.
 *
 * The port must be initialized before the first log line is emitted;
 * main calls init() as its very first step.
 */

use core::fmt;

use bitflags::bitflags;
use spin::Mutex;
use x86_64::instructions::port::Port;

bitflags! {
    /// Line status register flags.
    struct LineStsFlags: u8 {
        const INPUT_FULL = 1;
        const OUTPUT_EMPTY = 1 << 5;
    }
}

/// Register block of a 16550-compatible UART.
pub struct SerialPort {
    data: Port<u8>,
    int_en: Port<u8>,
    fifo_ctrl: Port<u8>,
    line_ctrl: Port<u8>,
    modem_ctrl: Port<u8>,
    line_sts: Port<u8>,
}

impl SerialPort {
    /// Creates a serial port handle for the UART at `base`.
    pub const fn new(base: u16) -> Self {
        Self {
            data: Port::new(base),
            int_en: Port::new(base + 1),
            fifo_ctrl: Port::new(base + 2),
            line_ctrl: Port::new(base + 3),
            modem_ctrl: Port::new(base + 4),
            line_sts: Port::new(base + 5),
        }
    }

    /// Initializes the UART: 38400 baud, 8N1, FIFOs on, interrupts off
    /// (the driver polls the line status register instead).
    pub fn init(&mut self) {
        unsafe {
            self.int_en.write(0x00);
            self.line_ctrl.write(0x80); // enable DLAB
            self.data.write(0x03); // divisor low byte (38400 baud)
            self.int_en.write(0x00); // divisor high byte
            self.line_ctrl.write(0x03); // 8 bits, no parity, one stop bit
            self.fifo_ctrl.write(0xC7); // enable FIFO, clear, 14-byte threshold
            self.modem_ctrl.write(0x0B); // RTS/DSR set
        }
    }

    fn line_sts(&mut self) -> LineStsFlags {
        LineStsFlags::from_bits_truncate(unsafe { self.line_sts.read() })
    }

    /// Sends one byte, busy-waiting for transmitter space.
    pub fn send(&mut self, byte: u8) {
        while !self.line_sts().contains(LineStsFlags::OUTPUT_EMPTY) {
            core::hint::spin_loop();
        }
        unsafe { self.data.write(byte) };
    }
}

impl fmt::Write for SerialPort {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for byte in s.bytes() {
            self.send(byte);
        }
        Ok(())
    }
}

/// Mutex-protected static instance of the COM1 serial port.
pub static COM1: Mutex<SerialPort> = Mutex::new(SerialPort::new(0x3F8));

/// Initializes the logging console (COM1).
///
/// Must be called early in the boot process, before any logging occurs.
pub fn init() {
    COM1.lock().init();
}

#[doc(hidden)]
pub fn _print(args: fmt::Arguments) {
    use core::fmt::Write;
    // The console is shared with interrupt-context log lines; taking the
    // lock with interrupts disabled keeps a tick from deadlocking on a
    // half-written line.
    crate::arch::x86_64::interrupts::without_interrupts(|| {
        COM1.lock().write_fmt(args).expect("serial write failed");
    });
}

/// Prints to the serial console.
#[macro_export]
macro_rules! serial_print {
    ($($arg:tt)*) => {
        $crate::drivers::serial::_print(format_args!($($arg)*))
    };
}

/// Prints to the serial console, with a trailing newline.
#[macro_export]
macro_rules! serial_println {
    () => ($crate::serial_print!("\n"));
    ($fmt:expr) => ($crate::serial_print!(concat!($fmt, "\n")));
    ($fmt:expr, $($arg:tt)*) => ($crate::serial_print!(concat!($fmt, "\n"), $($arg)*));
}
