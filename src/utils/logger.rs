/*
 * Kernel Logging System
 *
 * Routes the `log` crate's macros to the serial console. Every kernel
 * subsystem logs through `log::info!` and friends; this module is the
 * single place deciding where those lines go and which levels are
 * emitted.
 */

use log::{Level, LevelFilter, Metadata, Record};

use crate::serial_println;

/// Logger implementation writing to the serial console.
struct SerialLogger;

impl log::Log for SerialLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= Level::Info
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            serial_println!("[{}] {}", record.level(), record.args());
        }
    }

    fn flush(&self) {}
}

static LOGGER: SerialLogger = SerialLogger;

/// Installs the logger.
///
/// # Panics
///
/// Panics if a logger has already been installed; called exactly once
/// from main, right after the serial console comes up.
pub fn init() {
    let result = log::set_logger(&LOGGER).map(|()| log::set_max_level(LevelFilter::Info));
    match result {
        Ok(_) => serial_println!("Logger initialized correctly"),
        Err(err) => panic!("Error with initializing logger: {}", err),
    }
}
