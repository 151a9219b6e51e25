//! Console output: `print!`/`println!` macros, a `log`-crate sink, and a
//! lock-free path for contexts where acquiring the console's ticket lock
//! would be unsafe (trap entry, the panic path).
//!
//! Grounded in the teacher's `print`/`serial` split: ordinary kernel code
//! goes through the locked path so concurrent writers interleave whole
//! lines, not bytes; trap and panic code call [`print_unsafe`] directly,
//! matching spec.md §5's rule that trap-context code must use lock-free
//! variants.

use core::fmt;

use crate::arch::current::serial;
use crate::sync::TicketLock;

struct Printer;

impl fmt::Write for Printer {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for byte in s.bytes() {
            serial::putc(byte);
        }
        Ok(())
    }
}

static CONSOLE_LOCK: TicketLock<()> = TicketLock::new(());

#[doc(hidden)]
pub fn _print(args: fmt::Arguments) {
    use fmt::Write;
    let _guard = CONSOLE_LOCK.guard();
    let _ = Printer.write_fmt(args);
}

/// Writes directly to the UART with no locking and no ordering guarantee
/// against a concurrent locked writer. Only safe to call from contexts
/// that can never be interrupted by, or interrupt, another writer holding
/// `CONSOLE_LOCK` indefinitely — the panic path (behind the one-shot panic
/// gate) and trap entry before any scheduler state is touched.
pub fn print_unsafe(args: fmt::Arguments) {
    use fmt::Write;
    let _ = Printer.write_fmt(args);
}

#[macro_export]
macro_rules! print {
    ($($arg:tt)*) => ($crate::print::_print(format_args!($($arg)*)));
}

#[macro_export]
macro_rules! println {
    () => ($crate::print!("\n"));
    ($($arg:tt)*) => ($crate::print!("{}\n", format_args!($($arg)*)));
}

/// `log`-crate facade over the same console sink, so ordinary kernel code
/// can use `log::info!`/`log::warn!`/`log::error!` instead of `println!`.
/// Staged boot messages (spec.md §4.13) deliberately bypass this — they are
/// a user-facing contract, not a diagnostic stream.
struct KernelLogger;

static LOGGER: KernelLogger = KernelLogger;

impl log::Log for KernelLogger {
    fn enabled(&self, _metadata: &log::Metadata) -> bool {
        true
    }

    fn log(&self, record: &log::Record) {
        _print(format_args!("[{:<5}] {}\n", record.level(), record.args()));
    }

    fn flush(&self) {}
}

/// Installs the kernel logger as the `log` crate's global sink. Idempotent
/// from `log`'s point of view (a second call returns an error that this
/// function swallows, since the boot orchestrator only ever calls it once
/// per phase and either call is harmless to repeat).
pub fn init_logger() {
    let _ = log::set_logger(&LOGGER).map(|()| log::set_max_level(log::LevelFilter::Trace));
}

/// Staged boot banner: `[NN/TT] name<pad> message`, per spec.md §4.13.
pub fn stage_line(stage: u32, total: u32, name: &str, name_width: usize, message: &str) {
    _print(format_args!("[{:02}/{:02}] {:<width$} {}\n", stage, total, name, message, width = name_width));
}
