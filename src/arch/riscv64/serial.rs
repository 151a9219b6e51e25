//! Console output on RISC-V: routed through the SBI firmware's legacy
//! console service rather than direct UART MMIO, matching QEMU `virt`'s
//! OpenSBI firmware and real board firmware alike.

use core::sync::atomic::{AtomicU64, Ordering};

static BASE: AtomicU64 = AtomicU64::new(0);

/// No-op: SBI console output has no discoverable MMIO base to override.
/// Present only for HAL surface parity with the AArch64 PL011 backend.
pub fn set_base(addr: u64) {
    BASE.store(addr, Ordering::Relaxed);
}

pub fn putc(byte: u8) {
    super::sbi::console_putchar(byte);
}
