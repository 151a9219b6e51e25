//! RISC-V timer: the `time` CSR for `now()`, SBI `set_timer` for deadlines
//! since S-mode has no direct `mtimecmp` access.

use core::arch::asm;

fn read_time() -> u64 {
    let val: u64;
    // SAFETY: reading the `time` CSR is a read-only operation available to
    // S-mode whenever the `TM` bit in `mcounteren` is set, which OpenSBI
    // does by default.
    unsafe { asm!("rdtime {}", out(reg) val) };
    val
}

pub fn now() -> u64 {
    read_time()
}

/// QEMU `virt`'s CLINT runs the `time` CSR at 10 MHz; real hardware
/// advertises its own frequency via the device tree's `timebase-frequency`
/// property, captured into [`crate::hwinfo`] during C6.
pub fn frequency() -> u64 {
    10_000_000
}

pub fn set_deadline(absolute_ticks: u64) {
    super::sbi::set_timer(absolute_ticks);
}

/// Enables the supervisor timer interrupt line. Idempotent.
pub fn init() {
    const SIE_STIE: u64 = 1 << 5;
    // SAFETY: setting STIE in sie only unmasks the timer interrupt source;
    // it does not itself arm a deadline (set_deadline does that).
    unsafe { asm!("csrrs x0, sie, {0}", in(reg) SIE_STIE) };
}

pub fn ticks_to_ns(ticks: u64) -> u64 {
    let freq = frequency().max(1);
    (ticks as u128 * 1_000_000_000 / freq as u128) as u64
}

pub fn ns_to_ticks(ns: u64) -> u64 {
    let freq = frequency().max(1);
    (ns as u128 * freq as u128 / 1_000_000_000) as u64
}
