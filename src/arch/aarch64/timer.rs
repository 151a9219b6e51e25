//! ARM generic timer (CNTP) driver.
//!
//! Grounded in the teacher's `arch::aarch64::timer`, replacing its
//! millisecond-granularity `setup_timer` with the clock module's (C11)
//! absolute-deadline model: the clock core computes the next tick deadline
//! in ticks and calls [`set_deadline`], never a relative interval.

use core::arch::asm;

fn read_cntfrq() -> u64 {
    let val: u64;
    // SAFETY: CNTFRQ_EL0 is a read-only system register, readable from EL1.
    unsafe { asm!("mrs {}, cntfrq_el0", out(reg) val) };
    val
}

/// Current physical counter value.
pub fn now() -> u64 {
    let val: u64;
    // SAFETY: CNTPCT_EL0 is a read-only system register, readable from EL1.
    unsafe { asm!("mrs {}, cntpct_el0", out(reg) val) };
    val
}

/// Counter frequency in Hz, as reported by the hardware at reset. Falls
/// back to `62.5MHz`, QEMU `virt`'s default, if the register reads zero
/// (some emulators leave it unprogrammed until firmware sets it).
pub fn frequency() -> u64 {
    let hw = read_cntfrq();
    if hw != 0 {
        hw
    } else {
        62_500_000
    }
}

/// Programs the physical timer to fire at the given absolute counter value
/// and unmasks it. Called from trap context and from the clock core; both
/// callers already hold whatever serialization they need, so this performs
/// no locking of its own.
pub fn set_deadline(absolute_ticks: u64) {
    // SAFETY: CNTP_CVAL_EL0/CNTP_CTL_EL0 are EL1-accessible system
    // registers; writing them only affects this CPU's own timer.
    unsafe {
        asm!("msr cntp_cval_el0, {}", in(reg) absolute_ticks);
        asm!("msr cntp_ctl_el0, {}", in(reg) 1u64);
    }
}

/// Masks the timer, brings up the GIC distributor/CPU interface, and
/// enables the timer PPI. Idempotent.
pub fn init() {
    // SAFETY: writing 0 to CNTP_CTL_EL0 disables the timer output without
    // otherwise affecting CPU state.
    unsafe { asm!("msr cntp_ctl_el0, {}", in(reg) 0u64) };
    super::gic::init();
}

pub fn ticks_to_ns(ticks: u64) -> u64 {
    let freq = frequency().max(1);
    (ticks as u128 * 1_000_000_000 / freq as u128) as u64
}

pub fn ns_to_ticks(ns: u64) -> u64 {
    let freq = frequency().max(1);
    (ns as u128 * freq as u128 / 1_000_000_000) as u64
}
