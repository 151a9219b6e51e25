//! Timer-jitter entropy for kmalloc's free-list pointer salt (C8).
//!
//! Grounded in the teacher's architecture-independent
//! `entropy::collect_timer_entropy`, collapsed to a single mixed `u64` and
//! seeded from the `rdcycle` counter instead of a generic timestamp read.

use core::arch::asm;

fn read_cycle() -> u64 {
    let val: u64;
    // SAFETY: rdcycle is a read-only performance-counter read, always
    // available (and, on S-mode, gated by `mcounteren` which OpenSBI sets).
    unsafe { asm!("rdcycle {}", out(reg) val) };
    val
}

pub fn collect_mixed(addr_hint: u64) -> u64 {
    let t1 = read_cycle();
    let mut work = t1 ^ addr_hint;
    for _ in 0..37 {
        work = work.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
    }
    let t2 = read_cycle();
    work ^ t2
}
