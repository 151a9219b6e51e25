//! Timer-jitter entropy for kmalloc's free-list pointer salt (C8).
//!
//! Grounded in the teacher's architecture-independent `entropy::
//! collect_timer_entropy`, collapsed to the single `u64` the slab allocator
//! asks for and seeded with `cntvct_el0` instead of a generic cycle
//! counter read.

use core::arch::asm;

fn read_cntvct() -> u64 {
    let val: u64;
    // SAFETY: CNTVCT_EL0 is a read-only system register, readable at EL1.
    unsafe { asm!("mrs {}, cntvct_el0", out(reg) val) };
    val
}

/// Mixes the virtual counter with a caller-supplied hint (typically a
/// slab's own address, to decorrelate pools seeded in the same tick).
pub fn collect_mixed(addr_hint: u64) -> u64 {
    let t1 = read_cntvct();
    let mut work = t1 ^ addr_hint;
    for _ in 0..37 {
        work = work.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
    }
    let t2 = read_cntvct();
    work ^ t2
}
