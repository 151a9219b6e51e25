//! Entry point and the physical-to-virtual handoff (spec.md §6 external
//! ABI: `a0` holds the hart id, `a1` the DTB's physical address. The
//! kernel runs in S-mode under OpenSBI, which occupies the first 2 MiB of
//! DRAM, so `kernel_phys_load = DRAM_BASE + 2 MiB`).
//!
//! Grounded in the same physical-to-virtual crossing `arch::aarch64::boot`
//! implements, re-expressed for RISC-V: early code (stack, BSS, the call
//! into phase one) sticks to `la`'s PC-relative addressing, which resolves
//! consistently whichever domain the program counter is actually in. The
//! final jump into phase two cannot use that trick — it must land on the
//! higher-half virtual alias of `bullfinch_phase2_entry` once `satp` is
//! live, not the physical address PC-relative addressing would still
//! yield — so it loads an absolute 64-bit link-time address out of a
//! literal pool instead.

use core::arch::global_asm;

use crate::arch::PhysAddr;

global_asm!(
    r#"
.section .text._start
.global _start
_start:
    mv s1, a0
    mv s2, a1

    la sp, __boot_stack_top

    la t0, __bss_start
    la t1, __bss_end
1:
    bgeu t0, t1, 2f
    sd x0, 0(t0)
    addi t0, t0, 8
    j 1b
2:
    mv a0, s1
    mv a1, s2
    call bullfinch_phase1_entry

    la t0, 3f
    ld t0, 0(t0)
    jr t0
.align 3
3:
    .quad bullfinch_phase2_entry
"#
);

/// Runs entirely with paging off and the identity mapping of DRAM as the
/// only address space there is. `set_boot_hart_id` caches the hart id in
/// a global since S-mode code cannot read `mhartid` itself.
#[no_mangle]
extern "C" fn bullfinch_phase1_entry(hart_id: u64, dtb_phys: u64) {
    super::cpu::set_boot_hart_id(hart_id as u32);
    crate::bootstrap::phase1(PhysAddr::new(dtb_phys));
}

/// First function to run with `satp` live and the program counter in the
/// kernel's higher-half virtual range.
#[no_mangle]
extern "C" fn bullfinch_phase2_entry() -> ! {
    crate::bootstrap::phase2()
}
