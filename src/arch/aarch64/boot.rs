//! Entry point and the physical-to-virtual handoff (spec.md §6 external
//! ABI: `x0` holds the DTB's physical address, EL1, MMU off, interrupts
//! masked).
//!
//! Grounded in the teacher's `boot.rs`/`boot.S` split, replacing its
//! hardcoded UART startup bytes with a real stack/BSS bring-up and the
//! absolute-address branch real higher-half kernels (Linux's `head.S`
//! included) use to cross from physical to virtual execution: early code
//! only ever uses PC-relative `adrp`/`add`, which resolves correctly no
//! matter which address the CPU is actually fetching from, but the final
//! jump into phase two needs a real absolute address, loaded a 16-bit
//! chunk at a time via `movz`/`movk`.

use core::arch::global_asm;

use crate::arch::PhysAddr;

global_asm!(
    r#"
.section .text._start
.global _start
_start:
    mov x19, x0

    adrp x1, __boot_stack_top
    add x1, x1, :lo12:__boot_stack_top
    mov sp, x1

    adrp x1, __bss_start
    add x1, x1, :lo12:__bss_start
    adrp x2, __bss_end
    add x2, x2, :lo12:__bss_end
1:
    cmp x1, x2
    b.ge 2f
    str xzr, [x1], #8
    b 1b
2:
    mov x0, x19
    bl bullfinch_phase1_entry

    movz x0, #:abs_g3:bullfinch_phase2_entry
    movk x0, #:abs_g2_nc:bullfinch_phase2_entry
    movk x0, #:abs_g1_nc:bullfinch_phase2_entry
    movk x0, #:abs_g0_nc:bullfinch_phase2_entry
    br x0
"#
);

/// Runs entirely with the MMU off and the identity mapping of DRAM as the
/// only address space there is. Everything it calls must stick to
/// PC-relative addressing, which is why the physical-mode stages (uart,
/// trap, mmu) come first and enable translation last.
#[no_mangle]
extern "C" fn bullfinch_phase1_entry(dtb_phys: u64) {
    crate::bootstrap::phase1(PhysAddr::new(dtb_phys));
}

/// First function to run with the MMU on and the program counter in the
/// kernel's higher-half virtual range.
#[no_mangle]
extern "C" fn bullfinch_phase2_entry() -> ! {
    crate::bootstrap::phase2()
}
