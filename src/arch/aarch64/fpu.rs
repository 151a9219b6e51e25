//! NEON/FP register ownership.
//!
//! Grounded in the teacher's `context::init_fpu`/`enable_sve`. This kernel
//! never runs userspace (Non-goal) and the scheduler never touches FPU
//! state on a context switch; FPU access is enabled once per CPU at boot
//! purely so a stray compiler-generated NEON instruction in `core`'s
//! `memcpy`/`memset` lowering does not trap.

use core::arch::asm;

/// Enables EL1 access to the FP/NEON register file. Called once per CPU
/// during the physical-mode boot stage, before any floating-point-capable
/// code can run.
pub fn on_context_switch(_cpu: u32) {
    // SAFETY: CPACR_EL1 is an EL1-writable system register; setting FPEN
    // only affects trap behavior for FP/NEON instructions on this CPU.
    unsafe {
        asm!(
            "mrs x9, cpacr_el1",
            "orr x9, x9, #(0x3 << 20)",
            "msr cpacr_el1, x9",
            "isb",
            out("x9") _,
        );
    }
}

pub fn on_thread_exit(_cpu: u32) {}
