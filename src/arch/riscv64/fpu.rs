//! F/D register-file ownership.
//!
//! Grounded in the teacher's `riscv::context::init_fpu`, adapted from a
//! privileged `mstatus` write to the S-mode-accessible `sstatus` FS field.
//! As on AArch64, this kernel never runs userspace and never preempts
//! mid-FPU-use, so there is no save/restore path to speak of -- this just
//! keeps the FPU from trapping on a stray compiler-emitted FP instruction.

use core::arch::asm;

const SSTATUS_FS_DIRTY: u64 = 0b11 << 13;

pub fn on_context_switch(_hart: u32) {
    // SAFETY: setting the FS field in sstatus only changes FPU trap
    // behavior on this hart.
    unsafe { asm!("csrrs x0, sstatus, {0}", in(reg) SSTATUS_FS_DIRTY) };
}

pub fn on_thread_exit(_hart: u32) {}
