//! RISC-V RV64GC architecture backend.
//!
//! Mirrors [`super::aarch64`]'s module shape: boot entry, context switch,
//! per-hart id, FPU ownership, entropy, MMU, timer, and trap all live
//! here, each presenting the same free-function surface `crate::arch`
//! re-exports as `current::*`. `sbi` and `plic` are RISC-V-only support
//! modules with no AArch64 counterpart (SBI console/timer services, the
//! platform-level interrupt controller).

pub mod boot;
pub mod context;
pub mod cpu;
pub mod entropy;
pub mod fpu;
pub mod mmu;
pub mod plic;
pub mod sbi;
pub mod serial;
pub mod timer;
pub mod trap;
