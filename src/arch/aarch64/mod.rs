//! AArch64 (ARMv8-A) architecture backend.

pub mod boot;
pub mod context;
pub mod cpu;
pub mod entropy;
pub mod fpu;
pub mod gic;
pub mod mmu;
pub mod serial;
pub mod timer;
pub mod trap;
