//! Virtual memory subsystem: physical memory management, the slab-backed
//! kernel allocator, and the kernel-stack carve-out. The boot orchestrator
//! drives these in a fixed order — PMM before the slab allocator, both
//! before the first thread's kernel stack is requested.

pub mod pmm;
pub mod slab;
pub mod vmm;
