//! Kernel-wide recoverable error type (spec.md §7).
//!
//! One flat enum, struct-like variants carrying the context needed for a
//! useful panic/log message, following the teacher's `error.rs` shape
//! trimmed to exactly the recoverable errors this core can produce. The
//! unrecoverable tier (double-free, corrupted slab metadata, recursive
//! spinlock acquire, ...) never returns through this type — those call
//! `panic!` directly at the point of detection.

use core::fmt;

use crate::arch::MmuError;
use crate::mm::slab::KmallocError;
use crate::mm::pmm::PmmInitError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "kernel errors must be handled, not silently discarded"]
pub enum KernelError {
    OutOfMemory { requested: usize, available: usize },
    Mmu(MmuError),
    Kmalloc(KmallocError),
    PmmInit(PmmInitError),
    BadDtb,
    DtbTooLarge { size: usize, max: usize },
    ZeroTimerFrequency,
}

pub type KernelResult<T> = Result<T, KernelError>;

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfMemory { requested, available } => {
                write!(f, "out of memory: requested {} bytes, {} available", requested, available)
            }
            Self::Mmu(e) => write!(f, "page-table error: {:?}", e),
            Self::Kmalloc(e) => write!(f, "kmalloc error: {:?}", e),
            Self::PmmInit(e) => write!(f, "PMM init error: {:?}", e),
            Self::BadDtb => write!(f, "device-tree blob failed validation"),
            Self::DtbTooLarge { size, max } => {
                write!(f, "device-tree blob too large: {} bytes (max {})", size, max)
            }
            Self::ZeroTimerFrequency => write!(f, "timer frequency is zero at clock init"),
        }
    }
}

impl From<MmuError> for KernelError {
    fn from(e: MmuError) -> Self {
        Self::Mmu(e)
    }
}

impl From<KmallocError> for KernelError {
    fn from(e: KmallocError) -> Self {
        Self::Kmalloc(e)
    }
}

impl From<PmmInitError> for KernelError {
    fn from(e: PmmInitError) -> Self {
        Self::PmmInit(e)
    }
}
