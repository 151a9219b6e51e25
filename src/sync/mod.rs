//! Synchronization primitives: ticket spinlocks and a one-shot flag.
//!
//! Every lock whose critical section can be entered from an interrupt
//! handler must be acquired through [`TicketLock::guard`], which disables
//! interrupts first and restores them on release — this applies to every
//! lock in the kernel (spec.md §5).

mod once;
mod ticket;

pub use once::Once;
pub use ticket::{TicketLock, TicketLockGuard};
