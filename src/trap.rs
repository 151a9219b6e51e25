//! Architecture-independent trap core (spec.md §4.10).
//!
//! Each architecture's entry assembly builds a concrete, arch-specific
//! frame, classifies the cause into a neutral [`crate::arch::TrapKind`],
//! and calls [`dispatch`] here with both. `dispatch` is generic over the
//! frame type instead of a trait object — there is exactly one concrete
//! frame per build (whichever architecture is selected), so static
//! dispatch costs nothing and keeps the frame's accessors inlinable.
//!
//! Only the timer tick and external IRQs are real traffic in this core;
//! every other [`TrapKind`] has no legitimate source with no userspace in
//! scope, so reaching one is an unrecoverable kernel bug (spec.md §7).

use crate::arch::{TrapInfo, TrapKind};

/// Read/write view over an architecture's trap frame, per spec.md §4.10's
/// syscall ABI: six argument registers (`arg(0..=5)`) plus one
/// syscall-number register, pinned exactly that wide per the open
/// question in spec.md §9 (no sixth-vs-eighth-slot ambiguity).
pub trait TrapFrame {
    fn pc(&self) -> u64;
    fn set_pc(&mut self, pc: u64);
    fn arg(&self, n: usize) -> u64;
    fn syscall_number(&self) -> u64;
    fn set_return(&mut self, value: u64);
}

/// Outcome of a single handler, per spec.md §4.10.
pub enum TrapResult {
    Handled,
    HandledModified,
    Panic(&'static str),
}

/// Called by every architecture's trap entry with the frame it just saved
/// on the current kernel stack and the classified cause. Runs the matching
/// handler, then — before the assembly trampoline restores the frame —
/// consults the preemption hook, matching the ordering spec.md §4.10
/// requires (frame lives on the current thread's own kernel stack, so a
/// context switch here still finds the right frame to resume into later).
pub fn dispatch<F: TrapFrame>(frame: &mut F, info: TrapInfo) {
    let result = match info.kind {
        TrapKind::TimerIrq => {
            crate::clock::on_timer_interrupt();
            TrapResult::Handled
        }
        TrapKind::ExternalIrq => {
            log::warn!("unhandled external irq {}", info.aux);
            TrapResult::Handled
        }
        TrapKind::SoftwareIrq => TrapResult::Handled,
        TrapKind::Syscall => handle_syscall(frame),
        TrapKind::PageFault => TrapResult::Panic("page fault"),
        TrapKind::AlignmentFault => TrapResult::Panic("alignment fault"),
        TrapKind::IllegalInstruction => TrapResult::Panic("illegal instruction"),
        TrapKind::Breakpoint => TrapResult::Panic("breakpoint"),
        TrapKind::Unknown => TrapResult::Panic("unclassified trap"),
    };

    if let TrapResult::Panic(what) = result {
        panic!("unhandled trap: {} at pc={:#x} aux={:#x}", what, frame.pc(), info.aux);
    }

    crate::sched::preempt_from_trap();
}

/// No syscall table exists in this core — there is no userspace to issue
/// one from (spec.md §1 Non-goals) — so reaching this path at all means a
/// kernel thread executed `ecall`, which is a bug rather than a request to
/// service.
fn handle_syscall<F: TrapFrame>(frame: &mut F) -> TrapResult {
    log::error!("unexpected syscall {} (arg0={:#x})", frame.syscall_number(), frame.arg(0));
    TrapResult::Panic("syscall with no userspace")
}
