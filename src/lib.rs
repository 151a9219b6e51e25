//! Bullfinch — a small educational microkernel for ARMv8-A and RISC-V
//! RV64GC.
//!
//! Mirrors the teacher's crate root: a `#![no_std]` library holding every
//! subsystem, with a thin `main.rs` binary crate over it for the bare-metal
//! target. Firmware hands off directly to the architecture's `_start`
//! (`arch::<target>::boot`), which always runs the real boot sequence —
//! there is no separate on-device test entry point to hook a custom test
//! framework into, so architecture-independent components are instead unit
//! tested under `#[cfg(test)]` on the host target (spec.md's A.4 ambient
//! convention), and the real boot path is end-to-end verified by the
//! `boot_smoke` integration test driving QEMU from outside.

#![no_std]
#![cfg_attr(all(target_os = "none", feature = "alloc"), feature(alloc_error_handler))]

#[cfg(feature = "alloc")]
extern crate alloc;

#[cfg(not(target_os = "none"))]
extern crate std;

use core::panic::PanicInfo;

#[cfg(all(target_os = "none", feature = "alloc"))]
use linked_list_allocator::LockedHeap;

/// Bare-metal static heap backing the `alloc::*` global allocator. Sized at
/// 4 MiB — comfortably more than this core's own `Vec`/`String`/`format!`
/// use (hardware-info formatting, boot stage messages) ever needs; the
/// kernel's own fixed-size-class allocations (TCBs, PCBs) go through
/// `mm::slab` instead and never touch this heap.
#[cfg(all(target_os = "none", feature = "alloc"))]
const HEAP_SIZE: usize = 4 * 1024 * 1024;
#[cfg(all(target_os = "none", feature = "alloc"))]
static mut HEAP: [u8; HEAP_SIZE] = [0; HEAP_SIZE];

#[cfg(all(target_os = "none", feature = "alloc"))]
#[global_allocator]
static ALLOCATOR: LockedHeap = LockedHeap::empty();

/// Initializes the bare-metal heap. Must run exactly once, before the first
/// `alloc::*` use — called from [`bootstrap::phase2`] alongside the other
/// one-time subsystem bring-up.
#[cfg(all(target_os = "none", feature = "alloc"))]
pub fn init_heap() {
    // SAFETY: runs once, before any other code touches `HEAP` or allocates;
    // `HEAP`'s address and length are both valid for the allocator's whole
    // lifetime.
    unsafe {
        let ptr = core::ptr::addr_of_mut!(HEAP) as *mut u8;
        ALLOCATOR.lock().init(ptr, HEAP_SIZE);
    }
}

/// Host/test target: delegate to the system allocator so `#[cfg(test)]`
/// code using `Vec`/`String`/`format!` compiles and runs under `cargo test`
/// without needing the bare-metal heap at all.
#[cfg(not(target_os = "none"))]
#[global_allocator]
static SYSTEM_ALLOCATOR: std::alloc::System = std::alloc::System;

#[macro_use]
pub mod print;

pub mod arch;
pub mod backtrace;
pub mod bootstrap;
pub mod clock;
pub mod error;
pub mod fdt;
pub mod hwinfo;
pub mod list;
pub mod mm;
pub mod rbtree;
pub mod sched;
pub mod sync;
pub mod trace;
pub mod trap;
pub mod version;

/// Panic-reentrancy gate (spec.md §7: "a one-shot flag (C3 `Once`) prevents
/// double-panic from reentering the panic path").
static PANIC_GATE: sync::Once = sync::Once::new();

#[cfg(target_os = "none")]
#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    if !PANIC_GATE.try_once() {
        // Already unwinding a panic; don't touch the console or walk the
        // stack again, just stop.
        arch::current::cpu::halt();
    }

    print::print_unsafe(format_args!("[PANIC] Panic: {}\n", info));

    let mut frame = 0;
    backtrace::walk(|ra| {
        print::print_unsafe(format_args!("  #{} {:#018x}\n", frame, ra));
        frame += 1;
    });

    let cpu = arch::current::cpu::current_id() as usize;
    trace::dump(cpu, |tick, tag, value| {
        print::print_unsafe(format_args!("  trace: tick={} tag={} value={:#x}\n", tick, tag, value));
    });

    arch::current::cpu::halt();
}

#[cfg(all(target_os = "none", feature = "alloc"))]
#[alloc_error_handler]
fn alloc_error_handler(layout: core::alloc::Layout) -> ! {
    panic!("allocation error: {:?}", layout);
}
