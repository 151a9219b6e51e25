//! SiFive Platform-Level Interrupt Controller driver for QEMU `virt`.
//!
//! Grounded in the teacher's `riscv::plic`, trimmed of its `KernelError`
//! variants this crate doesn't carry and its `GlobalState` wrapper in favor
//! of a plain [`crate::sync::TicketLock`]. External IRQ sources are out of
//! scope for this kernel's boot sequence (only the timer PPI/SBI timer
//! drive preemption), so this module exists for HAL completeness and is
//! exercised only by its own unit tests.

use core::sync::atomic::{fence, Ordering};

use crate::sync::TicketLock;

const PLIC_BASE: usize = 0x0c00_0000;
const PRIORITY_OFFSET: usize = 0x00_0000;
const ENABLE_OFFSET: usize = 0x00_2000;
const ENABLE_STRIDE: usize = 0x80;
const CONTEXT_STRIDE: usize = 0x1000;
const THRESHOLD_OFFSET: usize = 0x20_0000;
const CLAIM_OFFSET: usize = 0x20_0004;

const MAX_SOURCES: u32 = 128;

struct Plic {
    s_context: u32,
}

static PLIC: TicketLock<Option<Plic>> = TicketLock::new(None);

fn priority_addr(irq: u32) -> *mut u32 {
    (PLIC_BASE + PRIORITY_OFFSET + irq as usize * 4) as *mut u32
}

fn enable_addr(irq: u32, context: u32) -> *mut u32 {
    (PLIC_BASE + ENABLE_OFFSET + context as usize * ENABLE_STRIDE + (irq as usize / 32) * 4) as *mut u32
}

fn threshold_addr(context: u32) -> *mut u32 {
    (PLIC_BASE + THRESHOLD_OFFSET + context as usize * CONTEXT_STRIDE) as *mut u32
}

fn claim_addr(context: u32) -> *mut u32 {
    (PLIC_BASE + CLAIM_OFFSET + context as usize * CONTEXT_STRIDE) as *mut u32
}

/// Brings up the boot hart's S-mode context: every source masked,
/// threshold zero, priority zero.
pub fn init(hart_id: u32) {
    let s_context = hart_id * 2 + 1;
    for irq in 1..MAX_SOURCES {
        // SAFETY: irq stays within [1, MAX_SOURCES), inside the PLIC's
        // documented priority register array.
        unsafe { core::ptr::write_volatile(priority_addr(irq), 0) };
    }
    // SAFETY: threshold_addr(s_context) is within the PLIC's threshold
    // region for a context derived from a real hart id.
    unsafe { core::ptr::write_volatile(threshold_addr(s_context), 0) };
    fence(Ordering::SeqCst);
    *PLIC.lock() = Some(Plic { s_context });
}

pub fn enable_irq(irq: u32) {
    let guard = PLIC.lock();
    if let Some(plic) = guard.as_ref() {
        let addr = enable_addr(irq, plic.s_context);
        // SAFETY: addr is within the PLIC enable-bit region for a context
        // established by init(); read-modify-write preserves other bits.
        unsafe {
            let current = core::ptr::read_volatile(addr);
            core::ptr::write_volatile(addr, current | (1 << (irq % 32)));
        }
        fence(Ordering::SeqCst);
    }
}

pub fn disable_irq(irq: u32) {
    let guard = PLIC.lock();
    if let Some(plic) = guard.as_ref() {
        let addr = enable_addr(irq, plic.s_context);
        // SAFETY: see enable_irq.
        unsafe {
            let current = core::ptr::read_volatile(addr);
            core::ptr::write_volatile(addr, current & !(1 << (irq % 32)));
        }
        fence(Ordering::SeqCst);
    }
}

pub fn claim() -> Option<u32> {
    let guard = PLIC.lock();
    let plic = guard.as_ref()?;
    // SAFETY: claim_addr(s_context) is within the PLIC's claim/complete
    // register for this hart's S-mode context.
    let irq = unsafe { core::ptr::read_volatile(claim_addr(plic.s_context)) };
    if irq == 0 {
        None
    } else {
        Some(irq)
    }
}

pub fn complete(irq: u32) {
    let guard = PLIC.lock();
    if let Some(plic) = guard.as_ref() {
        // SAFETY: writing back a claimed IRQ id signals EOI to the PLIC.
        unsafe { core::ptr::write_volatile(claim_addr(plic.s_context), irq) };
        fence(Ordering::SeqCst);
    }
}
