//! RISC-V context switch.
//!
//! Grounded in the teacher's `riscv::context::context_switch`, cut down
//! from a full-register save (the teacher's version, annotated as needing
//! no caller-saved registers since the switch is an ordinary function
//! call) to the callee-saved set the RISC-V calling convention actually
//! obligates a function to preserve: `ra`, `sp`, `s0`-`s11`.

use core::arch::global_asm;

#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct Context {
    ra: u64,
    sp: u64,
    s0: u64,
    s1: u64,
    s2: u64,
    s3: u64,
    s4: u64,
    s5: u64,
    s6: u64,
    s7: u64,
    s8: u64,
    s9: u64,
    s10: u64,
    s11: u64,
}

impl Context {
    pub const fn zeroed() -> Self {
        Self {
            ra: 0, sp: 0, s0: 0, s1: 0, s2: 0, s3: 0,
            s4: 0, s5: 0, s6: 0, s7: 0, s8: 0, s9: 0, s10: 0, s11: 0,
        }
    }

    /// Direct continuation at `pc` on a private `sp`, for the idle thread's
    /// body, an ordinary Rust function that never returns.
    pub fn init(&mut self, pc: u64, sp: u64) {
        self.ra = pc;
        self.sp = sp;
    }

    /// Redirects the first switch-in through [`bullfinch_thread_trampoline`],
    /// which calls `entry(arg)` with a real calling convention.
    pub fn set_entry_data(&mut self, entry: u64, arg: u64) {
        self.ra = bullfinch_thread_trampoline as u64;
        self.s0 = entry;
        self.s1 = arg;
    }
}

extern "C" {
    fn bullfinch_context_switch(prev: *mut Context, next: *const Context);
    fn bullfinch_thread_trampoline();
}

/// # Safety
/// Caller must hold the scheduler lock, have interrupts masked, and `prev`
/// must be the context of the thread currently executing on this hart.
pub unsafe fn switch(prev: *mut Context, next: *const Context) {
    // SAFETY: delegated to the caller's contract above.
    unsafe { bullfinch_context_switch(prev, next) };
}

global_asm!(
    r#"
.global bullfinch_context_switch
bullfinch_context_switch:
    sd ra,  0(a0)
    sd sp,  8(a0)
    sd s0,  16(a0)
    sd s1,  24(a0)
    sd s2,  32(a0)
    sd s3,  40(a0)
    sd s4,  48(a0)
    sd s5,  56(a0)
    sd s6,  64(a0)
    sd s7,  72(a0)
    sd s8,  80(a0)
    sd s9,  88(a0)
    sd s10, 96(a0)
    sd s11, 104(a0)

    ld ra,  0(a1)
    ld sp,  8(a1)
    ld s0,  16(a1)
    ld s1,  24(a1)
    ld s2,  32(a1)
    ld s3,  40(a1)
    ld s4,  48(a1)
    ld s5,  56(a1)
    ld s6,  64(a1)
    ld s7,  72(a1)
    ld s8,  80(a1)
    ld s9,  88(a1)
    ld s10, 96(a1)
    ld s11, 104(a1)
    ret

.global bullfinch_thread_trampoline
bullfinch_thread_trampoline:
    mv a0, s1
    jalr s0
1:
    j 1b
"#
);
