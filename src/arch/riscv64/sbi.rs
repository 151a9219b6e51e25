//! SBI (Supervisor Binary Interface) ecall wrappers.
//!
//! Grounded in the teacher's `riscv::sbi`, trimmed to the console and timer
//! extensions this kernel actually calls: console output routes through
//! SBI rather than direct UART MMIO, and the clock core (C11) programs the
//! next tick deadline through `sbi_set_timer` rather than a raw CSR write
//! (S-mode has no direct access to `mtimecmp`).

const SBI_EXT_BASE: usize = 0x10;
const SBI_EXT_TIMER: usize = 0x5449_4d45;
const SBI_EXT_CONSOLE_PUTCHAR: usize = 0x01;

#[derive(Debug, Clone, Copy)]
pub struct SbiRet {
    pub error: isize,
    pub value: usize,
}

#[inline(always)]
fn sbi_call(extension: usize, function: usize, arg0: usize, arg1: usize, arg2: usize) -> SbiRet {
    let error: isize;
    let value: usize;
    // SAFETY: `ecall` in S-mode traps to the SBI firmware, which never
    // corrupts caller state beyond the documented a0/a1 return values.
    unsafe {
        core::arch::asm!(
            "ecall",
            in("a0") arg0,
            in("a1") arg1,
            in("a2") arg2,
            in("a6") function,
            in("a7") extension,
            lateout("a0") error,
            lateout("a1") value,
        );
    }
    SbiRet { error, value }
}

/// Programs the next supervisor timer interrupt for absolute time
/// `stime_value`, measured in the platform's `time` CSR units.
pub fn set_timer(stime_value: u64) -> SbiRet {
    sbi_call(SBI_EXT_TIMER, 0, stime_value as usize, 0, 0)
}

pub fn probe_extension(extension_id: usize) -> bool {
    sbi_call(SBI_EXT_BASE, 3, extension_id, 0, 0).value != 0
}

/// Legacy console putchar (SBI v0.1, extension ID doubles as function ID).
pub fn console_putchar(ch: u8) {
    sbi_call(SBI_EXT_CONSOLE_PUTCHAR, 0, ch as usize, 0, 0);
}

pub fn timer_extension_available() -> bool {
    probe_extension(SBI_EXT_TIMER)
}

/// System reset via the SRST extension, falling back to a halt loop if the
/// firmware does not implement it.
pub fn shutdown() -> ! {
    const SBI_EXT_SRST: usize = 0x5352_5354;
    const SHUTDOWN: usize = 0;
    const REASON_NONE: usize = 0;
    sbi_call(SBI_EXT_SRST, SHUTDOWN, REASON_NONE, 0, 0);
    loop {
        core::hint::spin_loop();
    }
}
