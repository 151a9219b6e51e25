//! Host-target stand-in for the HAL, used only so architecture-independent
//! unit tests (C1, C2, C3, C7, C8, runqueue ordering) can compile and run
//! under `cargo test` on a developer machine. Never linked into a bare-metal
//! image — real boots always select [`super::aarch64`] or [`super::riscv64`].

use core::sync::atomic::{AtomicU64, Ordering};

pub mod cpu {
    use super::*;

    static NEXT_ID: AtomicU64 = AtomicU64::new(0);

    pub fn current_id() -> u32 {
        0
    }

    pub fn wait_for_interrupt() {}

    pub fn halt() -> ! {
        loop {
            core::hint::spin_loop();
        }
    }

    pub fn spin_wait_eq16(ptr: *const u16, expected: u16) {
        // Host has no WFE/pause-hint distinction worth modeling; a bare
        // read loop is enough to keep the ticket-lock tests honest.
        while unsafe { core::ptr::read_volatile(ptr) } != expected {
            core::hint::spin_loop();
        }
    }

    pub fn disable_interrupts() -> bool {
        true
    }

    pub fn enable_interrupts() {}

    /// Host builds never run the panic backtrace walk for real; returning 0
    /// makes it terminate immediately (null frame pointer).
    pub fn current_frame_pointer() -> u64 {
        0
    }

    /// # Safety
    /// Never actually called — `current_frame_pointer` always returns 0,
    /// which the walker treats as a terminal frame.
    pub unsafe fn unwind_frame(_fp: u64) -> (u64, u64) {
        (0, 0)
    }

    #[allow(dead_code)]
    fn _unused() {
        let _ = NEXT_ID.load(Ordering::Relaxed);
    }
}

pub mod timer {
    pub fn now() -> u64 {
        0
    }
    pub fn frequency() -> u64 {
        1_000_000_000
    }
    pub fn set_deadline(_absolute_ticks: u64) {}
    pub fn init() {}
    pub fn ticks_to_ns(ticks: u64) -> u64 {
        ticks
    }
    pub fn ns_to_ticks(ns: u64) -> u64 {
        ns
    }
}

pub mod entropy {
    pub fn collect_mixed(addr_hint: u64) -> u64 {
        addr_hint ^ 0x9E3779B97F4A7C15
    }
}

pub mod fpu {
    pub fn on_context_switch(_cpu: u32) {}
    pub fn on_thread_exit(_cpu: u32) {}
}

pub mod context {
    #[derive(Debug, Default, Clone, Copy)]
    pub struct Context {
        pub sp: u64,
        pub pc: u64,
        pub interrupts_enabled: bool,
    }

    impl Context {
        pub const fn zeroed() -> Self {
            Self { sp: 0, pc: 0, interrupts_enabled: false }
        }
        pub fn init(&mut self, pc: u64, sp: u64) {
            self.pc = pc;
            self.sp = sp;
        }
        pub fn set_entry_data(&mut self, _entry: u64, _arg: u64) {}
    }

    /// # Safety
    /// Test-only stand-in; performs no real register save/restore.
    pub unsafe fn switch(_prev: *mut Context, _next: *const Context) {}
}

pub mod trap {
    pub fn init() {}
}

pub mod serial {
    use core::sync::atomic::{AtomicU64, Ordering};

    static BASE: AtomicU64 = AtomicU64::new(0);

    pub fn set_base(addr: u64) {
        BASE.store(addr, Ordering::Relaxed);
    }

    /// Host stand-in writes to the process's real stdout through `std`, so
    /// `println!`/`log` calls in host-target unit tests are actually visible
    /// instead of silently discarded.
    pub fn putc(byte: u8) {
        #[cfg(not(target_os = "none"))]
        {
            use std::io::Write;
            let _ = std::io::stdout().write_all(&[byte]);
        }
        #[cfg(target_os = "none")]
        {
            let _ = byte;
        }
    }
}

pub mod mmu {
    use crate::arch::{MmuError, PageAllocFn, PageFlags, PhysAddr, VirtAddr};

    pub const PHYSMAP_BASE: u64 = 0xffff_8000_0000_0000;
    pub const KERNEL_BASE: u64 = 0xffff_ffff_8000_0000;
    pub const KERNEL_STACK_BASE: u64 = 0xffff_ff80_0000_0000;
    pub const KERNEL_STACK_WINDOW_SIZE: u64 = 512 * 1024 * 1024 * 1024;

    pub fn init(_kernel_phys_load: PhysAddr, _dtb_phys: PhysAddr) {}
    pub fn expand_physmap(_total_bytes: u64) {}
    pub fn remove_identity_mapping() {}
    pub fn post_mmu_init() {}

    pub fn phys_to_virt(p: PhysAddr) -> VirtAddr {
        VirtAddr::new(PHYSMAP_BASE + p.as_u64())
    }

    pub fn virt_to_phys(v: VirtAddr) -> Option<PhysAddr> {
        v.as_u64().checked_sub(PHYSMAP_BASE).map(PhysAddr::new)
    }

    pub fn map_page(
        _table: u64,
        _vaddr: VirtAddr,
        _paddr: PhysAddr,
        _flags: PageFlags,
        _page_alloc: PageAllocFn,
    ) -> Result<(), MmuError> {
        Ok(())
    }

    pub fn unmap_page(_table: u64, _vaddr: VirtAddr) -> Result<PhysAddr, MmuError> {
        Ok(PhysAddr::new(0))
    }

    pub fn kernel_table() -> u64 {
        0
    }
}
