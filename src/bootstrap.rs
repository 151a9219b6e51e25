//! Boot orchestrator (spec.md §4.13).
//!
//! Phase one runs with the MMU off, sticking to the low identity mapping;
//! phase two runs after the higher-half jump. Grounded in the teacher's
//! `bootstrap::kernel_init` staged structure — numbered stages, a
//! print-wrapper macro per stage, a final success marker — collapsed from
//! its six feature-bring-up stages onto the ten subsystems this core
//! actually owns, and split at the physical/virtual boundary the teacher's
//! single-address-space x86_64 target never had to cross.

use core::sync::atomic::{AtomicU64, Ordering};

use crate::arch::current::{mmu, serial, trap};
use crate::arch::PhysAddr;
use crate::error::{KernelError, KernelResult};
use crate::hwinfo::HwInfo;
use crate::{hwinfo, mm, print, sched, trace};

extern "C" {
    static __kernel_end: u8;
}

/// Physical load address of the kernel image. Fixed by the per-board
/// linker script and QEMU command line, both out of this crate's scope
/// (spec.md §6); mirrored here only so phase one can pass it to
/// `mmu::init` before any symbol from the linker script is readable.
#[cfg(target_arch = "aarch64")]
const KERNEL_PHYS_LOAD: u64 = 0x4008_0000;
#[cfg(target_arch = "riscv64")]
const KERNEL_PHYS_LOAD: u64 = 0x8020_0000;

const TOTAL_STAGES: u32 = 10;
const STAGE_NAME_WIDTH: usize = 5;
const MAX_DTB_SIZE: usize = 1024 * 1024;

static DTB_PHYS: AtomicU64 = AtomicU64::new(0);

fn stage(n: u32, name: &str, message: &str) {
    print::stage_line(n, TOTAL_STAGES, name, STAGE_NAME_WIDTH, message);
}

/// Runs entirely with the MMU off, at whatever physical address the
/// firmware handed control to. Must stick to PC-relative addressing
/// throughout, which is why console, trap vectors, and the page tables
/// themselves all come up before translation is enabled.
pub fn phase1(dtb_phys: PhysAddr) {
    serial::set_base(default_uart_phys());
    println!(
        "Bullfinch {}.{}.{} ({})",
        crate::version::MAJOR,
        crate::version::MINOR,
        crate::version::PATCH,
        crate::version::short_hash()
    );
    stage(1, "uart", "console ready");

    trap::init();
    stage(2, "trap", "vectors installed");

    DTB_PHYS.store(dtb_phys.as_u64(), Ordering::Relaxed);
    // SAFETY: runs once, with the MMU off, on the boot CPU — this
    // function's own contract.
    unsafe { mmu::init(PhysAddr::new(KERNEL_PHYS_LOAD), dtb_phys) };
    stage(3, "mmu", "identity + physmap + higher-half mapped");
}

/// Runs with the MMU on and the program counter in the kernel's
/// higher-half virtual range. Never returns: it ends by handing off to the
/// idle thread.
pub fn phase2() -> ! {
    if let Err(e) = phase2_inner() {
        panic!("boot phase 2 failed: {}", e);
    }
    println!("[BOOT:OK]");
    sched::enter_idle();
}

fn phase2_inner() -> KernelResult<()> {
    // Neither re-running the vector install nor the RISC-V gp reload gets
    // its own banner line — spec.md §4.13 lists exactly ten stage names,
    // and these two aren't among them.
    trap::init();
    mmu::post_mmu_init();

    #[cfg(all(target_os = "none", feature = "alloc"))]
    crate::init_heap();

    let dtb_phys = PhysAddr::new(DTB_PHYS.load(Ordering::Relaxed));
    if dtb_phys.as_u64() == 0 {
        panic!("DTB missing at phase 2");
    }

    // The identity mapping of the low gigabyte is still live at this point
    // (removed below), so the UART and DTB are both still reachable at
    // their physical addresses without going through the physmap.
    serial::set_base(mmu::phys_to_virt(PhysAddr::new(default_uart_phys())).as_u64());

    let header = unsafe { core::slice::from_raw_parts(dtb_phys.as_u64() as *const u8, 8) };
    let totalsize = u32::from_be_bytes(header[4..8].try_into().unwrap()) as usize;
    if totalsize > MAX_DTB_SIZE {
        return Err(KernelError::DtbTooLarge { size: totalsize, max: MAX_DTB_SIZE });
    }
    let dtb_slice = unsafe { core::slice::from_raw_parts(dtb_phys.as_u64() as *const u8, totalsize) };
    let info = HwInfo::capture(dtb_phys, dtb_slice).map_err(|_| KernelError::BadDtb)?;
    let total_memory = info.total_memory;
    let cpu_count = info.cpu_count;
    log::info!("{}", info);
    hwinfo::install(info);

    mmu::expand_physmap(total_memory);
    mmu::remove_identity_mapping();
    stage(4, "virt", "identity window removed");

    stage(5, "dtb", &format_cpus_mem(cpu_count, total_memory));

    let (kernel_base, kernel_end) = kernel_image_phys_range();
    mm::pmm::init(hwinfo::get(), kernel_base, kernel_end, dtb_phys.as_u64(), totalsize as u64)?;
    let stats = mm::pmm::stats();
    stage(6, "pmm", &format_pmm(&stats));

    trace::init(cpu_count);
    stage(7, "trace", "per-CPU ring sized");

    crate::clock::init();
    stage(8, "clock", "100 Hz tick enabled");

    sched::init();
    stage(9, "task", "kernel process + idle thread created");

    stage(10, "idle", "ready to dispatch");
    Ok(())
}

/// `__kernel_end` links at the higher-half virtual address; converting it
/// to physical reuses the same offset the linker script baked into every
/// other section (`PHYS_LOAD + (vaddr - KERNEL_BASE)`).
fn kernel_image_phys_range() -> (u64, u64) {
    let virt_end = unsafe { core::ptr::addr_of!(__kernel_end) as u64 };
    let phys_end = KERNEL_PHYS_LOAD + (virt_end - mmu::KERNEL_BASE);
    (KERNEL_PHYS_LOAD, phys_end)
}

#[cfg(target_arch = "aarch64")]
fn default_uart_phys() -> u64 {
    0x0900_0000
}
#[cfg(target_arch = "riscv64")]
fn default_uart_phys() -> u64 {
    0
}

fn format_cpus_mem(cpu_count: u32, total_memory: u64) -> alloc::string::String {
    alloc::format!("{} cpu(s), {} MiB", cpu_count, total_memory / (1024 * 1024))
}

fn format_pmm(stats: &mm::pmm::PmmStats) -> alloc::string::String {
    alloc::format!(
        "{} pages total, {} free, {} reserved",
        stats.total_pages, stats.free_count, stats.reserved_count
    )
}
