//! RV64 Sv39 page-table engine: 3-level, 4 KiB granule, 39-bit VA.
//!
//! Mirrors [`super::super::aarch64::mmu`]'s descend-or-create walker shape,
//! emitting Sv39 PTE bits (V/R/W/X/U/G/A/D + PPN) instead of AArch64
//! long-descriptor bits. Sv39 only gives each half of the address space
//! 512 GiB, a quarter of AArch64's identity/physmap/kernel-stack layout, so
//! the three windows below are sized down to fit rather than reusing the
//! same numeric constants.

use core::arch::asm;

use crate::arch::{MmuError, PageAllocFn, PageFlags, PhysAddr, VirtAddr};

pub const PHYSMAP_BASE: u64 = 0xffff_ffc0_0000_0000;
pub const KERNEL_BASE: u64 = 0xffff_ffff_8000_0000;
pub const KERNEL_STACK_BASE: u64 = 0xffff_ffe0_0000_0000;
pub const KERNEL_STACK_WINDOW_SIZE: u64 = 64 * 1024 * 1024 * 1024;

const ENTRIES: usize = 512;
const GRANULE: u64 = 4096;
const BLOCK_1GIB: u64 = 1 << 30;

const PTE_V: u64 = 1 << 0;
const PTE_R: u64 = 1 << 1;
const PTE_W: u64 = 1 << 2;
const PTE_X: u64 = 1 << 3;
const PTE_U: u64 = 1 << 4;
const PTE_G: u64 = 1 << 5;
const PTE_A: u64 = 1 << 6;
const PTE_D: u64 = 1 << 7;
const PPN_SHIFT: u32 = 10;

static mut KERNEL_ROOT: u64 = 0;

#[repr(C, align(4096))]
struct Table {
    entries: [u64; ENTRIES],
}

impl Table {
    const fn zeroed() -> Self {
        Self { entries: [0; ENTRIES] }
    }
}

fn va_index(va: u64, level: u32) -> usize {
    let shift = 12 + 9 * (2 - level);
    ((va >> shift) & 0x1ff) as usize
}

fn leaf_pte(paddr: PhysAddr, flags: PageFlags) -> u64 {
    let ppn = (paddr.as_u64() >> 12) << PPN_SHIFT;
    let mut pte = ppn | PTE_V | PTE_R | PTE_A | PTE_D;
    if flags.write {
        pte |= PTE_W;
    }
    if flags.exec {
        pte |= PTE_X;
    }
    if flags.user {
        pte |= PTE_U;
    } else {
        pte |= PTE_G;
    }
    pte
}

static mut L0_IDENTITY: Table = Table::zeroed();
static mut L0_PHYSMAP: Table = Table::zeroed();
static mut ROOT: Table = Table::zeroed();

fn table_ptr(root: u64) -> *mut Table {
    root as *mut Table
}

/// # Safety
/// `table_root` must be a live, page-aligned root table for the address
/// space being walked, and `page_alloc` must return zeroed, page-aligned
/// kernel-virtual memory usable as an intermediate table.
unsafe fn walk_create(
    table_root: u64,
    vaddr: VirtAddr,
    page_alloc: PageAllocFn,
) -> Result<*mut u64, MmuError> {
    if !vaddr.is_aligned(GRANULE) {
        return Err(MmuError::NotAligned);
    }
    // SAFETY: table_root points at a live Table for the duration of this walk.
    let mut table = unsafe { &mut *table_ptr(table_root) };
    for level in 0..2 {
        let idx = va_index(vaddr.as_u64(), level);
        let entry = table.entries[idx];
        if entry & PTE_V == 0 {
            let new_table = page_alloc().ok_or(MmuError::OutOfMemory)?;
            table.entries[idx] = ((new_table.as_u64() >> 12) << PPN_SHIFT) | PTE_V;
        } else if entry & (PTE_R | PTE_W | PTE_X) != 0 {
            return Err(MmuError::SuperpageConflict);
        }
        let next_phys = ((table.entries[idx] >> PPN_SHIFT) << 12) as usize;
        // SAFETY: the physmap identity covers this range once post_mmu_init
        // runs; before that, intermediate tables live at their physical
        // address directly, matching the identity mapping still in effect.
        table = unsafe { &mut *(next_phys as *mut Table) };
    }
    let leaf_idx = va_index(vaddr.as_u64(), 2);
    Ok(&mut table.entries[leaf_idx] as *mut u64)
}

pub fn map_page(
    table_root: u64,
    vaddr: VirtAddr,
    paddr: PhysAddr,
    flags: PageFlags,
    page_alloc: PageAllocFn,
) -> Result<(), MmuError> {
    // SAFETY: table_root is caller-provided and assumed live; walk_create's
    // safety contract is satisfied by page_alloc returning usable memory.
    let pte_ptr = unsafe { walk_create(table_root, vaddr, page_alloc)? };
    // SAFETY: pte_ptr points at a live leaf slot just located above.
    unsafe {
        if *pte_ptr & PTE_V != 0 {
            return Err(MmuError::AlreadyMapped);
        }
        *pte_ptr = leaf_pte(paddr, flags);
        asm!("sfence.vma");
    }
    Ok(())
}

pub fn unmap_page(table_root: u64, vaddr: VirtAddr) -> Result<PhysAddr, MmuError> {
    if !vaddr.is_aligned(GRANULE) {
        return Err(MmuError::NotAligned);
    }
    // SAFETY: table_root is caller-provided and assumed live.
    let mut table = unsafe { &mut *table_ptr(table_root) };
    for level in 0..2 {
        let idx = va_index(vaddr.as_u64(), level);
        let entry = table.entries[idx];
        if entry & PTE_V == 0 {
            return Err(MmuError::NotMapped);
        }
        let next_phys = ((entry >> PPN_SHIFT) << 12) as usize;
        // SAFETY: present non-leaf entries at levels 0/1 always point at a
        // live intermediate Table under this walker's invariants.
        table = unsafe { &mut *(next_phys as *mut Table) };
    }
    let leaf_idx = va_index(vaddr.as_u64(), 2);
    let entry = table.entries[leaf_idx];
    if entry & PTE_V == 0 {
        return Err(MmuError::NotMapped);
    }
    table.entries[leaf_idx] = 0;
    // SAFETY: sfence.vma with no operands flushes all address translations.
    unsafe { asm!("sfence.vma") };
    Ok(PhysAddr::new((entry >> PPN_SHIFT) << 12))
}

pub fn phys_to_virt(p: PhysAddr) -> VirtAddr {
    VirtAddr::new(PHYSMAP_BASE.wrapping_add(p.as_u64()))
}

pub fn virt_to_phys(v: VirtAddr) -> Option<PhysAddr> {
    v.as_u64().checked_sub(PHYSMAP_BASE).map(PhysAddr::new)
}

pub fn kernel_table() -> u64 {
    // SAFETY: KERNEL_ROOT is written once by init() before any reader runs.
    unsafe { KERNEL_ROOT }
}

fn satp_for(root_phys: u64) -> u64 {
    const SATP_MODE_SV39: u64 = 8 << 60;
    SATP_MODE_SV39 | (root_phys >> 12)
}

/// Builds the identity, physmap, and kernel higher-half mappings and turns
/// on paging via `satp`. Runs with the MMU off; every address taken here is
/// physical.
///
/// # Safety
/// Must run exactly once, before any other hart is started, with `satp`
/// currently zero (MMU off).
pub unsafe fn init(kernel_phys_load: PhysAddr, _dtb_phys: PhysAddr) {
    // SAFETY: sole writer during single-threaded boot, before the MMU is on.
    let root = unsafe { &mut *core::ptr::addr_of_mut!(ROOT) };
    let l0_identity = unsafe { &mut *core::ptr::addr_of_mut!(L0_IDENTITY) };
    let l0_physmap = unsafe { &mut *core::ptr::addr_of_mut!(L0_PHYSMAP) };

    let flags = PageFlags::kernel_rwx();
    let mut base = 0u64;
    while base < 4 * BLOCK_1GIB {
        l0_identity.entries[(base / BLOCK_1GIB) as usize] = leaf_pte(PhysAddr::new(base), flags);
        base += BLOCK_1GIB;
    }
    let identity_idx = va_index(0, 0);
    root.entries[identity_idx] = ((core::ptr::addr_of!(L0_IDENTITY) as u64 >> 12) << PPN_SHIFT) | PTE_V;

    base = 0;
    while base < 4 * BLOCK_1GIB {
        l0_physmap.entries[(base / BLOCK_1GIB) as usize] = leaf_pte(PhysAddr::new(base), PageFlags::kernel_rw());
        base += BLOCK_1GIB;
    }
    let physmap_idx = va_index(PHYSMAP_BASE, 0);
    root.entries[physmap_idx] = ((core::ptr::addr_of!(L0_PHYSMAP) as u64 >> 12) << PPN_SHIFT) | PTE_V;

    let kernel_idx = va_index(KERNEL_BASE, 0);
    root.entries[kernel_idx] = leaf_pte(kernel_phys_load.align_down(BLOCK_1GIB), PageFlags::kernel_rwx());

    let root_phys = core::ptr::addr_of!(ROOT) as u64;
    // SAFETY: writing satp with Sv39 mode and the root's PPN enables paging;
    // the identity mapping just installed keeps the current PC valid.
    unsafe {
        core::ptr::write_volatile(core::ptr::addr_of_mut!(KERNEL_ROOT), root_phys);
        asm!("csrw satp, {}", in(reg) satp_for(root_phys));
        asm!("sfence.vma");
    }
}

/// Grows the physmap's coverage once the PMM knows total DRAM size.
pub fn expand_physmap(total_bytes: u64) {
    let blocks_needed = total_bytes.div_ceil(BLOCK_1GIB).min(ENTRIES as u64 - 1);
    // SAFETY: only the boot CPU calls this, after init(), before any
    // secondary hart reads L0_PHYSMAP concurrently.
    let l0_physmap = unsafe { &mut *core::ptr::addr_of_mut!(L0_PHYSMAP) };
    let mut i = 0u64;
    while i < blocks_needed {
        if l0_physmap.entries[i as usize] & PTE_V == 0 {
            l0_physmap.entries[i as usize] = leaf_pte(PhysAddr::new(i * BLOCK_1GIB), PageFlags::kernel_rw());
        }
        i += 1;
    }
    // SAFETY: sfence.vma with no operands is always valid.
    unsafe { asm!("sfence.vma") };
}

/// Removes the low identity mapping once every reference has moved to the
/// physmap or kernel window.
pub fn remove_identity_mapping() {
    // SAFETY: only the boot CPU calls this, after all boot code has already
    // branched to its higher-half address.
    let root = unsafe { &mut *core::ptr::addr_of_mut!(ROOT) };
    let identity_idx = va_index(0, 0);
    root.entries[identity_idx] = 0;
    // SAFETY: sfence.vma with no operands is always valid.
    unsafe { asm!("sfence.vma") };
}

/// Reloads `gp` to its higher-half link-time value (spec.md §4.4). `gp` is
/// set once by the linker-relaxation convention and never touched again
/// by this kernel, but it was computed by `_start` while still running at
/// the physical load address; `la` with relaxation disabled recomputes it
/// against the now-live virtual program counter.
pub fn post_mmu_init() {
    // SAFETY: `__global_pointer$` is a linker-provided symbol; reloading
    // gp only affects this hart's own register state.
    unsafe {
        asm!(
            ".option push",
            ".option norelax",
            "la gp, __global_pointer$",
            ".option pop",
            out("gp") _,
        );
    }
}
