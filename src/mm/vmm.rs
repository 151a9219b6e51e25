//! Kernel-stack carve-out (spec.md §4.9).
//!
//! A dedicated sub-region of the kernel window is sliced into fixed
//! 12 KiB slots: one unmapped 4 KiB guard page, then 8 KiB of mapped,
//! writable, non-executable stack. Slot assignment is a monotonic atomic
//! counter with no reclamation — spec.md §4.9 justifies this by the sheer
//! size of the window relative to a slot (the 512 GiB AArch64 window
//! alone holds on the order of 42 million slots), more than this
//! single-CPU, no-userspace core could ever allocate. Grounded in the
//! teacher's `mm::vas` virtual-address-space carving, replaced with this
//! simpler fixed-slot scheme since demand paging and VMA trees are out of
//! scope here.

use core::sync::atomic::{AtomicU64, Ordering};

use crate::arch::current::mmu;
use crate::arch::{MmuError, PageFlags, PhysAddr, VirtAddr};
use crate::mm::pmm;

/// Frames mapped per stack, per spec.md §4.9.
pub const STACK_PAGES: usize = 2;
const GUARD_SIZE: u64 = pmm::FRAME_SIZE as u64;
const STACK_SIZE: u64 = (STACK_PAGES as u64) * pmm::FRAME_SIZE as u64;
const SLOT_SIZE: u64 = GUARD_SIZE + STACK_SIZE;

static NEXT_SLOT: AtomicU64 = AtomicU64::new(0);

/// A mapped, guarded kernel stack. Owns `STACK_PAGES` physical frames for
/// its lifetime; dropping it silently would leak them, so reclamation
/// only happens through the explicit [`Stack::destroy`].
pub struct Stack {
    base: VirtAddr,
    frames: PhysAddr,
}

/// Obtains a zeroed, page-aligned kernel-virtual page from the PMM for use
/// as an intermediate page-table level — the callback contract
/// [`crate::arch::PageAllocFn`] requires.
fn alloc_table_page() -> Option<VirtAddr> {
    let phys = pmm::alloc_page()?;
    let virt = mmu::phys_to_virt(phys);
    // SAFETY: virt is a just-allocated, page-sized frame reachable
    // through the physmap; zeroing it before use as a table level is
    // required so stale bytes aren't misread as valid descriptors.
    unsafe { core::ptr::write_bytes(virt.as_u64() as *mut u8, 0, pmm::FRAME_SIZE) };
    Some(virt)
}

impl Stack {
    /// Reserves the next slot, pulls `STACK_PAGES` contiguous frames from
    /// the PMM, and maps them just past the slot's guard page. Returns
    /// `None` on any allocation or mapping failure, rolling back whatever
    /// had already succeeded — except intermediate page-table levels
    /// created along the way, which are not tracked for rollback (spec.md
    /// §9 open question: the source has the same gap).
    pub fn create() -> Option<Self> {
        let slot = NEXT_SLOT.fetch_add(1, Ordering::Relaxed);
        let slot_base = mmu::KERNEL_STACK_BASE + slot * SLOT_SIZE;
        assert!(
            slot_base + SLOT_SIZE - mmu::KERNEL_STACK_BASE <= mmu::KERNEL_STACK_WINDOW_SIZE,
            "kernel stack window exhausted"
        );
        let base = slot_base + GUARD_SIZE;

        let frames = pmm::alloc_contiguous(STACK_PAGES, 0)?;
        let table = mmu::kernel_table();

        let mut mapped = 0usize;
        for i in 0..STACK_PAGES {
            let vaddr = VirtAddr::new(base + (i as u64) * pmm::FRAME_SIZE as u64);
            let paddr = PhysAddr::new(frames.as_u64() + (i as u64) * pmm::FRAME_SIZE as u64);
            let mut page_alloc = alloc_table_page as fn() -> Option<VirtAddr>;
            match mmu::map_page(table, vaddr, paddr, PageFlags::kernel_rw(), &mut page_alloc) {
                Ok(()) => mapped += 1,
                Err(_) => {
                    for j in 0..mapped {
                        let vaddr = VirtAddr::new(base + (j as u64) * pmm::FRAME_SIZE as u64);
                        let _ = mmu::unmap_page(table, vaddr);
                    }
                    pmm::free_contiguous(frames, STACK_PAGES);
                    return None;
                }
            }
        }

        Some(Self { base: VirtAddr::new(base), frames })
    }

    /// Address one past the last valid byte — the value a new thread's
    /// context should use as its initial stack pointer.
    pub fn top(&self) -> VirtAddr {
        VirtAddr::new(self.base.as_u64() + STACK_SIZE)
    }

    /// Unmaps both pages, flushes, and returns the frames to the PMM.
    pub fn destroy(self) -> Result<(), MmuError> {
        let table = mmu::kernel_table();
        for i in 0..STACK_PAGES {
            let vaddr = VirtAddr::new(self.base.as_u64() + (i as u64) * pmm::FRAME_SIZE as u64);
            mmu::unmap_page(table, vaddr)?;
        }
        pmm::free_contiguous(self.frames, STACK_PAGES);
        Ok(())
    }
}
