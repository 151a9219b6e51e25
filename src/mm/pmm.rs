//! Physical memory manager: arena-per-region allocation with per-page
//! metadata and a global free list.
//!
//! Grounded in the teacher's `mm::frame_allocator`, replacing its
//! bitmap+buddy hybrid with the arena/free-list design spec.md §4.7 calls
//! for: each DTB-discovered RAM region becomes an immutable arena whose
//! page-metadata array sits at the arena's own high end, so low physical
//! addresses stay free for DMA. A single [`TicketLock`] serializes every
//! mutation (spec.md §5).

use core::mem::size_of;
use core::ptr::NonNull;

use crate::arch::{mmu, PhysAddr};
use crate::hwinfo::HwInfo;
use crate::list::{IntrusiveList, ListLink};
use crate::sync::TicketLock;

pub const FRAME_SIZE: usize = 4096;
pub const MAX_ARENAS: usize = 4;
const MAX_RESERVED_RANGES: usize = 16;
const KERNEL_IMAGE_ALIGN: u64 = 2 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageState {
    Free,
    Allocated,
    Reserved,
}

/// Per-page metadata record. Kept at or under 24 bytes per spec.md §3:
/// two link pointers (free-list membership) plus state, owning arena
/// index, and the contiguous-allocation head flag.
pub struct Page {
    link: ListLink,
    state: PageState,
    arena_idx: u8,
    contiguous_head: bool,
}

impl Page {
    const fn new() -> Self {
        Self {
            link: ListLink::new(),
            state: PageState::Reserved,
            arena_idx: 0,
            contiguous_head: false,
        }
    }
}

fn page_link_offset() -> usize {
    core::mem::offset_of!(Page, link)
}

/// A contiguous physical RAM region discovered from the device tree.
/// Immutable after `Pmm::init`.
struct Arena {
    base: PhysAddr,
    total_pages: usize,
    usable_pages: usize,
    pages: NonNull<Page>,
}

// SAFETY: Arena is only ever accessed behind the PMM's ticket lock.
unsafe impl Send for Arena {}

#[derive(Clone, Copy)]
struct ReservedRange {
    base: u64,
    end: u64,
}

/// Errors are not how PMM exhaustion is reported (it returns `None`); this
/// exists purely so `init` can report DTB/region problems without a panic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PmmInitError {
    NoUsableRegions,
    TooManyRegions,
}

struct PmmState {
    arenas: [Option<Arena>; MAX_ARENAS],
    arena_count: usize,
    free_list: IntrusiveList<Page>,
    free_count: usize,
    allocated_count: usize,
    reserved_count: usize,
    total_pages: usize,
    initialized: bool,
}

impl PmmState {
    const fn empty() -> Self {
        Self {
            arenas: [None, None, None, None],
            arena_count: 0,
            free_list: IntrusiveList::new(page_link_offset_const()),
            free_count: 0,
            allocated_count: 0,
            reserved_count: 0,
            total_pages: 0,
            initialized: false,
        }
    }
}

// `offset_of!` is usable in const context; this indirection keeps the
// const-initializer readable without repeating the macro inline above.
const fn page_link_offset_const() -> usize {
    core::mem::offset_of!(Page, link)
}

static PMM: TicketLock<PmmState> = TicketLock::new(PmmState::empty());

fn in_reserved(ranges: &[ReservedRange], count: usize, addr: u64) -> bool {
    ranges[..count].iter().any(|r| addr >= r.base && addr < r.end)
}

/// Initializes the PMM from the hardware-info cache. Must run exactly
/// once, after the physmap covers all of RAM (so arena metadata, which
/// lives inside the arena itself, is reachable through `phys_to_virt`).
pub fn init(
    hw: &HwInfo,
    kernel_image_base: u64,
    kernel_image_end: u64,
    dtb_base: u64,
    dtb_size: u64,
) -> Result<(), PmmInitError> {
    let mut reserved = [ReservedRange { base: 0, end: 0 }; MAX_RESERVED_RANGES];
    let mut reserved_count = 0usize;

    reserved[reserved_count] = ReservedRange {
        base: kernel_image_base,
        end: align_up(kernel_image_end, KERNEL_IMAGE_ALIGN),
    };
    reserved_count += 1;

    reserved[reserved_count] = ReservedRange {
        base: dtb_base,
        end: align_up(dtb_base + dtb_size, FRAME_SIZE as u64),
    };
    reserved_count += 1;

    for r in hw.reserved_regions() {
        if reserved_count >= MAX_RESERVED_RANGES {
            break;
        }
        reserved[reserved_count] = ReservedRange { base: r.base, end: r.base + r.size };
        reserved_count += 1;
    }

    if hw.memory_regions().is_empty() {
        return Err(PmmInitError::NoUsableRegions);
    }
    if hw.memory_regions().len() > MAX_ARENAS {
        return Err(PmmInitError::TooManyRegions);
    }

    let mut guard = PMM.guard();
    if guard.initialized {
        panic!("Pmm::init called twice");
    }

    let mut any_usable = false;
    for region in hw.memory_regions() {
        let total_pages = (region.size as usize) / FRAME_SIZE;
        if total_pages == 0 {
            continue;
        }
        let meta_bytes = total_pages * size_of::<Page>();
        let meta_pages = align_up(meta_bytes as u64, FRAME_SIZE as u64) as usize / FRAME_SIZE;
        if meta_pages >= total_pages {
            // Region too small to host its own metadata; skip it.
            continue;
        }

        let meta_base = region.base + (total_pages - meta_pages) as u64 * FRAME_SIZE as u64;
        if reserved_count < MAX_RESERVED_RANGES {
            reserved[reserved_count] =
                ReservedRange { base: meta_base, end: meta_base + (meta_pages * FRAME_SIZE) as u64 };
            reserved_count += 1;
        }

        let meta_virt = mmu::phys_to_virt(PhysAddr::new(meta_base));
        let pages_ptr = meta_virt.as_u64() as *mut Page;

        let arena_idx = guard.arena_count;
        for i in 0..total_pages {
            let page = unsafe { &mut *pages_ptr.add(i) };
            *page = Page::new();
            page.arena_idx = arena_idx as u8;
            let page_phys = region.base + (i as u64) * FRAME_SIZE as u64;
            let reserved_here = in_reserved(&reserved, reserved_count, page_phys);
            page.state = if reserved_here { PageState::Reserved } else { PageState::Free };
        }

        let usable_pages = total_pages - meta_pages;
        guard.arenas[arena_idx] = Some(Arena {
            base: PhysAddr::new(region.base),
            total_pages,
            usable_pages,
            pages: unsafe { NonNull::new_unchecked(pages_ptr) },
        });
        guard.arena_count += 1;
        guard.total_pages += total_pages;
        any_usable = true;
    }

    if !any_usable {
        return Err(PmmInitError::NoUsableRegions);
    }

    // Build the global free list, last arena first is fine — order only
    // matters for LIFO round-trip within a single free/alloc pair, which
    // the testable properties only require for a freshly reset allocator.
    for idx in 0..guard.arena_count {
        let arena = guard.arenas[idx].as_ref().unwrap();
        let pages = arena.pages;
        let total = arena.total_pages;
        for i in 0..total {
            let page_ptr = unsafe { NonNull::new_unchecked(pages.as_ptr().add(i)) };
            let state = unsafe { page_ptr.as_ref().state };
            match state {
                PageState::Free => {
                    guard.free_list.push_front(page_ptr);
                    guard.free_count += 1;
                }
                PageState::Reserved => guard.reserved_count += 1,
                PageState::Allocated => unreachable!("no page starts allocated"),
            }
        }
    }

    guard.initialized = true;
    Ok(())
}

fn align_up(v: u64, align: u64) -> u64 {
    (v + align - 1) & !(align - 1)
}

fn poison(_phys: PhysAddr, _byte: u8) {
    #[cfg(debug_assertions)]
    unsafe {
        let virt = mmu::phys_to_virt(_phys);
        core::ptr::write_bytes(virt.as_u64() as *mut u8, _byte, FRAME_SIZE);
    }
}

fn page_to_phys_locked(state: &PmmState, page: NonNull<Page>) -> PhysAddr {
    let arena_idx = unsafe { page.as_ref().arena_idx } as usize;
    let arena = state.arenas[arena_idx].as_ref().expect("dangling arena index");
    let byte_offset = unsafe { (page.as_ptr() as *const u8).offset_from(arena.pages.as_ptr() as *const u8) };
    let index = byte_offset as usize / size_of::<Page>();
    PhysAddr::new(arena.base.as_u64() + (index * FRAME_SIZE) as u64)
}

fn phys_to_page_locked(state: &PmmState, phys: PhysAddr) -> Option<NonNull<Page>> {
    for arena_opt in state.arenas.iter() {
        let arena = arena_opt.as_ref()?;
        let start = arena.base.as_u64();
        let end = start + (arena.total_pages * FRAME_SIZE) as u64;
        if phys.as_u64() >= start && phys.as_u64() < end {
            let index = ((phys.as_u64() - start) / FRAME_SIZE as u64) as usize;
            return Some(unsafe { NonNull::new_unchecked(arena.pages.as_ptr().add(index)) });
        }
    }
    None
}

/// Allocates a single free page. O(1). Panics if the PMM is uninitialized.
pub fn alloc_page() -> Option<PhysAddr> {
    let mut guard = PMM.guard();
    assert!(guard.initialized, "alloc_page before Pmm::init");
    let page = guard.free_list.pop_front()?;
    unsafe {
        debug_assert_eq!(page.as_ref().state, PageState::Free);
    }
    let phys = page_to_phys_locked(&guard, page);
    unsafe {
        (*page.as_ptr()).state = PageState::Allocated;
    }
    guard.free_count -= 1;
    guard.allocated_count += 1;
    poison(phys, 0xCD);
    Some(phys)
}

/// Returns a previously-allocated page to the free list. O(1).
///
/// Panics on double-free or on an attempt to free a reserved page.
pub fn free_page(phys: PhysAddr) {
    let mut guard = PMM.guard();
    assert!(guard.initialized, "free_page before Pmm::init");
    let page = phys_to_page_locked(&guard, phys).expect("free_page: address not in any arena");
    let state = unsafe { page.as_ref().state };
    match state {
        PageState::Free => panic!("double free at {:#x}", phys.as_u64()),
        PageState::Reserved => panic!("attempted to free reserved page at {:#x}", phys.as_u64()),
        PageState::Allocated => {}
    }
    poison(phys, 0xDD);
    unsafe {
        (*page.as_ptr()).state = PageState::Free;
        (*page.as_ptr()).contiguous_head = false;
    }
    guard.free_list.push_front(page);
    guard.free_count += 1;
    guard.allocated_count -= 1;
}

/// Allocates `count` consecutive free pages whose base is aligned to
/// `1 << alignment_log2`. O(n) in the number of pages scanned; returns
/// `None` if no run fits. Arenas are scanned in order.
pub fn alloc_contiguous(count: usize, alignment_log2: u32) -> Option<PhysAddr> {
    assert!((alignment_log2 as usize) < usize::BITS as usize, "alignment_log2 too large");
    if count == 0 {
        return None;
    }
    let align_bytes = 1u64 << alignment_log2;

    let mut guard = PMM.guard();
    assert!(guard.initialized, "alloc_contiguous before Pmm::init");

    for idx in 0..guard.arena_count {
        let arena_base;
        let arena_total;
        let pages_ptr;
        {
            let arena = guard.arenas[idx].as_ref().unwrap();
            arena_base = arena.base.as_u64();
            arena_total = arena.total_pages;
            pages_ptr = arena.pages;
        }

        let mut start = 0usize;
        while start + count <= arena_total {
            let start_phys = arena_base + (start as u64) * FRAME_SIZE as u64;
            if start_phys % align_bytes != 0 {
                start += 1;
                continue;
            }
            let all_free = (0..count).all(|i| {
                let p = unsafe { &*pages_ptr.as_ptr().add(start + i) };
                p.state == PageState::Free
            });
            if all_free {
                for i in 0..count {
                    let p = unsafe { &mut *pages_ptr.as_ptr().add(start + i) };
                    let page_ptr = unsafe { NonNull::new_unchecked(p as *mut Page) };
                    guard.free_list.remove(page_ptr);
                    p.state = PageState::Allocated;
                    p.contiguous_head = i == 0;
                }
                guard.free_count -= count;
                guard.allocated_count += count;
                return Some(PhysAddr::new(start_phys));
            }
            start += 1;
        }
    }
    None
}

/// Frees a run of `count` pages previously returned by
/// [`alloc_contiguous`]. Validates that `head` is a contiguous head and
/// that the run has no interior head before freeing each page.
pub fn free_contiguous(head: PhysAddr, count: usize) {
    let mut guard = PMM.guard();
    assert!(guard.initialized, "free_contiguous before Pmm::init");

    let head_page = phys_to_page_locked(&guard, head).expect("free_contiguous: bad address");
    assert!(unsafe { head_page.as_ref().contiguous_head }, "free_contiguous: not a contiguous head");

    let arena_idx = unsafe { head_page.as_ref().arena_idx } as usize;
    let pages_ptr = guard.arenas[arena_idx].as_ref().unwrap().pages;
    let head_index = unsafe {
        (head_page.as_ptr() as *const u8).offset_from(pages_ptr.as_ptr() as *const u8)
    } as usize
        / size_of::<Page>();

    for i in 0..count {
        let p = unsafe { &*pages_ptr.as_ptr().add(head_index + i) };
        assert_eq!(p.state, PageState::Allocated, "free_contiguous: gap in run");
        if i > 0 {
            assert!(!p.contiguous_head, "free_contiguous: interior head in run");
        }
    }

    for i in 0..count {
        let p = unsafe { &mut *pages_ptr.as_ptr().add(head_index + i) };
        let phys = PhysAddr::new(
            guard.arenas[arena_idx].as_ref().unwrap().base.as_u64() + ((head_index + i) * FRAME_SIZE) as u64,
        );
        poison(phys, 0xDD);
        p.state = PageState::Free;
        p.contiguous_head = false;
        let page_ptr = unsafe { NonNull::new_unchecked(p as *mut Page) };
        guard.free_list.push_front(page_ptr);
    }
    guard.free_count += count;
    guard.allocated_count -= count;
}

pub struct PmmStats {
    pub total_pages: usize,
    pub free_count: usize,
    pub allocated_count: usize,
    pub reserved_count: usize,
}

pub fn stats() -> PmmStats {
    let guard = PMM.guard();
    PmmStats {
        total_pages: guard.total_pages,
        free_count: guard.free_count,
        allocated_count: guard.allocated_count,
        reserved_count: guard.reserved_count,
    }
}
