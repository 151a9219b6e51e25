//! Thread and process control blocks (spec.md §4.12).
//!
//! Both are kmalloc objects, never moved once allocated — every reference
//! to one is a `NonNull` pointer, matching the intrusive-container
//! discipline the rest of the kernel uses for the PMM's page records and
//! the slab allocator's headers.

use core::ptr::NonNull;
use core::sync::atomic::Ordering;

use crate::arch::current::context::Context;
use crate::list::{IntrusiveList, ListLink};
use crate::mm::{slab, vmm};
use crate::rbtree::RbLink;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    Ready,
    Running,
    Blocked,
    Exited,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Active,
    Exiting,
}

/// Packed through to [`thread_entry_shim`] as the context's entry argument.
/// Lives inline in the owning [`Tcb`] so its address is stable for the
/// thread's whole life without a second allocation.
struct ThreadEntryInfo {
    entry: extern "C" fn(usize),
    arg: usize,
}

#[repr(C)]
pub struct Tcb {
    pub id: u32,
    process: NonNull<Pcb>,
    pub(super) state: ThreadState,
    context: Context,
    /// `None` only for the idle thread, which runs on the boot stack
    /// instead of a carved-out one (spec.md §4.13's "task" stage: "do not
    /// call set_kernel_stack — the boot stack is still live").
    stack: Option<vmm::Stack>,
    rb_link: RbLink,
    process_link: ListLink,
    pub(super) blocked_on: usize,
    pub(super) weight: u32,
    pub(super) vruntime: u64,
    pub(super) seq: u64,
    /// Interrupt-enable flag of the outgoing context, saved by
    /// [`super::perform_switch`] and restored once this thread is
    /// dispatched again (spec.md §4.12, "Context switch").
    pub(super) interrupts_enabled: bool,
    trampoline_arg: ThreadEntryInfo,
}

pub(super) const fn rb_link_offset() -> usize {
    core::mem::offset_of!(Tcb, rb_link)
}

pub(super) const fn process_link_offset() -> usize {
    core::mem::offset_of!(Tcb, process_link)
}

extern "C" fn thread_entry_shim(packed: u64) -> ! {
    // SAFETY: `packed` is the address of this same thread's own
    // `trampoline_arg` field, set once in `Tcb::allocate` and never moved
    // since (the Tcb is a pinned kmalloc allocation).
    let info = unsafe { &*(packed as *const ThreadEntryInfo) };
    // A thread's first dispatch always starts with interrupts enabled;
    // there is no prior "outgoing context" for a brand-new thread to have
    // saved a different flag into.
    crate::arch::current::cpu::enable_interrupts();
    (info.entry)(info.arg);
    super::exit();
}

impl Tcb {
    pub fn is_enqueued(&self) -> bool {
        self.rb_link.is_linked()
    }

    /// Allocates a TCB and its kernel stack, wiring the context so its
    /// first dispatch runs `entry(arg)` through [`thread_entry_shim`].
    pub fn allocate(
        process: NonNull<Pcb>,
        entry: extern "C" fn(usize),
        arg: usize,
        weight: u32,
    ) -> Option<NonNull<Tcb>> {
        let stack = vmm::Stack::create()?;
        let top = stack.top().as_u64();

        let raw = slab::alloc(core::mem::size_of::<Tcb>(), Some(core::mem::align_of::<Tcb>())).ok()?;
        let ptr = raw.as_ptr() as *mut Tcb;

        let id = super::NEXT_TID.fetch_add(1, Ordering::Relaxed);
        let seq = super::NEXT_SEQ.fetch_add(1, Ordering::Relaxed);

        // SAFETY: `ptr` is a just-allocated, correctly sized and aligned
        // slab object; nothing else observes it before this write.
        unsafe {
            core::ptr::write(
                ptr,
                Tcb {
                    id,
                    process,
                    state: ThreadState::Ready,
                    context: Context::zeroed(),
                    stack: Some(stack),
                    rb_link: RbLink::new(),
                    process_link: ListLink::new(),
                    blocked_on: 0,
                    weight,
                    vruntime: 0,
                    seq,
                    interrupts_enabled: true,
                    trampoline_arg: ThreadEntryInfo { entry, arg },
                },
            );
        }

        let mut nn = unsafe { NonNull::new_unchecked(ptr) };
        // SAFETY: `nn` was just written above; `init` sets `sp` (and a
        // throwaway `pc` immediately overwritten by `set_entry_data`, the
        // two-step sequence both HAL context types expect for a freshly
        // created thread rather than one resuming mid-function).
        unsafe {
            let arg_addr = core::ptr::addr_of!((*nn.as_ptr()).trampoline_arg) as u64;
            let ctx = &mut nn.as_mut().context;
            ctx.init(0, top);
            ctx.set_entry_data(thread_entry_shim as u64, arg_addr);
        }
        Some(nn)
    }

    pub(super) fn context_mut(&mut self) -> *mut Context {
        &mut self.context
    }

    pub(super) fn context_ptr(&self) -> *const Context {
        &self.context
    }

    /// Builds the idle thread's TCB with no kernel stack of its own — it
    /// runs on whichever stack is live when [`super::enter_idle`] hands
    /// control to it (spec.md §4.13's "task" stage explicitly skips the
    /// stack carve-out for idle). Its `context` is never switched into
    /// through the ordinary HAL path and is left zeroed.
    pub(super) fn allocate_idle(process: NonNull<Pcb>) -> Option<NonNull<Tcb>> {
        extern "C" fn unreachable_entry(_arg: usize) {
            unreachable!("idle thread dispatched through the ordinary trampoline");
        }

        let raw = slab::alloc(core::mem::size_of::<Tcb>(), Some(core::mem::align_of::<Tcb>())).ok()?;
        let ptr = raw.as_ptr() as *mut Tcb;
        let id = super::NEXT_TID.fetch_add(1, Ordering::Relaxed);
        let seq = super::NEXT_SEQ.fetch_add(1, Ordering::Relaxed);

        // SAFETY: `ptr` is a just-allocated, correctly sized and aligned
        // slab object; nothing else observes it before this write.
        unsafe {
            core::ptr::write(
                ptr,
                Tcb {
                    id,
                    process,
                    state: ThreadState::Ready,
                    context: Context::zeroed(),
                    stack: None,
                    rb_link: RbLink::new(),
                    process_link: ListLink::new(),
                    blocked_on: 0,
                    weight: super::queue::IDLE_WEIGHT,
                    vruntime: u64::MAX,
                    seq,
                    interrupts_enabled: true,
                    trampoline_arg: ThreadEntryInfo { entry: unreachable_entry, arg: 0 },
                },
            );
        }
        Some(unsafe { NonNull::new_unchecked(ptr) })
    }

    /// Builds a detached `Tcb` for runqueue-ordering tests — no process,
    /// stack, or kmalloc storage behind it, never dispatched.
    #[cfg(test)]
    pub(super) fn for_test(weight: u32, vruntime: u64, seq: u64) -> Tcb {
        extern "C" fn unused_entry(_arg: usize) {}
        Tcb {
            id: 0,
            process: NonNull::dangling(),
            state: ThreadState::Ready,
            context: Context::zeroed(),
            stack: None,
            rb_link: RbLink::new(),
            process_link: ListLink::new(),
            blocked_on: 0,
            weight,
            vruntime,
            seq,
            interrupts_enabled: true,
            trampoline_arg: ThreadEntryInfo { entry: unused_entry, arg: 0 },
        }
    }
}

pub struct Pcb {
    pub pid: u32,
    threads: IntrusiveList<Tcb>,
    thread_count: usize,
    pub(super) state: ProcessState,
}

impl Pcb {
    pub fn allocate(pid: u32) -> Option<NonNull<Pcb>> {
        let raw = slab::alloc(core::mem::size_of::<Pcb>(), Some(core::mem::align_of::<Pcb>())).ok()?;
        let ptr = raw.as_ptr() as *mut Pcb;
        // SAFETY: `ptr` is a just-allocated, correctly sized and aligned
        // slab object.
        unsafe {
            core::ptr::write(
                ptr,
                Pcb {
                    pid,
                    threads: IntrusiveList::new(process_link_offset()),
                    thread_count: 0,
                    state: ProcessState::Active,
                },
            );
        }
        Some(unsafe { NonNull::new_unchecked(ptr) })
    }

    pub(super) fn add_thread(&mut self, t: NonNull<Tcb>) {
        self.threads.push_back(t);
        self.thread_count += 1;
    }

    pub fn thread_count(&self) -> usize {
        self.thread_count
    }
}
