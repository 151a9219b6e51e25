//! Thread, process, and CFS-style scheduler (spec.md §4.12).
//!
//! One global runqueue behind a single ticket lock — the spec's own
//! "Shared resources" note calls sharding per CPU a future extension, out
//! of scope while only one hart is ever started. Grounded in the
//! teacher's `sched::scheduler::Scheduler` shape (a `current`/`idle_task`
//! pair plus a run queue behind a lock), with the run queue itself
//! replaced end to end: `sched.ref::queue` is a priority-bitmap circular
//! buffer, nothing like the vruntime-ordered red-black tree this core
//! needs, so the runqueue discipline here is built fresh on
//! `crate::rbtree` instead of adapted from it.

mod queue;
mod task;

use core::ptr::NonNull;
use core::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use crate::arch::current::{context, cpu, fpu};
use crate::rbtree::RbTree;
use crate::sync::{TicketLock, TicketLockGuard};

pub use queue::DEFAULT_WEIGHT;
pub use task::{Pcb, ProcessState, Tcb, ThreadState};

use queue::VruntimeOrder;

type Runqueue = RbTree<Tcb, VruntimeOrder>;

struct SchedState {
    runqueue: Runqueue,
    current: Option<NonNull<Tcb>>,
    idle: Option<NonNull<Tcb>>,
    min_vruntime: u64,
    need_resched: bool,
}

impl SchedState {
    const fn new() -> Self {
        Self {
            runqueue: Runqueue::new(task::rb_link_offset()),
            current: None,
            idle: None,
            min_vruntime: 0,
            need_resched: false,
        }
    }
}

// SAFETY: every `Tcb`/`Pcb` reachable through `SchedState` is a pinned
// kmalloc allocation, never aliased outside the scheduler lock.
unsafe impl Send for SchedState {}

static SCHED: TicketLock<SchedState> = TicketLock::new(SchedState::new());
static NEXT_PID: AtomicU32 = AtomicU32::new(0);
static NEXT_TID: AtomicU32 = AtomicU32::new(0);
static NEXT_SEQ: AtomicU64 = AtomicU64::new(0);

fn idle_loop() -> ! {
    loop {
        cpu::wait_for_interrupt();
    }
}

/// Creates the kernel process and its idle thread (spec.md §4.13's "task"
/// stage). Does not yet switch to idle — [`enter_idle`] does that once
/// the boot orchestrator is ready to give up the boot stack for good.
pub fn init() {
    let pid = NEXT_PID.fetch_add(1, Ordering::Relaxed);
    let process = Pcb::allocate(pid).expect("kmalloc exhausted creating kernel process");

    let idle =
        task::Tcb::allocate_idle(process).expect("kmalloc exhausted creating idle thread");
    unsafe {
        (*process.as_ptr()).add_thread(idle);
    }

    let mut locked = SCHED.guard();
    locked.idle = Some(idle);
}

/// Hands control to the idle thread. The boot stack becomes the idle
/// thread's stack permanently — there is no architecture-level context
/// switch to perform since nothing will ever resume the boot flow.
pub fn enter_idle() -> ! {
    let mut locked = SCHED.guard();
    let idle = locked.idle.expect("scheduler not initialized");
    unsafe {
        (*idle.as_ptr()).state = ThreadState::Running;
    }
    locked.current = Some(idle);
    drop(locked);
    idle_loop();
}

fn enqueue(state: &mut SchedState, mut t: NonNull<Tcb>) {
    unsafe {
        if Some(t) == state.idle {
            t.as_mut().state = ThreadState::Ready;
            return;
        }
        debug_assert!(!t.as_ref().is_enqueued(), "enqueue of an already-enqueued thread");
        if t.as_ref().vruntime < state.min_vruntime {
            t.as_mut().vruntime = state.min_vruntime;
        }
        t.as_mut().state = ThreadState::Ready;
        state.runqueue.insert(t);
    }
}

fn pick_next(state: &mut SchedState) -> NonNull<Tcb> {
    state
        .runqueue
        .extract_min()
        .unwrap_or_else(|| state.idle.expect("scheduler not initialized"))
}

/// Creates a thread in `process`'s thread list and enqueues it ready to
/// run. Weight defaults to [`queue::DEFAULT_WEIGHT`] for ordinary callers;
/// only [`init`]'s idle thread uses a different weight.
pub fn create_thread(
    process: NonNull<Pcb>,
    entry: extern "C" fn(usize),
    arg: usize,
    weight: u32,
) -> Option<NonNull<Tcb>> {
    let tcb = task::Tcb::allocate(process, entry, arg, weight)?;
    let mut locked = SCHED.guard();
    unsafe {
        (*process.as_ptr()).add_thread(tcb);
    }
    enqueue(&mut locked, tcb);
    Some(tcb)
}

/// Charges the running thread for one tick and decides whether a better
/// thread is ready (spec.md §4.12, "Tick").
pub fn tick() {
    let mut locked = SCHED.guard();
    let current = match locked.current {
        Some(c) => c,
        None => return,
    };

    let current_is_idle = Some(current) == locked.idle;
    let current_vruntime = unsafe {
        if !current_is_idle {
            let weight = current.as_ref().weight;
            assert_ne!(weight, 0, "zero-weight thread on tick");
            let delta = queue::charge(weight);
            let mut cur = current;
            cur.as_mut().vruntime = cur.as_ref().vruntime.saturating_add(delta);
            cur.as_ref().vruntime
        } else {
            u64::MAX
        }
    };

    if let Some(min_node) = locked.runqueue.peek_min() {
        let min_vruntime = unsafe { min_node.as_ref().vruntime };
        if min_vruntime < current_vruntime {
            locked.need_resched = true;
        }
        locked.min_vruntime = locked.min_vruntime.max(current_vruntime.min(min_vruntime));
    }
}

/// Finishes a switch begun with the scheduler lock held: saves the
/// interrupt-enable flag into the outgoing thread, marks the incoming
/// thread running, hands FPU ownership across, releases the lock without
/// touching interrupts, and performs the architecture switch. Once this
/// returns — when `current` is dispatched again, possibly much later —
/// interrupts are restored per the flag just saved (spec.md §4.12,
/// "Context switch").
fn perform_switch(
    locked: TicketLockGuard<'_, SchedState>,
    mut current: NonNull<Tcb>,
    mut next: NonNull<Tcb>,
    was_enabled: bool,
) {
    let mut locked = locked;
    unsafe {
        current.as_mut().interrupts_enabled = was_enabled;
        next.as_mut().state = ThreadState::Running;
    }
    locked.current = Some(next);
    fpu::on_context_switch(cpu::current_id());
    drop(locked);

    unsafe {
        context::switch(current.as_mut().context_mut(), next.as_ref().context_ptr());
    }

    let restore = unsafe { current.as_ref().interrupts_enabled };
    if restore {
        cpu::enable_interrupts();
    }
}

/// Requeues the current thread and switches to whatever runs next,
/// including itself if nothing else is ready.
pub fn yield_now() {
    let was_enabled = cpu::disable_interrupts();
    let mut locked = SCHED.lock();
    let current = locked.current.expect("yield_now before scheduler init");

    enqueue(&mut locked, current);
    let next = pick_next(&mut locked);

    if next == current {
        unsafe {
            (*current.as_ptr()).state = ThreadState::Running;
        }
        drop(locked);
        if was_enabled {
            cpu::enable_interrupts();
        }
        return;
    }

    perform_switch(locked, current, next, was_enabled);
}

/// Blocks the current thread on an opaque wait channel. Not re-enqueued;
/// only [`wake`] can make it ready again.
pub fn block(wait_obj: usize) {
    let was_enabled = cpu::disable_interrupts();
    let mut locked = SCHED.lock();
    let current = locked.current.expect("block before scheduler init");

    unsafe {
        let mut cur = current;
        cur.as_mut().blocked_on = wait_obj;
        cur.as_mut().state = ThreadState::Blocked;
    }
    let next = pick_next(&mut locked);
    perform_switch(locked, current, next, was_enabled);
}

/// Makes a blocked thread ready again. A no-op if it is not blocked.
pub fn wake(mut t: NonNull<Tcb>) {
    let mut locked = SCHED.guard();
    unsafe {
        if t.as_ref().state == ThreadState::Blocked {
            t.as_mut().blocked_on = 0;
            enqueue(&mut locked, t);
        }
    }
}

/// Terminates the current thread. Its TCB and kernel stack are leaked:
/// nothing can safely unmap a stack while still executing on it, and no
/// other thread is ever handed a pointer to reap it later (spec.md has no
/// reaper in scope).
pub fn exit() -> ! {
    let was_enabled = cpu::disable_interrupts();
    let mut locked = SCHED.lock();
    let current = locked.current.expect("exit before scheduler init");

    fpu::on_thread_exit(cpu::current_id());
    unsafe {
        (*current.as_ptr()).state = ThreadState::Exited;
    }
    let next = pick_next(&mut locked);
    perform_switch(locked, current, next, was_enabled);
    unreachable!("exited thread resumed");
}

/// Called from the trap core after every trap is handled, before the
/// frame is restored (spec.md §4.10, §4.12's "Preempt from trap").
pub fn preempt_from_trap() {
    let was_enabled = cpu::disable_interrupts();
    let mut locked = SCHED.lock();

    if !locked.need_resched {
        drop(locked);
        if was_enabled {
            cpu::enable_interrupts();
        }
        return;
    }
    locked.need_resched = false;

    let current = locked.current.expect("preempt_from_trap before scheduler init");
    let next = pick_next(&mut locked);
    if next == current {
        drop(locked);
        if was_enabled {
            cpu::enable_interrupts();
        }
        return;
    }

    if Some(current) != locked.idle {
        enqueue(&mut locked, current);
    } else {
        unsafe {
            (*current.as_ptr()).state = ThreadState::Ready;
        }
    }

    perform_switch(locked, current, next, was_enabled);
}
