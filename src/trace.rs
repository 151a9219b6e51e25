//! Per-CPU lock-free trace ring (spec.md §4.13's "trace" stage, undetailed
//! in spec.md itself).
//!
//! Grounded in the teacher's `sync::lockfree_queue`/`sync::hazard` treatment
//! of structures usable from trap context, but collapsed from their
//! heap-allocated Michael-Scott list down to a fixed array per CPU: nothing
//! here may allocate, since the panic path and trap entry are exactly the
//! contexts this ring exists to serve. Each ring has exactly one writer (the
//! CPU that owns it), so a plain `fetch_add` wrapping index is enough —
//! no CAS, no hazard pointers.

use core::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

/// Upper bound on distinct per-CPU rings, independent of how many CPUs are
/// actually started (spec.md §4.13: "capped at a compile-time MAX_CPUS").
pub const MAX_CPUS: usize = 8;
const RING_CAPACITY: usize = 64;

#[derive(Clone, Copy)]
struct Entry {
    tick: u64,
    tag: u16,
    value: u64,
}

impl Entry {
    const fn empty() -> Self {
        Self { tick: 0, tag: 0, value: 0 }
    }
}

struct Ring {
    entries: [core::cell::UnsafeCell<Entry>; RING_CAPACITY],
    write: AtomicUsize,
}

// SAFETY: each ring has exactly one writer, the CPU whose id indexes it;
// readers (the panic path) only run after that CPU has stopped.
unsafe impl Sync for Ring {}

impl Ring {
    const fn new() -> Self {
        const EMPTY: core::cell::UnsafeCell<Entry> = core::cell::UnsafeCell::new(Entry::empty());
        Self { entries: [EMPTY; RING_CAPACITY], write: AtomicUsize::new(0) }
    }

    fn push(&self, tick: u64, tag: u16, value: u64) {
        let idx = self.write.fetch_add(1, Ordering::Relaxed) % RING_CAPACITY;
        // SAFETY: only this CPU ever writes its own ring, and the index is
        // unique to this call (fetch_add), so no concurrent writer aliases it.
        unsafe {
            *self.entries[idx].get() = Entry { tick, tag, value };
        }
    }
}

static RINGS: [Ring; MAX_CPUS] = [
    Ring::new(),
    Ring::new(),
    Ring::new(),
    Ring::new(),
    Ring::new(),
    Ring::new(),
    Ring::new(),
    Ring::new(),
];
static ACTIVE_CPUS: AtomicU32 = AtomicU32::new(1);

/// Sizes the ring set to `cpu_count`, capped at [`MAX_CPUS`]. Called once
/// from the "trace" boot stage.
pub fn init(cpu_count: u32) {
    ACTIVE_CPUS.store(cpu_count.clamp(1, MAX_CPUS as u32), Ordering::Relaxed);
}

/// Records one event into the calling CPU's ring. A no-op if the `trace`
/// feature is disabled or the CPU id is outside the active set.
pub fn record(tag: u16, value: u64) {
    #[cfg(feature = "trace")]
    {
        let cpu = crate::arch::current::cpu::current_id() as usize;
        if cpu < ACTIVE_CPUS.load(Ordering::Relaxed) as usize && cpu < MAX_CPUS {
            RINGS[cpu].push(crate::clock::tick_count(), tag, value);
        }
    }
    #[cfg(not(feature = "trace"))]
    let _ = (tag, value);
}

/// Dumps the most recent entries of CPU `cpu`'s ring, oldest first, for the
/// panic path. Returns an empty slice view (zero entries reported) if
/// nothing has been recorded yet or `cpu` was never activated.
pub fn dump(cpu: usize, mut on_entry: impl FnMut(u64, u16, u64)) {
    if cpu >= MAX_CPUS || cpu >= ACTIVE_CPUS.load(Ordering::Relaxed) as usize {
        return;
    }
    let ring = &RINGS[cpu];
    let written = ring.write.load(Ordering::Relaxed);
    let count = written.min(RING_CAPACITY);
    let start = written.saturating_sub(count);
    for i in start..written {
        // SAFETY: the panic path only calls this after the owning CPU has
        // stopped making progress; no writer races this read.
        let e = unsafe { *ring.entries[i % RING_CAPACITY].get() };
        on_entry(e.tick, e.tag, e.value);
    }
}

#[cfg(all(test, not(target_os = "none")))]
mod tests {
    use super::*;

    #[test]
    fn push_wraps_at_capacity() {
        let ring = Ring::new();
        for i in 0..(RING_CAPACITY * 2) {
            ring.push(i as u64, 1, i as u64);
        }
        assert_eq!(ring.write.load(Ordering::Relaxed), RING_CAPACITY * 2);
    }

    #[test]
    fn init_clamps_to_max_cpus() {
        init(1000);
        assert_eq!(ACTIVE_CPUS.load(Ordering::Relaxed), MAX_CPUS as u32);
        init(2);
        assert_eq!(ACTIVE_CPUS.load(Ordering::Relaxed), 2);
    }
}
