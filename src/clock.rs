//! Fixed 100 Hz system clock (spec.md §4.11).
//!
//! The only consumer of the timer IRQ: every tick feeds the scheduler's
//! accounting (`sched::tick`) and keeps a drift-free absolute deadline
//! schedule. Grounded in the teacher's `timer` module's tick-counting
//! shape, trimmed of its software timer-wheel (`timer.ref`'s 256-slot
//! wheel is a general-purpose facility this core has no use for — the
//! only client of elapsed time here is the scheduler).

use core::sync::atomic::{AtomicU64, Ordering};

use crate::arch::current::timer;

const TICK_HZ: u64 = 100;

static TICKS_PER_INTERVAL: AtomicU64 = AtomicU64::new(0);
static NEXT_TICK: AtomicU64 = AtomicU64::new(0);
static TICK_COUNT: AtomicU64 = AtomicU64::new(0);

/// Enables the 100 Hz tick (the "clock" boot stage, spec.md §4.13) and
/// panics if the architecture reports a zero counter frequency — a zero
/// frequency makes every later deadline computation divide-by-zero
/// nonsense, so this is caught here rather than producing a silently-wrong
/// schedule.
///
/// `timer::init()` runs before the first `set_deadline` call, not after:
/// on AArch64 it also brings up the GIC and leaves the comparator masked,
/// so arming the deadline first would have the immediately-following
/// `init()` mask the very enable bit `set_deadline` just set.
pub fn init() {
    let frequency = timer::frequency();
    assert_ne!(frequency, 0, "zero timer frequency at clock init");

    let interval = frequency / TICK_HZ;
    TICKS_PER_INTERVAL.store(interval, Ordering::Relaxed);

    let first_deadline = timer::now() + interval;
    NEXT_TICK.store(first_deadline, Ordering::Relaxed);
    TICK_COUNT.store(0, Ordering::Relaxed);

    timer::init();
    timer::set_deadline(first_deadline);
}

/// Called from the trap core on every [`crate::arch::TrapKind::TimerIrq`].
/// Advances the absolute deadline by whole intervals only — never by a
/// fraction recomputed from `now()` — so handler latency never
/// accumulates into the schedule (spec.md §8 property 11).
pub fn on_timer_interrupt() {
    TICK_COUNT.fetch_add(1, Ordering::Relaxed);

    let interval = TICKS_PER_INTERVAL.load(Ordering::Relaxed);
    let mut deadline = NEXT_TICK.load(Ordering::Relaxed) + interval;
    let now = timer::now();
    while deadline <= now {
        deadline += interval;
    }
    NEXT_TICK.store(deadline, Ordering::Relaxed);
    timer::set_deadline(deadline);

    crate::sched::tick();
}

pub fn tick_count() -> u64 {
    TICK_COUNT.load(Ordering::Relaxed)
}

/// Monotonic time since boot, in nanoseconds.
pub fn get_monotonic_ns() -> u64 {
    timer::ticks_to_ns(timer::now())
}

#[cfg(all(test, not(target_os = "none")))]
mod tests {
    use super::*;

    #[test]
    fn ticks_per_interval_matches_frequency() {
        init();
        assert_eq!(TICKS_PER_INTERVAL.load(Ordering::Relaxed), timer::frequency() / TICK_HZ);
    }
}
