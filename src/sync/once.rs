//! One-shot boolean flag (spec.md §4.3 `Once`).
//!
//! Distinct from `spin::Once<T>`: this carries no payload, only a single
//! bit, used wherever a path must run — or must be refused — exactly
//! once. The panic-reentrancy gate (§7) is its primary consumer: the
//! first panic flips the flag and proceeds; any panic nested inside that
//! unwind sees the flag already set and halts instead of recursing.

use core::sync::atomic::{AtomicBool, Ordering};

pub struct Once {
    fired: AtomicBool,
}

impl Once {
    pub const fn new() -> Self {
        Self { fired: AtomicBool::new(false) }
    }

    /// Atomically sets the flag and returns `true` for the caller that
    /// flips it from unfired to fired — i.e. at most one caller ever sees
    /// `true`. Acquire-ordered so the winner's subsequent reads observe
    /// everything visible to whoever might have already fired it.
    pub fn try_once(&self) -> bool {
        !self.fired.swap(true, Ordering::AcqRel)
    }

    pub fn is_fired(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }

    /// Resets the flag. Only safe when the caller can prove no other
    /// thread still observes the prior firing — intended for test setup,
    /// never for runtime use.
    #[cfg(test)]
    pub fn reset(&self) {
        self.fired.store(false, Ordering::Release);
    }
}

impl Default for Once {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_exactly_once() {
        let once = Once::new();
        assert!(once.try_once());
        assert!(!once.try_once());
        assert!(!once.try_once());
        assert!(once.is_fired());
    }

    #[test]
    fn reset_allows_refire() {
        let once = Once::new();
        assert!(once.try_once());
        once.reset();
        assert!(once.try_once());
    }
}
