//! CFS-style vruntime ordering (spec.md §4.12).
//!
//! The runqueue itself is just [`crate::rbtree::RbTree`] keyed by this
//! comparator — unlike the teacher's `sched::queue`, which is a
//! circular-buffer priority bitmap with no notion of virtual runtime, so
//! nothing from it carries over beyond the module name.

use core::cmp::Ordering;

use crate::rbtree::RbComparator;

use super::task::Tcb;

/// Scale factor a weight-1024 thread is charged against: `Δ = SLICE_NS *
/// BASE_WEIGHT / weight`, making 1024 the "normal" weight that is charged
/// exactly one slice per tick.
pub const BASE_WEIGHT: u32 = 1024;
pub const IDLE_WEIGHT: u32 = 1;
pub const DEFAULT_WEIGHT: u32 = BASE_WEIGHT;

/// One 100 Hz tick's worth of nanoseconds, mirroring `clock`'s fixed
/// cadence (spec.md §4.11).
pub const SLICE_NS: u64 = 10_000_000;

pub struct VruntimeOrder;

impl RbComparator<Tcb> for VruntimeOrder {
    /// Orders by vruntime, then by insertion sequence so two threads that
    /// reach the same vruntime never compare equal — `RbTree` requires a
    /// stable tiebreak or its invariant checks (and `find`) break.
    fn compare(a: &Tcb, b: &Tcb) -> Ordering {
        a.vruntime.cmp(&b.vruntime).then(a.seq.cmp(&b.seq))
    }
}

/// `Δ = SLICE_NS * BASE_WEIGHT / weight`, the per-tick vruntime charge
/// (spec.md §8 property 9). `weight` must be nonzero; callers panic on a
/// zero-weight thread rather than pass one here.
pub(super) fn charge(weight: u32) -> u64 {
    SLICE_NS.saturating_mul(BASE_WEIGHT as u64) / weight as u64
}

#[cfg(all(test, not(target_os = "none")))]
mod tests {
    use core::ptr::NonNull;

    use super::super::task::Tcb;
    use super::*;
    use crate::rbtree::RbTree;

    #[test]
    fn charge_scales_inversely_with_weight() {
        assert_eq!(charge(BASE_WEIGHT), SLICE_NS);
        assert_eq!(charge(BASE_WEIGHT * 2), SLICE_NS / 2);
        assert_eq!(charge(1), SLICE_NS * BASE_WEIGHT as u64);
    }

    #[test]
    fn extract_min_yields_ascending_vruntime() {
        let mut a = Tcb::for_test(DEFAULT_WEIGHT, 30, 0);
        let mut b = Tcb::for_test(DEFAULT_WEIGHT, 10, 1);
        let mut c = Tcb::for_test(DEFAULT_WEIGHT, 20, 2);

        let mut tree: RbTree<Tcb, VruntimeOrder> = RbTree::new(super::super::task::rb_link_offset());
        tree.insert(NonNull::from(&mut a));
        tree.insert(NonNull::from(&mut b));
        tree.insert(NonNull::from(&mut c));

        let order: alloc::vec::Vec<u64> =
            core::iter::from_fn(|| tree.extract_min().map(|p| unsafe { p.as_ref().vruntime }))
                .collect();
        assert_eq!(order, alloc::vec![10, 20, 30]);
    }
}
