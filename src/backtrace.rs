//! Frame-pointer backtrace walker for the panic path (spec.md §7).
//!
//! Bounded to 16 frames; stops on a null frame pointer, one outside the
//! kernel's higher-half range, or a stride greater than 64 KiB between
//! consecutive frames — the same three stop conditions spec.md names.
//! "Outside the kernel range" is simplified to "below `KERNEL_BASE`": every
//! live kernel stack, including the boot stack baked into the linked image,
//! sits above that line, and nothing this walker visits should ever be a
//! userspace address (there is no userspace in scope).

use crate::arch::current::{cpu, mmu};

const MAX_FRAMES: usize = 16;
const MAX_STRIDE: u64 = 64 * 1024;

/// Walks the current call stack from the live frame pointer, calling
/// `on_frame` with each return address in order, innermost first.
pub fn walk(mut on_frame: impl FnMut(u64)) {
    let mut fp = cpu::current_frame_pointer();

    for _ in 0..MAX_FRAMES {
        if fp == 0 || fp < mmu::KERNEL_BASE {
            return;
        }

        // SAFETY: `fp` was just checked non-null and within the kernel's
        // higher-half range; the walker trusts the compiler-maintained
        // frame-pointer chain within those bounds.
        let (ra, caller_fp) = unsafe { cpu::unwind_frame(fp) };
        on_frame(ra);

        if caller_fp != 0 && fp.abs_diff(caller_fp) > MAX_STRIDE {
            return;
        }
        fp = caller_fp;
    }
}
