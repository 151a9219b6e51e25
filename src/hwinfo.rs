//! Hardware information cache (spec.md §4.6).
//!
//! The device tree is parsed exactly once, at the tail of boot phase one,
//! into a fixed-size record that every later subsystem reads instead of
//! re-walking the DTB. Bounded at 4 memory regions and 8 reserved ranges
//! per spec.md §4.6 — a board with more than that is out of scope, and
//! `HwInfo::capture` reports the overflow rather than silently dropping
//! entries.

use core::fmt;

use crate::arch::PhysAddr;
use crate::fdt::Fdt;

pub const MAX_MEMORY_REGIONS: usize = 4;
pub const MAX_RESERVED_REGIONS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HwInfoError {
    BadDtb,
    TooManyMemoryRegions,
    TooManyReservedRegions,
    NoUsableMemory,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MemRegion {
    pub base: u64,
    pub size: u64,
}

/// Snapshot of everything later subsystems need from the device tree.
/// Built once by [`capture`] and read thereafter through [`get`].
pub struct HwInfo {
    pub dtb_base: PhysAddr,
    pub dtb_size: u64,
    memory: [MemRegion; MAX_MEMORY_REGIONS],
    memory_len: usize,
    reserved: [MemRegion; MAX_RESERVED_REGIONS],
    reserved_len: usize,
    pub total_memory: u64,
    pub timer_frequency: u64,
    pub cpu_count: u32,
    pub uart_base: Option<PhysAddr>,
}

impl HwInfo {
    /// Parses `dtb` and fills in every field. Memory regions are sorted by
    /// descending size so `memory_regions()[0]` is always the largest —
    /// the one the PMM seeds its first arena from.
    pub fn capture(dtb_base: PhysAddr, dtb: &[u8]) -> Result<Self, HwInfoError> {
        let fdt = Fdt::parse(dtb).map_err(|_| HwInfoError::BadDtb)?;

        let mut memory = [MemRegion::default(); MAX_MEMORY_REGIONS];
        let mut memory_len = 0usize;
        let mut total_memory = 0u64;
        for (base, size) in fdt.memory_regions() {
            if memory_len == MAX_MEMORY_REGIONS {
                return Err(HwInfoError::TooManyMemoryRegions);
            }
            memory[memory_len] = MemRegion { base, size };
            memory_len += 1;
            total_memory += size;
        }
        if memory_len == 0 {
            return Err(HwInfoError::NoUsableMemory);
        }
        memory[..memory_len].sort_by(|a, b| b.size.cmp(&a.size));

        let mut reserved = [MemRegion::default(); MAX_RESERVED_REGIONS];
        let mut reserved_len = 0usize;
        for (base, size) in fdt.reserved_regions() {
            if reserved_len == MAX_RESERVED_REGIONS {
                return Err(HwInfoError::TooManyReservedRegions);
            }
            reserved[reserved_len] = MemRegion { base, size };
            reserved_len += 1;
        }

        let cpu_count = fdt.cpu_nodes().count() as u32;

        let timer_frequency = fdt
            .find_node("cpus")
            .and_then(|n| n.property("timebase-frequency"))
            .and_then(|p| p.get(0..4))
            .map(|b| u32::from_be_bytes(b.try_into().unwrap()) as u64)
            .unwrap_or(0);

        let uart_base = fdt
            .find_compatible("arm,pl011")
            .or_else(|| fdt.find_compatible("ns16550a"))
            .and_then(|n| n.property("reg"))
            .and_then(|reg| super::fdt::parse_reg_entry(reg, 2, 1).ok())
            .map(|(base, _size)| PhysAddr::new(base));

        Ok(Self {
            dtb_base,
            dtb_size: dtb.len() as u64,
            memory,
            memory_len,
            reserved,
            reserved_len,
            total_memory,
            timer_frequency,
            cpu_count,
            uart_base,
        })
    }

    pub fn memory_regions(&self) -> &[MemRegion] {
        &self.memory[..self.memory_len]
    }

    pub fn reserved_regions(&self) -> &[MemRegion] {
        &self.reserved[..self.reserved_len]
    }
}

impl fmt::Display for HwInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "hwinfo: dtb={:#x}+{:#x} mem_total={} MiB cpus={} uart={:?}",
            self.dtb_base.as_u64(),
            self.dtb_size,
            self.total_memory / (1024 * 1024),
            self.cpu_count,
            self.uart_base.map(PhysAddr::as_u64),
        )?;
        for r in self.memory_regions() {
            writeln!(f, "  mem  base={:#x} size={:#x}", r.base, r.size)?;
        }
        for r in self.reserved_regions() {
            writeln!(f, "  rsvd base={:#x} size={:#x}", r.base, r.size)?;
        }
        Ok(())
    }
}

// SAFETY: HWINFO is written exactly once, guarded by HWINFO_SET, before any
// secondary CPU is brought up; every read happens after that single write.
static mut HWINFO: Option<HwInfo> = None;
static HWINFO_SET: crate::sync::Once = crate::sync::Once::new();

/// Stores the captured record for later retrieval via [`get`]. Must be
/// called at most once, before any other CPU is started.
pub fn install(info: HwInfo) {
    if !HWINFO_SET.try_once() {
        panic!("hwinfo::install called twice");
    }
    unsafe {
        HWINFO = Some(info);
    }
}

/// Returns the installed record. Panics if called before [`install`].
pub fn get() -> &'static HwInfo {
    if !HWINFO_SET.is_fired() {
        panic!("hwinfo::get called before install");
    }
    unsafe { (*core::ptr::addr_of!(HWINFO)).as_ref().unwrap() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sorts_regions_descending() {
        let mut regions = [
            MemRegion { base: 0, size: 100 },
            MemRegion { base: 200, size: 500 },
            MemRegion { base: 900, size: 50 },
        ];
        regions.sort_by(|a, b| b.size.cmp(&a.size));
        assert_eq!(regions[0].size, 500);
        assert_eq!(regions[2].size, 50);
    }
}
