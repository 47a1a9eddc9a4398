use std::path::PathBuf;

use bitflags::bitflags;

use crate::extent::ExtentMap;
use crate::refcount::RefTable;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackingKind {
    File,
    BlockDevice,
}

/// Identity of a registered area's backing store (spec §3 "Area
/// descriptor"). `previous_block_size` is only meaningful for
/// `BackingKind::BlockDevice` and records what `claim_block_device`
/// reported, so `deactivate` can restore it.
#[derive(Debug, Clone)]
pub struct BackingIdentity {
    pub path: PathBuf,
    pub kind: BackingKind,
    pub slot_size: u32,
    pub previous_block_size: u32,
}

bitflags! {
    /// Area lifecycle flags (spec §3). `SCANNING` is tracked separately as
    /// a saturating counter rather than a flag bit, since more than one
    /// concurrent scan can be in flight against the same area.
    #[derive(Default)]
    pub struct AreaFlags: u32 {
        const USED     = 0b0000_0001;
        const WRITEOK  = 0b0000_0010;
    }
}

impl AreaFlags {
    pub fn is_active(self) -> bool {
        self.contains(AreaFlags::USED | AreaFlags::WRITEOK)
    }
}

/// Per-area bookkeeping: identity, priority, lifecycle flags, allocation
/// cursors, the reference table, and the extent map (spec §3, §4.D).
/// Mirrors `mm/swapfile.c`'s `struct swap_info_struct`.
#[derive(Debug, Clone)]
pub struct AreaDescriptor {
    pub identity: BackingIdentity,
    pub priority: i32,
    pub flags: AreaFlags,
    /// Count of in-flight allocator scans against this area.
    pub scanning: u32,
    /// Total usable slots, including slot 0 (the header) and any bad slots.
    pub max: u32,
    /// Usable, non-bad slots: `max - 1 - bad_count`.
    pub pages: u32,
    pub lowest_bit: u32,
    pub highest_bit: u32,
    pub cluster_next: u32,
    pub cluster_nr: u32,
    pub inuse_pages: u32,
    pub refs: RefTable,
    pub extents: ExtentMap,
}

impl AreaDescriptor {
    /// True once every usable slot is allocated; `lowest_bit`/`highest_bit`
    /// are set to the sentinel emptied-range `(max, 0)` at that point.
    pub fn is_full(&self) -> bool {
        self.highest_bit == 0
    }

    /// Commit a freshly-chosen offset: mark it allocated, advance the
    /// rolling cluster cursor, tighten the free-range bounds, and flip to
    /// the full sentinel once the area has no slots left (spec §4.B "On
    /// picking offset o").
    pub fn commit_pick(&mut self, offset: u32) {
        self.refs.allocate_slot(offset);
        self.cluster_next = offset + 1;
        if offset == self.lowest_bit {
            self.lowest_bit += 1;
        }
        if offset == self.highest_bit {
            self.highest_bit = self.highest_bit.saturating_sub(1);
        }
        self.inuse_pages += 1;
        if self.inuse_pages == self.pages {
            self.lowest_bit = self.max;
            self.highest_bit = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extent::ExtentMap;
    use crate::refcount::RefTable;

    fn test_area(max: u32) -> AreaDescriptor {
        let mut refs = RefTable::new(max as usize);
        refs.set_bad(0);
        let mut extents = ExtentMap::new();
        extents.push(1, max - 1, 0);
        AreaDescriptor {
            identity: BackingIdentity {
                path: "/tmp/x".into(),
                kind: BackingKind::File,
                slot_size: 4096,
                previous_block_size: 0,
            },
            priority: 0,
            flags: AreaFlags::USED | AreaFlags::WRITEOK,
            scanning: 0,
            max,
            pages: max - 1,
            lowest_bit: 1,
            highest_bit: max - 1,
            cluster_next: 1,
            cluster_nr: 0,
            inuse_pages: 0,
            refs,
            extents,
        }
    }

    #[test]
    fn commit_pick_tightens_bounds_and_detects_full() {
        let mut a = test_area(4); // usable offsets 1,2,3
        a.commit_pick(1);
        assert_eq!(a.lowest_bit, 2);
        assert!(!a.is_full());
        a.commit_pick(2);
        a.commit_pick(3);
        assert!(a.is_full());
        assert_eq!(a.lowest_bit, a.max);
        assert_eq!(a.highest_bit, 0);
    }
}
