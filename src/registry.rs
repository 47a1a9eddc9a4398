use std::path::Path;

use crate::area::{AreaDescriptor, AreaFlags};

/// The set of registered areas plus the priority-ordered allocation list
/// (spec §4.D/E). Mirrors `mm/swapfile.c`'s `swap_info[]` array together
/// with the `swap_list` priority-ordered singly-linked list and the global
/// `nr_swap_pages`/`total_swap_pages` counters.
///
/// Slots of `areas` are kept `Some` for the lifetime of an area's
/// registration *and* for the duration of its deactivation drain, so that
/// `free`/`duplicate`/`lookup` keep working on a draining area even after
/// it has been pulled out of `order` (and is therefore no longer a
/// candidate for fresh allocations). The slot only becomes `None` once
/// `destroy` runs at the end of a successful drain.
#[derive(Default)]
pub struct Registry {
    areas: Vec<Option<AreaDescriptor>>,
    /// Priority-ordered (descending) list of area indices eligible for
    /// allocation. An area under drain is absent from this list even
    /// though its slot in `areas` is still `Some`.
    order: Vec<u32>,
    /// Cached "try here first" cursor (spec §4.D). `None` iff `order` is
    /// empty.
    next_area_index: Option<u32>,
    /// Signed, matching `mm/swapfile.c`'s `int nr_swap_pages`: `begin_drain`
    /// debits an area's *full* `pages` up front and relies on the ordinary
    /// per-slot `free()` increments during drain to repay exactly the
    /// in-use portion, so the counter can run transiently negative between
    /// those two events without underflowing.
    pub total_free_slots: i64,
    pub total_pages: u64,
    least_priority: i32,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, idx: u32) -> Option<&AreaDescriptor> {
        self.areas.get(idx as usize)?.as_ref()
    }

    pub fn get_mut(&mut self, idx: u32) -> Option<&mut AreaDescriptor> {
        self.areas.get_mut(idx as usize)?.as_mut()
    }

    pub fn find_by_path(&self, path: &Path) -> Option<u32> {
        self.areas.iter().enumerate().find_map(|(i, a)| {
            a.as_ref()
                .filter(|a| a.identity.path == path)
                .map(|_| i as u32)
        })
    }

    /// Reserve a slot for a new area, reusing the first vacated index if
    /// one exists. The returned index is not yet registered: call
    /// `insert` to populate it.
    pub fn reserve_slot(&mut self) -> u32 {
        for (i, a) in self.areas.iter().enumerate() {
            if a.is_none() {
                return i as u32;
            }
        }
        self.areas.push(None);
        (self.areas.len() - 1) as u32
    }

    /// The next default priority for an area that did not request one
    /// explicitly: monotonically decreasing, matching `mm/swapfile.c`'s
    /// `static int least_priority; ... p->prio = --least_priority;`.
    pub fn next_default_priority(&mut self) -> i32 {
        self.least_priority -= 1;
        self.least_priority
    }

    /// Undo a default-priority assignment that was never committed
    /// (activation failed before `insert`), matching `sys_swapon`'s
    /// `bad_swap: if (!(swap_flags & SWAP_FLAG_PREFER)) ++least_priority;`.
    pub fn undo_default_priority(&mut self) {
        self.least_priority += 1;
    }

    fn insertion_position(&self, priority: i32) -> usize {
        // New entries are inserted just before the first existing entry of
        // priority <= their own, matching mm/swapfile.c's swap_list
        // insertion walk (`if (p->prio >= swap_info[i].prio) break;`).
        self.order
            .iter()
            .position(|&i| priority >= self.get(i).unwrap().priority)
            .unwrap_or(self.order.len())
    }

    /// Register a freshly-built area at `idx` (reserved via `reserve_slot`)
    /// and make it eligible for allocation.
    pub fn insert(&mut self, idx: u32, area: AreaDescriptor) {
        let priority = area.priority;
        let free = (area.pages - area.inuse_pages) as i64;
        self.total_free_slots += free;
        self.total_pages += area.pages as u64;
        self.areas[idx as usize] = Some(area);

        let pos = self.insertion_position(priority);
        self.order.insert(pos, idx);
        // Mirrors sys_swapon: swap_list.head/next only move to the new
        // area when it lands at the very front of the list.
        if pos == 0 {
            self.next_area_index = Some(idx);
        }
    }

    /// Phase 1 of deactivation: pull an area out of the allocation list
    /// without destroying it, so in-flight `free`/`duplicate`/`lookup`
    /// calls and the drain loop can keep addressing it by index.
    ///
    /// Debits the area's *full* `pages` from `total_free_slots`, not just
    /// its currently-free portion (mirrors `sys_swapoff`'s
    /// `nr_swap_pages -= p->pages`). The drain loop frees each live slot
    /// through the ordinary `free()` path, which re-credits
    /// `total_free_slots` by one per slot; by the time every live slot has
    /// been freed, that exactly repays the `inuse_pages` difference and
    /// leaves the net change at `-(pages - inuse_pages)`, matching
    /// Invariant §3.6. The counter can run transiently negative while the
    /// drain is in progress — expected, since the field is signed for
    /// exactly this reason.
    pub fn begin_drain(&mut self, idx: u32) {
        self.order.retain(|&i| i != idx);
        if self.next_area_index == Some(idx) {
            self.next_area_index = self.order.first().copied();
        }
        let area = self.get_mut(idx).expect("begin_drain on unregistered area");
        area.flags.remove(AreaFlags::WRITEOK);
        self.total_free_slots -= area.pages as i64;
        self.total_pages -= area.pages as u64;
    }

    /// Undo `begin_drain` after an aborted drain. Credits back the same
    /// full `pages` that `begin_drain` debited, which is correct
    /// regardless of how many slots the aborted drain managed to free in
    /// the meantime: each of those frees already re-credited one slot via
    /// the ordinary `free()` path, and crediting `pages` here restores the
    /// rest, leaving the area's net contribution at `pages - inuse_pages`
    /// for whatever `inuse_pages` is now.
    pub fn rollback_drain(&mut self, idx: u32) {
        let priority = {
            let area = self.get_mut(idx).expect("rollback_drain on unknown area");
            area.flags.insert(AreaFlags::WRITEOK);
            area.priority
        };
        let area = self.get(idx).unwrap();
        self.total_free_slots += area.pages as i64;
        self.total_pages += area.pages as u64;

        let pos = self.insertion_position(priority);
        self.order.insert(pos, idx);
        if pos == 0 || self.next_area_index.is_none() {
            self.next_area_index = Some(idx);
        }
    }

    /// Phase 5 of deactivation: the drain succeeded, free the descriptor
    /// slot entirely.
    pub fn destroy(&mut self, idx: u32) -> AreaDescriptor {
        self.areas[idx as usize]
            .take()
            .expect("destroy on unregistered area")
    }

    pub fn next_area_index(&self) -> Option<u32> {
        self.next_area_index
    }

    pub fn set_next_area_index(&mut self, idx: Option<u32>) {
        self.next_area_index = idx;
    }

    pub fn head(&self) -> Option<u32> {
        self.order.first().copied()
    }

    /// The area immediately after `idx` in priority order, or `None` at
    /// the end of the list.
    pub fn successor(&self, idx: u32) -> Option<u32> {
        let pos = self.order.iter().position(|&i| i == idx)?;
        self.order.get(pos + 1).copied()
    }

    pub fn priority_of(&self, idx: u32) -> Option<i32> {
        self.get(idx).map(|a| a.priority)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::area::BackingKind;
    use crate::extent::ExtentMap;
    use crate::refcount::RefTable;

    fn area(priority: i32) -> AreaDescriptor {
        let mut refs = RefTable::new(4);
        refs.set_bad(0);
        let mut extents = ExtentMap::new();
        extents.push(1, 3, 0);
        AreaDescriptor {
            identity: crate::area::BackingIdentity {
                path: format!("/tmp/{}", priority).into(),
                kind: BackingKind::File,
                slot_size: 4096,
                previous_block_size: 0,
            },
            priority,
            flags: AreaFlags::USED | AreaFlags::WRITEOK,
            scanning: 0,
            max: 4,
            pages: 3,
            lowest_bit: 1,
            highest_bit: 3,
            cluster_next: 1,
            cluster_nr: 0,
            inuse_pages: 0,
            refs,
            extents,
        }
    }

    #[test]
    fn higher_priority_sorts_first() {
        let mut r = Registry::new();
        let i0 = r.reserve_slot();
        r.insert(i0, area(5));
        let i1 = r.reserve_slot();
        r.insert(i1, area(10));
        assert_eq!(r.head(), Some(i1));
        assert_eq!(r.successor(i1), Some(i0));
    }

    #[test]
    fn begin_drain_removes_from_order_but_keeps_descriptor() {
        let mut r = Registry::new();
        let idx = r.reserve_slot();
        r.insert(idx, area(0));
        assert_eq!(r.total_pages, 3);
        r.begin_drain(idx);
        assert_eq!(r.head(), None);
        assert!(r.get(idx).is_some());
        assert_eq!(r.total_pages, 0);
        r.rollback_drain(idx);
        assert_eq!(r.head(), Some(idx));
        assert_eq!(r.total_pages, 3);
    }
}
