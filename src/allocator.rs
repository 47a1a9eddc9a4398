use std::sync::MutexGuard;

use log::warn;

use crate::area::{AreaDescriptor, AreaFlags};
use crate::backend::SwapBackend;
use crate::entry::SwapEntry;
use crate::error::SwapError;
use crate::refcount;
use crate::registry::Registry;
use crate::SwapCore;

impl<B: SwapBackend> SwapCore<B> {
    /// Pick one free slot from whichever eligible area the registry's
    /// round-robin cursor currently favors, atomically claim it, and
    /// return its entry. Mirrors `mm/swapfile.c`'s `get_swap_page`: walk
    /// the priority list starting at the cached cursor, skip areas that
    /// are full or not writable, bound the walk to two full laps, and
    /// leave the cursor at the successor of whichever area answered.
    pub fn allocate(&self) -> Option<SwapEntry> {
        let mut guard = self.inner.lock().unwrap();
        if guard.total_free_slots == 0 {
            return None;
        }
        guard.total_free_slots -= 1;

        let mut wrapped = 0u32;
        let mut current = guard.next_area_index();

        loop {
            let idx = match current {
                Some(i) if wrapped < 2 => i,
                _ => {
                    guard.total_free_slots += 1;
                    return None;
                }
            };

            let succ = guard.successor(idx);
            let crosses_band = match succ {
                Some(s) => guard.priority_of(s) != guard.priority_of(idx),
                None => true,
            };
            let mut next = succ;
            if succ.is_none() || (wrapped == 0 && crosses_band) {
                next = guard.head();
                wrapped += 1;
            }

            let eligible = guard
                .get(idx)
                .map_or(false, |a| !a.is_full() && a.flags.contains(AreaFlags::WRITEOK));

            if !eligible {
                current = next;
                continue;
            }

            guard.set_next_area_index(next);
            let (new_guard, offset) = self.scan_area(guard, idx);
            guard = new_guard;
            if let Some(offset) = offset {
                return Some(SwapEntry::new(idx, offset));
            }
            // Re-read rather than reuse `next`: a concurrent free() may
            // have repointed the cursor at a more attractive area while
            // the lock was released for the cluster scan.
            current = guard.next_area_index();
        }
    }

    /// Scan one area for a free slot (spec §4.B). Prefers a fresh,
    /// entirely-empty cluster of `cluster_size` slots, probed with the
    /// allocator lock released; falls back to a plain lowest-free scan
    /// under the lock when no such cluster exists or the one found loses
    /// a race before it can be claimed.
    fn scan_area<'a>(
        &self,
        mut guard: MutexGuard<'a, Registry>,
        idx: u32,
    ) -> (MutexGuard<'a, Registry>, Option<u32>) {
        guard.get_mut(idx).unwrap().scanning += 1;

        let cluster_nr = guard.get(idx).unwrap().cluster_nr;
        if cluster_nr == 0 {
            let (pages, inuse) = {
                let a = guard.get(idx).unwrap();
                (a.pages, a.inuse_pages)
            };
            if pages - inuse >= self.config.cluster_size {
                let (new_guard, start) = self.find_fresh_cluster(guard, idx);
                guard = new_guard;
                if let Some(start) = start {
                    let a = guard.get_mut(idx).unwrap();
                    a.cluster_next = start;
                    a.cluster_nr = self.config.cluster_size;
                }
            }
        }

        let mut offset = None;
        if guard.get(idx).unwrap().cluster_nr > 0 {
            let candidate = guard.get(idx).unwrap().cluster_next;
            if guard.get(idx).unwrap().refs.is_free(candidate) {
                let a = guard.get_mut(idx).unwrap();
                a.cluster_nr -= 1;
                offset = Some(candidate);
            } else {
                guard.get_mut(idx).unwrap().cluster_nr = 0;
            }
        }

        if offset.is_none() {
            let a = guard.get_mut(idx).unwrap();
            offset = self.lowest_free_scan(a);
        }

        if let Some(o) = offset {
            guard.get_mut(idx).unwrap().commit_pick(o);
        }

        guard.get_mut(idx).unwrap().scanning -= 1;
        (guard, offset)
    }

    /// Probe `area`'s slot range for `cluster_size` consecutive free
    /// slots, starting at `lowest_bit`, with the allocator lock released
    /// for the probe itself (spec §4.B, §5). The candidate is
    /// re-validated after the lock is retaken, since a concurrent
    /// allocation could have claimed part of it in the meantime.
    fn find_fresh_cluster<'a>(
        &self,
        guard: MutexGuard<'a, Registry>,
        idx: u32,
    ) -> (MutexGuard<'a, Registry>, Option<u32>) {
        let cluster_size = self.config.cluster_size;
        let (lowest, highest, snapshot) = {
            let a = guard.get(idx).unwrap();
            (a.lowest_bit, a.highest_bit, a.refs.snapshot())
        };
        drop(guard);

        let mut found = None;
        let mut offset = lowest;
        let mut last_in_cluster = offset + cluster_size - 1;
        let mut latency = self.config.latency_quantum;
        while last_in_cluster <= highest {
            let busy = snapshot
                .get(offset as usize)
                .copied()
                .unwrap_or(refcount::BAD)
                != refcount::FREE;
            if busy {
                last_in_cluster = offset + cluster_size;
            } else if offset == last_in_cluster {
                found = Some(offset + 1 - cluster_size);
                break;
            }
            offset += 1;
            latency -= 1;
            if latency == 0 {
                self.backend.yield_now();
                latency = self.config.latency_quantum;
            }
        }

        let mut guard = self.inner.lock().unwrap();
        if let Some(start) = found {
            let still_free = (start..start + cluster_size)
                .all(|o| guard.get(idx).map_or(false, |a| a.refs.is_free(o)));
            if still_free {
                return (guard, Some(start));
            }
        }
        (guard, None)
    }

    fn lowest_free_scan(&self, area: &mut AreaDescriptor) -> Option<u32> {
        let mut offset = area.lowest_bit;
        let mut latency = self.config.latency_quantum;
        while offset <= area.highest_bit {
            if area.refs.is_free(offset) {
                return Some(offset);
            }
            offset += 1;
            latency -= 1;
            if latency == 0 {
                self.backend.yield_now();
                latency = self.config.latency_quantum;
            }
        }
        None
    }

    /// Release one reference on `entry`'s slot, freeing it once the
    /// counter reaches zero (spec §4.B `swap_entry_free`/`swap_free`).
    pub fn free(&self, entry: SwapEntry) -> Result<(), SwapError> {
        if entry.is_none() {
            return Err(SwapError::CorruptSlot);
        }
        let idx = entry.area_index();
        let offset = entry.offset();
        let mut guard = self.inner.lock().unwrap();

        let (became_free, priority) = {
            let area = guard.get_mut(idx).ok_or(SwapError::CorruptSlot)?;
            if offset == 0 || offset >= area.max {
                return Err(SwapError::CorruptSlot);
            }
            let became_free = area.refs.free(offset)?;
            if became_free {
                if offset < area.lowest_bit {
                    area.lowest_bit = offset;
                }
                if offset > area.highest_bit {
                    area.highest_bit = offset;
                }
                area.inuse_pages -= 1;
            }
            (became_free, area.priority)
        };

        if became_free {
            guard.total_free_slots += 1;
            let should_prefer = guard
                .next_area_index()
                .and_then(|cur| guard.priority_of(cur))
                .map_or(true, |cur_priority| priority > cur_priority);
            if should_prefer {
                guard.set_next_area_index(Some(idx));
            }
        }
        Ok(())
    }

    /// Add one reference to an already-allocated slot (spec §4.C
    /// `swap_duplicate`). Saturation is sticky and logged, not an error.
    pub fn duplicate(&self, entry: SwapEntry) -> Result<(), SwapError> {
        if entry.is_none() {
            return Err(SwapError::CorruptSlot);
        }
        let idx = entry.area_index();
        let offset = entry.offset();
        let mut guard = self.inner.lock().unwrap();
        let area = guard.get_mut(idx).ok_or(SwapError::CorruptSlot)?;
        if offset == 0 || offset >= area.max {
            return Err(SwapError::CorruptSlot);
        }
        let newly_saturated = area.refs.duplicate(offset)?;
        if newly_saturated {
            warn!(
                "area {} slot {} saturated its reference count; treated as permanent until deactivation",
                idx, offset
            );
        }
        Ok(())
    }

    /// Resolve `entry` to the device block backing it. Never sleeps.
    pub fn lookup(&self, entry: SwapEntry) -> Option<u64> {
        if entry.is_none() {
            return None;
        }
        let idx = entry.area_index();
        let offset = entry.offset();
        let mut guard = self.inner.lock().unwrap();
        let area = guard.get_mut(idx)?;
        if offset == 0 || offset >= area.max {
            return None;
        }
        Some(area.extents.lookup(offset))
    }

    /// Return the maximal run of consecutive allocated, non-BAD slots
    /// within the power-of-two cluster window containing `entry`,
    /// starting from the window's aligned base rather than from `entry`
    /// itself (spec §4.B, mirroring `valid_swaphandles`'s
    /// `(offset >> page_cluster) << page_cluster` windowing exactly).
    pub fn valid_neighbors(&self, entry: SwapEntry) -> Option<(u32, u32)> {
        if entry.is_none() {
            return None;
        }
        let idx = entry.area_index();
        let offset = entry.offset();
        let guard = self.inner.lock().unwrap();
        let area = guard.get(idx)?;

        let window = self.config.cluster_size.next_power_of_two().max(1);
        let mut toff = (offset / window) * window;
        let mut remaining = window;
        if toff == 0 {
            toff = 1;
            remaining -= 1;
        }
        let start = toff;
        let mut count = 0u32;
        while remaining > 0 {
            if toff >= area.max || !area.refs.counts_inuse(toff) {
                break;
            }
            toff += 1;
            count += 1;
            remaining -= 1;
        }
        Some((start, count))
    }
}
