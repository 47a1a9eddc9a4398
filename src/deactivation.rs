use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use log::{info, warn};

use crate::area::AreaDescriptor;
use crate::backend::{ReclaimOutcome, SwapBackend};
use crate::entry::SwapEntry;
use crate::error::SwapError;
use crate::refcount;
use crate::SwapCore;

impl<B: SwapBackend> SwapCore<B> {
    /// Unregister the area backed by `path` (spec §4.G). Drains every
    /// live slot through the backend's `reclaim_slot` callback, then waits
    /// out any in-flight scans and I/O before releasing the backing
    /// store. On any abort condition the area is restored to service
    /// exactly as it was before the call.
    pub fn deactivate(&self, path: &Path) -> Result<(), SwapError> {
        let _activation_guard = self.activation_mutex.lock().unwrap();

        let idx = {
            let mut guard = self.inner.lock().unwrap();
            let idx = guard.find_by_path(path).ok_or(SwapError::NotActive)?;
            let pages = guard.get(idx).unwrap().pages;
            self.backend
                .reserve_memory(pages)
                .map_err(|_| SwapError::OutOfMemory("deactivation drain headroom"))?;
            guard.begin_drain(idx);
            idx
        };

        info!("deactivating swap area at {:?}", path);

        match self.drain(idx) {
            Ok(()) => {
                self.finish_deactivation(idx);
                Ok(())
            }
            Err(e) => {
                self.inner.lock().unwrap().rollback_drain(idx);
                warn!("deactivation of {:?} aborted and rolled back: {}", path, e);
                Err(e)
            }
        }
    }

    /// Drive every live slot in area `idx` through `reclaim_slot` until
    /// none remain, or an abort condition fires. Mirrors
    /// `mm/swapfile.c`'s `try_to_unuse`.
    fn drain(&self, idx: u32) -> Result<(), SwapError> {
        let mut last_offset = 0u32;
        let mut stuck_rounds: HashMap<u32, u32> = HashMap::new();
        let mut since_yield = 0u32;

        loop {
            let next = {
                let guard = self.inner.lock().unwrap();
                let area = guard.get(idx).unwrap();
                find_next_to_unuse(area, last_offset)
            };
            let offset = match next {
                Some(o) => o,
                None => break,
            };
            last_offset = offset;
            let entry = SwapEntry::new(idx, offset);

            match self.backend.reclaim_slot(entry) {
                ReclaimOutcome::OutOfMemory => return Err(SwapError::OutOfMemory("drain reclaim")),
                ReclaimOutcome::Interrupted => return Err(SwapError::Interrupted),
                ReclaimOutcome::Reclaimed | ReclaimOutcome::StillReferenced => {}
            }

            let still_referenced = {
                let mut guard = self.inner.lock().unwrap();
                let area = guard.get_mut(idx).unwrap();
                let counter = area.refs.get(offset);
                if counter == refcount::MAX {
                    area.refs.reset_saturated(offset);
                    warn!(
                        "area {} slot {} was saturated at deactivation time; reset and re-offered (reference imbalance)",
                        idx, offset
                    );
                    false
                } else if counter > 1 {
                    let rounds = stuck_rounds.entry(offset).or_insert(0);
                    *rounds += 1;
                    if *rounds > self.config.max_drain_retries {
                        return Err(SwapError::Interrupted);
                    }
                    true
                } else {
                    stuck_rounds.remove(&offset);
                    false
                }
            };
            if still_referenced {
                self.backend.writeback_and_evict(entry);
            }

            since_yield += 1;
            if since_yield >= self.config.latency_quantum {
                self.backend.yield_now();
                since_yield = 0;
            }
        }
        Ok(())
    }

    /// Phases 3-5 of deactivation: cut off and wait out in-flight scans,
    /// take the unplug gate's write side to confirm no I/O is still in
    /// flight, then free the descriptor.
    fn finish_deactivation(&self, idx: u32) {
        {
            let mut guard = self.inner.lock().unwrap();
            guard.get_mut(idx).unwrap().highest_bit = 0;
        }
        loop {
            let scanning = self.inner.lock().unwrap().get(idx).unwrap().scanning;
            if scanning == 0 {
                break;
            }
            self.backend.yield_now();
            std::thread::sleep(Duration::from_millis(1));
        }

        let _unplug_guard = self.unplug.acquire_for_teardown();

        let area = self.inner.lock().unwrap().destroy(idx);
        if area.identity.kind == crate::area::BackingKind::BlockDevice {
            self.backend
                .restore_block_device(&area.identity.path, area.identity.previous_block_size);
        }
        info!("deactivated swap area at {:?}", area.identity.path);
    }
}

/// Find the next slot past `prev` whose counter is nonzero and not BAD,
/// wrapping once through `[1, prev]` if the initial forward scan from
/// `prev` to the area's end turns up nothing. A direct translation of
/// `mm/swapfile.c`'s `find_next_to_unuse`.
fn find_next_to_unuse(area: &AreaDescriptor, prev: u32) -> Option<u32> {
    let mut max = area.max;
    let mut prev = prev;
    let mut i = prev;
    loop {
        i += 1;
        if i >= max {
            if prev == 0 {
                return None;
            }
            max = prev + 1;
            prev = 0;
            i = 1;
        }
        let count = area.refs.get(i);
        if count != refcount::FREE && count != refcount::BAD {
            return Some(i);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::area::{AreaFlags, BackingIdentity, BackingKind};
    use crate::extent::ExtentMap;
    use crate::refcount::RefTable;

    fn area_with_live_slots(max: u32, live: &[u32]) -> AreaDescriptor {
        let mut refs = RefTable::new(max as usize);
        refs.set_bad(0);
        for &o in live {
            refs.allocate_slot(o);
        }
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
            inuse_pages: live.len() as u32,
            refs,
            extents,
        }
    }

    #[test]
    fn finds_each_live_slot_once_then_none() {
        let area = area_with_live_slots(8, &[2, 5]);
        let a = find_next_to_unuse(&area, 0).unwrap();
        assert_eq!(a, 2);
        let b = find_next_to_unuse(&area, a).unwrap();
        assert_eq!(b, 5);
        assert_eq!(find_next_to_unuse(&area, b), None);
    }

    #[test]
    fn wraps_once_when_nothing_found_past_prev() {
        // Live slot sits before `prev`; the forward scan from `prev` to
        // `max` must come up empty and then wrap into [1, prev].
        let area = area_with_live_slots(8, &[1]);
        assert_eq!(find_next_to_unuse(&area, 3), Some(1));
    }
}
