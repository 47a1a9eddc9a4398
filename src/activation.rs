use std::io::Read;
use std::path::Path;

use log::info;

use crate::area::{AreaDescriptor, AreaFlags, BackingIdentity, BackingKind};
use crate::backend::{SlotResolution, SwapBackend};
use crate::error::SwapError;
use crate::extent::ExtentMap;
use crate::header;
use crate::refcount::RefTable;
use crate::SwapCore;

/// Caller-supplied knobs for one activation (spec §4.F step "assign
/// priority"). `priority` mirrors `SWAP_FLAG_PREFER`/`SWAP_FLAG_PRIO_MASK`:
/// `None` means "assign the next default, decreasing priority."
#[derive(Debug, Clone, Copy, Default)]
pub struct ActivateOptions {
    pub priority: Option<i32>,
}

impl<B: SwapBackend> SwapCore<B> {
    /// Register `path` as a new swap area (spec §4.F). Serializes against
    /// other activations and deactivations via the activation mutex;
    /// reads and validates the header before taking the allocator lock to
    /// splice the area into the registry.
    pub fn activate(
        &self,
        path: &Path,
        kind: BackingKind,
        slot_size: u32,
        options: ActivateOptions,
    ) -> Result<(), SwapError> {
        let _activation_guard = self.activation_mutex.lock().unwrap();

        if self.inner.lock().unwrap().find_by_path(path).is_some() {
            return Err(SwapError::AlreadyActive);
        }

        let previous_block_size = if kind == BackingKind::BlockDevice {
            Some(self.backend.claim_block_device(path)?)
        } else {
            None
        };

        let result = self.activate_locked(path, kind, slot_size, options, previous_block_size);
        if result.is_err() {
            if let (BackingKind::BlockDevice, Some(prev)) = (kind, previous_block_size) {
                self.backend.restore_block_device(path, prev);
            }
        }
        result
    }

    fn activate_locked(
        &self,
        path: &Path,
        kind: BackingKind,
        slot_size: u32,
        options: ActivateOptions,
        previous_block_size: Option<u32>,
    ) -> Result<(), SwapError> {
        // Priority is assigned before any fallible step, mirroring
        // sys_swapon's `p->prio = --least_priority` placement; a failure
        // anywhere below must undo a default assignment so the next
        // activation without an explicit priority doesn't skip a value
        // (sys_swapon's `bad_swap: if (!PREFER) ++least_priority;`).
        let (priority, used_default_priority) = match options.priority {
            Some(p) => (p, false),
            None => (self.inner.lock().unwrap().next_default_priority(), true),
        };

        let result = self.build_and_insert_area(path, kind, slot_size, previous_block_size, priority);
        if result.is_err() && used_default_priority {
            self.inner.lock().unwrap().undo_default_priority();
        }
        result
    }

    fn build_and_insert_area(
        &self,
        path: &Path,
        kind: BackingKind,
        slot_size: u32,
        previous_block_size: Option<u32>,
        priority: i32,
    ) -> Result<(), SwapError> {
        let mut file = std::fs::File::open(path)?;
        let mut raw = vec![0u8; slot_size as usize];
        file.read_exact(&mut raw)?;

        let header = header::parse(slot_size, &raw, self.config.max_bad_slots)?;
        let max = header.last_slot.min(self.config.architectural_max_slots);
        if max <= 1 {
            return Err(SwapError::InvalidHeader("area has no usable slots".into()));
        }

        let mut refs = RefTable::new(max as usize);
        refs.set_bad(0);
        for &bad in &header.bad_slots {
            if bad >= max {
                continue;
            }
            refs.set_bad(bad);
        }

        let extents = match kind {
            BackingKind::BlockDevice => {
                let mut e = ExtentMap::new();
                e.push(1, max - 1 - bad_count_in_range(&refs, max), 0);
                e
            }
            BackingKind::File => self.build_file_extents(path, &mut refs, max)?,
        };
        // Re-derive pages from the final BAD count: build_file_extents may
        // have marked additional slots BAD for misaligned runs.
        let pages = max - 1 - bad_count_in_range(&refs, max);

        let area = AreaDescriptor {
            identity: BackingIdentity {
                path: path.to_path_buf(),
                kind,
                slot_size,
                previous_block_size: previous_block_size.unwrap_or(0),
            },
            priority,
            flags: AreaFlags::USED | AreaFlags::WRITEOK,
            scanning: 0,
            max,
            pages,
            lowest_bit: 1,
            highest_bit: max - 1,
            cluster_next: 1,
            cluster_nr: 0,
            inuse_pages: 0,
            refs,
            extents,
        };

        let mut guard = self.inner.lock().unwrap();
        let idx = guard.reserve_slot();
        guard.insert(idx, area);
        drop(guard);

        info!(
            "activated swap area at {:?}: {} usable slots, priority {}",
            path, pages, priority
        );
        Ok(())
    }

    /// Build a file-backed area's extent map by asking the backend to
    /// resolve every usable slot to a device block (spec §4.A/§4.F step
    /// 7). A hole in the usable range rejects the whole activation; a
    /// misaligned or non-contiguous run is not fatal — the slot is simply
    /// marked BAD and excluded from `pages`.
    fn build_file_extents(
        &self,
        path: &Path,
        refs: &mut RefTable,
        max: u32,
    ) -> Result<ExtentMap, SwapError> {
        let mut extents = ExtentMap::new();
        for slot in 1..max {
            match self.backend.bmap(path, slot) {
                SlotResolution::Mapped(block) => extents.push(slot, 1, block),
                SlotResolution::Misaligned => refs.set_bad(slot),
                SlotResolution::Hole => return Err(SwapError::FileHasHoles),
            }
        }
        Ok(extents)
    }
}

fn bad_count_in_range(refs: &RefTable, max: u32) -> u32 {
    (1..max).filter(|&o| refs.is_bad(o)).count() as u32
}
