//! A `SwapBackend` test double. Not a simulation of a real kernel's fault
//! path: the integration suite drives `SwapCore::free`/`duplicate`
//! directly to model what a page-table walk would do, and scripts this
//! backend's callbacks to return the outcomes a given scenario needs.
//! Available outside `#[cfg(test)]` behind the `testutil` feature so the
//! `tests/` binaries, which link against the crate as an ordinary
//! dependency, can reach it.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::backend::{Page, ReclaimOutcome, SlotResolution, SwapBackend};
use crate::entry::SwapEntry;
use crate::error::SwapError;
use crate::header;

/// Write a well-formed header slot (plus `last_slot * slot_size` of zero
/// filler) to `path`, for tests that need a real file `SwapCore::activate`
/// can open and read.
pub fn format_area_file(path: &Path, slot_size: u32, last_slot: u32, bad_slots: &[u32]) {
    let raw = header::write(slot_size, last_slot, bad_slots);
    std::fs::write(path, &raw).expect("write fixture header");
    let file = std::fs::OpenOptions::new()
        .write(true)
        .open(path)
        .expect("reopen fixture");
    file.set_len(slot_size as u64 * last_slot as u64)
        .expect("extend fixture to full area size");
}

type ReclaimHook = Box<dyn Fn(SwapEntry) + Send + Sync>;

#[derive(Default)]
pub struct FakeBackend {
    pages: Mutex<HashMap<(PathBuf, u32), Page>>,
    claimed_devices: Mutex<HashMap<PathBuf, u32>>,
    holes: Mutex<HashSet<(PathBuf, u32)>>,
    misaligned: Mutex<HashSet<(PathBuf, u32)>>,
    reclaim_script: Mutex<HashMap<SwapEntry, VecDeque<ReclaimOutcome>>>,
    writeback_calls: Mutex<Vec<SwapEntry>>,
    reserve_memory_fails: Mutex<bool>,
    /// Run after a scripted `Reclaimed` outcome, standing in for the
    /// page-table zap a real reclaim would perform (and which would, in a
    /// real kernel, itself call back into `swap_free`). Tests wire this to
    /// call `SwapCore::free` on the same entry.
    on_reclaimed: Mutex<Option<ReclaimHook>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `(path, slot)` as a hole: `bmap` will report it as
    /// unresolvable, which activation treats as `FileHasHoles`.
    pub fn punch_hole(&self, path: &Path, slot: u32) {
        self.holes
            .lock()
            .unwrap()
            .insert((path.to_path_buf(), slot));
    }

    /// Mark `(path, slot)` as a misaligned run: `bmap` reports it as
    /// `Misaligned`, which activation discards (marks BAD) rather than
    /// rejecting the whole area.
    pub fn mark_misaligned(&self, path: &Path, slot: u32) {
        self.misaligned
            .lock()
            .unwrap()
            .insert((path.to_path_buf(), slot));
    }

    /// Queue the outcome `reclaim_slot` should return the next time it's
    /// asked about `entry`. Unscripted entries default to `Reclaimed`.
    pub fn script_reclaim(&self, entry: SwapEntry, outcome: ReclaimOutcome) {
        self.reclaim_script
            .lock()
            .unwrap()
            .entry(entry)
            .or_default()
            .push_back(outcome);
    }

    pub fn fail_next_reserve(&self) {
        *self.reserve_memory_fails.lock().unwrap() = true;
    }

    pub fn writeback_calls(&self) -> Vec<SwapEntry> {
        self.writeback_calls.lock().unwrap().clone()
    }

    pub fn on_reclaimed(&self, hook: impl Fn(SwapEntry) + Send + Sync + 'static) {
        *self.on_reclaimed.lock().unwrap() = Some(Box::new(hook));
    }
}

impl SwapBackend for FakeBackend {
    fn read_swap_slot_into_page(&self, entry: SwapEntry) -> Result<Page, SwapError> {
        // Keyed only by slot for test purposes; the path is irrelevant
        // since a test double only ever manages one area at a time.
        let key = (PathBuf::new(), entry.offset());
        self.pages
            .lock()
            .unwrap()
            .get(&key)
            .cloned()
            .ok_or(SwapError::CorruptSlot)
    }

    fn write_page_to_swap_slot(&self, page: &Page, entry: SwapEntry) {
        let key = (PathBuf::new(), entry.offset());
        self.pages.lock().unwrap().insert(key, page.clone());
    }

    fn reclaim_slot(&self, entry: SwapEntry) -> ReclaimOutcome {
        let outcome = self
            .reclaim_script
            .lock()
            .unwrap()
            .get_mut(&entry)
            .and_then(VecDeque::pop_front)
            .unwrap_or(ReclaimOutcome::Reclaimed);
        if outcome == ReclaimOutcome::Reclaimed {
            if let Some(hook) = self.on_reclaimed.lock().unwrap().as_ref() {
                hook(entry);
            }
        }
        outcome
    }

    fn writeback_and_evict(&self, entry: SwapEntry) {
        self.writeback_calls.lock().unwrap().push(entry);
    }

    fn reserve_memory(&self, _n_pages: u32) -> Result<(), SwapError> {
        let mut fails = self.reserve_memory_fails.lock().unwrap();
        if *fails {
            *fails = false;
            return Err(SwapError::OutOfMemory("fake backend scripted failure"));
        }
        Ok(())
    }

    fn claim_block_device(&self, path: &Path) -> Result<u32, SwapError> {
        let mut claimed = self.claimed_devices.lock().unwrap();
        if claimed.contains_key(path) {
            return Err(SwapError::AlreadyActive);
        }
        claimed.insert(path.to_path_buf(), 512);
        Ok(512)
    }

    fn restore_block_device(&self, path: &Path, _previous_block_size: u32) {
        self.claimed_devices.lock().unwrap().remove(path);
    }

    fn bmap(&self, path: &Path, slot: u32) -> SlotResolution {
        let key = (path.to_path_buf(), slot);
        if self.holes.lock().unwrap().contains(&key) {
            SlotResolution::Hole
        } else if self.misaligned.lock().unwrap().contains(&key) {
            SlotResolution::Misaligned
        } else {
            SlotResolution::Mapped(slot as u64)
        }
    }

    fn yield_now(&self) {
        // No real scheduler in tests; nothing to do.
    }
}
