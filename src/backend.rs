use std::path::Path;

use crate::entry::SwapEntry;
use crate::error::SwapError;

/// A page of primary memory, as handed across the `SwapBackend` seam.
/// Opaque to the core; it never inspects the bytes.
#[derive(Debug, Clone)]
pub struct Page {
    pub data: Vec<u8>,
}

/// Outcome of resolving one logical slot to a device block (spec §4.A,
/// §4.F step 7). A regular-file backing's blocks need not be slot-size
/// aligned or contiguous; `Misaligned` lets the backend report a run that
/// exists on disk but can't stand as a single slot-granular extent, which
/// activation marks BAD rather than treating as fatal. `Hole` means the
/// slot has no backing at all, which is fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotResolution {
    Mapped(u64),
    Misaligned,
    Hole,
}

/// Result of asking the backend to reclaim one slot during deactivation's
/// drain (spec §4.G).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReclaimOutcome {
    /// The slot's only holder was substituted with a resident page; the
    /// slot's counter has already dropped, or will on the core's next
    /// glance.
    Reclaimed,
    /// The backend made progress but another holder appeared concurrently
    /// (e.g. a racing page fault); the counter may still read above 1.
    StillReferenced,
    OutOfMemory,
    Interrupted,
}

/// Everything the core needs from its host process (spec §6 "External
/// callbacks"). The core owns no page tables, performs no block I/O, and
/// never walks a reverse map; every one of those concerns is pushed across
/// this trait, matching spec §1's explicit non-goals.
///
/// `read_swap_slot_into_page` and `write_page_to_swap_slot` are named here
/// because spec §6 lists them as part of the external interface, but the
/// core itself never calls them directly — they belong to the host's own
/// fault-handling path and to `writeback_and_evict`'s implementation.
pub trait SwapBackend {
    fn read_swap_slot_into_page(&self, entry: SwapEntry) -> Result<Page, SwapError>;

    fn write_page_to_swap_slot(&self, page: &Page, entry: SwapEntry);

    /// Bring `entry`'s slot into a resident page and substitute that page
    /// for every reference the backend can find (page tables, shmem
    /// radix tree, swap cache). Scope and order of that substitution are
    /// entirely the backend's concern.
    fn reclaim_slot(&self, entry: SwapEntry) -> ReclaimOutcome;

    /// Called when drain observes the slot's counter still above 1 after
    /// `reclaim_slot` returned: write the resident page back to its slot
    /// and drop it from any swap cache, so the next drain round can retry.
    fn writeback_and_evict(&self, entry: SwapEntry);

    /// Reserve headroom for `n_pages` worth of pages that deactivation's
    /// drain may need to allocate as reclaim targets.
    fn reserve_memory(&self, n_pages: u32) -> Result<(), SwapError>;

    /// Exclusively claim a block device for use as a swap area, returning
    /// its previous block size so it can be restored later.
    fn claim_block_device(&self, path: &Path) -> Result<u32, SwapError>;

    fn restore_block_device(&self, path: &Path, previous_block_size: u32);

    /// Resolve logical slot `slot` of the file at `path` to a device
    /// block (spec §4.A/§4.F step 7). Implementations are responsible for
    /// collapsing sub-slot block runs into a single slot-granularity
    /// answer, reporting `Misaligned` when that run is not contiguous or
    /// aligned to the slot size, since the core only ever asks one slot
    /// at a time.
    fn bmap(&self, path: &Path, slot: u32) -> SlotResolution;

    /// Cooperative yield point for long scans. The default simply yields
    /// the current thread; hosts with their own scheduler may override it.
    fn yield_now(&self) {
        std::thread::yield_now();
    }
}
