/// Tunable knobs for the allocator's clustering heuristic, the cooperative
/// yield cadence, and the on-disk header's bad-slot capacity (spec §6
/// "Configuration constants").
#[derive(Debug, Clone, Copy)]
pub struct SwapConfig {
    /// Size of the contiguous-free-run the allocator prefers before
    /// falling back to a plain lowest-free scan. Mirrors `mm/swapfile.c`'s
    /// `SWAPFILE_CLUSTER`.
    pub cluster_size: u32,

    /// Iterations a scan runs between cooperative-yield checkpoints.
    /// Mirrors `mm/swapfile.c`'s `LATENCY_LIMIT`.
    pub latency_quantum: u32,

    /// Upper bound on the number of bad-slot entries a header may declare.
    pub max_bad_slots: usize,

    /// Consecutive non-progress drain rounds tolerated on a single slot
    /// before deactivation gives up and rolls back (spec §9 open question).
    pub max_drain_retries: u32,

    /// Ceiling applied to a header's declared slot count. Linux derives an
    /// equivalent cap from the page-table entry's offset field width; this
    /// crate has no page table, so the cap instead reflects the width of
    /// `SwapEntry`'s offset field (32 bits). Tests may shrink it to exercise
    /// truncation behavior cheaply.
    pub architectural_max_slots: u32,
}

impl SwapConfig {
    pub const DEFAULT_CLUSTER_SIZE: u32 = 256;
    pub const DEFAULT_LATENCY_QUANTUM: u32 = 256;
    pub const DEFAULT_MAX_BAD_SLOTS: usize = 512;
    pub const DEFAULT_MAX_DRAIN_RETRIES: u32 = 16;
    pub const DEFAULT_ARCHITECTURAL_MAX_SLOTS: u32 = u32::MAX;

    pub const fn new() -> Self {
        Self {
            cluster_size: Self::DEFAULT_CLUSTER_SIZE,
            latency_quantum: Self::DEFAULT_LATENCY_QUANTUM,
            max_bad_slots: Self::DEFAULT_MAX_BAD_SLOTS,
            max_drain_retries: Self::DEFAULT_MAX_DRAIN_RETRIES,
            architectural_max_slots: Self::DEFAULT_ARCHITECTURAL_MAX_SLOTS,
        }
    }
}

impl Default for SwapConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_mm_swapfile_constants() {
        let cfg = SwapConfig::default();
        assert_eq!(cfg.cluster_size, 256);
        assert_eq!(cfg.latency_quantum, 256);
    }
}
