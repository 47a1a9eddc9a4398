//! Swap-area manager: slot allocation, extent mapping, reference counting,
//! and the activation/deactivation lifecycle for a virtual-memory
//! subsystem's swap backing stores.
//!
//! The crate owns no page tables and performs no block I/O itself; the
//! host process supplies both through the [`SwapBackend`] trait. See
//! [`SwapCore`] for the public operations: [`SwapCore::allocate`],
//! [`SwapCore::free`], [`SwapCore::duplicate`], [`SwapCore::lookup`],
//! [`SwapCore::valid_neighbors`], [`SwapCore::activate`],
//! [`SwapCore::deactivate`], and [`SwapCore::totals`].

mod activation;
mod allocator;
mod area;
mod config;
mod deactivation;
mod entry;
mod error;
mod extent;
mod refcount;
mod registry;

pub mod backend;
pub mod header;
pub mod unplug;

#[cfg(feature = "testutil")]
pub mod testutil;

pub use activation::ActivateOptions;
pub use area::BackingKind;
pub use backend::{Page, ReclaimOutcome, SlotResolution, SwapBackend};
pub use config::SwapConfig;
pub use entry::SwapEntry;
pub use error::SwapError;

use std::sync::Mutex;

use registry::Registry;
use unplug::UnplugGate;

/// Ties together the registry of active areas, the allocator lock, the
/// activation mutex, and the unplug gate behind one handle (spec §5's
/// lock order: activation mutex, then allocator lock; the unplug gate is
/// orthogonal to both). Generic over the host's [`SwapBackend`]
/// implementation rather than reaching for ambient globals, per the
/// "model external collaborators as an owned structure" design note.
pub struct SwapCore<B: SwapBackend> {
    pub(crate) config: SwapConfig,
    pub(crate) activation_mutex: Mutex<()>,
    pub(crate) inner: Mutex<Registry>,
    pub(crate) unplug: UnplugGate,
    pub(crate) backend: B,
}

impl<B: SwapBackend> SwapCore<B> {
    pub fn new(backend: B, config: SwapConfig) -> Self {
        Self {
            config,
            activation_mutex: Mutex::new(()),
            inner: Mutex::new(Registry::new()),
            unplug: UnplugGate::new(),
            backend,
        }
    }

    pub fn with_defaults(backend: B) -> Self {
        Self::new(backend, SwapConfig::default())
    }

    /// `(total_free_slots, total_pages)` across every active area,
    /// excluding any area currently mid-deactivation. Mirrors
    /// `mm/swapfile.c`'s `si_swapinfo`. `total_free_slots` is internally
    /// signed (it can run transiently negative while a deactivation is
    /// draining a large area, mirroring `nr_swap_pages`'s `int` type) but
    /// is never negative once no deactivation is in flight, so it's
    /// clamped to zero here rather than widened into the public signature.
    pub fn totals(&self) -> (u64, u64) {
        let guard = self.inner.lock().unwrap();
        (guard.total_free_slots.max(0) as u64, guard.total_pages)
    }

    /// Acquire the unplug gate's read side for the duration of one I/O
    /// request against an active area (spec §4.H). Never taken while
    /// holding the allocator lock.
    pub fn acquire_io_gate(&self) -> unplug::UnplugReadGuard<'_> {
        self.unplug.acquire_for_io()
    }

    /// Reach through to the backend instance this core owns. Only meant
    /// for tests that need to script the same `FakeBackend` the core is
    /// already using; not part of the operational API.
    #[cfg(feature = "testutil")]
    pub fn backend_for_testing(&self) -> &B {
        &self.backend
    }
}
