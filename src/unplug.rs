use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Orthogonal read/write gate separating in-flight block I/O from
/// deactivation's final teardown (spec §4.H, §5). The I/O path holds this
/// in read mode for the duration of one request; deactivation takes the
/// write side once drain has emptied the area, guaranteeing no I/O against
/// it is still in flight before the backing store is released.
///
/// This gate is never held while acquiring the allocator lock, in either
/// direction: the two are independent, not nested.
#[derive(Default)]
pub struct UnplugGate(RwLock<()>);

pub type UnplugReadGuard<'a> = RwLockReadGuard<'a, ()>;
pub type UnplugWriteGuard<'a> = RwLockWriteGuard<'a, ()>;

impl UnplugGate {
    pub fn new() -> Self {
        Self(RwLock::new(()))
    }

    pub fn acquire_for_io(&self) -> UnplugReadGuard<'_> {
        self.0.read().unwrap()
    }

    pub fn acquire_for_teardown(&self) -> UnplugWriteGuard<'_> {
        self.0.write().unwrap()
    }
}
