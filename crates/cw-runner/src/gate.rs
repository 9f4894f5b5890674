//! Admission control for heavy external processes.
//!
//! A gate hands out at most one permit at a time and never queues: callers
//! that find it held are turned away immediately. Permits release on drop, so
//! every exit path out of a run gives the slot back.

use std::sync::{Mutex, MutexGuard, TryLockError};

pub trait AdmissionGate: Send + Sync {
    type Permit<'a>
    where
        Self: 'a;

    /// Take the permit if nobody holds it. Never blocks.
    fn try_admit(&self) -> Option<Self::Permit<'_>>;
}

/// One slot, backed by a mutex that is only ever `try_lock`ed.
#[derive(Debug, Default)]
pub struct SingleSlotGate {
    slot: Mutex<()>,
}

impl SingleSlotGate {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Held while a child process is being spawned or is executing.
#[derive(Debug)]
pub struct SlotPermit<'a> {
    _guard: MutexGuard<'a, ()>,
}

impl AdmissionGate for SingleSlotGate {
    type Permit<'a> = SlotPermit<'a>;

    fn try_admit(&self) -> Option<SlotPermit<'_>> {
        match self.slot.try_lock() {
            Ok(guard) => Some(SlotPermit { _guard: guard }),
            // The slot protects no data, so a panic while it was held leaves
            // nothing inconsistent behind.
            Err(TryLockError::Poisoned(poisoned)) => Some(SlotPermit {
                _guard: poisoned.into_inner(),
            }),
            Err(TryLockError::WouldBlock) => None,
        }
    }
}
