//! Single-slot snapshot transfer between the trainer and rollout workers.
//!
//! The trainer publishes frozen policy snapshots; each worker takes the
//! latest one before collecting. Swap semantics keep at most one pending
//! snapshot per worker: a new publication overwrites an untaken one, so
//! stale models never queue up.
//!
//! Burn modules are `Send` but not `Sync`, which is why this is a
//! `Mutex<Option<M>>` handoff rather than a shared reference.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Single-slot snapshot container.
pub struct ModelSlot<M> {
    pending: Mutex<Option<M>>,
    version: AtomicU64,
}

impl<M> ModelSlot<M> {
    /// Create an empty slot.
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(None),
            version: AtomicU64::new(0),
        }
    }

    /// Create a slot holding an initial snapshot.
    pub fn with_initial(model: M) -> Self {
        Self {
            pending: Mutex::new(Some(model)),
            version: AtomicU64::new(1),
        }
    }

    /// Version of the most recently published snapshot.
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// Whether an untaken snapshot is pending.
    pub fn has_pending(&self) -> bool {
        self.pending.lock().is_some()
    }
}

impl<M> Default for ModelSlot<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: Send> ModelSlot<M> {
    /// Publish a snapshot, overwriting any pending one.
    ///
    /// Returns true if an untaken snapshot was dropped.
    pub fn publish(&self, model: M) -> bool {
        let mut guard = self.pending.lock();
        let was_pending = guard.is_some();
        *guard = Some(model);
        self.version.fetch_add(1, Ordering::Release);
        was_pending
    }

    /// Take the pending snapshot, leaving the slot empty.
    pub fn take(&self) -> Option<M> {
        self.pending.lock().take()
    }
}

/// Shared handle to a slot, one per worker.
pub type SharedModelSlot<M> = Arc<ModelSlot<M>>;

/// Create a new shared slot.
pub fn model_slot<M>() -> SharedModelSlot<M> {
    Arc::new(ModelSlot::new())
}

/// Create a new shared slot with an initial snapshot.
pub fn model_slot_with<M>(model: M) -> SharedModelSlot<M> {
    Arc::new(ModelSlot::with_initial(model))
}
