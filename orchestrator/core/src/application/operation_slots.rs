// Copyright (c) 2026 Sideload Orchestrator Contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Operation Slots
//!
//! Per-bundle-identifier mutual exclusion. A pipeline holds its app's
//! [`OperationSlot`] for its whole run; a second pipeline for the same
//! bundle identifier waits until the first releases it.
//!
//! Once a pipeline holds the slot, its progress node is registered so callers
//! can look up "the" progress of an app. Waiters are never registered. The
//! newest holder wins; a released slot only removes its own registration,
//! never a newer one.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::OwnedMutexGuard;
use tracing::debug;
use uuid::Uuid;

use crate::domain::app::BundleId;
use crate::domain::progress::ProgressRef;

#[derive(Default)]
struct SlotTable {
    locks: HashMap<BundleId, Arc<tokio::sync::Mutex<()>>>,
    claims: HashMap<BundleId, Claim>,
}

struct Claim {
    token: Uuid,
    progress: ProgressRef,
}

#[derive(Clone, Default)]
pub struct OperationSlots {
    table: Arc<Mutex<SlotTable>>,
}

/// Exclusive right to mutate one app's canonical record. Released on drop.
pub struct OperationSlot {
    slots: OperationSlots,
    bundle_id: BundleId,
    token: Uuid,
    _guard: OwnedMutexGuard<()>,
}

impl OperationSlot {
    pub fn bundle_id(&self) -> &BundleId {
        &self.bundle_id
    }
}

impl Drop for OperationSlot {
    fn drop(&mut self) {
        self.slots.release_claim(&self.bundle_id, self.token);
        debug!(bundle_id = %self.bundle_id, "Released operation slot");
    }
}

impl OperationSlots {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the slot for `bundle_id`, waiting for any current holder.
    pub async fn acquire(&self, bundle_id: &BundleId, progress: ProgressRef) -> OperationSlot {
        let guard = self.lock_for(bundle_id).lock_owned().await;
        debug!(bundle_id = %bundle_id, "Acquired operation slot");
        self.claim(bundle_id, progress, guard)
    }

    /// Claim the slot only if nobody holds it.
    pub fn try_acquire(&self, bundle_id: &BundleId, progress: ProgressRef) -> Option<OperationSlot> {
        let guard = self.lock_for(bundle_id).try_lock_owned().ok()?;
        Some(self.claim(bundle_id, progress, guard))
    }

    pub fn is_held(&self, bundle_id: &BundleId) -> bool {
        let lock = self.table.lock().locks.get(bundle_id).cloned();
        lock.is_some_and(|lock| lock.try_lock().is_err())
    }

    /// Progress of the pipeline holding `bundle_id`'s slot.
    pub fn progress_for(&self, bundle_id: &BundleId) -> Option<ProgressRef> {
        self.table
            .lock()
            .claims
            .get(bundle_id)
            .map(|claim| claim.progress.clone())
    }

    fn lock_for(&self, bundle_id: &BundleId) -> Arc<tokio::sync::Mutex<()>> {
        self.table
            .lock()
            .locks
            .entry(bundle_id.clone())
            .or_default()
            .clone()
    }

    fn claim(&self, bundle_id: &BundleId, progress: ProgressRef, guard: OwnedMutexGuard<()>) -> OperationSlot {
        let token = Uuid::new_v4();
        self.table.lock().claims.insert(bundle_id.clone(), Claim { token, progress });
        OperationSlot {
            slots: self.clone(),
            bundle_id: bundle_id.clone(),
            token,
            _guard: guard,
        }
    }

    fn release_claim(&self, bundle_id: &BundleId, token: Uuid) {
        let mut table = self.table.lock();
        if table
            .claims
            .get(bundle_id)
            .is_some_and(|claim| claim.token == token)
        {
            table.claims.remove(bundle_id);
        }
    }
}
