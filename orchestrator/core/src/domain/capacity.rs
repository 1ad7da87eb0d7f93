// Copyright (c) 2026 Sideload Orchestrator Contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Active-App Slot Manager
//!
//! Free developer accounts may only keep a fixed number of apps active at a
//! time. [`SlotManager`] computes whether an app fits and, if not, which
//! currently active apps the user may deactivate to make room.
//!
//! The orchestrator's own host app is never offered as a candidate.

use crate::domain::app::{App, BundleId};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotPolicy {
    /// Maximum number of simultaneously active slots; `None` means unlimited.
    pub max_active: Option<usize>,
    /// Each app extension consumes its own slot.
    pub extensions_count: bool,
}

/// Outcome of a capacity check.
#[derive(Debug, Clone, PartialEq)]
pub struct CapacityPlan {
    pub required: usize,
    pub available: usize,
    /// Apps the user may choose from, in presentation order. Empty when the
    /// app already fits.
    pub candidates: Vec<App>,
}

impl CapacityPlan {
    pub fn fits(&self) -> bool {
        self.available >= self.required
    }

    pub fn deficit(&self) -> usize {
        self.required.saturating_sub(self.available)
    }
}

#[derive(Debug, Clone)]
pub struct SlotManager {
    policy: SlotPolicy,
    host_bundle_id: BundleId,
}

impl SlotManager {
    pub fn new(policy: SlotPolicy, host_bundle_id: BundleId) -> Self {
        Self {
            policy,
            host_bundle_id,
        }
    }

    pub fn policy(&self) -> &SlotPolicy {
        &self.policy
    }

    pub fn required_slots(&self, app: &App) -> usize {
        if self.policy.extensions_count {
            1 + app.extensions.len()
        } else {
            1
        }
    }

    /// Check whether `app` can become active alongside `active_apps`.
    ///
    /// `app` itself is excluded from the active sum, so reactivating or
    /// reinstalling an already active app never counts against itself.
    pub fn ensure_capacity(&self, app: &App, active_apps: &[App]) -> CapacityPlan {
        let required = self.required_slots(app);
        let Some(max_active) = self.policy.max_active else {
            return CapacityPlan {
                required,
                available: usize::MAX,
                candidates: Vec::new(),
            };
        };

        let others: Vec<&App> = active_apps
            .iter()
            .filter(|other| other.is_active && other.bundle_id != app.bundle_id)
            .collect();
        let used: usize = others.iter().map(|other| self.required_slots(other)).sum();
        let available = max_active.saturating_sub(used);

        if available >= required {
            return CapacityPlan {
                required,
                available,
                candidates: Vec::new(),
            };
        }

        let mut candidates: Vec<App> = others
            .into_iter()
            .filter(|other| other.bundle_id != self.host_bundle_id)
            .cloned()
            .collect();
        candidates.sort_by(candidate_order);

        CapacityPlan {
            required,
            available,
            candidates,
        }
    }

    /// Slots freed by deactivating `chosen`.
    pub fn freed_by(&self, chosen: &[App]) -> usize {
        chosen.iter().map(|app| self.required_slots(app)).sum()
    }
}

/// Name ascending, then least recently refreshed first.
fn candidate_order(a: &App, b: &App) -> Ordering {
    a.name
        .cmp(&b.name)
        .then_with(|| a.refreshed_at.cmp(&b.refreshed_at))
}
