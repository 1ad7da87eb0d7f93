// Copyright (c) 2026 Sideload Orchestrator Contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Result Aggregation
//!
//! Collects one terminal result per submitted intent and delivers the batch
//! report exactly once, when the last result arrives. A result stored for a
//! bundle identifier is never overwritten; a second intent for the same
//! identifier in one batch counts towards completion but keeps the first
//! result.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tokio::sync::oneshot;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::app::{App, BundleId};
use crate::domain::errors::{LifecycleError, OperationFailure};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BatchId(pub Uuid);

impl BatchId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for BatchId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub type LifecycleResult = Result<App, OperationFailure>;

/// Terminal results of one batch.
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub batch_id: BatchId,
    pub results: HashMap<BundleId, LifecycleResult>,
    /// Authentication or certificate failure shared by every pipeline.
    pub batch_error: Option<LifecycleError>,
}

impl BatchReport {
    pub fn result(&self, bundle_id: &BundleId) -> Option<&LifecycleResult> {
        self.results.get(bundle_id)
    }

    pub fn succeeded(&self) -> impl Iterator<Item = &App> {
        self.results.values().filter_map(|result| result.as_ref().ok())
    }

    pub fn failures(&self) -> impl Iterator<Item = &OperationFailure> {
        self.results.values().filter_map(|result| result.as_ref().err())
    }
}

struct AggregatorState {
    remaining: usize,
    results: HashMap<BundleId, LifecycleResult>,
    batch_error: Option<LifecycleError>,
    completion: Option<oneshot::Sender<BatchReport>>,
}

pub struct ResultAggregator {
    batch_id: BatchId,
    state: Mutex<AggregatorState>,
}

impl ResultAggregator {
    /// `intents` is the bundle identifier of every submitted intent,
    /// duplicates included.
    pub fn new(batch_id: BatchId, intents: &[BundleId]) -> (Self, oneshot::Receiver<BatchReport>) {
        let (sender, receiver) = oneshot::channel();
        let aggregator = Self {
            batch_id,
            state: Mutex::new(AggregatorState {
                remaining: intents.len(),
                results: HashMap::with_capacity(intents.len()),
                batch_error: None,
                completion: Some(sender),
            }),
        };
        aggregator.finish_if_complete(&mut aggregator.state.lock());
        (aggregator, receiver)
    }

    /// Record a terminal result. Returns `false` if a result for this
    /// bundle identifier was already stored.
    pub fn set(&self, bundle_id: BundleId, result: LifecycleResult) -> bool {
        let mut state = self.state.lock();
        if state.remaining == 0 {
            warn!(batch_id = %self.batch_id, bundle_id = %bundle_id, "Result arrived after batch completed");
            return false;
        }
        state.remaining -= 1;

        let stored = if state.results.contains_key(&bundle_id) {
            debug!(batch_id = %self.batch_id, bundle_id = %bundle_id, "Keeping first result for bundle");
            false
        } else {
            state.results.insert(bundle_id, result);
            true
        };

        self.finish_if_complete(&mut state);
        stored
    }

    /// Record a batch-wide failure. The first one wins.
    pub fn set_batch_error(&self, error: LifecycleError) {
        let mut state = self.state.lock();
        if state.batch_error.is_none() {
            state.batch_error = Some(error);
        }
    }

    pub fn is_complete(&self) -> bool {
        self.state.lock().completion.is_none()
    }

    fn finish_if_complete(&self, state: &mut AggregatorState) {
        if state.remaining > 0 {
            return;
        }
        if let Some(sender) = state.completion.take() {
            let report = BatchReport {
                batch_id: self.batch_id,
                results: std::mem::take(&mut state.results),
                batch_error: state.batch_error.clone(),
            };
            debug!(batch_id = %self.batch_id, results = report.results.len(), "Batch complete");
            let _ = sender.send(report);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::intent::OperationKind;

    fn bid(id: &str) -> BundleId {
        BundleId::from(id)
    }

    #[tokio::test]
    async fn test_empty_batch_completes_immediately() {
        let (aggregator, receiver) = ResultAggregator::new(BatchId::new(), &[]);
        assert!(aggregator.is_complete());
        let report = receiver.await.unwrap();
        assert!(report.results.is_empty());
    }

    #[tokio::test]
    async fn test_report_fires_after_last_result() {
        let (aggregator, mut receiver) =
            ResultAggregator::new(BatchId::new(), &[bid("com.example.a"), bid("com.example.b")]);

        assert!(aggregator.set(bid("com.example.a"), Ok(App::listing("com.example.a", "A", "1.0"))));
        assert!(receiver.try_recv().is_err());

        let failure = OperationFailure::new(
            OperationKind::Install,
            bid("com.example.b"),
            "B",
            LifecycleError::Cancelled,
        );
        assert!(aggregator.set(bid("com.example.b"), Err(failure)));

        let report = receiver.await.unwrap();
        assert_eq!(report.succeeded().count(), 1);
        assert_eq!(report.failures().count(), 1);
    }

    #[tokio::test]
    async fn test_first_result_is_never_overwritten() {
        let (aggregator, receiver) =
            ResultAggregator::new(BatchId::new(), &[bid("com.example.a"), bid("com.example.a")]);

        assert!(aggregator.set(bid("com.example.a"), Ok(App::listing("com.example.a", "First", "1.0"))));
        assert!(!aggregator.set(bid("com.example.a"), Ok(App::listing("com.example.a", "Second", "1.0"))));

        let report = receiver.await.unwrap();
        let stored = report.result(&bid("com.example.a")).unwrap().as_ref().unwrap();
        assert_eq!(stored.name, "First");
    }
}
