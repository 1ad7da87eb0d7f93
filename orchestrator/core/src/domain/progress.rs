// Copyright (c) 2026 Sideload Orchestrator Contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Progress Tree
//!
//! Hierarchical weighted progress, stored as an arena: nodes live in a `Vec`
//! and refer to each other by [`ProgressNodeId`], so parents and children never
//! own each other.
//!
//! ## Invariants
//!
//! - A child's weight (pending units in its parent) is fixed at attach time.
//! - Nodes are append-only: once attached, a child is never detached, and a
//!   node may be attached at most once.
//! - A node's own completed units only increase (clamped to its total).
//!
//! Together these make [`ProgressTree::fraction_completed`] monotonically
//! non-decreasing for every node, even while workers advance leaves
//! concurrently through a [`ProgressHandle`].
//!
//! Cancelling a node marks its whole subtree cancelled; children attached to a
//! cancelled parent later are cancelled on attach.

use parking_lot::RwLock;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProgressNodeId(usize);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProgressError {
    #[error("Progress node {0:?} does not exist")]
    UnknownNode(ProgressNodeId),

    #[error("Progress node {0:?} is already attached to a parent")]
    AlreadyAttached(ProgressNodeId),

    #[error("Attaching {child:?} under {parent:?} would create a cycle")]
    Cycle {
        parent: ProgressNodeId,
        child: ProgressNodeId,
    },
}

#[derive(Debug, Clone)]
struct ProgressNode {
    total_units: u64,
    completed_units: u64,
    parent: Option<ProgressNodeId>,
    /// (child, pending units of this node assigned to the child)
    children: Vec<(ProgressNodeId, u64)>,
    cancelled: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ProgressTree {
    nodes: Vec<ProgressNode>,
}

impl ProgressTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_node(&mut self, total_units: u64) -> ProgressNodeId {
        let id = ProgressNodeId(self.nodes.len());
        self.nodes.push(ProgressNode {
            total_units,
            completed_units: 0,
            parent: None,
            children: Vec::new(),
            cancelled: false,
        });
        id
    }

    /// Attach `child` under `parent`, weighted as `pending_units` of the
    /// parent's total.
    pub fn attach(
        &mut self,
        parent: ProgressNodeId,
        child: ProgressNodeId,
        pending_units: u64,
    ) -> Result<(), ProgressError> {
        self.get(parent)?;
        let child_node = self.get(child)?;

        if child_node.parent.is_some() {
            return Err(ProgressError::AlreadyAttached(child));
        }

        let mut cursor = Some(parent);
        while let Some(current) = cursor {
            if current == child {
                return Err(ProgressError::Cycle { parent, child });
            }
            cursor = self.nodes[current.0].parent;
        }

        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.push((child, pending_units));

        if self.nodes[parent.0].cancelled {
            self.mark_cancelled(child);
        }
        Ok(())
    }

    /// Create a node and attach it under `parent` in one step.
    pub fn new_child(
        &mut self,
        parent: ProgressNodeId,
        pending_units: u64,
        total_units: u64,
    ) -> Result<ProgressNodeId, ProgressError> {
        self.get(parent)?;
        let child = self.new_node(total_units);
        self.attach(parent, child, pending_units)?;
        Ok(child)
    }

    /// Advance a node's own completed units. Saturates at the node's total.
    pub fn advance(&mut self, node: ProgressNodeId, by: u64) -> Result<(), ProgressError> {
        let entry = self.get_mut(node)?;
        entry.completed_units = entry.completed_units.saturating_add(by).min(entry.total_units);
        Ok(())
    }

    /// Mark a node's own units fully complete.
    pub fn complete(&mut self, node: ProgressNodeId) -> Result<(), ProgressError> {
        let entry = self.get_mut(node)?;
        entry.completed_units = entry.total_units;
        Ok(())
    }

    /// Fraction complete in `[0, 1]`: own units plus the weighted fractions of
    /// all children, divided by the node's total.
    pub fn fraction_completed(&self, node: ProgressNodeId) -> Result<f64, ProgressError> {
        self.get(node)?;
        Ok(self.fraction_unchecked(node))
    }

    fn fraction_unchecked(&self, node: ProgressNodeId) -> f64 {
        let entry = &self.nodes[node.0];
        if entry.total_units == 0 {
            return 1.0;
        }

        let from_children: f64 = entry
            .children
            .iter()
            .map(|(child, weight)| *weight as f64 * self.fraction_unchecked(*child))
            .sum();

        ((entry.completed_units as f64 + from_children) / entry.total_units as f64).min(1.0)
    }

    pub fn cancel(&mut self, node: ProgressNodeId) -> Result<(), ProgressError> {
        self.get(node)?;
        self.mark_cancelled(node);
        Ok(())
    }

    pub fn is_cancelled(&self, node: ProgressNodeId) -> Result<bool, ProgressError> {
        Ok(self.get(node)?.cancelled)
    }

    pub fn parent(&self, node: ProgressNodeId) -> Result<Option<ProgressNodeId>, ProgressError> {
        Ok(self.get(node)?.parent)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn mark_cancelled(&mut self, node: ProgressNodeId) {
        let mut stack = vec![node];
        while let Some(current) = stack.pop() {
            let entry = &mut self.nodes[current.0];
            entry.cancelled = true;
            stack.extend(entry.children.iter().map(|(child, _)| *child));
        }
    }

    fn get(&self, node: ProgressNodeId) -> Result<&ProgressNode, ProgressError> {
        self.nodes.get(node.0).ok_or(ProgressError::UnknownNode(node))
    }

    fn get_mut(&mut self, node: ProgressNodeId) -> Result<&mut ProgressNode, ProgressError> {
        self.nodes.get_mut(node.0).ok_or(ProgressError::UnknownNode(node))
    }
}

/// Thread-safe handle to a shared [`ProgressTree`].
#[derive(Debug, Clone, Default)]
pub struct ProgressHandle {
    tree: Arc<RwLock<ProgressTree>>,
}

impl ProgressHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a detached root node.
    pub fn root(&self, total_units: u64) -> ProgressRef {
        let id = self.tree.write().new_node(total_units);
        ProgressRef {
            tree: self.clone(),
            id,
        }
    }

    pub fn fraction_completed(&self, node: ProgressNodeId) -> Result<f64, ProgressError> {
        self.tree.read().fraction_completed(node)
    }

    pub fn with<R>(&self, f: impl FnOnce(&ProgressTree) -> R) -> R {
        f(&self.tree.read())
    }

    pub fn with_mut<R>(&self, f: impl FnOnce(&mut ProgressTree) -> R) -> R {
        f(&mut self.tree.write())
    }
}

/// A node inside a shared tree. Node ids handed out by the handle are always
/// valid for that tree, so operations here do not fail.
#[derive(Debug, Clone)]
pub struct ProgressRef {
    tree: ProgressHandle,
    id: ProgressNodeId,
}

impl ProgressRef {
    pub fn id(&self) -> ProgressNodeId {
        self.id
    }

    pub fn handle(&self) -> &ProgressHandle {
        &self.tree
    }

    /// Create a child weighted as `pending_units` of this node.
    pub fn child(&self, pending_units: u64, total_units: u64) -> ProgressRef {
        let id = self.tree.with_mut(|tree| match tree.new_child(self.id, pending_units, total_units) {
            Ok(id) => id,
            Err(e) => {
                debug!(error = %e, "Creating detached progress node");
                tree.new_node(total_units)
            }
        });
        ProgressRef {
            tree: self.tree.clone(),
            id,
        }
    }

    pub fn advance(&self, by: u64) {
        if let Err(e) = self.tree.with_mut(|tree| tree.advance(self.id, by)) {
            debug!(error = %e, "Ignoring progress update");
        }
    }

    pub fn complete(&self) {
        if let Err(e) = self.tree.with_mut(|tree| tree.complete(self.id)) {
            debug!(error = %e, "Ignoring progress completion");
        }
    }

    pub fn cancel(&self) {
        if let Err(e) = self.tree.with_mut(|tree| tree.cancel(self.id)) {
            debug!(error = %e, "Ignoring progress cancellation");
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.tree
            .with(|tree| tree.is_cancelled(self.id))
            .unwrap_or(false)
    }

    pub fn fraction_completed(&self) -> f64 {
        self.tree.fraction_completed(self.id).unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weighted_sum_of_children() {
        let mut tree = ProgressTree::new();
        let root = tree.new_node(100);
        let download = tree.new_child(root, 40, 10).unwrap();
        let install = tree.new_child(root, 60, 1).unwrap();

        tree.advance(download, 5).unwrap();
        assert!((tree.fraction_completed(root).unwrap() - 0.2).abs() < 1e-9);

        tree.complete(install).unwrap();
        assert!((tree.fraction_completed(root).unwrap() - 0.8).abs() < 1e-9);

        tree.advance(download, 500).unwrap();
        assert!((tree.fraction_completed(root).unwrap() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_attach_twice_is_rejected() {
        let mut tree = ProgressTree::new();
        let a = tree.new_node(1);
        let b = tree.new_node(1);
        let child = tree.new_node(1);

        tree.attach(a, child, 1).unwrap();
        assert_eq!(tree.attach(b, child, 1), Err(ProgressError::AlreadyAttached(child)));
    }

    #[test]
    fn test_attach_cycle_is_rejected() {
        let mut tree = ProgressTree::new();
        let root = tree.new_node(1);
        let child = tree.new_child(root, 1, 1).unwrap();

        assert_eq!(
            tree.attach(child, root, 1),
            Err(ProgressError::Cycle { parent: child, child: root })
        );
        assert_eq!(
            tree.attach(root, root, 1),
            Err(ProgressError::Cycle { parent: root, child: root })
        );
    }

    #[test]
    fn test_cancel_marks_subtree_and_late_children() {
        let mut tree = ProgressTree::new();
        let root = tree.new_node(2);
        let app_a = tree.new_child(root, 1, 100).unwrap();
        let app_b = tree.new_child(root, 1, 100).unwrap();
        let step = tree.new_child(app_a, 50, 1).unwrap();

        tree.cancel(app_a).unwrap();
        assert!(tree.is_cancelled(app_a).unwrap());
        assert!(tree.is_cancelled(step).unwrap());
        assert!(!tree.is_cancelled(app_b).unwrap());
        assert!(!tree.is_cancelled(root).unwrap());

        let late = tree.new_child(app_a, 50, 1).unwrap();
        assert!(tree.is_cancelled(late).unwrap());
    }

    #[test]
    fn test_root_fraction_is_monotonic_over_advance_sequences() {
        let mut tree = ProgressTree::new();
        let root = tree.new_node(3);
        let leaves: Vec<_> = (0..3)
            .map(|i| tree.new_child(root, 1, 7 + i as u64).unwrap())
            .collect();

        let mut last = tree.fraction_completed(root).unwrap();
        for step in 0..60u64 {
            let leaf = leaves[(step * 7 % 3) as usize];
            tree.advance(leaf, step % 4).unwrap();
            let now = tree.fraction_completed(root).unwrap();
            assert!(now + 1e-12 >= last, "fraction went backwards: {} -> {}", last, now);
            last = now;
        }
        assert!(last <= 1.0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_advances_through_handle() {
        let handle = ProgressHandle::new();
        let root = handle.root(8);
        let leaves: Vec<_> = (0..8).map(|_| root.child(1, 100)).collect();

        let tasks: Vec<_> = leaves
            .into_iter()
            .map(|leaf| {
                tokio::spawn(async move {
                    for _ in 0..100 {
                        leaf.advance(1);
                        tokio::task::yield_now().await;
                    }
                })
            })
            .collect();

        let observer = {
            let root = root.clone();
            tokio::spawn(async move {
                let mut last = 0.0;
                for _ in 0..200 {
                    let now = root.fraction_completed();
                    assert!(now + 1e-12 >= last);
                    last = now;
                    tokio::task::yield_now().await;
                }
            })
        };

        for task in tasks {
            task.await.unwrap();
        }
        observer.await.unwrap();
        assert!((root.fraction_completed() - 1.0).abs() < 1e-9);
    }
}
