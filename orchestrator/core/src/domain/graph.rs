// Copyright (c) 2026 Sideload Orchestrator Contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Operation Graph
//!
//! Acyclic dependency graph of named sub-operations for one execution context
//! (a batch, or several batches sharing a context). This module is pure data:
//! it decides *which* nodes a new node waits on. Running nodes is the job of
//! `application::scheduler`.
//!
//! ## Host-app re-entrancy rule
//!
//! Reinstalling the orchestrator's own host app must be the last serial action
//! of its context, because the host process usually exits when it is replaced:
//!
//! 1. Adding a [`NodeKind::HostReinstall`] node inserts a dependency from it
//!    onto every serial-lane node already present.
//! 2. Adding any other node while a host-reinstall node exists and has not
//!    started inserts a dependency from the host node onto the new node.
//!
//! Rule 2 only touches host nodes that have not started; a started node's
//! dependency set is frozen.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Queue affinity of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lane {
    /// Bounded-concurrency pool, no ordering beyond dependencies.
    Pool,
    /// Strictly serial lane for device transport and on-disk bundle state.
    Serial,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Regular,
    /// Reinstalls or refreshes the orchestrator's own host app.
    HostReinstall,
}

/// Description of a node to add.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeSpec {
    pub name: String,
    pub lane: Lane,
    pub kind: NodeKind,
    pub dependencies: Vec<NodeId>,
}

impl NodeSpec {
    pub fn new(name: impl Into<String>, lane: Lane) -> Self {
        Self {
            name: name.into(),
            lane,
            kind: NodeKind::Regular,
            dependencies: Vec::new(),
        }
    }

    pub fn pool(name: impl Into<String>) -> Self {
        Self::new(name, Lane::Pool)
    }

    pub fn serial(name: impl Into<String>) -> Self {
        Self::new(name, Lane::Serial)
    }

    pub fn host_reinstall(mut self) -> Self {
        self.kind = NodeKind::HostReinstall;
        self
    }

    pub fn with_kind(mut self, kind: NodeKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn after(mut self, dependency: NodeId) -> Self {
        self.dependencies.push(dependency);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphNode {
    pub id: NodeId,
    pub name: String,
    pub lane: Lane,
    pub kind: NodeKind,
    pub dependencies: BTreeSet<NodeId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("Unknown dependency {dependency} for node '{name}'")]
    UnknownDependency { name: String, dependency: NodeId },

    #[error("Adding node '{name}' would create a dependency cycle")]
    Cycle { name: String },

    #[error("Unknown node {0}")]
    UnknownNode(NodeId),
}

#[derive(Debug, Clone, Default)]
pub struct OperationGraph {
    nodes: Vec<GraphNode>,
    started: HashSet<NodeId>,
}

impl OperationGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node, applying the host-app re-entrancy rule.
    pub fn add(&mut self, spec: NodeSpec) -> Result<NodeId, GraphError> {
        let id = NodeId(self.nodes.len());

        let mut dependencies = BTreeSet::new();
        for dependency in &spec.dependencies {
            if dependency.0 >= self.nodes.len() {
                return Err(GraphError::UnknownDependency {
                    name: spec.name.clone(),
                    dependency: *dependency,
                });
            }
            dependencies.insert(*dependency);
        }

        let mut waiting_hosts = Vec::new();
        match spec.kind {
            NodeKind::HostReinstall => {
                dependencies.extend(
                    self.nodes
                        .iter()
                        .filter(|node| node.lane == Lane::Serial)
                        .map(|node| node.id),
                );
            }
            NodeKind::Regular => {
                waiting_hosts.extend(
                    self.nodes
                        .iter()
                        .filter(|node| node.kind == NodeKind::HostReinstall)
                        .filter(|node| !self.is_started(node.id))
                        .map(|node| node.id),
                );
            }
        }

        // A host node about to wait on the new node must not itself be an
        // ancestor of it.
        for host in &waiting_hosts {
            if dependencies.iter().any(|dep| dep == host || self.depends_on(*dep, *host)) {
                return Err(GraphError::Cycle { name: spec.name });
            }
        }

        self.nodes.push(GraphNode {
            id,
            name: spec.name,
            lane: spec.lane,
            kind: spec.kind,
            dependencies,
        });
        for host in waiting_hosts {
            self.nodes[host.0].dependencies.insert(id);
        }

        Ok(id)
    }

    /// Freeze a node's dependency set. Returns the dependencies it must wait on.
    pub fn mark_started(&mut self, id: NodeId) -> Result<BTreeSet<NodeId>, GraphError> {
        let node = self.node(id)?;
        let dependencies = node.dependencies.clone();
        self.started.insert(id);
        Ok(dependencies)
    }

    pub fn is_started(&self, id: NodeId) -> bool {
        self.started.contains(&id)
    }

    pub fn node(&self, id: NodeId) -> Result<&GraphNode, GraphError> {
        self.nodes.get(id.0).ok_or(GraphError::UnknownNode(id))
    }

    pub fn dependencies(&self, id: NodeId) -> Result<&BTreeSet<NodeId>, GraphError> {
        Ok(&self.node(id)?.dependencies)
    }

    pub fn nodes(&self) -> &[GraphNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// True if `from` (transitively) depends on `target`.
    pub fn depends_on(&self, from: NodeId, target: NodeId) -> bool {
        let mut stack = vec![from];
        let mut seen = HashSet::new();
        while let Some(current) = stack.pop() {
            if !seen.insert(current) {
                continue;
            }
            let Some(node) = self.nodes.get(current.0) else {
                continue;
            };
            for dependency in &node.dependencies {
                if *dependency == target {
                    return true;
                }
                stack.push(*dependency);
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_node_waits_on_existing_serial_nodes_only() {
        let mut graph = OperationGraph::new();
        let auth = graph.add(NodeSpec::pool("authenticate")).unwrap();
        let install_a = graph.add(NodeSpec::serial("install a").after(auth)).unwrap();
        let download_b = graph.add(NodeSpec::pool("download b").after(auth)).unwrap();

        let host = graph
            .add(NodeSpec::serial("install host").host_reinstall())
            .unwrap();

        let deps = graph.dependencies(host).unwrap();
        assert!(deps.contains(&install_a));
        assert!(!deps.contains(&download_b));
        assert!(!deps.contains(&auth));
    }

    #[test]
    fn test_nodes_added_after_host_become_host_dependencies() {
        let mut graph = OperationGraph::new();
        let host = graph
            .add(NodeSpec::serial("install host").host_reinstall())
            .unwrap();

        let later: Vec<_> = (0..3)
            .map(|i| graph.add(NodeSpec::serial(format!("install {}", i))).unwrap())
            .collect();

        let deps = graph.dependencies(host).unwrap();
        for id in &later {
            assert!(deps.contains(id));
            assert!(graph.depends_on(host, *id));
        }
    }

    #[test]
    fn test_started_host_is_not_extended() {
        let mut graph = OperationGraph::new();
        let host = graph
            .add(NodeSpec::serial("install host").host_reinstall())
            .unwrap();
        graph.mark_started(host).unwrap();
        assert!(graph.is_started(host));

        let late = graph.add(NodeSpec::serial("late install")).unwrap();
        assert!(!graph.dependencies(host).unwrap().contains(&late));
    }

    #[test]
    fn test_node_depending_on_waiting_host_is_a_cycle() {
        let mut graph = OperationGraph::new();
        let host = graph
            .add(NodeSpec::serial("install host").host_reinstall())
            .unwrap();

        let result = graph.add(NodeSpec::pool("after host").after(host));
        assert_eq!(
            result,
            Err(GraphError::Cycle {
                name: "after host".to_string()
            })
        );
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn test_unknown_dependency_is_rejected() {
        let mut graph = OperationGraph::new();
        let result = graph.add(NodeSpec::pool("orphan").after(NodeId(7)));
        assert!(matches!(result, Err(GraphError::UnknownDependency { .. })));
    }
}
