// Copyright (c) 2026 Sideload Orchestrator Contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Scheduler
//!
//! Runs [`OperationGraph`] nodes on two lanes shared by every context of one
//! orchestrator instance:
//!
//! - a bounded-concurrency pool (a [`Semaphore`] with
//!   `max_concurrent_operations` permits), and
//! - a single serial lane (a fair `tokio::sync::Mutex`), FIFO in arrival
//!   order, for anything that talks to the device transport or mutates
//!   on-disk bundle state.
//!
//! Every submitted node becomes its own task. It waits until its context is
//! launched, then until every dependency has finished (successfully or not),
//! then for its lane, and only then polls the node's future. A failed node
//! unblocks its dependents like a successful one; dependents inspect the
//! results they were handed before doing real work.
//!
//! Dependency sets are re-read until the node starts, so edges the
//! host-reinstall rule inserts while a node is waiting are honoured.

use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{oneshot, watch, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::domain::errors::LifecycleError;
use crate::domain::graph::{GraphError, GraphNode, Lane, NodeId, NodeSpec, OperationGraph};

#[derive(Clone)]
pub struct Scheduler {
    pool: Arc<Semaphore>,
    serial: Arc<tokio::sync::Mutex<()>>,
    max_concurrent: usize,
}

impl Scheduler {
    pub fn new(max_concurrent: usize) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            pool: Arc::new(Semaphore::new(max_concurrent)),
            serial: Arc::new(tokio::sync::Mutex::new(())),
            max_concurrent,
        }
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// A new context whose nodes may start as soon as they are submitted.
    pub fn context(&self) -> ExecutionContext {
        let context = self.suspended_context();
        context.launch();
        context
    }

    /// A new context that holds every node back until [`ExecutionContext::launch`].
    pub fn suspended_context(&self) -> ExecutionContext {
        let (launched, _) = watch::channel(false);
        ExecutionContext {
            inner: Arc::new(ContextInner {
                scheduler: self.clone(),
                state: Mutex::new(ContextState::default()),
                launched,
                cancel: CancellationToken::new(),
            }),
        }
    }
}

#[derive(Default)]
struct ContextState {
    graph: OperationGraph,
    done: HashMap<NodeId, watch::Receiver<bool>>,
    finished: HashSet<NodeId>,
    completion_order: Vec<NodeId>,
}

struct ContextInner {
    scheduler: Scheduler,
    state: Mutex<ContextState>,
    launched: watch::Sender<bool>,
    cancel: CancellationToken,
}

/// One operation graph plus the bookkeeping to run it. Batches may share a
/// context so their host-reinstall ordering spans all of them.
#[derive(Clone)]
pub struct ExecutionContext {
    inner: Arc<ContextInner>,
}

/// Output of a submitted node.
pub struct NodeHandle<T> {
    id: NodeId,
    output: oneshot::Receiver<T>,
}

impl<T> NodeHandle<T> {
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Wait for the node's output. A node that never ran (its context was
    /// cancelled first) yields [`LifecycleError::Cancelled`].
    pub async fn join(self) -> Result<T, LifecycleError> {
        self.output.await.map_err(|_| LifecycleError::Cancelled)
    }
}

/// Marks a node finished when dropped, whether it ran, failed or was
/// abandoned, so dependents are never stranded.
struct NodeCompletion {
    context: ExecutionContext,
    id: NodeId,
    done: watch::Sender<bool>,
}

impl Drop for NodeCompletion {
    fn drop(&mut self) {
        {
            let mut state = self.context.inner.state.lock();
            if state.finished.insert(self.id) {
                state.completion_order.push(self.id);
            }
        }
        self.done.send_replace(true);
    }
}

impl ExecutionContext {
    /// Release every node held back by a suspended context.
    pub fn launch(&self) {
        self.inner.launched.send_replace(true);
    }

    /// Cancel every node of this context that has not started yet.
    pub fn cancel(&self) {
        self.inner.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.inner.cancel.clone()
    }

    /// Add a node to the graph and spawn the task that runs it.
    pub fn submit<F>(&self, spec: NodeSpec, future: F) -> Result<NodeHandle<F::Output>, GraphError>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.spawn_node(spec, future, true)
    }

    fn spawn_node<F>(&self, spec: NodeSpec, future: F, cancellable: bool) -> Result<NodeHandle<F::Output>, GraphError>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let name = spec.name.clone();
        let (done_tx, done_rx) = watch::channel(false);
        let id = {
            let mut state = self.inner.state.lock();
            let id = state.graph.add(spec)?;
            state.done.insert(id, done_rx);
            id
        };
        debug!(node = %name, id = %id, "Scheduled node");

        let (output_tx, output_rx) = oneshot::channel();
        let completion = NodeCompletion {
            context: self.clone(),
            id,
            done: done_tx,
        };
        let context = self.clone();
        tokio::spawn(async move {
            let completion = completion;
            if let Some(output) = context.execute(id, future, cancellable).await {
                let _ = output_tx.send(output);
            }
            drop(completion);
        });

        Ok(NodeHandle { id, output: output_rx })
    }

    /// Submit a fallible node and wait for its result.
    pub async fn run<F, T>(&self, spec: NodeSpec, future: F) -> Result<T, LifecycleError>
    where
        F: Future<Output = Result<T, LifecycleError>> + Send + 'static,
        T: Send + 'static,
    {
        let handle = self
            .submit(spec, future)
            .map_err(|e| LifecycleError::Internal(e.to_string()))?;
        handle.join().await?
    }

    /// Like [`run`](Self::run), but the node still runs after the context is
    /// cancelled. For compensating steps that must not be skipped.
    pub async fn run_uncancellable<F, T>(&self, spec: NodeSpec, future: F) -> Result<T, LifecycleError>
    where
        F: Future<Output = Result<T, LifecycleError>> + Send + 'static,
        T: Send + 'static,
    {
        let handle = self
            .spawn_node(spec, future, false)
            .map_err(|e| LifecycleError::Internal(e.to_string()))?;
        handle.join().await?
    }

    /// Wait until the node has finished.
    pub async fn wait_for(&self, id: NodeId) {
        let receiver = self.inner.state.lock().done.get(&id).cloned();
        if let Some(mut receiver) = receiver {
            let _ = receiver.wait_for(|done| *done).await;
        }
    }

    pub fn is_finished(&self, id: NodeId) -> bool {
        self.inner.state.lock().finished.contains(&id)
    }

    /// Nodes in the order they finished.
    pub fn completion_order(&self) -> Vec<NodeId> {
        self.inner.state.lock().completion_order.clone()
    }

    pub fn node(&self, id: NodeId) -> Option<GraphNode> {
        self.inner.state.lock().graph.node(id).ok().cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.state.lock().graph.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    async fn execute<F: Future>(&self, id: NodeId, future: F, cancellable: bool) -> Option<F::Output> {
        if cancellable {
            let cancel = self.inner.cancel.clone();
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(id = %id, "Node cancelled before start");
                    return None;
                }
                _ = self.wait_until_ready(id) => {}
            }
        } else {
            self.wait_until_ready(id).await;
        }

        let lane = self
            .inner
            .state
            .lock()
            .graph
            .node(id)
            .map(|node| node.lane)
            .unwrap_or(Lane::Pool);

        let scheduler = &self.inner.scheduler;
        let output = match lane {
            Lane::Serial => {
                let _turn = scheduler.serial.lock().await;
                future.await
            }
            Lane::Pool => {
                let _permit = scheduler.pool.acquire().await.ok();
                future.await
            }
        };
        Some(output)
    }

    async fn wait_until_ready(&self, id: NodeId) {
        let mut launched = self.inner.launched.subscribe();
        let _ = launched.wait_for(|launched| *launched).await;

        loop {
            let pending: Vec<watch::Receiver<bool>> = {
                let mut state = self.inner.state.lock();
                let pending: Vec<_> = match state.graph.dependencies(id) {
                    Ok(dependencies) => dependencies
                        .iter()
                        .filter(|dependency| !state.finished.contains(dependency))
                        .filter_map(|dependency| state.done.get(dependency).cloned())
                        .collect(),
                    Err(_) => Vec::new(),
                };
                if pending.is_empty() {
                    let _ = state.graph.mark_started(id);
                }
                pending
            };

            if pending.is_empty() {
                return;
            }
            for mut receiver in pending {
                let _ = receiver.wait_for(|done| *done).await;
            }
        }
    }
}
