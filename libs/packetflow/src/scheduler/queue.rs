// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Priority-ordered work queues, one per executor.
//!
//! Workers are woken through a crossbeam channel (one token per pushed
//! item); the heap itself is a plain mutexed binary heap — contention on it
//! is bounded by the executor's worker count, and item handling dwarfs the
//! lock hold time.

use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::topology::NodeId;

/// What a dequeued worker should do with the node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WorkKind {
    Process,
    Close,
}

#[derive(Debug)]
pub(crate) struct WorkItem {
    pub node: NodeId,
    pub kind: WorkKind,
    /// Topological depth; deeper nodes (closer to outputs) run first.
    pub depth: u32,
    /// Declaration order; earlier-declared nodes break depth ties.
    pub decl_order: u32,
    /// FIFO tie-break among otherwise equal items.
    pub seq: u64,
}

impl PartialEq for WorkItem {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == std::cmp::Ordering::Equal
    }
}

impl Eq for WorkItem {}

impl PartialOrd for WorkItem {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for WorkItem {
    /// `BinaryHeap` is a max-heap: "greater" means "dispatched first".
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.depth
            .cmp(&other.depth)
            .then_with(|| other.decl_order.cmp(&self.decl_order))
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// One executor's queue of ready work items.
///
/// The queue exclusively owns pending items until a worker pops them; a
/// node never has more than one pending item (only the NotReady→Ready
/// transition enqueues).
pub(crate) struct SchedulerQueue {
    heap: Mutex<BinaryHeap<WorkItem>>,
    seq: AtomicU64,
    wakeup_tx: crossbeam_channel::Sender<()>,
    wakeup_rx: crossbeam_channel::Receiver<()>,
}

impl SchedulerQueue {
    pub fn new() -> Self {
        let (wakeup_tx, wakeup_rx) = crossbeam_channel::unbounded();
        SchedulerQueue {
            heap: Mutex::new(BinaryHeap::new()),
            seq: AtomicU64::new(0),
            wakeup_tx,
            wakeup_rx,
        }
    }

    pub fn push(&self, node: NodeId, kind: WorkKind, depth: u32, decl_order: u32) {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        self.heap.lock().push(WorkItem {
            node,
            kind,
            depth,
            decl_order,
            seq,
        });
        // A send only fails when every receiver is gone, i.e. after the
        // executor threads have exited; the item is then drained by close().
        let _ = self.wakeup_tx.send(());
    }

    pub fn try_pop(&self) -> Option<WorkItem> {
        self.heap.lock().pop()
    }

    pub fn len(&self) -> usize {
        self.heap.lock().len()
    }

    /// Receiver workers select on, one token per pushed item.
    pub fn wakeup_receiver(&self) -> crossbeam_channel::Receiver<()> {
        self.wakeup_rx.clone()
    }
}
