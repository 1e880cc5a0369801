// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Readiness tracking and work dispatch.
//!
//! Every node owns a small state machine (`NotReady → Ready → Running`,
//! terminally `Closed`) guarded by a per-node mutex. Stream events — a push,
//! a bound advance, a channel close — re-evaluate the consuming node's
//! readiness through its input policy; only the NotReady→Ready transition
//! enqueues a work item, so a node never has more than one item pending and
//! never runs its processing phase concurrently with itself. Distinct nodes
//! run freely in parallel on the executor workers, which is where pipelining
//! throughput comes from.
//!
//! Teardown discipline: the first recorded error flips the run to
//! `Terminating`; pending process items are dropped, in-flight ones finish,
//! and every opened node is closed exactly once before the run reports
//! failure.

mod queue;

pub(crate) use queue::{SchedulerQueue, WorkItem, WorkKind};

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::channel::policy::Settlement;
use crate::channel::{ChannelSnapshot, InputChannel, InputPolicy, InputSet, OutputPort, PushAdmission};
use crate::error::{FlowError, Result};
use crate::node::{LifecyclePhase, Node, NodeContext, ProcessOutcome};
use crate::packet::Packet;
use crate::runtime::state::RuntimeState;
use crate::runtime::stats::RuntimeStats;
use crate::timestamp::Timestamp;
use crate::topology::{NodeId, PlannedSide};

pub type ErrorListener = Box<dyn Fn(&FlowError) + Send + Sync>;

/// Per-node scheduling state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SchedState {
    NotReady,
    Ready,
    Running,
    Closed,
}

pub(crate) struct SchedCell {
    pub state: SchedState,
    /// Kind of the single enqueued work item, if any.
    pub pending: Option<WorkKind>,
    pub opened: bool,
    pub closed: bool,
    /// Source requested Stop, or the run is draining.
    pub stopped: bool,
}

/// One node instance plus everything the scheduler needs around it.
pub(crate) struct NodeCell {
    pub id: NodeId,
    pub alias: String,
    pub node: Mutex<Box<dyn Node>>,
    pub sched: Mutex<SchedCell>,
    pub policy: Box<dyn InputPolicy>,
    /// Connected input channels, contract declaration order.
    pub inputs: Vec<Arc<InputChannel>>,
    pub input_selectors: Arc<Vec<String>>,
    pub outputs: Vec<OutputPort>,
    pub side_inputs: Vec<PlannedSide>,
    pub side_outputs: Vec<PlannedSide>,
    pub is_source: bool,
    pub depth: u32,
    pub decl_order: u32,
    /// Index into `Scheduler::queues`.
    pub queue: usize,
}

#[derive(Default)]
pub(crate) struct SchedulerStats {
    pub packets_pushed: AtomicU64,
    pub input_sets_delivered: AtomicU64,
    pub backpressure_reliefs: AtomicU64,
}

struct IdleCounters {
    /// Enqueued-or-running work items.
    active: usize,
}

/// Shared core of a running graph: node cells, channels, queues, run phase.
pub(crate) struct Scheduler {
    pub nodes: Vec<NodeCell>,
    pub channels: Vec<Arc<InputChannel>>,
    pub queues: Vec<Arc<SchedulerQueue>>,
    phase: Mutex<RuntimeState>,
    phase_cv: Condvar,
    release_backpressure: AtomicBool,
    /// Startup failed before workers existed: finalize on the caller's
    /// thread and never enqueue.
    inline_teardown: AtomicBool,
    error: Mutex<Option<FlowError>>,
    error_listener: Mutex<Option<ErrorListener>>,
    idle: Mutex<IdleCounters>,
    idle_cv: Condvar,
    /// Nodes not yet closed; the run completes when this reaches zero.
    live_nodes: AtomicUsize,
    pub stats: SchedulerStats,
    pub side_packets: Mutex<HashMap<String, Packet>>,
}

impl Scheduler {
    pub fn new(
        nodes: Vec<NodeCell>,
        channels: Vec<Arc<InputChannel>>,
        queues: Vec<Arc<SchedulerQueue>>,
        error_listener: Option<ErrorListener>,
    ) -> Self {
        let live_nodes = nodes.len();
        Scheduler {
            nodes,
            channels,
            queues,
            phase: Mutex::new(RuntimeState::Starting),
            phase_cv: Condvar::new(),
            release_backpressure: AtomicBool::new(false),
            inline_teardown: AtomicBool::new(false),
            error: Mutex::new(None),
            error_listener: Mutex::new(error_listener),
            idle: Mutex::new(IdleCounters { active: 0 }),
            idle_cv: Condvar::new(),
            live_nodes: AtomicUsize::new(live_nodes),
            stats: SchedulerStats::default(),
            side_packets: Mutex::new(HashMap::new()),
        }
    }

    // =========================================================================
    // Run phase
    // =========================================================================

    pub fn state(&self) -> RuntimeState {
        *self.phase.lock()
    }

    pub fn set_state(&self, state: RuntimeState) {
        *self.phase.lock() = state;
        self.phase_cv.notify_all();
    }

    fn is_terminating(&self) -> bool {
        matches!(
            self.state(),
            RuntimeState::Terminating | RuntimeState::Failed
        )
    }

    fn is_draining(&self) -> bool {
        !matches!(self.state(), RuntimeState::Running)
    }

    // =========================================================================
    // Packet admission (producer side)
    // =========================================================================

    /// Deliver a packet into every channel of an output port, blocking on
    /// full queues (backpressure). Fatal `OrderingViolation` on a
    /// non-monotonic timestamp.
    pub fn push_port(&self, port: &OutputPort, packet: Packet) -> Result<()> {
        if !packet.timestamp().is_packet_timestamp() {
            return Err(FlowError::Port(format!(
                "Cannot send a packet at timestamp '{}' on '{}'",
                packet.timestamp(),
                port.selector
            )));
        }

        for channel in &port.channels {
            match channel.push(packet.clone(), &self.release_backpressure)? {
                PushAdmission::Normal => {}
                PushAdmission::Relieved => {
                    self.stats
                        .backpressure_reliefs
                        .fetch_add(1, Ordering::Relaxed);
                    if channel.back_edge {
                        tracing::debug!(
                            "Back-edge channel '{}' admitted a packet over its cap",
                            channel.name
                        );
                    } else {
                        tracing::warn!(
                            "Channel '{}' relaxed backpressure during teardown",
                            channel.name
                        );
                    }
                }
            }
            self.stats.packets_pushed.fetch_add(1, Ordering::Relaxed);
        }

        for channel in &port.channels {
            self.evaluate(channel.consumer);
        }
        Ok(())
    }

    /// Assert a tighter bound on every channel of an output port.
    pub fn advance_port_bound(&self, port: &OutputPort, new_bound: Timestamp) -> Result<()> {
        let mut moved_consumers = Vec::new();
        for channel in &port.channels {
            if channel.advance_bound(new_bound)? {
                moved_consumers.push(channel.consumer);
            }
        }
        for consumer in moved_consumers {
            self.evaluate(consumer);
        }
        Ok(())
    }

    /// Close every channel of an output port and cascade readiness.
    pub fn close_port(&self, port: &OutputPort) {
        for channel in &port.channels {
            channel.close();
        }
        for channel in &port.channels {
            self.evaluate(channel.consumer);
        }
    }

    // =========================================================================
    // Readiness
    // =========================================================================

    fn snapshots(&self, cell: &NodeCell) -> Vec<ChannelSnapshot> {
        cell.inputs.iter().map(|c| c.snapshot()).collect()
    }

    fn settle_for(&self, cell: &NodeCell) -> Option<Settlement> {
        cell.policy.settle(&self.snapshots(cell))
    }

    /// Whether a node can never receive another input set. Back-edge
    /// channels only need to be drained, not closed: once the forward
    /// inputs are exhausted, nothing can feed the loop again — requiring
    /// the feedback producer to close first would deadlock the cycle's
    /// shutdown.
    fn inputs_done_and_empty(&self, cell: &NodeCell) -> bool {
        cell.inputs.iter().all(|c| {
            if c.back_edge {
                c.len() == 0
            } else {
                c.is_done_and_empty()
            }
        })
    }

    /// Re-evaluate a node after a stream event on one of its inputs.
    pub fn evaluate(&self, node_id: NodeId) {
        if self.inline_teardown.load(Ordering::Acquire) {
            return;
        }
        let cell = &self.nodes[node_id];
        let mut sched = cell.sched.lock();
        if sched.state != SchedState::NotReady || sched.closed || !sched.opened {
            return;
        }
        if cell.is_source {
            // Sources are driven by their own completion loop, not by
            // stream events.
            return;
        }
        if self.is_terminating() {
            self.schedule_close_locked(cell, &mut sched);
            return;
        }
        if self.settle_for(cell).is_some() {
            sched.state = SchedState::Ready;
            sched.pending = Some(WorkKind::Process);
            self.enqueue(cell, WorkKind::Process);
        } else if self.inputs_done_and_empty(cell) {
            self.schedule_close_locked(cell, &mut sched);
        }
    }

    /// Make every source node ready. Called once the run enters `Running`.
    pub fn kick_sources(&self) {
        for cell in &self.nodes {
            if !cell.is_source {
                continue;
            }
            let mut sched = cell.sched.lock();
            if sched.state == SchedState::NotReady && !sched.stopped && !sched.closed {
                sched.state = SchedState::Ready;
                sched.pending = Some(WorkKind::Process);
                self.enqueue(cell, WorkKind::Process);
            }
        }
    }

    fn enqueue(&self, cell: &NodeCell, kind: WorkKind) {
        {
            let mut idle = self.idle.lock();
            idle.active += 1;
        }
        self.queues[cell.queue].push(cell.id, kind, cell.depth, cell.decl_order);
    }

    fn schedule_close_locked(&self, cell: &NodeCell, sched: &mut SchedCell) {
        if self.inline_teardown.load(Ordering::Acquire) {
            return;
        }
        if !sched.opened || sched.closed || sched.state != SchedState::NotReady {
            return;
        }
        if sched.pending.is_some() {
            return;
        }
        sched.state = SchedState::Ready;
        sched.pending = Some(WorkKind::Close);
        self.enqueue(cell, WorkKind::Close);
    }

    fn schedule_close_if_needed(&self, cell: &NodeCell) {
        let mut sched = cell.sched.lock();
        self.schedule_close_locked(cell, &mut sched);
    }

    // =========================================================================
    // Work item execution (worker side)
    // =========================================================================

    /// Executor workers funnel every dequeued item through here.
    pub fn run_item(&self, item: WorkItem) {
        self.dispatch(&item);
        self.finish_item();
    }

    fn dispatch(&self, item: &WorkItem) {
        let cell = &self.nodes[item.node];
        let mut sched = cell.sched.lock();
        if sched.state != SchedState::Ready || sched.pending != Some(item.kind) {
            // Stale wakeup; the state machine has moved on.
            return;
        }
        sched.pending = None;

        match item.kind {
            WorkKind::Close => {
                sched.state = SchedState::Running;
                drop(sched);
                self.close_node(cell);
            }
            WorkKind::Process => {
                if self.is_terminating() {
                    sched.state = SchedState::NotReady;
                    self.schedule_close_locked(cell, &mut sched);
                    return;
                }
                if cell.is_source {
                    if sched.stopped {
                        sched.state = SchedState::NotReady;
                        self.schedule_close_locked(cell, &mut sched);
                        return;
                    }
                    sched.state = SchedState::Running;
                    drop(sched);
                    let outcome = self.invoke_process(cell, InputSet::empty());
                    self.after_process(cell, outcome);
                } else {
                    let Some(settlement) = self.settle_for(cell) else {
                        sched.state = SchedState::NotReady;
                        if self.inputs_done_and_empty(cell) {
                            self.schedule_close_locked(cell, &mut sched);
                        }
                        return;
                    };
                    let input = self.collect_input_set(cell, &settlement);
                    sched.state = SchedState::Running;
                    drop(sched);
                    self.stats
                        .input_sets_delivered
                        .fetch_add(1, Ordering::Relaxed);
                    let outcome = self.invoke_process(cell, input);
                    self.after_process(cell, outcome);
                }
            }
        }
    }

    fn collect_input_set(&self, cell: &NodeCell, settlement: &Settlement) -> InputSet {
        let mut slots: Vec<Option<Packet>> = vec![None; cell.inputs.len()];
        for &port in &settlement.ports {
            slots[port] = cell.inputs[port].pop_at(settlement.timestamp);
        }
        InputSet::new(
            settlement.timestamp,
            slots,
            Arc::clone(&cell.input_selectors),
        )
    }

    fn invoke_process(&self, cell: &NodeCell, input: InputSet) -> Result<ProcessOutcome> {
        let mut ctx = NodeContext::new(self, cell, LifecyclePhase::Process, input);
        let mut node = cell.node.lock();
        node.process(&mut ctx)
    }

    fn after_process(&self, cell: &NodeCell, outcome: Result<ProcessOutcome>) {
        match outcome {
            Err(e) => {
                {
                    let mut sched = cell.sched.lock();
                    sched.state = SchedState::NotReady;
                }
                self.record_error(self.tag_error(&cell.alias, e));
            }
            Ok(ProcessOutcome::Stop) => {
                if !cell.is_source {
                    {
                        let mut sched = cell.sched.lock();
                        sched.state = SchedState::NotReady;
                    }
                    self.record_error(FlowError::Processing {
                        node: cell.alias.clone(),
                        message: "Stop is only legal for source nodes".to_string(),
                    });
                    return;
                }
                tracing::debug!("[{}] Source stopped", cell.alias);
                {
                    let mut sched = cell.sched.lock();
                    sched.stopped = true;
                }
                // Still Running; finalize in place.
                self.close_node(cell);
            }
            Ok(ProcessOutcome::Continue) => {
                let mut sched = cell.sched.lock();
                sched.state = SchedState::NotReady;
                if self.is_terminating() {
                    self.schedule_close_locked(cell, &mut sched);
                } else if cell.is_source {
                    if self.is_draining() || sched.stopped {
                        self.schedule_close_locked(cell, &mut sched);
                    } else {
                        sched.state = SchedState::Ready;
                        sched.pending = Some(WorkKind::Process);
                        self.enqueue(cell, WorkKind::Process);
                    }
                } else if self.settle_for(cell).is_some() {
                    sched.state = SchedState::Ready;
                    sched.pending = Some(WorkKind::Process);
                    self.enqueue(cell, WorkKind::Process);
                } else if self.inputs_done_and_empty(cell) {
                    self.schedule_close_locked(cell, &mut sched);
                }
            }
        }
    }

    /// Finalize a node. Caller holds the `Running` state (no sched lock).
    fn close_node(&self, cell: &NodeCell) {
        tracing::debug!("[{}] Closing", cell.alias);
        let close_result = {
            let mut ctx = NodeContext::new(self, cell, LifecyclePhase::Close, InputSet::empty());
            let mut node = cell.node.lock();
            node.close(&mut ctx)
        };
        if let Err(e) = close_result {
            self.record_error(self.tag_error(&cell.alias, e));
        }

        for port in &cell.outputs {
            self.close_port(port);
        }

        {
            let mut sched = cell.sched.lock();
            sched.state = SchedState::Closed;
            sched.closed = true;
        }

        if self.live_nodes.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.finish_run();
        }
    }

    fn finish_item(&self) {
        let mut idle = self.idle.lock();
        idle.active -= 1;
        if idle.active == 0 {
            self.idle_cv.notify_all();
        }
    }

    // =========================================================================
    // Errors and teardown
    // =========================================================================

    fn tag_error(&self, alias: &str, e: FlowError) -> FlowError {
        match e {
            FlowError::OrderingViolation { .. } | FlowError::Processing { .. } => e,
            other => FlowError::Processing {
                node: alias.to_string(),
                message: other.to_string(),
            },
        }
    }

    /// Record a fatal run error. The first error wins; every error is
    /// logged loudly, since a silently failed graph is a debugging hazard.
    pub fn record_error(&self, error: FlowError) {
        let first = {
            let mut slot = self.error.lock();
            if slot.is_none() {
                *slot = Some(error.duplicate());
                true
            } else {
                false
            }
        };

        if first {
            tracing::error!("Graph run failed: {}", error);
            if let Some(listener) = self.error_listener.lock().as_ref() {
                listener(&error);
            }
            self.begin_teardown();
        } else {
            tracing::warn!("Further error during teardown: {}", error);
        }
    }

    fn begin_teardown(&self) {
        {
            let mut phase = self.phase.lock();
            match *phase {
                RuntimeState::Done | RuntimeState::Failed => return,
                _ => *phase = RuntimeState::Terminating,
            }
            self.phase_cv.notify_all();
        }

        // Producers stalled on full queues must not outlive the run.
        self.release_backpressure.store(true, Ordering::Release);
        for channel in &self.channels {
            channel.release_waiters();
        }

        for cell in &self.nodes {
            self.schedule_close_if_needed(cell);
        }
    }

    /// Graceful shutdown: sources stop after their current iteration, then
    /// closure cascades downstream as channels drain.
    pub fn drain(&self) {
        {
            let mut phase = self.phase.lock();
            if *phase != RuntimeState::Running {
                return;
            }
            *phase = RuntimeState::Draining;
            self.phase_cv.notify_all();
        }
        for cell in &self.nodes {
            if cell.is_source {
                self.schedule_close_if_needed(cell);
            }
        }
    }

    fn finish_run(&self) {
        let failed = self.error.lock().is_some();
        {
            let mut phase = self.phase.lock();
            *phase = if failed {
                RuntimeState::Failed
            } else {
                RuntimeState::Done
            };
            self.phase_cv.notify_all();
        }
        tracing::info!(
            "Graph run finished ({})",
            if failed { "failed" } else { "ok" }
        );
    }

    // =========================================================================
    // Waiting
    // =========================================================================

    /// Block until no work item is queued or running. With live source
    /// nodes this does not return until they stop or the run drains.
    pub fn wait_until_idle(&self) {
        let mut idle = self.idle.lock();
        while idle.active > 0 {
            self.idle_cv.wait(&mut idle);
        }
    }

    /// Block until every node has closed; returns the first run error.
    pub fn wait_until_done(&self) -> Result<()> {
        let mut phase = self.phase.lock();
        while !matches!(*phase, RuntimeState::Done | RuntimeState::Failed) {
            self.phase_cv.wait(&mut phase);
        }
        drop(phase);
        match &*self.error.lock() {
            Some(e) => Err(e.duplicate()),
            None => Ok(()),
        }
    }

    pub fn first_error(&self) -> Option<FlowError> {
        self.error.lock().as_ref().map(FlowError::duplicate)
    }

    pub fn runtime_stats(&self) -> RuntimeStats {
        RuntimeStats {
            packets_pushed: self.stats.packets_pushed.load(Ordering::Relaxed),
            input_sets_delivered: self.stats.input_sets_delivered.load(Ordering::Relaxed),
            backpressure_reliefs: self.stats.backpressure_reliefs.load(Ordering::Relaxed),
        }
    }

    // =========================================================================
    // Startup helpers (called from the runtime's open sequence)
    // =========================================================================

    pub fn open_node(&self, node_id: NodeId) -> Result<()> {
        let cell = &self.nodes[node_id];

        for side in &cell.side_inputs {
            if side.required && !self.side_packets.lock().contains_key(&side.global_name) {
                return Err(FlowError::Configuration(format!(
                    "[{}] Required side packet '{}' was not provided",
                    cell.alias, side.global_name
                )));
            }
        }

        let open_result = {
            let mut ctx = NodeContext::new(self, cell, LifecyclePhase::Open, InputSet::empty());
            let mut node = cell.node.lock();
            node.open(&mut ctx)
        };
        open_result.map_err(|e| self.tag_error(&cell.alias, e))?;

        let mut sched = cell.sched.lock();
        sched.opened = true;
        Ok(())
    }

    /// Enter inline-teardown mode after a startup failure: record the
    /// error, stop all future enqueueing, and let the caller finalize each
    /// node on its own thread via [`Scheduler::close_node_inline`].
    pub fn begin_inline_teardown(&self, error: FlowError) {
        self.inline_teardown.store(true, Ordering::Release);
        {
            let mut slot = self.error.lock();
            if slot.is_none() {
                *slot = Some(error.duplicate());
            }
        }
        tracing::error!("Graph startup failed: {}", error);
        if let Some(listener) = self.error_listener.lock().as_ref() {
            listener(&error);
        }
        self.set_state(RuntimeState::Terminating);
        self.release_backpressure.store(true, Ordering::Release);
        for channel in &self.channels {
            channel.release_waiters();
        }
    }

    /// Close a node synchronously during a failed startup, before any
    /// executor threads exist.
    pub fn close_node_inline(&self, node_id: NodeId) {
        let cell = &self.nodes[node_id];
        {
            let mut sched = cell.sched.lock();
            if sched.closed {
                return;
            }
            if !sched.opened {
                // Never opened, so no finalization is owed.
                sched.closed = true;
                sched.state = SchedState::Closed;
                drop(sched);
                if self.live_nodes.fetch_sub(1, Ordering::AcqRel) == 1 {
                    self.finish_run();
                }
                return;
            }
            sched.state = SchedState::Running;
        }
        self.close_node(cell);
    }
}

impl NodeCell {
    pub fn new_sched_cell() -> SchedCell {
        SchedCell {
            state: SchedState::NotReady,
            pending: None,
            opened: false,
            closed: false,
            stopped: false,
        }
    }
}
