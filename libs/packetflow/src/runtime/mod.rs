// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Run control: load a graph, feed it, observe it, shut it down.
//!
//! A [`FlowRuntime`] is single-run: it is loaded from a [`GraphConfig`]
//! plus a [`NodeRegistry`], configured (observers, error listener), started
//! once, and closed once. Nodes are constructed fresh at load and destroyed
//! with the runtime.
//!
//! Shutdown is cooperative, never preemptive: [`FlowRuntime::close`] stops
//! admission of external input, lets sources finish their current
//! iteration, drains in-flight work, finalizes every opened node exactly
//! once, and joins the worker threads.

mod observer;
pub(crate) mod state;
pub(crate) mod stats;

pub use observer::ObserverCallback;
pub use state::RuntimeState;
pub use stats::RuntimeStats;

/// Callback invoked with the run's first fatal error before teardown.
pub use crate::scheduler::ErrorListener;

use std::collections::HashMap;
use std::sync::Arc;

use crate::channel::{policy, InputChannel, OutputPort};
use crate::config::{expand_subgraphs, GraphConfig};
use crate::error::{FlowError, Result};
use crate::executor::ExecutorPool;
use crate::node::{Node, NodeKind, NodeRegistry};
use crate::packet::Packet;
use crate::scheduler::{NodeCell, Scheduler, SchedulerQueue};
use crate::timestamp::Timestamp;
use crate::topology::Topology;

use observer::ObserverNode;

/// Side packets provided to [`FlowRuntime::start`], by graph-level name.
pub type SidePackets = HashMap<String, Packet>;

struct Staged {
    topology: Topology,
    instances: parking_lot::Mutex<Vec<Box<dyn Node>>>,
}

/// A loaded, runnable graph.
pub struct FlowRuntime {
    name: String,
    staged: Option<Staged>,
    observers: Vec<(String, ObserverCallback)>,
    error_listener: Option<ErrorListener>,
    scheduler: Option<Arc<Scheduler>>,
    pools: Vec<ExecutorPool>,
    graph_inputs: HashMap<String, OutputPort>,
}

impl std::fmt::Debug for FlowRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowRuntime")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl FlowRuntime {
    /// The graph-load interface: validate `config` against `registry` and
    /// return a runnable graph, or a `Configuration` error.
    pub fn load(registry: &NodeRegistry, config: GraphConfig) -> Result<Self> {
        let config = expand_subgraphs(config, registry)?;
        config.validate()?;

        let mut instances: Vec<Box<dyn Node>> = Vec::with_capacity(config.nodes.len());
        for node in &config.nodes {
            match registry.get(&node.node_type) {
                Some(NodeKind::Node(factory)) => instances.push(factory(&node.options)?),
                Some(NodeKind::Subgraph(_)) => {
                    // Expansion replaced these already; reaching here means
                    // the registry changed between expansion and load.
                    return Err(FlowError::Configuration(format!(
                        "Subgraph type '{}' survived expansion",
                        node.node_type
                    )));
                }
                None => {
                    return Err(FlowError::Configuration(format!(
                        "Unknown node type '{}' (node '{}')",
                        node.node_type, node.alias
                    )))
                }
            }
        }

        let contracts: Vec<_> = instances.iter().map(|n| n.contract()).collect();
        let topology = Topology::resolve(&config, &contracts)?;

        let name = topology.name.clone().unwrap_or_else(|| "graph".to_string());
        tracing::info!(
            "[{}] Loaded: {} nodes, {} streams, {} executors",
            name,
            topology.nodes.len(),
            topology.channels.len(),
            topology.executors.len()
        );

        Ok(FlowRuntime {
            name,
            staged: Some(Staged {
                topology,
                instances: parking_lot::Mutex::new(instances),
            }),
            observers: Vec::new(),
            error_listener: None,
            scheduler: None,
            pools: Vec::new(),
            graph_inputs: HashMap::new(),
        })
    }

    /// Register a per-output-stream packet observer. Must be called before
    /// `start`. The callback runs synchronously on the executor thread that
    /// produced the packet; long work must be handed off, or it stalls the
    /// scheduler.
    pub fn observe_output(
        &mut self,
        stream: impl Into<String>,
        callback: ObserverCallback,
    ) -> Result<()> {
        let stream = stream.into();
        let Some(staged) = &self.staged else {
            return Err(FlowError::Runtime(
                "Observers must be registered before start".to_string(),
            ));
        };
        if !staged
            .topology
            .graph_outputs
            .iter()
            .any(|(name, _, _)| *name == stream)
        {
            return Err(FlowError::NotFound(format!(
                "Graph has no output stream '{}'",
                stream
            )));
        }
        self.observers.push((stream, callback));
        Ok(())
    }

    /// Register the run's error listener. Without one, fatal errors are
    /// still logged at error level before teardown.
    pub fn set_error_listener(&mut self, listener: ErrorListener) -> Result<()> {
        if self.staged.is_none() {
            return Err(FlowError::Runtime(
                "The error listener must be registered before start".to_string(),
            ));
        }
        self.error_listener = Some(listener);
        Ok(())
    }

    /// Bind side packets, open every node in topological order, spawn the
    /// executor pools, and begin scheduling.
    pub fn start(&mut self, side_packets: SidePackets) -> Result<()> {
        let Some(staged) = self.staged.take() else {
            return Err(FlowError::Runtime(format!(
                "[{}] Runtime cannot start twice",
                self.name
            )));
        };
        let Staged {
            topology,
            instances,
        } = staged;

        let core_count = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        let node_count = topology.nodes.len() + self.observers.len();
        tracing::info!("[{}] Starting with {} nodes", self.name, node_count);
        if node_count > core_count * 2 {
            tracing::warn!(
                "[{}] {} nodes on {} CPU cores; consider dedicating executors \
                 to the expensive nodes instead of adding more",
                self.name,
                node_count,
                core_count
            );
        }

        // Channels from the plan, then one extra channel per observer.
        let mut channels: Vec<Arc<InputChannel>> = topology
            .channels
            .iter()
            .map(|p| {
                Arc::new(InputChannel::new(
                    p.name.clone(),
                    p.consumer,
                    p.max_queue_size,
                    p.back_edge,
                ))
            })
            .collect();

        // (producer node, output idx) -> extra observer channels
        let mut observer_taps: HashMap<(usize, usize), Vec<Arc<InputChannel>>> = HashMap::new();
        let mut observer_specs = Vec::new();
        for (i, (stream, callback)) in self.observers.drain(..).enumerate() {
            let &(_, producer, out_idx) = topology
                .graph_outputs
                .iter()
                .find(|(name, _, _)| *name == stream)
                .expect("observer stream validated at registration");
            let observer_id = topology.nodes.len() + i;
            let channel = Arc::new(InputChannel::new(
                format!("{} -> observer:{}", stream, stream),
                observer_id,
                topology.default_max_queue_size,
                false,
            ));
            channels.push(Arc::clone(&channel));
            observer_taps
                .entry((producer, out_idx))
                .or_default()
                .push(channel);
            observer_specs.push((stream, callback, producer));
        }

        let queues: Vec<Arc<SchedulerQueue>> = topology
            .executors
            .iter()
            .map(|_| Arc::new(SchedulerQueue::new()))
            .collect();
        let queues_for_spawn = queues.clone();

        let mut cells: Vec<NodeCell> = Vec::with_capacity(node_count);
        for (id, (planned, instance)) in topology.nodes.iter().zip(instances.into_inner()).enumerate() {
            let inputs: Vec<Arc<InputChannel>> = planned
                .inputs
                .iter()
                .map(|i| Arc::clone(&channels[i.channel]))
                .collect();
            let input_selectors =
                Arc::new(planned.inputs.iter().map(|i| i.selector.clone()).collect());
            let outputs: Vec<OutputPort> = planned
                .outputs
                .iter()
                .enumerate()
                .map(|(out_idx, po)| {
                    let mut port = OutputPort::new(po.selector.clone());
                    port.channels = po
                        .channels
                        .iter()
                        .map(|&c| Arc::clone(&channels[c]))
                        .collect();
                    if let Some(taps) = observer_taps.remove(&(id, out_idx)) {
                        port.channels.extend(taps);
                    }
                    port
                })
                .collect();

            cells.push(NodeCell {
                id,
                alias: planned.alias.clone(),
                node: parking_lot::Mutex::new(instance),
                sched: parking_lot::Mutex::new(NodeCell::new_sched_cell()),
                policy: policy::build_policy(&planned.policy, planned.sync_groups.clone()),
                inputs,
                input_selectors,
                outputs,
                side_inputs: planned.side_inputs.clone(),
                side_outputs: planned.side_outputs.clone(),
                is_source: planned.is_source,
                depth: planned.depth,
                decl_order: planned.decl_order,
                queue: planned.executor,
            });
        }

        for (i, (stream, callback, producer)) in observer_specs.into_iter().enumerate() {
            let id = topology.nodes.len() + i;
            let channel = Arc::clone(&channels[topology.channels.len() + i]);
            cells.push(NodeCell {
                id,
                alias: format!("observer:{}", stream),
                node: parking_lot::Mutex::new(Box::new(ObserverNode::new(
                    stream.clone(),
                    callback,
                ))),
                sched: parking_lot::Mutex::new(NodeCell::new_sched_cell()),
                policy: Box::new(policy::DefaultPolicy),
                inputs: vec![channel],
                input_selectors: Arc::new(vec!["IN".to_string()]),
                outputs: Vec::new(),
                side_inputs: Vec::new(),
                side_outputs: Vec::new(),
                is_source: false,
                depth: topology.nodes[producer].depth + 1,
                decl_order: id as u32,
                queue: 0,
            });
        }

        let scheduler = Arc::new(Scheduler::new(
            cells,
            channels,
            queues,
            self.error_listener.take(),
        ));

        {
            let mut bound = scheduler.side_packets.lock();
            for (name, packet) in side_packets {
                bound.insert(name, packet);
            }
        }

        // Open in topological order so produced side packets are visible to
        // their consumers' open phases.
        let mut open_order: Vec<usize> = (0..scheduler.nodes.len()).collect();
        open_order.sort_by_key(|&id| (scheduler.nodes[id].depth, scheduler.nodes[id].decl_order));

        let mut opened: Vec<usize> = Vec::with_capacity(open_order.len());
        for &id in &open_order {
            if let Err(e) = scheduler.open_node(id) {
                tracing::error!(
                    "[{}] Failed to open node '{}': {}",
                    self.name,
                    scheduler.nodes[id].alias,
                    e
                );
                self.abort_startup(&scheduler, &opened, &open_order, e.duplicate());
                self.scheduler = Some(scheduler);
                return Err(e);
            }
            opened.push(id);
        }

        for input in &topology.graph_inputs {
            let mut port = OutputPort::new(input.name.clone());
            port.channels = input
                .channels
                .iter()
                .map(|&c| Arc::clone(&scheduler.channels[c]))
                .collect();
            self.graph_inputs.insert(input.name.clone(), port);
        }

        self.scheduler = Some(Arc::clone(&scheduler));

        for (plan, queue) in topology.executors.iter().zip(&queues_for_spawn) {
            let workers = plan.workers.unwrap_or(core_count).max(1);
            match ExecutorPool::spawn(&plan.name, workers, Arc::clone(queue), Arc::clone(&scheduler))
            {
                Ok(pool) => self.pools.push(pool),
                Err(e) => {
                    // No (or not all) workers exist yet, so finalize inline
                    // rather than through queues nobody will drain.
                    self.abort_startup(&scheduler, &opened, &open_order, e.duplicate());
                    for pool in &mut self.pools {
                        pool.shutdown();
                    }
                    return Err(e);
                }
            }
        }

        scheduler.set_state(RuntimeState::Running);
        scheduler.kick_sources();
        // Readiness is driven entirely by stream events from here on.

        tracing::info!("[{}] Running", self.name);
        Ok(())
    }

    fn abort_startup(
        &self,
        scheduler: &Arc<Scheduler>,
        opened: &[usize],
        all: &[usize],
        error: FlowError,
    ) {
        scheduler.begin_inline_teardown(error);
        for &id in opened.iter().rev() {
            scheduler.close_node_inline(id);
        }
        for &id in all {
            if !opened.contains(&id) {
                scheduler.close_node_inline(id);
            }
        }
    }

    /// Feed a packet into a graph input stream. Blocks while the downstream
    /// queues are full (backpressure). A non-monotonic timestamp is fatal
    /// to the run and returned to the caller.
    pub fn send(&self, input_stream: &str, packet: Packet) -> Result<()> {
        let scheduler = self.require_scheduler()?;
        if !scheduler.state().accepts_input() {
            return Err(FlowError::Runtime(format!(
                "[{}] Cannot send on '{}' in state {:?}",
                self.name,
                input_stream,
                scheduler.state()
            )));
        }
        let port = self.graph_inputs.get(input_stream).ok_or_else(|| {
            FlowError::NotFound(format!("Graph has no input stream '{}'", input_stream))
        })?;
        scheduler.push_port(port, packet).inspect_err(|e| {
            scheduler.record_error(e.duplicate());
        })
    }

    /// Assert that nothing earlier than `new_bound` will be sent on an
    /// input stream, accelerating downstream settlement.
    pub fn advance_input_bound(&self, input_stream: &str, new_bound: Timestamp) -> Result<()> {
        let scheduler = self.require_scheduler()?;
        let port = self.graph_inputs.get(input_stream).ok_or_else(|| {
            FlowError::NotFound(format!("Graph has no input stream '{}'", input_stream))
        })?;
        scheduler.advance_port_bound(port, new_bound).inspect_err(|e| {
            scheduler.record_error(e.duplicate());
        })
    }

    /// Close every graph input stream: no further external packets.
    pub fn close_inputs(&self) -> Result<()> {
        let scheduler = self.require_scheduler()?;
        for port in self.graph_inputs.values() {
            scheduler.close_port(port);
        }
        Ok(())
    }

    /// Block until no work is queued or running. With live sources this
    /// returns only once they stop or the run drains.
    pub fn wait_until_idle(&self) -> Result<()> {
        self.require_scheduler()?.wait_until_idle();
        Ok(())
    }

    /// Block until the run reaches a terminal state; returns its result.
    pub fn wait_until_done(&self) -> Result<()> {
        self.require_scheduler()?.wait_until_done()
    }

    /// Cooperative shutdown: close inputs, drain, finalize, join workers.
    /// Idempotent; returns the run's first error, if any.
    pub fn close(&mut self) -> Result<()> {
        let Some(scheduler) = self.scheduler.clone() else {
            // Loaded but never started; nothing to tear down.
            self.staged = None;
            return Ok(());
        };

        if !scheduler.state().is_terminal() {
            tracing::info!("[{}] Closing", self.name);
            for port in self.graph_inputs.values() {
                scheduler.close_port(port);
            }
            scheduler.drain();
        }

        let result = scheduler.wait_until_done();
        for pool in &mut self.pools {
            pool.shutdown();
        }
        result
    }

    pub fn state(&self) -> RuntimeState {
        match &self.scheduler {
            Some(s) => s.state(),
            None => RuntimeState::Stopped,
        }
    }

    pub fn stats(&self) -> RuntimeStats {
        match &self.scheduler {
            Some(s) => s.runtime_stats(),
            None => RuntimeStats::default(),
        }
    }

    /// The run's first fatal error, if one has been recorded.
    pub fn error(&self) -> Option<FlowError> {
        self.scheduler.as_ref().and_then(|s| s.first_error())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn require_scheduler(&self) -> Result<&Arc<Scheduler>> {
        self.scheduler.as_ref().ok_or_else(|| {
            FlowError::Runtime(format!("[{}] Runtime has not been started", self.name))
        })
    }
}

impl Drop for FlowRuntime {
    fn drop(&mut self) {
        if let Some(scheduler) = &self.scheduler {
            if !scheduler.state().is_terminal() {
                tracing::warn!(
                    "[{}] Dropped without close(); draining now. Call close() \
                     to observe the run's result.",
                    self.name
                );
            }
        }
        let _ = self.close();
    }
}
