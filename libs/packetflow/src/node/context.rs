// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! The API surface a node sees while the engine drives it.

use super::LifecyclePhase;
use crate::channel::InputSet;
use crate::error::{FlowError, Result};
use crate::packet::Packet;
use crate::scheduler::{NodeCell, Scheduler};
use crate::timestamp::Timestamp;

/// Handle passed into a node's `open` / `process` / `close` phases.
///
/// Emitting goes straight through the synchronization layer: an `emit` may
/// block while a downstream queue is full (backpressure), and a
/// non-monotonic timestamp fails with `OrderingViolation`, which is fatal
/// to the run.
pub struct NodeContext<'a> {
    scheduler: &'a Scheduler,
    cell: &'a NodeCell,
    phase: LifecyclePhase,
    input: InputSet,
}

impl<'a> NodeContext<'a> {
    pub(crate) fn new(
        scheduler: &'a Scheduler,
        cell: &'a NodeCell,
        phase: LifecyclePhase,
        input: InputSet,
    ) -> Self {
        NodeContext {
            scheduler,
            cell,
            phase,
            input,
        }
    }

    /// This node's alias in the graph, for logging.
    pub fn alias(&self) -> &str {
        &self.cell.alias
    }

    /// The current input set. Empty (at [`Timestamp::UNSET`]) during
    /// `open`/`close` and for source nodes.
    pub fn inputs(&self) -> &InputSet {
        &self.input
    }

    /// Timestamp of the current input set.
    pub fn timestamp(&self) -> Timestamp {
        self.input.timestamp()
    }

    /// A bound side packet, by side-input selector.
    pub fn side(&self, selector: &str) -> Option<Packet> {
        let binding = self
            .cell
            .side_inputs
            .iter()
            .find(|s| s.selector == selector)?;
        self.scheduler
            .side_packets
            .lock()
            .get(&binding.global_name)
            .cloned()
    }

    /// Emit a packet on an output port. Legal during `process` and `close`.
    pub fn emit(&mut self, selector: &str, packet: Packet) -> Result<()> {
        if self.phase == LifecyclePhase::Open {
            return Err(FlowError::Port(format!(
                "[{}] Cannot emit on '{}' during open; emit side packets instead",
                self.cell.alias, selector
            )));
        }
        let port = self.output(selector)?;
        self.scheduler.push_port(port, packet)
    }

    /// Emit `value` on an output port at `timestamp`.
    pub fn emit_value<T: std::any::Any + Send + Sync>(
        &mut self,
        selector: &str,
        value: T,
        timestamp: Timestamp,
    ) -> Result<()> {
        self.emit(selector, Packet::new(value, timestamp))
    }

    /// Promise that nothing earlier than `new_bound` will ever be emitted
    /// on the port, accelerating downstream settlement.
    pub fn advance_bound(&mut self, selector: &str, new_bound: Timestamp) -> Result<()> {
        let port = self.output(selector)?;
        self.scheduler.advance_port_bound(port, new_bound)
    }

    /// Emit an output side packet. Legal only during `open`; downstream
    /// nodes see it in their own `open`, which runs after this one.
    pub fn emit_side(&mut self, selector: &str, packet: Packet) -> Result<()> {
        if self.phase != LifecyclePhase::Open {
            return Err(FlowError::Port(format!(
                "[{}] Side packets can only be emitted during open",
                self.cell.alias
            )));
        }
        let binding = self
            .cell
            .side_outputs
            .iter()
            .find(|s| s.selector == selector)
            .ok_or_else(|| {
                FlowError::Port(format!(
                    "[{}] No side output '{}' is bound in this graph",
                    self.cell.alias, selector
                ))
            })?;
        let mut side_packets = self.scheduler.side_packets.lock();
        if side_packets.contains_key(&binding.global_name) {
            return Err(FlowError::Port(format!(
                "[{}] Side packet '{}' is already set",
                self.cell.alias, binding.global_name
            )));
        }
        side_packets.insert(binding.global_name.clone(), packet);
        Ok(())
    }

    fn output(&self, selector: &str) -> Result<&'a crate::channel::OutputPort> {
        let cell: &'a NodeCell = self.cell;
        cell.outputs
            .iter()
            .find(|p| p.selector == selector)
            .ok_or_else(|| {
                FlowError::Port(format!("[{}] No output port '{}'", cell.alias, selector))
            })
    }
}
