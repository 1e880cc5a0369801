// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! The node abstraction: contract declaration, lifecycle, and registry.
//!
//! A node is a unit of computation with declared input/output ports. The
//! engine constructs nodes fresh for each run via registered factories,
//! drives them through open → process* → close, and guarantees that no node
//! instance executes its processing phase concurrently with itself.

mod context;
mod contract;
mod registry;

pub use context::NodeContext;
pub use contract::{NodeContract, PolicySpec, PortDataType, PortDecl};
pub use registry::{
    global_registry, FromOptions, NodeFactory, NodeKind, NodeRegistry, RegisteredNodeType,
};

use crate::error::Result;

/// Outcome of a node's processing phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Keep scheduling the node as input settles (or, for sources, as
    /// output capacity allows).
    Continue,
    /// Voluntary termination. Legal only for source nodes; the node is
    /// closed without failing the run, and downstream nodes whose inputs
    /// become permanently empty close in cascade.
    Stop,
}

/// A processing unit in the graph.
///
/// Implementations declare their port surface via [`Node::contract`] and are
/// instantiated by a factory registered in a [`NodeRegistry`]. The default
/// `open`/`close` do nothing; `process` is invoked once per settled input
/// set (continuously, for sources).
pub trait Node: Send {
    fn contract(&self) -> NodeContract;

    /// Per-run initialization. Runs before any packet is delivered; this is
    /// the only phase in which output side packets may be emitted.
    fn open(&mut self, _ctx: &mut NodeContext<'_>) -> Result<()> {
        Ok(())
    }

    /// Handle one input set (or, for a source, produce output).
    fn process(&mut self, ctx: &mut NodeContext<'_>) -> Result<ProcessOutcome>;

    /// Per-run finalization. Invoked exactly once if `open` succeeded, even
    /// when the run aborts. Emitting on output ports is still allowed here.
    fn close(&mut self, _ctx: &mut NodeContext<'_>) -> Result<()> {
        Ok(())
    }
}

/// Which lifecycle phase a [`NodeContext`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LifecyclePhase {
    Open,
    Process,
    Close,
}
