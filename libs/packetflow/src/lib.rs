// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! packetflow — a dataflow graph scheduler with per-stream timestamp
//! synchronization.
//!
//! Graphs are built from [`Node`]s connected by typed, timestamped streams.
//! The engine decides when each node runs: an input policy computes, per
//! node, the next timestamp at which its inputs are jointly determined
//! ("settled"), a priority queue orders the resulting work items by
//! topological depth (draining beats admitting), and fixed pools of worker
//! threads execute them — distinct nodes in parallel, each node serialized
//! with itself. Bounded stream buffers propagate backpressure; lossy
//! behavior exists only where a graph explicitly places a
//! [`nodes::FlowLimiterNode`].
//!
//! ```no_run
//! use packetflow::{global_registry, FlowRuntime, GraphConfig, Packet, Timestamp};
//!
//! # fn main() -> packetflow::Result<()> {
//! let config = GraphConfig::from_json_str(r#"{
//!     "nodes": [ { "alias": "pass", "type": "PassThrough" } ],
//!     "input_streams": [ { "name": "in", "to": ["pass.IN:0"] } ],
//!     "output_streams": [ { "name": "out", "from": "pass.OUT:0" } ]
//! }"#)?;
//!
//! let registry = global_registry();
//! let mut runtime = FlowRuntime::load(&registry.lock(), config)?;
//! runtime.observe_output("out", Box::new(|packet| {
//!     tracing::info!("got {:?}", packet);
//!     Ok(())
//! }))?;
//!
//! runtime.start(Default::default())?;
//! runtime.send("in", Packet::new(1u32, Timestamp::new(0)))?;
//! runtime.close_inputs()?;
//! runtime.close()?;
//! # Ok(())
//! # }
//! ```

// Re-exports for macro-generated code
pub use inventory;
pub use serde_json;

pub mod channel;
pub mod config;
pub mod error;
pub mod node;
pub mod nodes;
pub mod packet;
pub mod runtime;
pub mod timestamp;

mod executor;
mod scheduler;
mod topology;

pub use channel::{
    ChannelSnapshot, DefaultPolicy, ImmediatePolicy, InputPolicy, InputSet, Settlement,
    SyncSetPolicy,
};
pub use config::{
    ConnectionConfig, ExecutorConfig, GraphConfig, GraphInputConfig, GraphOutputConfig,
    NodeConfig, SidePacketConfig,
};
pub use error::{FlowError, Result};
pub use node::{
    global_registry, FromOptions, Node, NodeContext, NodeContract, NodeFactory, NodeKind,
    NodeRegistry, PolicySpec, PortDataType, PortDecl, ProcessOutcome, RegisteredNodeType,
};
pub use packet::Packet;
pub use runtime::{
    ErrorListener, FlowRuntime, ObserverCallback, RuntimeState, RuntimeStats, SidePackets,
};
pub use timestamp::Timestamp;
