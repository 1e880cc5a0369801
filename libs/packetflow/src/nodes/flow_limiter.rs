// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! The flow-limiter pattern: bound in-flight work at a graph's ingress.
//!
//! Dropping is confined to this one explicit, graph-author-controlled node;
//! the scheduler itself never drops. The limiter takes the raw input plus a
//! `FINISHED` feedback edge from a point later in the graph (marked
//! `back_edge` in the config) and refuses new packets while the number of
//! not-yet-finished timestamps is at the limit. This is how a real-time,
//! lossy ingress coexists with the deterministic core.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::node::{
    FromOptions, Node, NodeContext, NodeContract, PolicySpec, PortDecl, ProcessOutcome,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowLimiterOptions {
    /// Admitted-but-unfinished timestamps allowed at once.
    pub max_in_flight: usize,
}

impl Default for FlowLimiterOptions {
    fn default() -> Self {
        Self { max_in_flight: 1 }
    }
}

/// Admission gate driven by downstream feedback.
///
/// Ports: `IN` (raw input), `FINISHED` (feedback, wire with
/// `back_edge: true`), `OUT`. Uses the immediate input policy: the
/// `FINISHED` signal must act on arrival, not wait to synchronize with the
/// stream it is throttling.
pub struct FlowLimiterNode {
    options: FlowLimiterOptions,
    in_flight: usize,
    dropped: u64,
}

impl FromOptions for FlowLimiterNode {
    type Options = FlowLimiterOptions;

    fn from_options(options: Self::Options) -> Result<Self> {
        Ok(FlowLimiterNode {
            options,
            in_flight: 0,
            dropped: 0,
        })
    }
}

impl Node for FlowLimiterNode {
    fn contract(&self) -> NodeContract {
        NodeContract::new()
            .input(PortDecl::new("IN"))
            .input(PortDecl::new("FINISHED"))
            .output(PortDecl::new("OUT"))
            .with_input_policy(PolicySpec::Immediate)
    }

    fn process(&mut self, ctx: &mut NodeContext<'_>) -> Result<ProcessOutcome> {
        // Immediate policy: exactly one of the two ports fires per call.
        if let Some(packet) = ctx.inputs().tag("IN").cloned() {
            if self.in_flight < self.options.max_in_flight {
                self.in_flight += 1;
                ctx.emit("OUT", packet)?;
            } else {
                self.dropped += 1;
                tracing::debug!(
                    "[{}] Dropped packet at {} ({} in flight)",
                    ctx.alias(),
                    packet.timestamp(),
                    self.in_flight
                );
            }
        }

        if ctx.inputs().tag("FINISHED").is_some() {
            self.in_flight = self.in_flight.saturating_sub(1);
        }

        Ok(ProcessOutcome::Continue)
    }

    fn close(&mut self, ctx: &mut NodeContext<'_>) -> Result<()> {
        if self.dropped > 0 {
            tracing::info!("[{}] Dropped {} packets in total", ctx.alias(), self.dropped);
        }
        Ok(())
    }
}
