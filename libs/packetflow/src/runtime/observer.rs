// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Internal observer nodes backing `FlowRuntime::observe_output`.
//!
//! An observed output stream gets a hidden sink node with the default input
//! policy, so callbacks see packets in strictly ascending timestamp order,
//! delivered synchronously on whichever executor thread produced the
//! packet. Heavy consumers must hand work off; a slow callback backpressures
//! the producing node exactly like any slow downstream node would.

use crate::error::{FlowError, Result};
use crate::node::{Node, NodeContext, NodeContract, PortDecl, ProcessOutcome};
use crate::packet::Packet;

pub type ObserverCallback = Box<dyn Fn(&Packet) -> Result<()> + Send + Sync>;

pub(crate) struct ObserverNode {
    stream: String,
    callback: ObserverCallback,
}

impl ObserverNode {
    pub fn new(stream: String, callback: ObserverCallback) -> Self {
        ObserverNode { stream, callback }
    }
}

impl Node for ObserverNode {
    fn contract(&self) -> NodeContract {
        NodeContract::new().input(PortDecl::new("IN"))
    }

    fn process(&mut self, ctx: &mut NodeContext<'_>) -> Result<ProcessOutcome> {
        if let Some(packet) = ctx.inputs().get(0) {
            (self.callback)(packet).map_err(|e| {
                FlowError::Processing {
                    node: format!("observer:{}", self.stream),
                    message: format!("Output observer failed: {}", e),
                }
            })?;
        }
        Ok(ProcessOutcome::Continue)
    }
}
