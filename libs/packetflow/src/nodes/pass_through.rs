// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::node::{
    FromOptions, Node, NodeContext, NodeContract, PortDecl, ProcessOutcome,
};
use crate::packet::Packet;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PassThroughOptions {
    /// Number of `IN:i` / `OUT:i` port pairs.
    pub ports: usize,
    /// Add a `TICK` input that participates in synchronization but is never
    /// forwarded. A tick firing with no fresh data re-emits the cached
    /// value of each port, re-stamped at the tick's timestamp.
    pub tick: bool,
}

impl Default for PassThroughOptions {
    fn default() -> Self {
        Self {
            ports: 1,
            tick: false,
        }
    }
}

/// Forwards each input set unchanged, caching the latest packet per port.
///
/// When a timestamp settles with some ports empty (their bounds have passed
/// it without a packet), the cached value is re-emitted at the settled
/// timestamp, so downstream always sees a full set per firing.
pub struct PassThroughNode {
    options: PassThroughOptions,
    cache: Vec<Option<Packet>>,
}

impl FromOptions for PassThroughNode {
    type Options = PassThroughOptions;

    fn from_options(options: Self::Options) -> Result<Self> {
        let cache = vec![None; options.ports];
        Ok(PassThroughNode { options, cache })
    }
}

impl Node for PassThroughNode {
    fn contract(&self) -> NodeContract {
        let mut contract = NodeContract::new();
        for i in 0..self.options.ports {
            contract = contract
                .input(PortDecl::new("IN").with_index(i as u32))
                .output(PortDecl::new("OUT").with_index(i as u32));
        }
        if self.options.tick {
            contract = contract.input(PortDecl::new("TICK"));
        }
        contract
    }

    fn process(&mut self, ctx: &mut NodeContext<'_>) -> Result<ProcessOutcome> {
        let ts = ctx.timestamp();

        let fresh: Vec<Option<Packet>> = (0..self.options.ports)
            .map(|i| ctx.inputs().get(i).cloned())
            .collect();

        for (i, packet) in fresh.into_iter().enumerate() {
            let out = format!("OUT:{}", i);
            match packet {
                Some(packet) => {
                    self.cache[i] = Some(packet.clone());
                    ctx.emit(&out, packet)?;
                }
                None => {
                    if let Some(cached) = self.cache[i].clone() {
                        ctx.emit(&out, cached.at(ts))?;
                    }
                }
            }
        }
        Ok(ProcessOutcome::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let options = PassThroughOptions::default();
        assert_eq!(options.ports, 1);
        assert!(!options.tick);
    }

    #[test]
    fn test_contract_matches_ports() {
        let node = PassThroughNode::from_options(PassThroughOptions {
            ports: 2,
            tick: true,
        })
        .unwrap();
        let contract = node.contract();
        assert_eq!(contract.inputs.len(), 3);
        assert_eq!(contract.outputs.len(), 2);
        assert!(contract.find_input("TICK").is_some());
        assert!(contract.find_input("IN:1").is_some());
        assert!(contract.find_output("OUT:1").is_some());
        contract.validate("pass").unwrap();
    }

    #[test]
    fn test_options_from_json() {
        let options: PassThroughOptions =
            serde_json::from_str(r#"{ "ports": 3 }"#).unwrap();
        assert_eq!(options.ports, 3);
        assert!(!options.tick);
    }
}
