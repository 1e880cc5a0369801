// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Subgraph expansion: textual substitution of registered subgraph configs
//! into the parent graph's namespace.
//!
//! A node whose type resolves to [`NodeKind::Subgraph`] is replaced by the
//! subgraph's nodes, with every internal alias prefixed `"outer/inner"` so
//! internal streams cannot collide with the parent's. The subgraph's
//! declared `input_streams` / `output_streams` are its port surface: parent
//! connections to `"outer.NAME"` are rewired to the prefixed internal
//! endpoints. Side packet names stay global across the expansion.

use std::collections::HashMap;

use super::{parse_port_ref, ConnectionConfig, GraphConfig, SidePacketConfig};
use crate::error::{FlowError, Result};
use crate::node::{NodeKind, NodeRegistry};

/// Nested subgraphs expand recursively; past this depth we assume a
/// self-referential subgraph definition.
const MAX_EXPANSION_DEPTH: usize = 32;

pub(crate) fn expand_subgraphs(config: GraphConfig, registry: &NodeRegistry) -> Result<GraphConfig> {
    let mut config = config;
    for _ in 0..MAX_EXPANSION_DEPTH {
        let has_subgraph = config.nodes.iter().any(|n| {
            matches!(registry.get(&n.node_type), Some(NodeKind::Subgraph(_)))
        });
        if !has_subgraph {
            return Ok(config);
        }
        config = expand_once(config, registry)?;
    }
    Err(FlowError::Configuration(format!(
        "Subgraph expansion did not converge after {} rounds (self-referential subgraph?)",
        MAX_EXPANSION_DEPTH
    )))
}

fn expand_once(config: GraphConfig, registry: &NodeRegistry) -> Result<GraphConfig> {
    let mut out = GraphConfig {
        name: config.name.clone(),
        nodes: Vec::new(),
        connections: Vec::new(),
        input_streams: Vec::new(),
        output_streams: Vec::new(),
        side_packets: Vec::new(),
        executors: config.executors.clone(),
        max_queue_size: config.max_queue_size,
    };

    // alias -> expanded subgraph (prefixed), for endpoint rewiring below.
    let mut expanded: HashMap<String, GraphConfig> = HashMap::new();

    for node in &config.nodes {
        match registry.get(&node.node_type) {
            Some(NodeKind::Subgraph(sub)) => {
                if !sub.executors.is_empty() {
                    return Err(FlowError::Configuration(format!(
                        "Subgraph '{}' defines executors; executors may only be defined at the root graph",
                        node.node_type
                    )));
                }
                let prefixed = prefix_subgraph(sub, &node.alias)?;
                out.nodes.extend(prefixed.nodes.iter().cloned());
                out.connections.extend(prefixed.connections.iter().cloned());
                out.side_packets.extend(prefixed.side_packets.iter().cloned());
                expanded.insert(node.alias.clone(), prefixed);
            }
            Some(NodeKind::Node(_)) => out.nodes.push(node.clone()),
            // Unknown types surface as Configuration errors later, during
            // instantiation, with better context than we have here.
            None => out.nodes.push(node.clone()),
        }
    }

    // Rewire a consumer-side endpoint that targets an expanded subgraph.
    let rewire_to = |endpoint: &str| -> Result<Vec<String>> {
        let port = parse_port_ref(endpoint)?;
        let Some(sub) = expanded.get(port.alias) else {
            return Ok(vec![endpoint.to_string()]);
        };
        let input = sub
            .input_streams
            .iter()
            .find(|i| i.name == port.selector)
            .ok_or_else(|| {
                FlowError::Configuration(format!(
                    "Subgraph '{}' has no input stream '{}'",
                    port.alias, port.selector
                ))
            })?;
        Ok(input.to.clone())
    };

    // Rewire a producer-side endpoint that sources from an expanded subgraph.
    let rewire_from = |endpoint: &str| -> Result<String> {
        let port = parse_port_ref(endpoint)?;
        let Some(sub) = expanded.get(port.alias) else {
            return Ok(endpoint.to_string());
        };
        let output = sub
            .output_streams
            .iter()
            .find(|o| o.name == port.selector)
            .ok_or_else(|| {
                FlowError::Configuration(format!(
                    "Subgraph '{}' has no output stream '{}'",
                    port.alias, port.selector
                ))
            })?;
        Ok(output.from.clone())
    };

    for connection in &config.connections {
        let from = rewire_from(&connection.from)?;
        for to in rewire_to(&connection.to)? {
            out.connections.push(ConnectionConfig {
                from: from.clone(),
                to,
                back_edge: connection.back_edge,
                max_queue_size: connection.max_queue_size,
            });
        }
    }

    for input in &config.input_streams {
        let mut to = Vec::new();
        for endpoint in &input.to {
            to.extend(rewire_to(endpoint)?);
        }
        out.input_streams.push(super::GraphInputConfig {
            name: input.name.clone(),
            to,
        });
    }

    for output in &config.output_streams {
        out.output_streams.push(super::GraphOutputConfig {
            name: output.name.clone(),
            from: rewire_from(&output.from)?,
        });
    }

    for side in &config.side_packets {
        let rewired = SidePacketConfig {
            name: side.name.clone(),
            to: match &side.to {
                Some(to) => {
                    let port = parse_port_ref(to)?;
                    if expanded.contains_key(port.alias) {
                        return Err(FlowError::Configuration(format!(
                            "Side packet '{}' targets subgraph '{}' directly; bind it to the inner node instead (side packet names are global)",
                            side.name, port.alias
                        )));
                    }
                    Some(to.clone())
                }
                None => None,
            },
            from: side.from.clone(),
        };
        out.side_packets.push(rewired);
    }

    Ok(out)
}

/// Prefix every alias in a subgraph config with `"outer/"`.
fn prefix_subgraph(sub: &GraphConfig, outer: &str) -> Result<GraphConfig> {
    let prefix_ref = |reference: &str| -> Result<String> {
        let port = parse_port_ref(reference)?;
        Ok(format!("{}/{}.{}", outer, port.alias, port.selector))
    };

    let mut prefixed = sub.clone();
    for node in &mut prefixed.nodes {
        node.alias = format!("{}/{}", outer, node.alias);
    }
    for connection in &mut prefixed.connections {
        connection.from = prefix_ref(&connection.from)?;
        connection.to = prefix_ref(&connection.to)?;
    }
    for input in &mut prefixed.input_streams {
        input.to = input
            .to
            .iter()
            .map(|e| prefix_ref(e))
            .collect::<Result<Vec<_>>>()?;
    }
    for output in &mut prefixed.output_streams {
        output.from = prefix_ref(&output.from)?;
    }
    for side in &mut prefixed.side_packets {
        if let Some(to) = &side.to {
            side.to = Some(prefix_ref(to)?);
        }
        if let Some(from) = &side.from {
            side.from = Some(prefix_ref(from)?);
        }
    }
    Ok(prefixed)
}
