// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Topology resolution: from a validated [`GraphConfig`] plus per-node
//! contracts to a fully bound execution plan.
//!
//! Resolution checks everything the config alone cannot: port existence,
//! required-port coverage, declared payload type agreement across each
//! connection, input-policy group membership, and forward-edge acyclicity.
//! It also assigns the topological depth used as the scheduling priority
//! hint — depth is distance from the graph's sources/ingress, and deeper
//! nodes (closer to outputs) are dispatched first so in-flight data drains
//! before new data is admitted.

use std::collections::HashMap;

use petgraph::graph::{DiGraph, NodeIndex};

use crate::channel::ChannelId;
use crate::config::{parse_port_ref, ExecutorConfig, GraphConfig};
use crate::error::{FlowError, Result};
use crate::node::{NodeContract, PolicySpec};

pub(crate) type NodeId = usize;

#[derive(Debug, Clone)]
pub(crate) struct PlannedInput {
    pub selector: String,
    pub channel: ChannelId,
}

#[derive(Debug, Clone)]
pub(crate) struct PlannedOutput {
    pub selector: String,
    pub channels: Vec<ChannelId>,
}

#[derive(Debug, Clone)]
pub(crate) struct PlannedSide {
    pub selector: String,
    pub global_name: String,
    pub required: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct PlannedNode {
    pub alias: String,
    pub executor: usize,
    pub policy: PolicySpec,
    /// Index-resolved sync groups when `policy` is `SyncSets`.
    pub sync_groups: Option<Vec<Vec<usize>>>,
    /// Connected inputs, in contract declaration order.
    pub inputs: Vec<PlannedInput>,
    /// All declared outputs, in contract declaration order; unconnected
    /// outputs carry no channels.
    pub outputs: Vec<PlannedOutput>,
    pub side_inputs: Vec<PlannedSide>,
    pub side_outputs: Vec<PlannedSide>,
    pub depth: u32,
    pub decl_order: u32,
    pub is_source: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ChannelProducer {
    Node(NodeId),
    GraphInput(usize),
}

#[derive(Debug, Clone)]
pub(crate) struct PlannedChannel {
    pub name: String,
    pub producer: ChannelProducer,
    pub consumer: NodeId,
    pub max_queue_size: usize,
    pub back_edge: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct PlannedGraphInput {
    pub name: String,
    pub channels: Vec<ChannelId>,
}

#[derive(Debug, Clone)]
pub(crate) struct PlannedExecutor {
    pub name: String,
    pub workers: Option<usize>,
}

#[derive(Debug)]
pub(crate) struct Topology {
    pub name: Option<String>,
    pub nodes: Vec<PlannedNode>,
    pub channels: Vec<PlannedChannel>,
    pub graph_inputs: Vec<PlannedGraphInput>,
    /// (name, producer node, output port index).
    pub graph_outputs: Vec<(String, NodeId, usize)>,
    pub executors: Vec<PlannedExecutor>,
    pub default_max_queue_size: usize,
}

/// One input binding collected while walking connections, before channels
/// are materialized.
struct InputBinding {
    producer: ChannelProducer,
    producer_label: String,
    back_edge: bool,
    max_queue_size: Option<usize>,
}

impl Topology {
    /// Resolve a subgraph-expanded, syntactically valid config against the
    /// contracts of the instantiated nodes (index-aligned with
    /// `config.nodes`).
    pub fn resolve(config: &GraphConfig, contracts: &[NodeContract]) -> Result<Topology> {
        debug_assert_eq!(config.nodes.len(), contracts.len());

        for (node, contract) in config.nodes.iter().zip(contracts) {
            contract.validate(&node.alias)?;
        }

        let alias_to_id: HashMap<&str, NodeId> = config
            .nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.alias.as_str(), i))
            .collect();

        // bindings[node][input decl index] -> producer
        let mut bindings: Vec<Vec<Option<InputBinding>>> = contracts
            .iter()
            .map(|c| c.inputs.iter().map(|_| None).collect())
            .collect();

        let resolve_consumer = |endpoint: &str| -> Result<(NodeId, usize)> {
            let port = parse_port_ref(endpoint)?;
            let &node = alias_to_id.get(port.alias).ok_or_else(|| {
                FlowError::Configuration(format!("Unknown node alias '{}'", port.alias))
            })?;
            let (decl_idx, _) = contracts[node].find_input(port.selector).ok_or_else(|| {
                FlowError::Configuration(format!(
                    "Node '{}' ({}) has no input port '{}'",
                    port.alias, config.nodes[node].node_type, port.selector
                ))
            })?;
            Ok((node, decl_idx))
        };

        for connection in &config.connections {
            let from = parse_port_ref(&connection.from)?;
            let &producer = alias_to_id.get(from.alias).ok_or_else(|| {
                FlowError::Configuration(format!("Unknown node alias '{}'", from.alias))
            })?;
            let (_, out_decl) =
                contracts[producer].find_output(from.selector).ok_or_else(|| {
                    FlowError::Configuration(format!(
                        "Node '{}' ({}) has no output port '{}'",
                        from.alias, config.nodes[producer].node_type, from.selector
                    ))
                })?;

            let (consumer, in_decl_idx) = resolve_consumer(&connection.to)?;
            let in_decl = &contracts[consumer].inputs[in_decl_idx];

            if let (Some(a), Some(b)) = (out_decl.data, in_decl.data) {
                if a != b {
                    return Err(FlowError::Configuration(format!(
                        "Type mismatch on '{}' -> '{}': '{}' vs '{}'",
                        connection.from,
                        connection.to,
                        a.type_name(),
                        b.type_name()
                    )));
                }
            }

            let slot = &mut bindings[consumer][in_decl_idx];
            if slot.is_some() {
                return Err(FlowError::Configuration(format!(
                    "Input '{}' is bound to more than one producer",
                    connection.to
                )));
            }
            *slot = Some(InputBinding {
                producer: ChannelProducer::Node(producer),
                producer_label: connection.from.clone(),
                back_edge: connection.back_edge,
                max_queue_size: connection.max_queue_size,
            });
        }

        for (input_idx, input) in config.input_streams.iter().enumerate() {
            for endpoint in &input.to {
                let (consumer, in_decl_idx) = resolve_consumer(endpoint)?;
                let slot = &mut bindings[consumer][in_decl_idx];
                if slot.is_some() {
                    return Err(FlowError::Configuration(format!(
                        "Input '{}' is bound to more than one producer",
                        endpoint
                    )));
                }
                *slot = Some(InputBinding {
                    producer: ChannelProducer::GraphInput(input_idx),
                    producer_label: input.name.clone(),
                    back_edge: false,
                    max_queue_size: None,
                });
            }
        }

        // Required inputs must be fed; optional unconnected inputs simply
        // do not materialize a channel.
        for (node_id, contract) in contracts.iter().enumerate() {
            for (decl_idx, decl) in contract.inputs.iter().enumerate() {
                if decl.required && bindings[node_id][decl_idx].is_none() {
                    return Err(FlowError::Configuration(format!(
                        "Required input '{}.{}' is not connected",
                        config.nodes[node_id].alias,
                        decl.selector()
                    )));
                }
            }
        }

        // Materialize channels in (consumer, decl) order.
        let mut channels: Vec<PlannedChannel> = Vec::new();
        let mut planned_inputs: Vec<Vec<PlannedInput>> = vec![Vec::new(); config.nodes.len()];
        let mut graph_inputs: Vec<PlannedGraphInput> = config
            .input_streams
            .iter()
            .map(|i| PlannedGraphInput {
                name: i.name.clone(),
                channels: Vec::new(),
            })
            .collect();
        // producer node -> output selector label -> channel ids
        let mut producer_channels: HashMap<(NodeId, String), Vec<ChannelId>> = HashMap::new();

        for (consumer, contract) in contracts.iter().enumerate() {
            for (decl_idx, decl) in contract.inputs.iter().enumerate() {
                let Some(binding) = &bindings[consumer][decl_idx] else {
                    continue;
                };
                let id = channels.len();
                let name = format!(
                    "{} -> {}.{}",
                    binding.producer_label,
                    config.nodes[consumer].alias,
                    decl.selector()
                );
                channels.push(PlannedChannel {
                    name,
                    producer: binding.producer,
                    consumer,
                    max_queue_size: binding.max_queue_size.unwrap_or(config.max_queue_size),
                    back_edge: binding.back_edge,
                });
                planned_inputs[consumer].push(PlannedInput {
                    selector: decl.selector(),
                    channel: id,
                });
                match binding.producer {
                    ChannelProducer::Node(producer) => {
                        producer_channels
                            .entry((producer, binding.producer_label.clone()))
                            .or_default()
                            .push(id);
                    }
                    ChannelProducer::GraphInput(input_idx) => {
                        graph_inputs[input_idx].channels.push(id);
                    }
                }
            }
        }

        // All declared outputs, wiring in the channels recorded above.
        let mut planned_outputs: Vec<Vec<PlannedOutput>> = Vec::with_capacity(config.nodes.len());
        for (node_id, contract) in contracts.iter().enumerate() {
            let alias = &config.nodes[node_id].alias;
            let outputs = contract
                .outputs
                .iter()
                .map(|decl| {
                    let label = format!("{}.{}", alias, decl.selector());
                    PlannedOutput {
                        selector: decl.selector(),
                        channels: producer_channels.remove(&(node_id, label)).unwrap_or_default(),
                    }
                })
                .collect();
            planned_outputs.push(outputs);
        }

        let mut graph_outputs = Vec::new();
        for output in &config.output_streams {
            let port = parse_port_ref(&output.from)?;
            let &node = alias_to_id.get(port.alias).ok_or_else(|| {
                FlowError::Configuration(format!("Unknown node alias '{}'", port.alias))
            })?;
            let (out_idx, _) = contracts[node].find_output(port.selector).ok_or_else(|| {
                FlowError::Configuration(format!(
                    "Node '{}' ({}) has no output port '{}'",
                    port.alias, config.nodes[node].node_type, port.selector
                ))
            })?;
            graph_outputs.push((output.name.clone(), node, out_idx));
        }

        let (side_inputs, side_outputs) = resolve_side_packets(config, contracts, &alias_to_id)?;

        let executors = plan_executors(&config.executors)?;
        let executor_index: HashMap<&str, usize> = executors
            .iter()
            .enumerate()
            .map(|(i, e)| (e.name.as_str(), i))
            .collect();

        let depths = compute_depths(config, contracts, &channels)?;

        let mut nodes = Vec::with_capacity(config.nodes.len());
        for (node_id, node) in config.nodes.iter().enumerate() {
            let contract = &contracts[node_id];
            let policy = node
                .input_policy
                .clone()
                .unwrap_or_else(|| contract.input_policy.clone());
            let sync_groups = match &policy {
                PolicySpec::SyncSets(groups) => Some(resolve_sync_groups(
                    &node.alias,
                    groups,
                    &planned_inputs[node_id],
                )?),
                _ => None,
            };
            let executor = match &node.executor {
                Some(name) => *executor_index.get(name.as_str()).ok_or_else(|| {
                    FlowError::Configuration(format!(
                        "Node '{}' references undefined executor '{}'",
                        node.alias, name
                    ))
                })?,
                None => 0,
            };
            let is_source = planned_inputs[node_id].is_empty();
            nodes.push(PlannedNode {
                alias: node.alias.clone(),
                executor,
                policy,
                sync_groups,
                inputs: std::mem::take(&mut planned_inputs[node_id]),
                outputs: std::mem::take(&mut planned_outputs[node_id]),
                side_inputs: side_inputs[node_id].clone(),
                side_outputs: side_outputs[node_id].clone(),
                depth: depths[node_id],
                decl_order: node_id as u32,
                is_source,
            });
        }

        Ok(Topology {
            name: config.name.clone(),
            nodes,
            channels,
            graph_inputs,
            graph_outputs,
            executors,
            default_max_queue_size: config.max_queue_size,
        })
    }
}

fn resolve_side_packets(
    config: &GraphConfig,
    contracts: &[NodeContract],
    alias_to_id: &HashMap<&str, NodeId>,
) -> Result<(Vec<Vec<PlannedSide>>, Vec<Vec<PlannedSide>>)> {
    let mut side_inputs: Vec<Vec<PlannedSide>> = vec![Vec::new(); config.nodes.len()];
    let mut side_outputs: Vec<Vec<PlannedSide>> = vec![Vec::new(); config.nodes.len()];

    for side in &config.side_packets {
        if let Some(to) = &side.to {
            let port = parse_port_ref(to)?;
            let &node = alias_to_id.get(port.alias).ok_or_else(|| {
                FlowError::Configuration(format!("Unknown node alias '{}'", port.alias))
            })?;
            let (_, decl) = contracts[node].find_side_input(port.selector).ok_or_else(|| {
                FlowError::Configuration(format!(
                    "Node '{}' ({}) has no side input '{}'",
                    port.alias, config.nodes[node].node_type, port.selector
                ))
            })?;
            side_inputs[node].push(PlannedSide {
                selector: decl.selector(),
                global_name: side.name.clone(),
                required: decl.required,
            });
        }
        if let Some(from) = &side.from {
            let port = parse_port_ref(from)?;
            let &node = alias_to_id.get(port.alias).ok_or_else(|| {
                FlowError::Configuration(format!("Unknown node alias '{}'", port.alias))
            })?;
            let (_, decl) = contracts[node].find_side_output(port.selector).ok_or_else(|| {
                FlowError::Configuration(format!(
                    "Node '{}' ({}) has no side output '{}'",
                    port.alias, config.nodes[node].node_type, port.selector
                ))
            })?;
            side_outputs[node].push(PlannedSide {
                selector: decl.selector(),
                global_name: side.name.clone(),
                required: decl.required,
            });
        }
    }

    // A required side input with no binding can never be satisfied.
    for (node_id, contract) in contracts.iter().enumerate() {
        for decl in &contract.side_inputs {
            let bound = side_inputs[node_id]
                .iter()
                .any(|s| s.selector == decl.selector());
            if decl.required && !bound {
                return Err(FlowError::Configuration(format!(
                    "Required side input '{}.{}' is not bound",
                    config.nodes[node_id].alias,
                    decl.selector()
                )));
            }
        }
    }

    Ok((side_inputs, side_outputs))
}

fn plan_executors(configured: &[ExecutorConfig]) -> Result<Vec<PlannedExecutor>> {
    let mut executors = vec![PlannedExecutor {
        name: "default".to_string(),
        workers: None,
    }];
    for executor in configured {
        if executor.name == "default" {
            executors[0].workers = executor.workers;
            continue;
        }
        if let Some(workers) = executor.workers {
            if workers == 0 {
                return Err(FlowError::Configuration(format!(
                    "Executor '{}' must have at least one worker",
                    executor.name
                )));
            }
        }
        executors.push(PlannedExecutor {
            name: executor.name.clone(),
            workers: executor.workers,
        });
    }
    Ok(executors)
}

fn resolve_sync_groups(
    alias: &str,
    groups: &[Vec<String>],
    inputs: &[PlannedInput],
) -> Result<Vec<Vec<usize>>> {
    let mut resolved: Vec<Vec<usize>> = Vec::new();
    let mut claimed = vec![false; inputs.len()];

    for group in groups {
        let mut indices = Vec::with_capacity(group.len());
        for selector in group {
            let idx = inputs
                .iter()
                .position(|i| &i.selector == selector)
                .ok_or_else(|| {
                    FlowError::Configuration(format!(
                        "Node '{}' sync_sets references unknown or unconnected input '{}'",
                        alias, selector
                    ))
                })?;
            if claimed[idx] {
                return Err(FlowError::Configuration(format!(
                    "Node '{}' sync_sets lists input '{}' in more than one group",
                    alias, selector
                )));
            }
            claimed[idx] = true;
            indices.push(idx);
        }
        resolved.push(indices);
    }

    // Unlisted inputs synchronize alone.
    for (idx, was_claimed) in claimed.iter().enumerate() {
        if !was_claimed {
            resolved.push(vec![idx]);
        }
    }

    Ok(resolved)
}

/// Longest-path depth from sources/ingress over forward edges. Back edges
/// are excluded both from cycle detection and from ranking, so feedback
/// loops are legal but do not inflate their upstream's priority.
fn compute_depths(
    config: &GraphConfig,
    contracts: &[NodeContract],
    channels: &[PlannedChannel],
) -> Result<Vec<u32>> {
    let mut graph: DiGraph<NodeId, ()> = DiGraph::new();
    let indices: Vec<NodeIndex> = (0..contracts.len()).map(|i| graph.add_node(i)).collect();

    for channel in channels {
        if channel.back_edge {
            continue;
        }
        if let ChannelProducer::Node(producer) = channel.producer {
            graph.add_edge(indices[producer], indices[channel.consumer], ());
        }
    }

    let order = petgraph::algo::toposort(&graph, None).map_err(|cycle| {
        let node = graph[cycle.node_id()];
        FlowError::Configuration(format!(
            "Graph has a forward-edge cycle through node '{}'; mark the feedback connection with back_edge",
            config.nodes[node].alias
        ))
    })?;

    let mut depths = vec![0u32; contracts.len()];
    for index in order {
        let node = graph[index];
        let depth = graph
            .neighbors_directed(index, petgraph::Direction::Incoming)
            .map(|pred| depths[graph[pred]] + 1)
            .max()
            .unwrap_or(0);
        depths[node] = depth;
    }
    Ok(depths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::PortDecl;

    fn node(alias: &str, node_type: &str) -> crate::config::NodeConfig {
        crate::config::NodeConfig {
            alias: alias.to_string(),
            node_type: node_type.to_string(),
            options: serde_json::Value::Null,
            executor: None,
            input_policy: None,
        }
    }

    fn conn(from: &str, to: &str) -> crate::config::ConnectionConfig {
        crate::config::ConnectionConfig {
            from: from.to_string(),
            to: to.to_string(),
            back_edge: false,
            max_queue_size: None,
        }
    }

    fn source_contract() -> NodeContract {
        NodeContract::new().output(PortDecl::new("OUT"))
    }

    fn filter_contract() -> NodeContract {
        NodeContract::new()
            .input(PortDecl::new("IN"))
            .output(PortDecl::new("OUT"))
    }

    fn sink_contract() -> NodeContract {
        NodeContract::new().input(PortDecl::new("IN"))
    }

    #[test]
    fn test_linear_chain_depths() {
        let config = GraphConfig {
            nodes: vec![node("src", "Src"), node("mid", "Mid"), node("end", "End")],
            connections: vec![conn("src.OUT", "mid.IN"), conn("mid.OUT", "end.IN")],
            ..GraphConfig::default()
        };
        let contracts = vec![source_contract(), filter_contract(), sink_contract()];
        let topology = Topology::resolve(&config, &contracts).unwrap();

        assert_eq!(topology.nodes[0].depth, 0);
        assert_eq!(topology.nodes[1].depth, 1);
        assert_eq!(topology.nodes[2].depth, 2);
        assert!(topology.nodes[0].is_source);
        assert!(!topology.nodes[1].is_source);
        assert_eq!(topology.channels.len(), 2);
        assert_eq!(topology.nodes[0].outputs[0].channels.len(), 1);
    }

    #[test]
    fn test_fan_out_shares_output() {
        let config = GraphConfig {
            nodes: vec![node("src", "Src"), node("a", "Sink"), node("b", "Sink")],
            connections: vec![conn("src.OUT", "a.IN"), conn("src.OUT", "b.IN")],
            ..GraphConfig::default()
        };
        let contracts = vec![source_contract(), sink_contract(), sink_contract()];
        let topology = Topology::resolve(&config, &contracts).unwrap();
        assert_eq!(topology.nodes[0].outputs[0].channels.len(), 2);
    }

    #[test]
    fn test_unknown_port_rejected() {
        let config = GraphConfig {
            nodes: vec![node("src", "Src"), node("end", "Sink")],
            connections: vec![conn("src.NOPE", "end.IN")],
            ..GraphConfig::default()
        };
        let contracts = vec![source_contract(), sink_contract()];
        let err = Topology::resolve(&config, &contracts).unwrap_err();
        assert!(err.to_string().contains("no output port 'NOPE'"));
    }

    #[test]
    fn test_required_input_must_be_connected() {
        let config = GraphConfig {
            nodes: vec![node("end", "Sink")],
            ..GraphConfig::default()
        };
        let contracts = vec![sink_contract()];
        let err = Topology::resolve(&config, &contracts).unwrap_err();
        assert!(err.to_string().contains("Required input 'end.IN' is not connected"));
    }

    #[test]
    fn test_optional_input_may_stay_unconnected() {
        let config = GraphConfig {
            nodes: vec![node("src", "Src"), node("end", "Sink")],
            connections: vec![conn("src.OUT", "end.IN")],
            ..GraphConfig::default()
        };
        let contracts = vec![
            source_contract(),
            NodeContract::new()
                .input(PortDecl::new("IN"))
                .input(PortDecl::new("HINT").optional()),
        ];
        let topology = Topology::resolve(&config, &contracts).unwrap();
        assert_eq!(topology.nodes[1].inputs.len(), 1);
    }

    #[test]
    fn test_type_mismatch_rejected() {
        let config = GraphConfig {
            nodes: vec![node("src", "Src"), node("end", "Sink")],
            connections: vec![conn("src.OUT", "end.IN")],
            ..GraphConfig::default()
        };
        let contracts = vec![
            NodeContract::new().output(PortDecl::new("OUT").typed::<u32>()),
            NodeContract::new().input(PortDecl::new("IN").typed::<String>()),
        ];
        let err = Topology::resolve(&config, &contracts).unwrap_err();
        assert!(err.to_string().contains("Type mismatch"));
    }

    #[test]
    fn test_forward_cycle_rejected_back_edge_allowed() {
        let mut config = GraphConfig {
            nodes: vec![node("a", "Filter"), node("b", "Filter")],
            connections: vec![conn("a.OUT", "b.IN"), conn("b.OUT", "a.IN")],
            ..GraphConfig::default()
        };
        let contracts = vec![filter_contract(), filter_contract()];
        let err = Topology::resolve(&config, &contracts).unwrap_err();
        assert!(err.to_string().contains("forward-edge cycle"));

        config.connections[1].back_edge = true;
        let topology = Topology::resolve(&config, &contracts).unwrap();
        assert_eq!(topology.nodes[0].depth, 0);
        assert_eq!(topology.nodes[1].depth, 1);
        assert!(topology.channels.iter().any(|c| c.back_edge));
    }

    #[test]
    fn test_sync_groups_resolved_and_completed() {
        let config = GraphConfig {
            nodes: vec![
                node("src", "Src"),
                {
                    let mut n = node("mux", "Mux");
                    n.input_policy = Some(PolicySpec::SyncSets(vec![vec![
                        "A".to_string(),
                        "B".to_string(),
                    ]]));
                    n
                },
            ],
            connections: vec![
                conn("src.OUT", "mux.A"),
                conn("src.OUT", "mux.B"),
                conn("src.OUT", "mux.TICK"),
            ],
            ..GraphConfig::default()
        };
        let contracts = vec![
            source_contract(),
            NodeContract::new()
                .input(PortDecl::new("A"))
                .input(PortDecl::new("B"))
                .input(PortDecl::new("TICK")),
        ];
        let topology = Topology::resolve(&config, &contracts).unwrap();
        assert_eq!(
            topology.nodes[1].sync_groups,
            Some(vec![vec![0, 1], vec![2]])
        );
    }

    #[test]
    fn test_graph_io_resolution() {
        let config = GraphConfig {
            nodes: vec![node("pass", "Filter")],
            input_streams: vec![crate::config::GraphInputConfig {
                name: "in".to_string(),
                to: vec!["pass.IN".to_string()],
            }],
            output_streams: vec![crate::config::GraphOutputConfig {
                name: "out".to_string(),
                from: "pass.OUT".to_string(),
            }],
            ..GraphConfig::default()
        };
        let contracts = vec![filter_contract()];
        let topology = Topology::resolve(&config, &contracts).unwrap();

        assert_eq!(topology.graph_inputs.len(), 1);
        assert_eq!(topology.graph_inputs[0].channels.len(), 1);
        assert_eq!(topology.graph_outputs, vec![("out".to_string(), 0, 0)]);
        // Fed by a graph input, not a source in the scheduling sense.
        assert!(!topology.nodes[0].is_source);
    }

    #[test]
    fn test_executor_plans() {
        let config = GraphConfig {
            nodes: vec![{
                let mut n = node("pass", "Filter");
                n.executor = Some("inference".to_string());
                n
            }],
            connections: vec![],
            input_streams: vec![crate::config::GraphInputConfig {
                name: "in".to_string(),
                to: vec!["pass.IN".to_string()],
            }],
            executors: vec![crate::config::ExecutorConfig {
                name: "inference".to_string(),
                workers: Some(1),
            }],
            ..GraphConfig::default()
        };
        let contracts = vec![filter_contract()];
        let topology = Topology::resolve(&config, &contracts).unwrap();
        assert_eq!(topology.executors.len(), 2);
        assert_eq!(topology.executors[0].name, "default");
        assert_eq!(topology.nodes[0].executor, 1);
    }
}
