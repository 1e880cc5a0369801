// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Declarative graph description loadable from JSON/YAML.
//!
//! Nodes are identified by local aliases; connections reference ports as
//! `"alias.TAG"` (or `"alias.TAG:index"` for indexed ports). The config is
//! purely syntactic — contract-aware validation (port existence, types,
//! single-producer rules) happens in the topology resolver.
//!
//! # Example
//!
//! ```json
//! {
//!   "name": "limited-inference",
//!   "nodes": [
//!     { "alias": "limiter", "type": "FlowLimiter", "options": { "max_in_flight": 1 } },
//!     { "alias": "detector", "type": "Detector" }
//!   ],
//!   "input_streams": [ { "name": "frames", "to": ["limiter.IN"] } ],
//!   "output_streams": [ { "name": "detections", "from": "detector.OUT" } ],
//!   "connections": [
//!     { "from": "limiter.OUT", "to": "detector.IN" },
//!     { "from": "detector.OUT", "to": "limiter.FINISHED", "back_edge": true }
//!   ]
//! }
//! ```

mod expand;

pub(crate) use expand::expand_subgraphs;

use serde::{Deserialize, Serialize};

use crate::error::{FlowError, Result};
use crate::node::PolicySpec;

pub(crate) const DEFAULT_MAX_QUEUE_SIZE: usize = 16;

fn default_max_queue_size() -> usize {
    DEFAULT_MAX_QUEUE_SIZE
}

/// Declarative graph definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphConfig {
    /// Optional graph name for display/logging.
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub nodes: Vec<NodeConfig>,

    #[serde(default)]
    pub connections: Vec<ConnectionConfig>,

    /// Streams fed from outside the graph (`FlowRuntime::send`).
    #[serde(default)]
    pub input_streams: Vec<GraphInputConfig>,

    /// Streams observable from outside the graph
    /// (`FlowRuntime::observe_output`).
    #[serde(default)]
    pub output_streams: Vec<GraphOutputConfig>,

    /// Side packet bindings: graph-level names to node side ports.
    #[serde(default)]
    pub side_packets: Vec<SidePacketConfig>,

    /// Additional executors beyond the default shared pool.
    #[serde(default)]
    pub executors: Vec<ExecutorConfig>,

    /// Default per-channel packet cap, overridable per connection.
    #[serde(default = "default_max_queue_size")]
    pub max_queue_size: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        GraphConfig {
            name: None,
            nodes: Vec::new(),
            connections: Vec::new(),
            input_streams: Vec::new(),
            output_streams: Vec::new(),
            side_packets: Vec::new(),
            executors: Vec::new(),
            max_queue_size: DEFAULT_MAX_QUEUE_SIZE,
        }
    }
}

/// A node instance in the graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Local alias, unique within the graph, used in connection references.
    pub alias: String,

    /// Registered node (or subgraph) type name.
    #[serde(rename = "type")]
    pub node_type: String,

    /// Per-node options, passed to the node factory.
    #[serde(default)]
    pub options: serde_json::Value,

    /// Executor this node's work items run on. Defaults to the shared pool.
    #[serde(default)]
    pub executor: Option<String>,

    /// Override of the input policy declared in the node's contract.
    #[serde(default)]
    pub input_policy: Option<PolicySpec>,
}

/// A stream connection between two node ports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Producing output port: `"alias.TAG"`.
    pub from: String,

    /// Consuming input port: `"alias.TAG"`.
    pub to: String,

    /// Back edges close feedback loops. They are ignored for priority
    /// ranking and cycle detection, and exempt from backpressure.
    #[serde(default)]
    pub back_edge: bool,

    /// Per-connection queue cap override.
    #[serde(default)]
    pub max_queue_size: Option<usize>,
}

/// An externally fed stream, fanning out to consumer ports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphInputConfig {
    pub name: String,
    pub to: Vec<String>,
}

/// An externally observable stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphOutputConfig {
    pub name: String,
    pub from: String,
}

/// One side packet binding. Exactly one of `to` (deliver a graph-level side
/// packet into a node side input) or `from` (publish a node side output
/// under a graph-level name) is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SidePacketConfig {
    pub name: String,

    #[serde(default)]
    pub to: Option<String>,

    #[serde(default)]
    pub from: Option<String>,
}

/// A named worker pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    pub name: String,

    /// Worker thread count; defaults to available parallelism.
    #[serde(default)]
    pub workers: Option<usize>,
}

/// Parsed `"alias.selector"` reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PortRef<'a> {
    pub alias: &'a str,
    pub selector: &'a str,
}

pub(crate) fn parse_port_ref(s: &str) -> Result<PortRef<'_>> {
    match s.split_once('.') {
        Some((alias, selector)) if !alias.is_empty() && !selector.is_empty() => {
            Ok(PortRef { alias, selector })
        }
        _ => Err(FlowError::Configuration(format!(
            "Invalid port reference '{}', expected 'alias.TAG'",
            s
        ))),
    }
}

impl GraphConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| FlowError::Configuration(format!("Failed to parse graph JSON: {}", e)))
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| FlowError::Configuration(format!("Failed to parse graph YAML: {}", e)))
    }

    pub fn from_json_file(path: &std::path::Path) -> Result<Self> {
        let file = std::fs::File::open(path).map_err(|e| {
            FlowError::Configuration(format!(
                "Failed to open graph file '{}': {}",
                path.display(),
                e
            ))
        })?;
        serde_json::from_reader(file).map_err(|e| {
            FlowError::Configuration(format!(
                "Failed to parse graph file '{}': {}",
                path.display(),
                e
            ))
        })
    }

    pub fn from_yaml_file(path: &std::path::Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            FlowError::Configuration(format!(
                "Failed to open graph file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_yaml_str(&text)
    }

    /// Syntactic validation: alias uniqueness, reference resolution, single
    /// producer per input endpoint, well-formed side packet entries.
    pub fn validate(&self) -> Result<()> {
        use std::collections::HashSet;

        let mut aliases: HashSet<&str> = HashSet::new();
        for node in &self.nodes {
            if !aliases.insert(node.alias.as_str()) {
                return Err(FlowError::Configuration(format!(
                    "Duplicate node alias: '{}'",
                    node.alias
                )));
            }
        }

        let mut executor_names: HashSet<&str> = HashSet::new();
        for executor in &self.executors {
            if !executor_names.insert(executor.name.as_str()) {
                return Err(FlowError::Configuration(format!(
                    "Duplicate executor name: '{}'",
                    executor.name
                )));
            }
        }
        for node in &self.nodes {
            if let Some(executor) = &node.executor {
                if !executor_names.contains(executor.as_str()) && executor.as_str() != "default" {
                    return Err(FlowError::Configuration(format!(
                        "Node '{}' references undefined executor '{}'",
                        node.alias, executor
                    )));
                }
            }
        }

        let check_alias = |reference: &str| -> Result<()> {
            let port = parse_port_ref(reference)?;
            if !aliases.contains(port.alias) {
                return Err(FlowError::Configuration(format!(
                    "Reference '{}' names unknown node alias '{}'",
                    reference, port.alias
                )));
            }
            Ok(())
        };

        // Every input endpoint is fed by exactly one producer; fan-in is
        // expressed with multi-input nodes, never with merged streams.
        let mut consumed: HashSet<String> = HashSet::new();
        let mut claim_endpoint = move |endpoint: &str| -> Result<()> {
            if !consumed.insert(endpoint.to_string()) {
                return Err(FlowError::Configuration(format!(
                    "Input '{}' is bound to more than one producer",
                    endpoint
                )));
            }
            Ok(())
        };

        for connection in &self.connections {
            check_alias(&connection.from)?;
            check_alias(&connection.to)?;
            claim_endpoint(&connection.to)?;
        }

        let mut input_names: HashSet<&str> = HashSet::new();
        for input in &self.input_streams {
            if !input_names.insert(input.name.as_str()) {
                return Err(FlowError::Configuration(format!(
                    "Duplicate graph input stream: '{}'",
                    input.name
                )));
            }
            if input.to.is_empty() {
                return Err(FlowError::Configuration(format!(
                    "Graph input stream '{}' has no consumers",
                    input.name
                )));
            }
            for endpoint in &input.to {
                check_alias(endpoint)?;
                claim_endpoint(endpoint)?;
            }
        }

        let mut output_names: HashSet<&str> = HashSet::new();
        for output in &self.output_streams {
            if !output_names.insert(output.name.as_str()) {
                return Err(FlowError::Configuration(format!(
                    "Duplicate graph output stream: '{}'",
                    output.name
                )));
            }
            check_alias(&output.from)?;
        }

        for side in &self.side_packets {
            match (&side.to, &side.from) {
                (Some(to), None) => check_alias(to)?,
                (None, Some(from)) => check_alias(from)?,
                _ => {
                    return Err(FlowError::Configuration(format!(
                        "Side packet '{}' must set exactly one of 'to' or 'from'",
                        side.name
                    )))
                }
            }
        }

        Ok(())
    }
}
