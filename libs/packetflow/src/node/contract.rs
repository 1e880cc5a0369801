// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Node contracts: the declared port surface of a node type.
//!
//! A contract is what the topology resolver validates connections against —
//! which ports exist, which are required, what payload type each carries,
//! and which input policy synchronizes the node's input streams.

use std::any::{Any, TypeId};

use serde::{Deserialize, Serialize};

use crate::error::{FlowError, Result};

/// Concrete payload type declared on a port.
///
/// Ports may leave this unset (`None` in [`PortDecl::data`]) to accept any
/// payload; type mismatches then surface at `Packet::value` time instead of
/// at graph load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortDataType {
    type_id: TypeId,
    type_name: &'static str,
}

impl PortDataType {
    pub fn of<T: Any + Send + Sync>() -> Self {
        PortDataType {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

/// A declared input, output, or side port.
///
/// Ports are addressed by an uppercase tag plus an optional index, written
/// `"TAG"` or `"TAG:2"` in connection references. Tag/index combinations
/// must be unique per node per direction.
#[derive(Debug, Clone)]
pub struct PortDecl {
    pub tag: String,
    pub index: Option<u32>,
    pub data: Option<PortDataType>,
    pub required: bool,
}

impl PortDecl {
    pub fn new(tag: impl Into<String>) -> Self {
        PortDecl {
            tag: tag.into(),
            index: None,
            data: None,
            required: true,
        }
    }

    pub fn with_index(mut self, index: u32) -> Self {
        self.index = Some(index);
        self
    }

    pub fn typed<T: Any + Send + Sync>(mut self) -> Self {
        self.data = Some(PortDataType::of::<T>());
        self
    }

    /// Optional ports may be left unconnected in a graph.
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    /// Selector string: `"TAG"` or `"TAG:index"`.
    pub fn selector(&self) -> String {
        match self.index {
            Some(i) => format!("{}:{}", self.tag, i),
            None => self.tag.clone(),
        }
    }
}

/// Input policy selection, per node.
///
/// The policy decides how a node's input streams are combined into input
/// sets; see the `channel::policy` module for the semantics of each.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicySpec {
    /// Deterministic cross-stream synchronization on settled timestamps.
    #[default]
    Default,
    /// Deliver every packet on arrival, one stream at a time.
    Immediate,
    /// Partition inputs (by selector) into independently synchronized
    /// groups. Selectors not listed form singleton groups.
    SyncSets(Vec<Vec<String>>),
}

/// The declared surface of a node type: ports, side ports, input policy.
#[derive(Debug, Clone, Default)]
pub struct NodeContract {
    pub inputs: Vec<PortDecl>,
    pub outputs: Vec<PortDecl>,
    pub side_inputs: Vec<PortDecl>,
    pub side_outputs: Vec<PortDecl>,
    pub input_policy: PolicySpec,
}

impl NodeContract {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn input(mut self, decl: PortDecl) -> Self {
        self.inputs.push(decl);
        self
    }

    pub fn output(mut self, decl: PortDecl) -> Self {
        self.outputs.push(decl);
        self
    }

    pub fn side_input(mut self, decl: PortDecl) -> Self {
        self.side_inputs.push(decl);
        self
    }

    pub fn side_output(mut self, decl: PortDecl) -> Self {
        self.side_outputs.push(decl);
        self
    }

    pub fn with_input_policy(mut self, policy: PolicySpec) -> Self {
        self.input_policy = policy;
        self
    }

    /// Check tag/index uniqueness per direction.
    pub fn validate(&self, node: &str) -> Result<()> {
        for (direction, decls) in [
            ("input", &self.inputs),
            ("output", &self.outputs),
            ("side input", &self.side_inputs),
            ("side output", &self.side_outputs),
        ] {
            let mut seen = std::collections::HashSet::new();
            for decl in decls.iter() {
                if !seen.insert(decl.selector()) {
                    return Err(FlowError::Configuration(format!(
                        "Node '{}' declares duplicate {} port '{}'",
                        node,
                        direction,
                        decl.selector()
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn find_input(&self, selector: &str) -> Option<(usize, &PortDecl)> {
        Self::find(&self.inputs, selector)
    }

    pub fn find_output(&self, selector: &str) -> Option<(usize, &PortDecl)> {
        Self::find(&self.outputs, selector)
    }

    pub fn find_side_input(&self, selector: &str) -> Option<(usize, &PortDecl)> {
        Self::find(&self.side_inputs, selector)
    }

    pub fn find_side_output(&self, selector: &str) -> Option<(usize, &PortDecl)> {
        Self::find(&self.side_outputs, selector)
    }

    fn find<'a>(decls: &'a [PortDecl], selector: &str) -> Option<(usize, &'a PortDecl)> {
        decls
            .iter()
            .enumerate()
            .find(|(_, d)| d.selector() == selector)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selector_format() {
        assert_eq!(PortDecl::new("VIDEO").selector(), "VIDEO");
        assert_eq!(PortDecl::new("IN").with_index(2).selector(), "IN:2");
    }

    #[test]
    fn test_duplicate_ports_rejected() {
        let contract = NodeContract::new()
            .input(PortDecl::new("IN"))
            .input(PortDecl::new("IN"));
        let err = contract.validate("dup").unwrap_err();
        assert!(err.to_string().contains("duplicate input port 'IN'"));
    }

    #[test]
    fn test_same_tag_different_index_is_distinct() {
        let contract = NodeContract::new()
            .input(PortDecl::new("IN").with_index(0))
            .input(PortDecl::new("IN").with_index(1));
        assert!(contract.validate("ok").is_ok());
        assert_eq!(contract.find_input("IN:1").unwrap().0, 1);
        assert!(contract.find_input("IN").is_none());
    }

    #[test]
    fn test_port_data_type() {
        let a = PortDataType::of::<u32>();
        let b = PortDataType::of::<u32>();
        let c = PortDataType::of::<String>();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(c.type_name().contains("String"));
    }

    #[test]
    fn test_policy_spec_serde() {
        let json = serde_json::to_string(&PolicySpec::Immediate).unwrap();
        assert_eq!(json, "\"immediate\"");

        let spec: PolicySpec =
            serde_json::from_str(r#"{"sync_sets": [["A", "B"], ["TICK"]]}"#).unwrap();
        assert_eq!(
            spec,
            PolicySpec::SyncSets(vec![
                vec!["A".to_string(), "B".to_string()],
                vec!["TICK".to_string()]
            ])
        );
    }
}
