// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Node type registry: type-name strings to factories.
//!
//! Built-in node types self-register through [`crate::register_node_type!`]
//! and `inventory`; the process-wide registry is populated once, on first
//! access, and treated as read-mostly thereafter. Graph loading always takes
//! the registry explicitly, so embedders can also build private registries
//! and skip the global one entirely.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use serde::de::DeserializeOwned;

use super::Node;
use crate::config::GraphConfig;
use crate::error::{FlowError, Result};

/// Factory signature: per-node options (JSON) to a fresh node instance.
pub type NodeFactory = fn(&serde_json::Value) -> Result<Box<dyn Node>>;

/// What a registered type name resolves to.
#[derive(Clone)]
pub enum NodeKind {
    /// A concrete node, built by a factory for each run.
    Node(NodeFactory),
    /// A subgraph, expanded into the parent graph at load time.
    Subgraph(GraphConfig),
}

/// Typed-options construction helper, mirroring the config-driven
/// construction of every built-in node type.
pub trait FromOptions: Node + Sized + 'static {
    type Options: DeserializeOwned + Default;

    fn from_options(options: Self::Options) -> Result<Self>;

    fn from_options_boxed(raw: &serde_json::Value) -> Result<Box<dyn Node>> {
        let options = if raw.is_null() {
            Self::Options::default()
        } else {
            serde_json::from_value(raw.clone()).map_err(|e| {
                FlowError::Configuration(format!(
                    "Invalid options for {}: {}",
                    std::any::type_name::<Self>(),
                    e
                ))
            })?
        };
        Ok(Box::new(Self::from_options(options)?))
    }
}

/// An inventory-submitted node type.
pub struct RegisteredNodeType {
    pub name: &'static str,
    pub factory: NodeFactory,
}

inventory::collect!(RegisteredNodeType);

/// Register a node type under a name, for pickup by [`global_registry`].
#[macro_export]
macro_rules! register_node_type {
    ($name:literal, $node_type:ty) => {
        $crate::inventory::submit! {
            $crate::node::RegisteredNodeType {
                name: $name,
                factory: <$node_type as $crate::node::FromOptions>::from_options_boxed,
            }
        }
    };
}

/// Maps type-name strings to node factories and subgraph configs.
pub struct NodeRegistry {
    entries: HashMap<String, NodeKind>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    pub fn register_node(&mut self, name: impl Into<String>, factory: NodeFactory) -> Result<()> {
        self.insert(name.into(), NodeKind::Node(factory))
    }

    pub fn register_subgraph(&mut self, name: impl Into<String>, config: GraphConfig) -> Result<()> {
        self.insert(name.into(), NodeKind::Subgraph(config))
    }

    fn insert(&mut self, name: String, kind: NodeKind) -> Result<()> {
        if self.entries.contains_key(&name) {
            return Err(FlowError::Configuration(format!(
                "Node type '{}' is already registered",
                name
            )));
        }
        self.entries.insert(name, kind);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&NodeKind> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

static GLOBAL_REGISTRY: OnceLock<Arc<Mutex<NodeRegistry>>> = OnceLock::new();

/// The process-wide registry, populated from inventory on first access.
pub fn global_registry() -> Arc<Mutex<NodeRegistry>> {
    GLOBAL_REGISTRY
        .get_or_init(|| {
            let mut registry = NodeRegistry::new();

            for entry in inventory::iter::<RegisteredNodeType> {
                if let Err(e) = registry.register_node(entry.name, entry.factory) {
                    tracing::warn!("Failed to auto-register node type '{}': {}", entry.name, e);
                }
            }

            tracing::info!("Auto-registered {} node types", registry.len());

            Arc::new(Mutex::new(registry))
        })
        .clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{NodeContract, NodeContext, ProcessOutcome};

    struct NullNode;

    impl Node for NullNode {
        fn contract(&self) -> NodeContract {
            NodeContract::new()
        }

        fn process(&mut self, _ctx: &mut NodeContext<'_>) -> Result<ProcessOutcome> {
            Ok(ProcessOutcome::Stop)
        }
    }

    fn null_factory(_options: &serde_json::Value) -> Result<Box<dyn Node>> {
        Ok(Box::new(NullNode))
    }

    #[test]
    fn test_register_and_get() {
        let mut registry = NodeRegistry::new();
        registry.register_node("Null", null_factory).unwrap();
        assert!(registry.contains("Null"));
        assert!(matches!(registry.get("Null"), Some(NodeKind::Node(_))));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut registry = NodeRegistry::new();
        registry.register_node("Null", null_factory).unwrap();
        let err = registry.register_node("Null", null_factory).unwrap_err();
        assert!(err.to_string().contains("already registered"));
    }

    #[test]
    fn test_subgraph_and_node_share_namespace() {
        let mut registry = NodeRegistry::new();
        registry
            .register_subgraph("Sub", GraphConfig::default())
            .unwrap();
        assert!(registry.register_node("Sub", null_factory).is_err());
    }

    #[test]
    fn test_global_registry_has_builtins() {
        let registry = global_registry();
        let registry = registry.lock();
        assert!(registry.contains("FlowLimiter"));
        assert!(registry.contains("PassThrough"));
    }
}
