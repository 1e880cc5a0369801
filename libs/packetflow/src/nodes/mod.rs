// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Built-in node types, auto-registered into the global registry.

mod flow_limiter;
mod pass_through;

pub use flow_limiter::{FlowLimiterNode, FlowLimiterOptions};
pub use pass_through::{PassThroughNode, PassThroughOptions};

crate::register_node_type!("FlowLimiter", FlowLimiterNode);
crate::register_node_type!("PassThrough", PassThroughNode);
