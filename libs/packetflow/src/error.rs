// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use thiserror::Error;

use crate::timestamp::Timestamp;

#[derive(Error, Debug)]
pub enum FlowError {
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Port error: {0}")]
    Port(String),

    #[error(
        "Ordering violation on '{stream}': timestamp {timestamp} is below the stream bound {bound}"
    )]
    OrderingViolation {
        stream: String,
        timestamp: Timestamp,
        bound: Timestamp,
    },

    #[error("[{node}] Processing failed: {message}")]
    Processing { node: String, message: String },

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Runtime error: {0}")]
    Runtime(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl FlowError {
    /// Clone-ish conversion for fan-out to error listeners. `Io` and `Other`
    /// carry non-clonable sources, so they degrade to `Runtime` strings.
    pub(crate) fn duplicate(&self) -> FlowError {
        match self {
            FlowError::Configuration(m) => FlowError::Configuration(m.clone()),
            FlowError::Port(m) => FlowError::Port(m.clone()),
            FlowError::OrderingViolation {
                stream,
                timestamp,
                bound,
            } => FlowError::OrderingViolation {
                stream: stream.clone(),
                timestamp: *timestamp,
                bound: *bound,
            },
            FlowError::Processing { node, message } => FlowError::Processing {
                node: node.clone(),
                message: message.clone(),
            },
            FlowError::NotFound(m) => FlowError::NotFound(m.clone()),
            FlowError::Runtime(m) => FlowError::Runtime(m.clone()),
            other => FlowError::Runtime(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, FlowError>;
