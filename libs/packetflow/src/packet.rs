// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Packets: the timestamped units of data flowing on streams.
//!
//! A [`Packet`] is an immutable, cheaply clonable handle to a type-erased
//! payload. Cloning a packet clones the `Arc`, never the payload, so fan-out
//! to several consumers costs one refcount per consumer.

use std::any::Any;
use std::sync::Arc;

use crate::error::{FlowError, Result};
use crate::timestamp::Timestamp;

/// A single timestamped unit of data.
///
/// Side packets are ordinary packets carrying [`Timestamp::UNSET`].
#[derive(Clone)]
pub struct Packet {
    payload: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
    timestamp: Timestamp,
}

impl Packet {
    /// Wrap a value into a packet at the given timestamp.
    pub fn new<T: Any + Send + Sync>(value: T, timestamp: Timestamp) -> Self {
        Packet {
            payload: Arc::new(value),
            type_name: std::any::type_name::<T>(),
            timestamp,
        }
    }

    /// Wrap a value into an untimestamped side packet.
    pub fn side<T: Any + Send + Sync>(value: T) -> Self {
        Packet::new(value, Timestamp::UNSET)
    }

    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    /// Re-stamp: a new packet sharing this payload at another timestamp.
    pub fn at(&self, timestamp: Timestamp) -> Packet {
        Packet {
            payload: Arc::clone(&self.payload),
            type_name: self.type_name,
            timestamp,
        }
    }

    /// Borrow the payload as `T`.
    pub fn value<T: Any + Send + Sync>(&self) -> Result<&T> {
        self.payload.downcast_ref::<T>().ok_or_else(|| {
            FlowError::Port(format!(
                "Packet holds '{}', not '{}'",
                self.type_name,
                std::any::type_name::<T>()
            ))
        })
    }

    pub fn is<T: Any + Send + Sync>(&self) -> bool {
        self.payload.is::<T>()
    }

    /// Name of the payload's concrete type, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl std::fmt::Debug for Packet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Packet<{}>@{}", self.type_name, self.timestamp)
    }
}
