// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Per-consumer stream buffers with timestamp bounds.
//!
//! Every consuming input port gets its own [`InputChannel`]; a producing
//! output port fans out to one channel per consumer. The channel is the only
//! state shared between a producer thread and its consumer's worker thread,
//! so all mutation goes through the internal mutex.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Condvar, Mutex};

use crate::error::{FlowError, Result};
use crate::packet::Packet;
use crate::timestamp::Timestamp;

pub(crate) type ChannelId = usize;
pub(crate) type NodeId = usize;

/// Result of a successful push: whether the packet was admitted past a full
/// queue under deadlock-avoidance relaxation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PushAdmission {
    Normal,
    Relieved,
}

/// Point-in-time view used by input policies. Taken under the channel lock,
/// but stable for settlement purposes: fronts are only removed by the
/// consumer's own (serialized) worker, and bounds only advance.
#[derive(Debug, Clone, Copy)]
pub struct ChannelSnapshot {
    /// Timestamp of the oldest buffered packet, if any.
    pub front: Option<Timestamp>,
    /// Lowest timestamp a future packet could carry.
    pub bound: Timestamp,
}

struct ChannelState {
    queue: VecDeque<Packet>,
    bound: Timestamp,
}

/// A bounded, timestamp-ordered buffer between one producer port and one
/// consumer input port.
pub(crate) struct InputChannel {
    /// `"producer.OUT -> consumer.IN"`, for diagnostics.
    pub name: String,
    pub consumer: NodeId,
    pub max_queue_size: usize,
    /// Back edges are exempt from backpressure so feedback loops cannot
    /// deadlock against their own downstream.
    pub back_edge: bool,
    state: Mutex<ChannelState>,
    space: Condvar,
}

impl InputChannel {
    pub fn new(name: String, consumer: NodeId, max_queue_size: usize, back_edge: bool) -> Self {
        InputChannel {
            name,
            consumer,
            max_queue_size: max_queue_size.max(1),
            back_edge,
            state: Mutex::new(ChannelState {
                queue: VecDeque::new(),
                bound: Timestamp::MIN,
            }),
            space: Condvar::new(),
        }
    }

    /// Buffer a packet and advance the bound to `timestamp + 1`.
    ///
    /// A timestamp below the current bound is a programming error in the
    /// producing node and fails with `OrderingViolation`. A full queue
    /// blocks the caller until the consumer drains, unless the channel is a
    /// back edge or `release` is set (teardown), in which case the packet is
    /// admitted over the cap and reported as [`PushAdmission::Relieved`].
    pub fn push(&self, packet: Packet, release: &AtomicBool) -> Result<PushAdmission> {
        let mut state = self.state.lock();

        if packet.timestamp() < state.bound {
            return Err(FlowError::OrderingViolation {
                stream: self.name.clone(),
                timestamp: packet.timestamp(),
                bound: state.bound,
            });
        }

        let mut admission = PushAdmission::Normal;
        while state.queue.len() >= self.max_queue_size {
            if self.back_edge || release.load(Ordering::Acquire) {
                admission = PushAdmission::Relieved;
                break;
            }
            self.space.wait(&mut state);
        }

        state.bound = packet.timestamp().succ();
        state.queue.push_back(packet);
        Ok(admission)
    }

    /// Assert a tighter bound than implied by the last packet.
    ///
    /// Returns whether the bound actually moved; an attempt to move it
    /// backwards is an `OrderingViolation`.
    pub fn advance_bound(&self, new_bound: Timestamp) -> Result<bool> {
        let mut state = self.state.lock();
        if new_bound < state.bound {
            return Err(FlowError::OrderingViolation {
                stream: self.name.clone(),
                timestamp: new_bound,
                bound: state.bound,
            });
        }
        let moved = new_bound > state.bound;
        state.bound = new_bound;
        Ok(moved)
    }

    /// Mark the channel done: no packet will ever arrive again.
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.bound = Timestamp::DONE;
        drop(state);
        // Producers blocked on a full queue re-check and fail monotonicity
        // on their next push attempt rather than hanging forever.
        self.space.notify_all();
    }

    pub fn snapshot(&self) -> ChannelSnapshot {
        let state = self.state.lock();
        ChannelSnapshot {
            front: state.queue.front().map(Packet::timestamp),
            bound: state.bound,
        }
    }

    /// Remove and return the front packet iff it sits at exactly `ts`.
    pub fn pop_at(&self, ts: Timestamp) -> Option<Packet> {
        let mut state = self.state.lock();
        if state.queue.front().map(Packet::timestamp) == Some(ts) {
            let packet = state.queue.pop_front();
            drop(state);
            self.space.notify_all();
            packet
        } else {
            None
        }
    }

    /// Closed with nothing left to deliver.
    pub fn is_done_and_empty(&self) -> bool {
        let state = self.state.lock();
        state.bound == Timestamp::DONE && state.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// Wake any producer blocked on backpressure so it can observe a
    /// release flag. Used during teardown.
    pub fn release_waiters(&self) {
        self.space.notify_all();
    }
}
