// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Input policies: when is a node's next input set determined?
//!
//! A policy looks at snapshots of the node's input channels and answers
//! "which timestamp settles next, on which ports". The scheduler then pops
//! exactly the packets sitting at that timestamp and delivers them as one
//! [`crate::InputSet`].
//!
//! The default policy is the deterministic one: it never fires a timestamp
//! until every input channel's bound has passed it, so a slow stream stalls
//! the node rather than being skipped. That stall is the documented
//! structural risk of cross-stream synchronization; it is mitigated by flow
//! control (bounded queues, flow-limiter nodes), never by the policy itself.

use crate::channel::input_channel::ChannelSnapshot;
use crate::node::PolicySpec;
use crate::timestamp::Timestamp;

/// A policy's verdict: `timestamp` has settled for the ports listed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settlement {
    pub timestamp: Timestamp,
    /// Input port indices participating in the firing. Ports not listed
    /// contribute empty slots to the delivered input set.
    pub ports: Vec<usize>,
}

/// Pluggable settlement rule, selected per node via [`PolicySpec`].
pub trait InputPolicy: Send + Sync {
    /// The next settled timestamp, given current channel snapshots, or
    /// `None` if nothing is determined yet. Must be monotonic: once the
    /// scheduler delivers the returned timestamp (popping its packets),
    /// subsequent calls return strictly greater timestamps.
    fn settle(&self, channels: &[ChannelSnapshot]) -> Option<Settlement>;
}

/// Deterministic cross-stream synchronization.
///
/// Fires the minimum buffered timestamp T once every channel's bound
/// exceeds T. Guarantees strictly ascending delivery, no drops, and at most
/// one delivery per timestamp.
pub struct DefaultPolicy;

impl InputPolicy for DefaultPolicy {
    fn settle(&self, channels: &[ChannelSnapshot]) -> Option<Settlement> {
        let t = min_front(channels)?;
        if channels.iter().all(|c| c.bound > t) {
            Some(Settlement {
                timestamp: t,
                ports: (0..channels.len()).collect(),
            })
        } else {
            None
        }
    }
}

/// Independently synchronized groups of inputs.
///
/// Each group settles like [`DefaultPolicy`] over its own channels; the
/// group with the earliest settled timestamp fires. Useful when some inputs
/// are logically decoupled (e.g. a data stream plus an unrelated control
/// stream) and waiting across the groups would serialize them artificially.
pub struct SyncSetPolicy {
    groups: Vec<Vec<usize>>,
}

impl SyncSetPolicy {
    /// `groups` are disjoint sets of input port indices covering all ports
    /// (the topology resolver completes partial partitions with singleton
    /// groups).
    pub fn new(groups: Vec<Vec<usize>>) -> Self {
        SyncSetPolicy { groups }
    }
}

impl InputPolicy for SyncSetPolicy {
    fn settle(&self, channels: &[ChannelSnapshot]) -> Option<Settlement> {
        let mut best: Option<Settlement> = None;
        for group in &self.groups {
            let members: Vec<ChannelSnapshot> = group.iter().map(|&i| channels[i]).collect();
            let Some(t) = min_front(&members) else {
                continue;
            };
            if !members.iter().all(|c| c.bound > t) {
                continue;
            }
            if best.as_ref().is_none_or(|b| t < b.timestamp) {
                best = Some(Settlement {
                    timestamp: t,
                    ports: group.clone(),
                });
            }
        }
        best
    }
}

/// No cross-stream waiting: every arriving packet is its own single-stream
/// input set. Sacrifices cross-stream determinism for latency; delivery is
/// monotonic per channel but unordered across channels.
pub struct ImmediatePolicy;

impl InputPolicy for ImmediatePolicy {
    fn settle(&self, channels: &[ChannelSnapshot]) -> Option<Settlement> {
        let mut best: Option<(Timestamp, usize)> = None;
        for (i, c) in channels.iter().enumerate() {
            if let Some(front) = c.front {
                if best.is_none_or(|(t, _)| front < t) {
                    best = Some((front, i));
                }
            }
        }
        best.map(|(t, i)| Settlement {
            timestamp: t,
            ports: vec![i],
        })
    }
}

/// Build the policy implementation for a node's resolved spec.
///
/// `sync_groups` is the index-resolved form of `PolicySpec::SyncSets`,
/// produced by the topology resolver.
pub(crate) fn build_policy(
    spec: &PolicySpec,
    sync_groups: Option<Vec<Vec<usize>>>,
) -> Box<dyn InputPolicy> {
    match spec {
        PolicySpec::Default => Box::new(DefaultPolicy),
        PolicySpec::Immediate => Box::new(ImmediatePolicy),
        PolicySpec::SyncSets(_) => Box::new(SyncSetPolicy::new(
            sync_groups.expect("sync_sets policy resolved without index groups"),
        )),
    }
}

fn min_front(channels: &[ChannelSnapshot]) -> Option<Timestamp> {
    channels.iter().filter_map(|c| c.front).min()
}
