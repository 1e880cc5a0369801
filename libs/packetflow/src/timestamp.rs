// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Timestamps and timestamp bounds.
//!
//! Every packet on a stream carries a [`Timestamp`]; every stream carries a
//! monotonically non-decreasing bound (the lowest timestamp a future packet
//! could still have). Settlement — the point at which a timestamp is fully
//! determined for a stream — is always a comparison against that bound.
//!
//! The value space is a signed 64-bit tick count with reserved sentinels at
//! both ends:
//!
//! - [`Timestamp::UNSET`] — side packets and not-yet-started state
//! - [`Timestamp::MIN`] / [`Timestamp::MAX`] — the packet-carrying range
//! - [`Timestamp::DONE`] — bound value of a closed stream; no packet can
//!   carry it

use serde::{Deserialize, Serialize};

/// A point on a stream's timeline.
///
/// Plain ticks; the engine assigns no unit. Producers typically use
/// microseconds, but only ordering matters to the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Value of a side packet, or of per-node state before any delivery.
    pub const UNSET: Timestamp = Timestamp(i64::MIN);

    /// Lowest timestamp a packet may carry.
    pub const MIN: Timestamp = Timestamp(i64::MIN + 1);

    /// Highest timestamp a packet may carry.
    pub const MAX: Timestamp = Timestamp(i64::MAX - 1);

    /// Bound of a closed stream. Never carried by a packet.
    pub const DONE: Timestamp = Timestamp(i64::MAX);

    pub const fn new(ticks: i64) -> Self {
        Timestamp(ticks)
    }

    pub const fn ticks(self) -> i64 {
        self.0
    }

    /// Whether a packet is allowed to carry this timestamp.
    pub fn is_packet_timestamp(self) -> bool {
        self >= Timestamp::MIN && self <= Timestamp::MAX
    }

    /// The next admissible value, saturating into [`Timestamp::DONE`].
    ///
    /// Pushing a packet at `t` advances the stream bound to `t.succ()`:
    /// nothing at or below `t` can arrive afterwards.
    pub fn succ(self) -> Timestamp {
        if self >= Timestamp::MAX {
            Timestamp::DONE
        } else {
            Timestamp(self.0 + 1)
        }
    }
}

impl From<i64> for Timestamp {
    fn from(ticks: i64) -> Self {
        Timestamp(ticks)
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            Timestamp::UNSET => write!(f, "unset"),
            Timestamp::MIN => write!(f, "min"),
            Timestamp::MAX => write!(f, "max"),
            Timestamp::DONE => write!(f, "done"),
            Timestamp(t) => write!(f, "{}", t),
        }
    }
}
