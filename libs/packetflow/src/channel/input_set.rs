// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use std::any::Any;
use std::sync::Arc;

use crate::error::{FlowError, Result};
use crate::packet::Packet;
use crate::timestamp::Timestamp;

/// A coherent, per-timestamp bundle of packets across a node's input ports.
///
/// Slots align with the node's connected input ports in declaration order;
/// a slot is `None` when the port had no packet at this timestamp (settled
/// as "guaranteed never to arrive"). Constructed by the scheduler once a
/// timestamp settles, delivered to the node exactly once, then discarded.
#[derive(Clone)]
pub struct InputSet {
    timestamp: Timestamp,
    slots: Vec<Option<Packet>>,
    selectors: Arc<Vec<String>>,
}

impl InputSet {
    pub(crate) fn new(
        timestamp: Timestamp,
        slots: Vec<Option<Packet>>,
        selectors: Arc<Vec<String>>,
    ) -> Self {
        debug_assert_eq!(slots.len(), selectors.len());
        InputSet {
            timestamp,
            slots,
            selectors,
        }
    }

    pub(crate) fn empty() -> Self {
        InputSet {
            timestamp: Timestamp::UNSET,
            slots: Vec::new(),
            selectors: Arc::new(Vec::new()),
        }
    }

    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    /// Number of input ports (filled or not).
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    pub fn get(&self, index: usize) -> Option<&Packet> {
        self.slots.get(index).and_then(Option::as_ref)
    }

    /// Packet on the port with the given selector (`"TAG"` / `"TAG:i"`).
    pub fn tag(&self, selector: &str) -> Option<&Packet> {
        self.selectors
            .iter()
            .position(|s| s == selector)
            .and_then(|i| self.get(i))
    }

    /// Typed payload on a port, failing on an absent packet.
    pub fn value<T: Any + Send + Sync>(&self, selector: &str) -> Result<&T> {
        self.tag(selector)
            .ok_or_else(|| {
                FlowError::NotFound(format!("No packet on input '{}' at {}", selector, self.timestamp))
            })?
            .value::<T>()
    }

    /// Present packets, with their port selectors.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Packet)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|p| (self.selectors[i].as_str(), p)))
    }
}

impl std::fmt::Debug for InputSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let filled = self.slots.iter().filter(|s| s.is_some()).count();
        write!(
            f,
            "InputSet@{} ({}/{} ports filled)",
            self.timestamp,
            filled,
            self.slots.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set() -> InputSet {
        InputSet::new(
            Timestamp::new(7),
            vec![Some(Packet::new(10u32, Timestamp::new(7))), None],
            Arc::new(vec!["A".to_string(), "B".to_string()]),
        )
    }

    #[test]
    fn test_tag_lookup() {
        let set = set();
        assert_eq!(*set.tag("A").unwrap().value::<u32>().unwrap(), 10);
        assert!(set.tag("B").is_none());
        assert!(set.tag("C").is_none());
    }

    #[test]
    fn test_value_on_empty_slot_is_not_found() {
        let set = set();
        assert!(matches!(
            set.value::<u32>("B").unwrap_err(),
            FlowError::NotFound(_)
        ));
    }

    #[test]
    fn test_iter_skips_empty_slots() {
        let set = set();
        let present: Vec<&str> = set.iter().map(|(tag, _)| tag).collect();
        assert_eq!(present, vec!["A"]);
    }

    #[test]
    fn test_empty_set() {
        let set = InputSet::empty();
        assert!(set.is_empty());
        assert_eq!(set.timestamp(), Timestamp::UNSET);
    }
}
