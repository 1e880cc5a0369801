// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Settlement semantics through the public runtime API: deterministic
//! cross-stream synchronization, bound-driven firing, re-stamping of cached
//! values, and fatal ordering violations.

use std::sync::{Arc, Mutex};

use packetflow::{
    global_registry, FlowError, FlowRuntime, GraphConfig, ObserverCallback, Packet, Timestamp,
};

type Seen = Arc<Mutex<Vec<(String, i64, u32)>>>;

fn recording_observer(stream: &str, seen: &Seen) -> ObserverCallback {
    let stream = stream.to_string();
    let seen = Arc::clone(seen);
    Box::new(move |packet: &Packet| {
        seen.lock().unwrap().push((
            stream.clone(),
            packet.timestamp().ticks(),
            *packet.value::<u32>()?,
        ));
        Ok(())
    })
}

fn load(json: &str) -> FlowRuntime {
    let registry = global_registry();
    let registry = registry.lock();
    FlowRuntime::load(&registry, GraphConfig::from_json_str(json).unwrap()).unwrap()
}

#[test]
fn test_clone_node_restamps_cached_values_on_tick() {
    // Streams a, b plus a tick stream c feed one clone-style node. A tick
    // with no fresh a/b data re-emits the cached values at the tick's
    // timestamp, once a and b's bounds prove nothing else is coming.
    let mut runtime = load(
        r#"{
            "name": "restamp",
            "nodes": [
                { "alias": "pass", "type": "PassThrough", "options": { "ports": 2, "tick": true } }
            ],
            "input_streams": [
                { "name": "a", "to": ["pass.IN:0"] },
                { "name": "b", "to": ["pass.IN:1"] },
                { "name": "c", "to": ["pass.TICK"] }
            ],
            "output_streams": [
                { "name": "out_a", "from": "pass.OUT:0" },
                { "name": "out_b", "from": "pass.OUT:1" }
            ]
        }"#,
    );

    let seen: Seen = Arc::new(Mutex::new(Vec::new()));
    runtime
        .observe_output("out_a", recording_observer("out_a", &seen))
        .unwrap();
    runtime
        .observe_output("out_b", recording_observer("out_b", &seen))
        .unwrap();

    runtime.start(Default::default()).unwrap();

    runtime.send("a", Packet::new(10u32, Timestamp::new(1))).unwrap();
    runtime.send("b", Packet::new(20u32, Timestamp::new(1))).unwrap();
    runtime.send("c", Packet::new(0u32, Timestamp::new(1))).unwrap();
    runtime.wait_until_idle().unwrap();

    {
        let mut seen = seen.lock().unwrap();
        seen.sort();
        assert_eq!(
            *seen,
            vec![
                ("out_a".to_string(), 1, 10),
                ("out_b".to_string(), 1, 20),
            ]
        );
        seen.clear();
    }

    // Only the tick advances; a and b assert bounds past 2 explicitly.
    runtime.send("c", Packet::new(0u32, Timestamp::new(2))).unwrap();
    runtime.advance_input_bound("a", Timestamp::new(3)).unwrap();
    runtime.advance_input_bound("b", Timestamp::new(3)).unwrap();
    runtime.wait_until_idle().unwrap();

    {
        let mut seen = seen.lock().unwrap();
        seen.sort();
        assert_eq!(
            *seen,
            vec![
                ("out_a".to_string(), 2, 10),
                ("out_b".to_string(), 2, 20),
            ]
        );
    }

    runtime.close().unwrap();
}

#[test]
fn test_delivery_is_strictly_ascending_and_exactly_once() {
    let mut runtime = load(
        r#"{
            "nodes": [ { "alias": "pass", "type": "PassThrough" } ],
            "input_streams": [ { "name": "in", "to": ["pass.IN:0"] } ],
            "output_streams": [ { "name": "out", "from": "pass.OUT:0" } ]
        }"#,
    );

    let seen: Seen = Arc::new(Mutex::new(Vec::new()));
    runtime
        .observe_output("out", recording_observer("out", &seen))
        .unwrap();
    runtime.start(Default::default()).unwrap();

    for ts in [1i64, 3, 7, 20] {
        runtime
            .send("in", Packet::new(ts as u32, Timestamp::new(ts)))
            .unwrap();
    }
    runtime.close_inputs().unwrap();
    runtime.close().unwrap();

    let seen = seen.lock().unwrap();
    let timestamps: Vec<i64> = seen.iter().map(|(_, ts, _)| *ts).collect();
    assert_eq!(timestamps, vec![1, 3, 7, 20]);
}

#[test]
fn test_out_of_order_send_is_fatal() {
    let mut runtime = load(
        r#"{
            "nodes": [ { "alias": "pass", "type": "PassThrough" } ],
            "input_streams": [ { "name": "in", "to": ["pass.IN:0"] } ],
            "output_streams": [ { "name": "out", "from": "pass.OUT:0" } ]
        }"#,
    );
    runtime.start(Default::default()).unwrap();

    runtime.send("in", Packet::new(1u32, Timestamp::new(5))).unwrap();
    let err = runtime
        .send("in", Packet::new(2u32, Timestamp::new(3)))
        .unwrap_err();
    assert!(matches!(err, FlowError::OrderingViolation { .. }));

    // The violation aborts the run, not just the one send.
    let result = runtime.wait_until_done();
    assert!(matches!(
        result,
        Err(FlowError::OrderingViolation { .. })
    ));
    assert!(runtime.close().is_err());
}

#[test]
fn test_sync_sets_deliver_groups_independently() {
    // With each input in its own sync group, a packet on one stream fires
    // without waiting for the other stream's bound.
    let mut runtime = load(
        r#"{
            "nodes": [
                {
                    "alias": "pass",
                    "type": "PassThrough",
                    "options": { "ports": 2 },
                    "input_policy": { "sync_sets": [["IN:0"], ["IN:1"]] }
                }
            ],
            "input_streams": [
                { "name": "a", "to": ["pass.IN:0"] },
                { "name": "b", "to": ["pass.IN:1"] }
            ],
            "output_streams": [
                { "name": "out_a", "from": "pass.OUT:0" },
                { "name": "out_b", "from": "pass.OUT:1" }
            ]
        }"#,
    );

    let seen: Seen = Arc::new(Mutex::new(Vec::new()));
    runtime
        .observe_output("out_a", recording_observer("out_a", &seen))
        .unwrap();
    runtime.start(Default::default()).unwrap();

    // Under the default policy this would stall until b's bound passes 1.
    runtime.send("a", Packet::new(1u32, Timestamp::new(1))).unwrap();
    runtime.wait_until_idle().unwrap();

    assert_eq!(
        *seen.lock().unwrap(),
        vec![("out_a".to_string(), 1, 1)]
    );

    runtime.close().unwrap();
}

#[test]
fn test_default_policy_waits_for_every_bound() {
    let mut runtime = load(
        r#"{
            "nodes": [
                { "alias": "pass", "type": "PassThrough", "options": { "ports": 2 } }
            ],
            "input_streams": [
                { "name": "a", "to": ["pass.IN:0"] },
                { "name": "b", "to": ["pass.IN:1"] }
            ],
            "output_streams": [ { "name": "out_a", "from": "pass.OUT:0" } ]
        }"#,
    );

    let seen: Seen = Arc::new(Mutex::new(Vec::new()));
    runtime
        .observe_output("out_a", recording_observer("out_a", &seen))
        .unwrap();
    runtime.start(Default::default()).unwrap();

    runtime.send("a", Packet::new(1u32, Timestamp::new(1))).unwrap();
    runtime.wait_until_idle().unwrap();
    // b's bound has not passed timestamp 1: nothing may fire yet.
    assert!(seen.lock().unwrap().is_empty());

    runtime.advance_input_bound("b", Timestamp::new(2)).unwrap();
    runtime.wait_until_idle().unwrap();
    assert_eq!(
        *seen.lock().unwrap(),
        vec![("out_a".to_string(), 1, 1)]
    );

    runtime.close().unwrap();
}
