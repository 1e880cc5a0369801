// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Flow limiter drop semantics: the first packet always passes, later
//! packets pass only once the FINISHED feedback catches up.

use std::sync::{Arc, Mutex};

use packetflow::{global_registry, FlowRuntime, GraphConfig, Packet, Timestamp};

type Seen = Arc<Mutex<Vec<i64>>>;

fn load_limiter_graph() -> FlowRuntime {
    let config = GraphConfig::from_json_str(
        r#"{
            "name": "limited",
            "nodes": [
                { "alias": "limiter", "type": "FlowLimiter", "options": { "max_in_flight": 1 } }
            ],
            "input_streams": [
                { "name": "frames", "to": ["limiter.IN"] },
                { "name": "finished", "to": ["limiter.FINISHED"] }
            ],
            "output_streams": [ { "name": "admitted", "from": "limiter.OUT" } ]
        }"#,
    )
    .unwrap();
    let registry = global_registry();
    let registry = registry.lock();
    FlowRuntime::load(&registry, config).unwrap()
}

#[test]
fn test_limiter_drops_while_feedback_lags() {
    let mut runtime = load_limiter_graph();

    let seen: Seen = Arc::new(Mutex::new(Vec::new()));
    {
        let seen = Arc::clone(&seen);
        runtime
            .observe_output(
                "admitted",
                Box::new(move |packet: &Packet| {
                    seen.lock().unwrap().push(packet.timestamp().ticks());
                    Ok(())
                }),
            )
            .unwrap();
    }

    runtime.start(Default::default()).unwrap();

    // Feedback for an admitted timestamp K arrives only after K+2 has been
    // pushed: 1 admitted, 2 and 3 dropped, feedback(1), 4 admitted, 5
    // dropped.
    let mut send_frame = |ts: i64| {
        runtime
            .send("frames", Packet::new(ts as u32, Timestamp::new(ts)))
            .unwrap();
        runtime.wait_until_idle().unwrap();
    };

    send_frame(1);
    send_frame(2);
    send_frame(3);
    runtime
        .send("finished", Packet::new(1u32, Timestamp::new(1)))
        .unwrap();
    runtime.wait_until_idle().unwrap();
    send_frame(4);
    send_frame(5);

    runtime.close_inputs().unwrap();
    runtime.close().unwrap();

    assert_eq!(*seen.lock().unwrap(), vec![1, 4]);
}

#[test]
fn test_limiter_limit_two_admits_pairs() {
    let config = GraphConfig::from_json_str(
        r#"{
            "nodes": [
                { "alias": "limiter", "type": "FlowLimiter", "options": { "max_in_flight": 2 } }
            ],
            "input_streams": [
                { "name": "frames", "to": ["limiter.IN"] },
                { "name": "finished", "to": ["limiter.FINISHED"] }
            ],
            "output_streams": [ { "name": "admitted", "from": "limiter.OUT" } ]
        }"#,
    )
    .unwrap();
    let registry = global_registry();
    let mut runtime = FlowRuntime::load(&registry.lock(), config).unwrap();

    let seen: Seen = Arc::new(Mutex::new(Vec::new()));
    {
        let seen = Arc::clone(&seen);
        runtime
            .observe_output(
                "admitted",
                Box::new(move |packet: &Packet| {
                    seen.lock().unwrap().push(packet.timestamp().ticks());
                    Ok(())
                }),
            )
            .unwrap();
    }
    runtime.start(Default::default()).unwrap();

    for ts in 1..=4i64 {
        runtime
            .send("frames", Packet::new(ts as u32, Timestamp::new(ts)))
            .unwrap();
        runtime.wait_until_idle().unwrap();
    }

    runtime.close_inputs().unwrap();
    runtime.close().unwrap();

    // Two in flight, no feedback ever: exactly the first two pass.
    assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
}

#[test]
fn test_limiter_in_a_feedback_cycle() {
    // The real topology: the FINISHED edge loops back from downstream,
    // marked back_edge so the forward-cycle check and backpressure skip it.
    let config = GraphConfig::from_json_str(
        r#"{
            "nodes": [
                { "alias": "limiter", "type": "FlowLimiter" },
                { "alias": "worker", "type": "PassThrough" }
            ],
            "connections": [
                { "from": "limiter.OUT", "to": "worker.IN:0" },
                { "from": "worker.OUT:0", "to": "limiter.FINISHED", "back_edge": true }
            ],
            "input_streams": [ { "name": "frames", "to": ["limiter.IN"] } ],
            "output_streams": [ { "name": "results", "from": "worker.OUT:0" } ]
        }"#,
    )
    .unwrap();
    let registry = global_registry();
    let mut runtime = FlowRuntime::load(&registry.lock(), config).unwrap();

    let seen: Seen = Arc::new(Mutex::new(Vec::new()));
    {
        let seen = Arc::clone(&seen);
        runtime
            .observe_output(
                "results",
                Box::new(move |packet: &Packet| {
                    seen.lock().unwrap().push(packet.timestamp().ticks());
                    Ok(())
                }),
            )
            .unwrap();
    }
    runtime.start(Default::default()).unwrap();

    for ts in 1..=5i64 {
        runtime
            .send("frames", Packet::new(ts as u32, Timestamp::new(ts)))
            .unwrap();
        // Let each frame finish its loop before the next arrives: with the
        // feedback keeping pace, nothing is dropped.
        runtime.wait_until_idle().unwrap();
    }

    runtime.close_inputs().unwrap();
    runtime.close().unwrap();

    assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3, 4, 5]);
}
