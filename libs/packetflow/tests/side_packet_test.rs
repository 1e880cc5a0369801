// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Side packets: bound once per run before processing, immutable
//! thereafter, and propagated from producer opens to consumer opens in
//! topological order.

use std::sync::{Arc, Mutex};

use packetflow::{
    global_registry, FlowError, FlowRuntime, GraphConfig, Node, NodeContext, NodeContract,
    Packet, PortDecl, ProcessOutcome, Result, SidePackets, Timestamp,
};

/// Prepends a prefix (taken from a required side packet) to every string
/// packet passing through.
struct Tagger {
    prefix: String,
}

impl Node for Tagger {
    fn contract(&self) -> NodeContract {
        NodeContract::new()
            .input(PortDecl::new("IN").typed::<String>())
            .output(PortDecl::new("OUT").typed::<String>())
            .side_input(PortDecl::new("PREFIX").typed::<String>())
    }

    fn open(&mut self, ctx: &mut NodeContext<'_>) -> Result<()> {
        let packet = ctx.side("PREFIX").ok_or_else(|| {
            FlowError::NotFound("PREFIX side packet missing".to_string())
        })?;
        self.prefix = packet.value::<String>()?.clone();
        Ok(())
    }

    fn process(&mut self, ctx: &mut NodeContext<'_>) -> Result<ProcessOutcome> {
        if let Some(packet) = ctx.inputs().get(0).cloned() {
            let tagged = format!("{}{}", self.prefix, packet.value::<String>()?);
            ctx.emit_value("OUT", tagged, packet.timestamp())?;
        }
        Ok(ProcessOutcome::Continue)
    }
}

fn tagger_factory(_options: &serde_json::Value) -> Result<Box<dyn Node>> {
    Ok(Box::new(Tagger {
        prefix: String::new(),
    }))
}

/// Publishes a side packet from its open phase, then stops immediately.
struct PrefixProvider;

impl Node for PrefixProvider {
    fn contract(&self) -> NodeContract {
        NodeContract::new()
            .output(PortDecl::new("OUT"))
            .side_output(PortDecl::new("PREFIX_OUT").typed::<String>())
    }

    fn open(&mut self, ctx: &mut NodeContext<'_>) -> Result<()> {
        ctx.emit_side("PREFIX_OUT", Packet::side("gen:".to_string()))
    }

    fn process(&mut self, _ctx: &mut NodeContext<'_>) -> Result<ProcessOutcome> {
        Ok(ProcessOutcome::Stop)
    }
}

fn provider_factory(_options: &serde_json::Value) -> Result<Box<dyn Node>> {
    Ok(Box::new(PrefixProvider))
}

fn register_nodes() {
    let registry = global_registry();
    let mut registry = registry.lock();
    if !registry.contains("Tagger") {
        registry.register_node("Tagger", tagger_factory).unwrap();
    }
    if !registry.contains("PrefixProvider") {
        registry
            .register_node("PrefixProvider", provider_factory)
            .unwrap();
    }
}

#[test]
fn test_externally_provided_side_packet() {
    register_nodes();

    let config = GraphConfig::from_json_str(
        r#"{
            "nodes": [ { "alias": "tag", "type": "Tagger" } ],
            "input_streams": [ { "name": "in", "to": ["tag.IN"] } ],
            "output_streams": [ { "name": "out", "from": "tag.OUT" } ],
            "side_packets": [ { "name": "prefix", "to": "tag.PREFIX" } ]
        }"#,
    )
    .unwrap();
    let registry = global_registry();
    let mut runtime = FlowRuntime::load(&registry.lock(), config).unwrap();

    let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    {
        let seen = Arc::clone(&seen);
        runtime
            .observe_output(
                "out",
                Box::new(move |packet: &Packet| {
                    seen.lock().unwrap().push(packet.value::<String>()?.clone());
                    Ok(())
                }),
            )
            .unwrap();
    }

    let mut side_packets = SidePackets::new();
    side_packets.insert("prefix".to_string(), Packet::side("ext:".to_string()));
    runtime.start(side_packets).unwrap();

    runtime
        .send("in", Packet::new("hello".to_string(), Timestamp::new(1)))
        .unwrap();
    runtime.close_inputs().unwrap();
    runtime.close().unwrap();

    assert_eq!(*seen.lock().unwrap(), vec!["ext:hello".to_string()]);
}

#[test]
fn test_missing_required_side_packet_fails_start() {
    register_nodes();

    let config = GraphConfig::from_json_str(
        r#"{
            "nodes": [ { "alias": "tag", "type": "Tagger" } ],
            "input_streams": [ { "name": "in", "to": ["tag.IN"] } ],
            "output_streams": [ { "name": "out", "from": "tag.OUT" } ],
            "side_packets": [ { "name": "prefix", "to": "tag.PREFIX" } ]
        }"#,
    )
    .unwrap();
    let registry = global_registry();
    let mut runtime = FlowRuntime::load(&registry.lock(), config).unwrap();

    let err = runtime.start(SidePackets::new()).unwrap_err();
    assert!(err.to_string().contains("Required side packet 'prefix'"));
}

#[test]
fn test_unbound_side_packet_reference_rejected_at_load() {
    register_nodes();

    // The Tagger's required PREFIX side input has no binding at all.
    let config = GraphConfig::from_json_str(
        r#"{
            "nodes": [ { "alias": "tag", "type": "Tagger" } ],
            "input_streams": [ { "name": "in", "to": ["tag.IN"] } ],
            "output_streams": [ { "name": "out", "from": "tag.OUT" } ]
        }"#,
    )
    .unwrap();
    let registry = global_registry();
    let err = FlowRuntime::load(&registry.lock(), config).unwrap_err();
    assert!(err
        .to_string()
        .contains("Required side input 'tag.PREFIX' is not bound"));
}

#[test]
fn test_side_packet_produced_by_upstream_open() {
    register_nodes();

    // PrefixProvider emits the side packet during open; Tagger, deeper in
    // the topology, reads it in its own open.
    let config = GraphConfig::from_json_str(
        r#"{
            "nodes": [
                { "alias": "provider", "type": "PrefixProvider" },
                { "alias": "tag", "type": "Tagger" }
            ],
            "connections": [ { "from": "provider.OUT", "to": "tag.IN" } ],
            "output_streams": [ { "name": "out", "from": "tag.OUT" } ],
            "side_packets": [
                { "name": "prefix", "from": "provider.PREFIX_OUT" },
                { "name": "prefix", "to": "tag.PREFIX" }
            ]
        }"#,
    )
    .unwrap();
    let registry = global_registry();
    let mut runtime = FlowRuntime::load(&registry.lock(), config).unwrap();

    runtime.start(SidePackets::new()).unwrap();
    runtime.wait_until_done().unwrap();
    runtime.close().unwrap();
}
