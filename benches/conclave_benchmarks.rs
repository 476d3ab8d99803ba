// =============================================================================
// Conclave Federated Room Server - Benchmarks
// =============================================================================
//
// Project: Conclave - High Performance Federated Room Messaging Server Core
// Author: Conclave Development Team
// Date: 2025-06-20
// Version: 0.1.0-alpha (Pluggable Storage Backend)
// License: Apache 2.0 / MIT
//
// Description:
//   Criterion benchmarks for the pure authorization path, the hottest
//   code the pipeline runs per event.
//
// =============================================================================

use std::sync::Arc;

use conclave::{
    service::auth::{allowed, state_needed_for_auth, AuthEventMap},
    PduEvent,
};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use serde_json::json;

fn parse(value: serde_json::Value) -> Arc<PduEvent> {
    Arc::new(PduEvent::parse(value.to_string().as_bytes()).expect("bench event parses"))
}

fn bench_room() -> AuthEventMap {
    let mut map = AuthEventMap::new();
    map.insert(parse(json!({
        "event_id": "$create:bench",
        "room_id": "!room:bench",
        "sender": "@alice:bench",
        "type": "m.room.create",
        "state_key": "",
        "content": {"creator": "@alice:bench"},
        "prev_events": [],
        "depth": 0,
    })))
    .unwrap();
    map.insert(parse(json!({
        "event_id": "$join:bench",
        "room_id": "!room:bench",
        "sender": "@alice:bench",
        "type": "m.room.member",
        "state_key": "@alice:bench",
        "content": {"membership": "join"},
        "prev_events": ["$create:bench"],
        "depth": 1,
    })))
    .unwrap();
    map.insert(parse(json!({
        "event_id": "$power:bench",
        "room_id": "!room:bench",
        "sender": "@alice:bench",
        "type": "m.room.power_levels",
        "state_key": "",
        "content": {"users": {"@alice:bench": 100}},
        "prev_events": ["$join:bench"],
        "depth": 2,
    })))
    .unwrap();
    map.insert(parse(json!({
        "event_id": "$rules:bench",
        "room_id": "!room:bench",
        "sender": "@alice:bench",
        "type": "m.room.join_rules",
        "state_key": "",
        "content": {"join_rule": "public"},
        "prev_events": ["$power:bench"],
        "depth": 3,
    })))
    .unwrap();
    map
}

fn auth_benchmarks(c: &mut Criterion) {
    let map = bench_room();

    let message = parse(json!({
        "event_id": "$message:bench",
        "room_id": "!room:bench",
        "sender": "@alice:bench",
        "type": "m.room.message",
        "content": {"body": "benchmark payload"},
        "prev_events": ["$rules:bench"],
        "depth": 4,
    }));
    c.bench_function("allowed_message", |b| {
        b.iter(|| allowed(black_box(&message), &map))
    });

    let join = parse(json!({
        "event_id": "$joinb:bench",
        "room_id": "!room:bench",
        "sender": "@bob:bench",
        "type": "m.room.member",
        "state_key": "@bob:bench",
        "content": {"membership": "join"},
        "prev_events": ["$rules:bench"],
        "depth": 4,
    }));
    c.bench_function("allowed_membership", |b| {
        b.iter(|| allowed(black_box(&join), &map))
    });

    c.bench_function("state_needed_for_auth", |b| {
        b.iter(|| state_needed_for_auth(black_box(&[join.as_ref(), message.as_ref()])))
    });
}

criterion_group!(benches, auth_benchmarks);
criterion_main!(benches);
