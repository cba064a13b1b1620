//! Performance benchmarks for the relay hot paths

use server::config::RelayConfig;
use server::relay::EventRelay;
use shared::{ClientEvent, ConnectionId, ServerEvent};
use std::time::Instant;

fn populated_relay(room: &str, players: usize) -> (EventRelay, Vec<ConnectionId>) {
    let mut relay = EventRelay::new(&RelayConfig::default());
    let ids: Vec<ConnectionId> = (0..players).map(|_| ConnectionId::new()).collect();

    for id in &ids {
        relay.connect(*id);
        relay.handle(
            *id,
            ClientEvent::JoinRoom {
                room: Some(room.to_string()),
            },
        );
    }
    (relay, ids)
}

/// Benchmarks movement fan-out in a busy room
#[test]
fn benchmark_move_fanout() {
    let (mut relay, ids) = populated_relay("lobby", 50);

    let iterations = 10_000;
    let start = Instant::now();
    let mut delivered = 0;

    for i in 0..iterations {
        let sender = ids[i % ids.len()];
        let outcome = relay.handle(
            sender,
            ClientEvent::PlayerMove {
                x: i as f64,
                y: i as f64,
            },
        );
        delivered += outcome.envelopes().len();
    }

    let duration = start.elapsed();
    println!(
        "Move fan-out: {} moves, {} envelopes in {:?} ({:.2} μs/move)",
        iterations,
        delivered,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    assert_eq!(delivered, iterations * (ids.len() - 1));
    // Should complete in under 2 seconds
    assert!(duration.as_millis() < 2000);
}

/// Benchmarks join and disconnect churn across many rooms
#[test]
fn stress_test_join_churn() {
    let mut relay = EventRelay::new(&RelayConfig::default());

    let iterations = 5_000;
    let start = Instant::now();

    for i in 0..iterations {
        let id = ConnectionId::new();
        relay.connect(id);
        relay.handle(
            id,
            ClientEvent::JoinRoom {
                room: Some(format!("room-{}", i % 100)),
            },
        );
        if i % 2 == 0 {
            relay.disconnect(id);
        }
    }

    let duration = start.elapsed();
    println!("Join churn: {} joins in {:?}", iterations, duration);

    let stats = relay.stats();
    assert_eq!(stats.players, iterations / 2);
    assert_eq!(stats.connections, iterations / 2);
    assert!(duration.as_millis() < 2000);
}

/// Benchmarks decoding inbound frames and encoding broadcasts
#[test]
fn benchmark_frame_codec() {
    let inbound = r#"{"event":"playerMove","data":{"x":512.5,"y":384.25}}"#;
    let outbound = ServerEvent::PlayerMoved {
        player_id: ConnectionId::new(),
        x: 512.5,
        y: 384.25,
        character: shared::Character::new(3),
    };

    let iterations = 50_000;
    let start = Instant::now();

    for _ in 0..iterations {
        let event = ClientEvent::decode(inbound).unwrap();
        assert!(matches!(event, ClientEvent::PlayerMove { .. }));
        let json = outbound.encode().unwrap();
        assert!(!json.is_empty());
    }

    let duration = start.elapsed();
    println!(
        "Frame codec: {} round trips in {:?} ({:.2} μs/iter)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    assert!(duration.as_millis() < 3000);
}

/// Benchmarks room status snapshots for a full room
#[test]
fn benchmark_room_status() {
    let (mut relay, ids) = populated_relay("lobby", 200);

    let iterations = 1_000;
    let start = Instant::now();

    for i in 0..iterations {
        let outcome = relay.handle(ids[i % ids.len()], ClientEvent::GetRoomStatus);
        match &outcome.envelopes()[0].event {
            ServerEvent::RoomStatus { players_in_room, .. } => assert_eq!(*players_in_room, 200),
            other => panic!("Unexpected event: {:?}", other),
        }
    }

    let duration = start.elapsed();
    println!("Room status: {} snapshots in {:?}", iterations, duration);

    assert!(duration.as_millis() < 3000);
}
