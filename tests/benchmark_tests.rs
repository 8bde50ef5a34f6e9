//! Performance benchmarks for the session hot paths

use client::peer::{Peer, PeerConfig};
use server::authority::Authority;
use shared::role::resolve_remote;
use shared::{apply_movement, decode, encode, MoveAxis, Packet, Transform};
use std::time::Instant;
use tokio::sync::mpsc;

/// Benchmarks rating commands through the authority
#[test]
fn benchmark_authority_rating_commands() {
    let mut authority = Authority::new(2.0, Some(1));
    authority.join(1, true).unwrap();
    authority.join(2, false).unwrap();

    let iterations = 100_000;
    let start = Instant::now();

    for i in 0..iterations {
        let out = authority
            .handle_command(
                2,
                Packet::RatePlayer {
                    rating: i,
                    base: i - 1,
                },
            )
            .unwrap();
        assert_eq!(out.len(), 1);
    }

    let duration = start.elapsed();
    println!(
        "Rating commands: {} iterations in {:?} ({:.2} ns/iter)",
        iterations,
        duration,
        duration.as_nanos() as f64 / iterations as f64
    );

    assert_eq!(authority.session().rating(), iterations - 1);
    // Should complete in under 1 second
    assert!(duration.as_millis() < 1000);
}

/// Benchmarks applying rating broadcasts on a peer
#[test]
fn benchmark_peer_rating_broadcasts() {
    let (tx, _rx) = mpsc::unbounded_channel();
    let mut peer = Peer::new(PeerConfig::default(), false, tx);

    let iterations = 100_000;
    let start = Instant::now();

    for i in 0..iterations {
        peer.handle_packet(Packet::PlayerRated {
            rating: i,
            origin: 9,
        });
    }

    let duration = start.elapsed();
    println!(
        "Rating broadcasts: {} iterations in {:?} ({:.2} ns/iter)",
        iterations,
        duration,
        duration.as_nanos() as f64 / iterations as f64
    );

    assert_eq!(peer.replica().label().text(), format!("Rating : {}", iterations - 1));
    assert!(duration.as_millis() < 1000);
}

/// Benchmarks role resolution for mirrored entities
#[test]
fn benchmark_role_resolution() {
    let iterations = 1_000_000u32;
    let start = Instant::now();
    let mut hosts = 0;

    for i in 0..iterations {
        if resolve_remote(i % 16, 3).is_host() {
            hosts += 1;
        }
    }

    let duration = start.elapsed();
    println!(
        "Role resolution: {} iterations in {:?}",
        iterations, duration
    );

    assert_eq!(hosts, iterations / 16);
    assert!(duration.as_millis() < 1000);
}

/// Benchmarks packet encoding and decoding
#[test]
fn benchmark_packet_serialization() {
    let packet = Packet::EntityMoved {
        entity_id: 42,
        transform: Transform::new(1.5, -2.5),
    };

    let iterations = 100_000;
    let start = Instant::now();

    for _ in 0..iterations {
        let bytes = encode(&packet).unwrap();
        let _ = decode(&bytes).unwrap();
    }

    let duration = start.elapsed();
    println!(
        "Packet serialization: {} iterations in {:?} ({:.2} ns/iter)",
        iterations,
        duration,
        duration.as_nanos() as f64 / iterations as f64
    );

    assert!(duration.as_millis() < 2000);
}

/// Stress test: many peers joining and leaving one authority
#[test]
fn stress_test_join_and_leave() {
    let mut authority = Authority::new(2.0, Some(3));
    authority.join(0, true).unwrap();
    authority.handle_command(0, Packet::SetPlayer { entity_id: 1 }).unwrap();

    let start = Instant::now();
    for peer in 1..=500 {
        authority.join(peer, false).unwrap();
    }
    for peer in 1..=500 {
        authority.leave(peer);
    }
    let duration = start.elapsed();
    println!("Join/leave of 500 peers in {:?}", duration);

    assert_eq!(authority.entity_count(), 1);
    assert_eq!(authority.session().active_player(), Some(1));
    assert!(duration.as_millis() < 2000);
}

/// Benchmarks per-frame movement
#[test]
fn benchmark_movement() {
    let mut transform = Transform::default();
    let axis = MoveAxis {
        vertical: 1.0,
        horizontal: 1.0,
    };

    let iterations = 1_000_000;
    let start = Instant::now();
    for _ in 0..iterations {
        apply_movement(&mut transform, axis, 2.0, 1.0 / 60.0, true);
    }
    let duration = start.elapsed();
    println!("Movement: {} iterations in {:?}", iterations, duration);

    assert!(transform.z > 0.0);
    assert!(duration.as_millis() < 1000);
}
