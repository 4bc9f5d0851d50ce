//! Performance benchmarks for the replication hot paths

use bincode::{deserialize, serialize};
use client::game::ObserverState;
use client::presentation::NullPresentation;
use server::config::ServerConfig;
use server::world::World;
use shared::{
    Color, EntityId, FieldId, FieldSet, FieldUpdate, FieldValue, Packet, PlayerFields, Role,
    SceneLayout, Vec3,
};
use std::time::Instant;

fn seeded_world() -> World {
    let config = ServerConfig {
        seed: Some(7),
        ..Default::default()
    };
    World::new(config, SceneLayout::default())
}

/// Benchmarks field update serialization
#[test]
fn benchmark_field_update_serialization() {
    let packet = Packet::Field(FieldUpdate {
        entity: EntityId(12),
        field: FieldId::Position,
        revision: 4096,
        value: FieldValue::Vec3(Vec3::new(1.5, 0.0, -3.25)),
    });

    let iterations = 100_000;
    let start = Instant::now();

    for _ in 0..iterations {
        let bytes = serialize(&packet).unwrap();
        let _: Packet = deserialize(&bytes).unwrap();
    }

    let duration = start.elapsed();
    println!(
        "Field update round trip: {} iterations in {:?} ({:.2} ns/iter)",
        iterations,
        duration,
        duration.as_nanos() as f64 / iterations as f64
    );

    assert!(duration.as_millis() < 2000);
}

/// Benchmarks draining and applying a busy player's field set
#[test]
fn benchmark_field_set_drain_and_apply() {
    let mut authority = PlayerFields::spawned(Role::Authority, Color::WHITE, Vec3::ZERO, 0.0);
    let mut mirror = PlayerFields::new(Role::Observer);
    let mut updates = Vec::new();

    let iterations = 50_000;
    let start = Instant::now();

    for i in 0..iterations {
        authority.position.set(Vec3::new(i as f32, 0.0, 0.0)).unwrap();
        authority.yaw.set((i % 360) as f32).unwrap();
        updates.clear();
        authority.drain_updates(EntityId(1), &mut updates);
        for update in &updates {
            mirror.apply_update(update);
        }
    }

    let duration = start.elapsed();
    println!(
        "Drain and apply: {} iterations in {:?} ({:.2} μs/iter)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    assert_eq!(*mirror.position.get(), Vec3::new((iterations - 1) as f32, 0.0, 0.0));
    assert!(duration.as_millis() < 2000);
}

/// Benchmarks authority ticks with a full arena of shooting players
#[test]
fn benchmark_world_tick_with_projectiles() {
    let mut world = seeded_world();
    let players: Vec<EntityId> = (1..=16)
        .map(|client| {
            world.session_mut().connect(client);
            world.spawn_player(client)
        })
        .collect();

    let dt = 1.0 / 60.0;
    let iterations = 600;
    let start = Instant::now();

    for _ in 0..iterations {
        for (i, id) in players.iter().enumerate() {
            let _ = world.move_player(*id, 1.0, 0.5, i % 2 == 0);
        }
        world.tick(dt);
        world.session_mut().drain_outbox();
    }

    let duration = start.elapsed();
    println!(
        "World tick: {} ticks with {} players in {:?} ({:.2} μs/tick)",
        iterations,
        players.len(),
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    assert!(duration.as_millis() < 5000);
}

/// Benchmarks a late joiner consuming a full snapshot
#[test]
fn benchmark_snapshot_application() {
    let mut world = seeded_world();
    for client in 1..=16 {
        world.spawn_player(client);
    }
    let snapshot: Vec<Vec<u8>> = world
        .snapshot()
        .iter()
        .map(|p| serialize(p).unwrap())
        .collect();

    let iterations = 500;
    let start = Instant::now();

    for _ in 0..iterations {
        let mut observer = ObserverState::new(SceneLayout::default());
        for bytes in &snapshot {
            observer.apply_packet(deserialize(bytes).unwrap(), &mut NullPresentation);
        }
        assert_eq!(observer.entity_count(), world.entity_count());
    }

    let duration = start.elapsed();
    println!(
        "Snapshot application: {} snapshots of {} packets in {:?} ({:.2} μs/snapshot)",
        iterations,
        snapshot.len(),
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    assert!(duration.as_millis() < 5000);
}
