//! Performance benchmarks for per-tick and per-refresh hot paths

use server::catalog::{Catalog, ItemBaseline, ItemOverride, ProjectileOverride};
use server::config::Config;
use server::connection::ConnectionContext;
use server::game::GameState;
use server::homing::{update_homing, HomingTarget};
use server::inventory::{diff_inventory, Inventory};
use server::masking::{DropCursor, MaskingEnv, MaskingSession};
use server::outbox::Outbox;
use server::probe::CancellationToken;
use server::projectile::{Projectile, ProjectileTable};
use server::scheduler::{ManualScheduler, RetryScheduler, TokioScheduler};
use shared::{ItemStack, Packet, ProjectileState, Vec2, INVENTORY_SIZE, MAX_PROJECTILES};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn large_catalog() -> Catalog {
    let mut catalog = Catalog::new();
    for kind in 1..700 {
        catalog.insert_projectile(
            kind,
            ProjectileOverride {
                velocity_multiplier: 1.25,
                homing_radius: Some(30.0),
                angular_velocity: 0.05,
                ..Default::default()
            },
        );
    }
    for kind in (1..3900).step_by(3) {
        catalog.insert_item(
            kind,
            ItemOverride {
                damage: Some(kind % 50),
                ..Default::default()
            },
        );
        catalog.insert_vanilla(
            kind,
            ItemBaseline {
                damage: 25,
                ..Default::default()
            },
        );
    }
    catalog
}

fn full_inventory() -> Inventory {
    let mut inventory = Inventory::new();
    for slot in 0..INVENTORY_SIZE {
        inventory.set(slot, ItemStack::new(1 + slot as i32 * 7, 0, 1));
    }
    inventory
}

/// Benchmarks the inventory diff engine over a full inventory
#[test]
fn benchmark_inventory_diff() {
    let catalog = large_catalog();
    let inventory = full_inventory();

    let iterations = 10_000;
    let start = Instant::now();

    let mut modified = 0;
    for _ in 0..iterations {
        modified = diff_inventory(&inventory, &catalog)
            .iter()
            .filter(|diff| diff.modified)
            .count();
    }

    let duration = start.elapsed();
    println!(
        "Inventory diff: {} iterations in {:?} ({:.2} μs/iter, {} modified slots)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64,
        modified
    );

    assert!(modified > 0);
    // Should complete in under 2 seconds
    assert!(duration.as_millis() < 2000);
}

/// Benchmarks a homing pass over a full projectile table
#[test]
fn benchmark_homing_full_table() {
    let catalog = large_catalog();
    let mut table = ProjectileTable::new();
    for identity in 0..MAX_PROJECTILES {
        *table.get_mut(identity) = Projectile {
            identity: identity as u16,
            kind: 1 + (identity as i32 % 600),
            owner: (identity % 8) as u32,
            position: Vec2::new(identity as f32, 100.0),
            velocity: Vec2::new(5.0, 0.0),
            active: true,
            time_left: 3600,
            ..Default::default()
        };
    }
    let targets: Vec<HomingTarget> = (0..8)
        .map(|id| HomingTarget {
            id,
            center: Vec2::new(id as f32 * 120.0, 140.0),
        })
        .collect();

    let iterations = 100;
    let start = Instant::now();

    let mut steered = 0;
    for _ in 0..iterations {
        let mut out = Outbox::new();
        steered = update_homing(&mut table, &catalog, &targets, &mut out);
    }

    let duration = start.elapsed();
    println!(
        "Homing pass: {} passes over {} projectiles in {:?} ({:.2} ms/pass)",
        iterations,
        MAX_PROJECTILES,
        duration,
        duration.as_secs_f64() * 1000.0 / iterations as f64
    );

    assert_eq!(steered, MAX_PROJECTILES);
    // Must stay well inside one 60Hz tick on average
    assert!(duration / iterations < Duration::from_millis(16));
}

/// Benchmarks a full masking refresh of a heavily modified inventory
#[test]
fn benchmark_masking_refresh() {
    let catalog = large_catalog();
    let config = Config::default();
    let mut scheduler = ManualScheduler::new();
    let mut drops = DropCursor::new();

    let iterations = 2_000;
    let start = Instant::now();

    for _ in 0..iterations {
        let mut conn = ConnectionContext::new(1);
        conn.inventory = full_inventory();
        let mut session = MaskingSession::new();
        let mut out = Outbox::new();
        let mut env = MaskingEnv {
            catalog: &catalog,
            config: &config,
            scheduler: &mut scheduler,
            drops: &mut drops,
            out: &mut out,
        };
        session.refresh(&mut conn, &mut env);
        session.abort(1, &mut scheduler);
    }

    let duration = start.elapsed();
    println!(
        "Masking refresh: {} iterations in {:?} ({:.2} μs/iter)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    assert!(duration.as_millis() < 2000);
}

/// Benchmarks spawn interception through the game state
#[test]
fn benchmark_spawn_interception() {
    let mut game = GameState::new(
        Arc::new(large_catalog()),
        Config::default(),
        ManualScheduler::new(),
    );
    game.add_player(1);
    game.set_hostile(1, true).unwrap();

    let iterations = 50_000;
    let start = Instant::now();

    for i in 0..iterations {
        let state = ProjectileState {
            identity: (i % MAX_PROJECTILES) as u16,
            kind: 1 + (i % 600) as i32,
            owner: 1,
            position: Vec2::ZERO,
            velocity: Vec2::new(4.0, 1.0),
            knockback: 1.0,
            damage: 10,
            ai0: 0.0,
        };
        game.spawn_projectile(1, state, 0).unwrap();
        if i % 1000 == 0 {
            game.drain_outbox();
        }
    }

    let duration = start.elapsed();
    println!(
        "Spawn interception: {} spawns in {:?} ({:.2} μs/spawn)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    assert!(duration.as_millis() < 2000);
}

/// Benchmarks network packet serialization performance
#[test]
fn benchmark_packet_serialization() {
    use bincode::{deserialize, serialize};

    let packet = Packet::ProjectileNew {
        state: ProjectileState {
            identity: 999,
            kind: 207,
            owner: 3,
            position: Vec2::new(1000.0, 200.0),
            velocity: Vec2::new(6.0, -2.0),
            knockback: 4.5,
            damage: 70,
            ai0: 0.0,
        },
        source_item: 757,
    };

    let iterations = 100_000;
    let start = Instant::now();

    for _ in 0..iterations {
        let serialized = serialize(&packet).unwrap();
        let _deserialized: Packet = deserialize(&serialized).unwrap();
    }

    let duration = start.elapsed();
    println!(
        "Packet serialization: {} iterations in {:?} ({:.2} μs/iter)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    assert!(duration.as_millis() < 2000);
}

/// Stress tests arming and disarming tokio retry timers
#[test]
fn stress_test_retry_timers() {
    tokio_test::block_on(async {
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let mut scheduler = TokioScheduler::new(tx);

        let iterations = 10_000;
        let start = Instant::now();

        for i in 0..iterations {
            let client_id = i % 64;
            scheduler.arm(client_id, Duration::from_secs(1), CancellationToken::new());
            if i % 2 == 1 {
                scheduler.disarm(client_id);
            }
        }

        let duration = start.elapsed();
        println!(
            "Retry timers: {} arm/disarm operations in {:?}",
            iterations, duration
        );

        assert!(duration.as_millis() < 2000);
    });
}
