//! Performance benchmarks for critical game systems

use assert_approx_eq::assert_approx_eq;
use server::game::{GameState, Projectile};
use shared::{
    heading_step, Color, FrameReader, FrameWriter, Message, MoveIntent, PlayerRecord, ProjectileRecord,
    Vec2, HEADING_RANGE, PROJECTILE_SPEED,
};
use std::time::Instant;

fn full_player_list() -> Message {
    Message::PlayerList {
        players: (0..=255u8)
            .map(|id| PlayerRecord {
                id,
                x: id as u16 * 6,
                y: id as u16 * 3,
                color: Color::new(id, id, id),
            })
            .collect(),
    }
}

/// Benchmarks encoding and decoding the largest player list
#[test]
fn benchmark_player_list_codec() {
    let message = full_player_list();
    let iterations = 10_000;
    let start = Instant::now();

    for _ in 0..iterations {
        let bytes = message.encode();
        let decoded = Message::decode(&bytes).unwrap();
        assert_eq!(bytes.len(), 1 + 256 * PlayerRecord::ENCODED_SIZE);
        std::hint::black_box(decoded);
    }

    let duration = start.elapsed();
    println!(
        "Player list codec: {} iterations in {:?} ({:.2} μs/iter)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    // Should complete in under 5 seconds even unoptimized
    assert!(duration.as_millis() < 5000);
}

/// Benchmarks the movement/heading codecs used on every client message
#[test]
fn benchmark_small_message_codec() {
    let messages = [
        Message::MovementUpdate {
            intent: MoveIntent::new(-1, 1),
        },
        Message::CreateProjectile { heading: 27_000 },
        Message::PlayerListRequest,
    ];

    let iterations = 100_000;
    let start = Instant::now();

    for i in 0..iterations {
        let message = &messages[i % messages.len()];
        let decoded = Message::decode(&message.encode()).unwrap();
        assert_eq!(&decoded, message);
    }

    let duration = start.elapsed();
    println!(
        "Small message codec: {} iterations in {:?} ({:.2} ns/iter)",
        iterations,
        duration,
        duration.as_nanos() as f64 / iterations as f64
    );

    assert!(duration.as_millis() < 2000);
}

/// Benchmarks heading to step conversion across the full heading range
#[test]
fn benchmark_heading_step() {
    let start = Instant::now();
    let mut longest = 0.0f64;

    for heading in 0..HEADING_RANGE {
        let step = heading_step(heading);
        longest = longest.max(((step.x * step.x + step.y * step.y) as f64).sqrt());
    }

    let duration = start.elapsed();
    println!("Heading step: {} headings in {:?}", HEADING_RANGE, duration);

    assert_approx_eq!(longest, PROJECTILE_SPEED, 1e-9);
    assert!(duration.as_millis() < 1000);
}

/// Benchmarks a full tick with a crowded world
#[test]
fn benchmark_crowded_tick() {
    let mut game = GameState::with_seed(99);
    for id in 0..=255u8 {
        game.add_random_player(id);
        game.set_intent(id, MoveIntent::new((id % 3) as i8 - 1, (id % 2) as i8))
            .unwrap();
    }
    // Owned by their shooter at spawn, so nobody dies before moving apart
    let owners: Vec<(u8, Vec2)> = game.players().map(|p| (p.id, p.pos)).collect();
    for (i, (id, pos)) in owners.iter().cycle().take(2000).enumerate() {
        game.add_projectile(Projectile {
            pos: *pos,
            heading: ((i * 97) % HEADING_RANGE as usize) as u16,
            owner: Some(*id),
        });
    }

    let ticks = 100;
    let start = Instant::now();
    let mut killed = 0;

    for _ in 0..ticks {
        let outcome = game.update();
        killed += outcome.killed.len();
    }

    let duration = start.elapsed();
    println!(
        "Crowded tick: {} ticks in {:?} ({:.2} ms/tick, {} killed)",
        ticks,
        duration,
        duration.as_secs_f64() * 1000.0 / ticks as f64,
        killed
    );

    assert!(killed <= 256);
    assert!(duration.as_millis() < 10_000);
}

/// Benchmarks framed transport over an in-memory stream
#[test]
fn benchmark_frame_transport() {
    let list = Message::ProjectileList {
        projectiles: (0..1000u16)
            .map(|i| ProjectileRecord { x: i, y: i })
            .collect(),
    };
    let frames = 500;

    let start = Instant::now();
    tokio_test::block_on(async {
        let (a, b) = tokio::io::duplex(1 << 20);
        let mut writer = FrameWriter::new(a);
        let mut reader = FrameReader::new(b);

        let send = async {
            for _ in 0..frames {
                writer.write_message(&list).await.unwrap();
            }
        };
        let receive = async {
            for _ in 0..frames {
                assert_eq!(reader.read_message().await.unwrap().as_ref(), Some(&list));
            }
        };
        tokio::join!(send, receive);
    });

    let duration = start.elapsed();
    println!("Frame transport: {} frames in {:?}", frames, duration);
    assert!(duration.as_millis() < 5000);
}
