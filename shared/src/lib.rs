//! Protocol pieces shared by the arena server and its clients: world
//! constants, the wire codec and the length-prefixed frame transport.

pub mod codec;
pub mod frame;
pub mod types;

pub use codec::{CodecError, Message};
pub use frame::{FrameError, FrameReader, FrameWriter};
pub use types::{Color, DisconnectReason, MoveIntent, PlayerRecord, ProjectileRecord, Vec2};

pub const WORLD_WIDTH: i32 = 1600;
pub const WORLD_HEIGHT: i32 = 900;

pub const PLAYER_RADIUS: i32 = 50;
/// Units per tick along each moving axis.
pub const PLAYER_SPEED: i32 = 3;
/// Diagonal velocity is divided by this before being applied.
pub const DIAGONAL_DIVISOR: f64 = 1.2;

/// Units per tick along the heading.
pub const PROJECTILE_SPEED: f64 = 10.0;
/// Headings are centidegrees in `0..HEADING_RANGE`, 0 pointing up, clockwise.
pub const HEADING_RANGE: u16 = 36_000;

/// Player ids are a single byte on the wire.
pub const MAX_PLAYERS: usize = 256;

pub const DEFAULT_TICK_RATE: u32 = 60;

/// Whether a point lies inside the world rectangle, edges included.
pub fn in_world(pos: Vec2) -> bool {
    (0..=WORLD_WIDTH).contains(&pos.x) && (0..=WORLD_HEIGHT).contains(&pos.y)
}

/// Per-tick displacement of a projectile travelling along `heading`.
///
/// The heading is shifted by -90 degrees so that 0 points towards negative
/// y, then each component is truncated toward zero.
pub fn heading_step(heading: u16) -> Vec2 {
    let angle = (heading as f64 / 100.0 - 90.0).to_radians();
    Vec2::new(
        (PROJECTILE_SPEED * angle.cos()) as i32,
        (PROJECTILE_SPEED * angle.sin()) as i32,
    )
}
