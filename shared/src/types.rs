//! Plain data carried between the simulation and the wire.

use std::fmt;
use std::ops::{Add, Mul, Sub};

/// Integer 2D vector used for positions and movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Vec2 {
    pub x: i32,
    pub y: i32,
}

impl Vec2 {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Divides both components, rounding away from zero. A non-zero
    /// component never collapses to zero.
    pub fn div_away_from_zero(self, divisor: f64) -> Vec2 {
        fn component(value: i32, divisor: f64) -> i32 {
            let scaled = value as f64 / divisor;
            if value < 0 {
                scaled.floor() as i32
            } else if value > 0 {
                scaled.ceil() as i32
            } else {
                0
            }
        }

        Vec2 {
            x: component(self.x, divisor),
            y: component(self.y, divisor),
        }
    }
}

impl Add for Vec2 {
    type Output = Vec2;

    fn add(self, other: Vec2) -> Vec2 {
        Vec2::new(self.x + other.x, self.y + other.y)
    }
}

impl Sub for Vec2 {
    type Output = Vec2;

    fn sub(self, other: Vec2) -> Vec2 {
        Vec2::new(self.x - other.x, self.y - other.y)
    }
}

impl Mul<i32> for Vec2 {
    type Output = Vec2;

    fn mul(self, scalar: i32) -> Vec2 {
        Vec2::new(self.x * scalar, self.y * scalar)
    }
}

impl fmt::Display for Vec2 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Movement intent with each axis constrained to -1, 0 or 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MoveIntent {
    dx: i8,
    dy: i8,
}

impl MoveIntent {
    pub const NONE: MoveIntent = MoveIntent { dx: 0, dy: 0 };

    /// Builds an intent, clamping each axis into `-1..=1`.
    pub fn new(dx: i8, dy: i8) -> Self {
        Self {
            dx: dx.signum(),
            dy: dy.signum(),
        }
    }

    pub fn dx(&self) -> i8 {
        self.dx
    }

    pub fn dy(&self) -> i8 {
        self.dy
    }

    pub fn is_none(&self) -> bool {
        self.dx == 0 && self.dy == 0
    }

    pub fn is_diagonal(&self) -> bool {
        self.dx != 0 && self.dy != 0
    }

    pub fn as_vec(&self) -> Vec2 {
        Vec2::new(self.dx as i32, self.dy as i32)
    }

    /// Packs the intent into the movement byte: `0000xxyy`.
    pub fn pack(&self) -> u8 {
        (pack_axis(self.dx) << 2) | pack_axis(self.dy)
    }

    /// Unpacks a movement byte. The unused `0b11` code reads as zero.
    pub fn unpack(byte: u8) -> Self {
        Self {
            dx: unpack_axis((byte >> 2) & 0b11),
            dy: unpack_axis(byte & 0b11),
        }
    }
}

fn pack_axis(value: i8) -> u8 {
    match value {
        1 => 0b01,
        -1 => 0b10,
        _ => 0b00,
    }
}

fn unpack_axis(bits: u8) -> i8 {
    match bits {
        0b01 => 1,
        0b10 => -1,
        _ => 0,
    }
}

impl fmt::Display for MoveIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.dx, self.dy)
    }
}

/// Display colour of a player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.r, self.g, self.b)
    }
}

/// One entry of a Player-list message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayerRecord {
    pub id: u8,
    pub x: u16,
    pub y: u16,
    pub color: Color,
}

impl PlayerRecord {
    pub const ENCODED_SIZE: usize = 8;
}

/// One entry of a Projectile-list message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProjectileRecord {
    pub x: u16,
    pub y: u16,
}

impl ProjectileRecord {
    pub const ENCODED_SIZE: usize = 4;
}

/// Why the server is dropping a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DisconnectReason {
    Kicked,
    Killed,
    ServerClosed,
}

impl DisconnectReason {
    pub fn code(self) -> u8 {
        match self {
            DisconnectReason::Kicked => 0,
            DisconnectReason::Killed => 1,
            DisconnectReason::ServerClosed => 2,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(DisconnectReason::Kicked),
            1 => Some(DisconnectReason::Killed),
            2 => Some(DisconnectReason::ServerClosed),
            _ => None,
        }
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            DisconnectReason::Kicked => "kicked",
            DisconnectReason::Killed => "killed",
            DisconnectReason::ServerClosed => "server closed",
        };
        f.write_str(text)
    }
}

/// Saturates a world coordinate into the 16-bit wire range.
pub fn wire_coord(value: i32) -> u16 {
    value.clamp(0, u16::MAX as i32) as u16
}
