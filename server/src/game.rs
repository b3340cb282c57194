//! Authoritative world state and the fixed-tick update.

use log::{debug, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::{
    heading_step, in_world, types::wire_coord, Color, Message, MoveIntent, PlayerRecord,
    ProjectileRecord, Vec2, DIAGONAL_DIVISOR, HEADING_RANGE, PLAYER_RADIUS, PLAYER_SPEED,
    WORLD_HEIGHT, WORLD_WIDTH,
};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SimulationError {
    #[error("no player with id {0}")]
    UnknownPlayer(u8),

    #[error("heading {0} is outside 0..36000")]
    InvalidHeading(u16),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Player {
    pub id: u8,
    pub pos: Vec2,
    pub intent: MoveIntent,
    pub color: Color,
}

impl Player {
    pub fn new(id: u8, pos: Vec2, color: Color) -> Self {
        Self {
            id,
            pos,
            intent: MoveIntent::NONE,
            color,
        }
    }

    pub fn record(&self) -> PlayerRecord {
        PlayerRecord {
            id: self.id,
            x: wire_coord(self.pos.x),
            y: wire_coord(self.pos.y),
            color: self.color,
        }
    }

    /// Whether `point` lies in the player's hit square, edges included.
    pub fn hit_square_contains(&self, point: Vec2) -> bool {
        (self.pos.x - PLAYER_RADIUS..=self.pos.x + PLAYER_RADIUS).contains(&point.x)
            && (self.pos.y - PLAYER_RADIUS..=self.pos.y + PLAYER_RADIUS).contains(&point.y)
    }
}

impl fmt::Display for Player {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Player[id={}, pos={}, dir={}, color={}]",
            self.id, self.pos, self.intent, self.color
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Projectile {
    pub pos: Vec2,
    /// Centidegrees, 0 = up, clockwise.
    pub heading: u16,
    /// Shooter id. Only used to skip self-hits; never keeps the player alive.
    pub owner: Option<u8>,
}

impl Projectile {
    pub fn record(&self) -> ProjectileRecord {
        ProjectileRecord {
            x: wire_coord(self.pos.x),
            y: wire_coord(self.pos.y),
        }
    }
}

impl fmt::Display for Projectile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.owner {
            Some(owner) => write!(
                f,
                "Projectile[pos={}, heading={}, owner={}]",
                self.pos, self.heading, owner
            ),
            None => write!(
                f,
                "Projectile[pos={}, heading={}, owner=-]",
                self.pos, self.heading
            ),
        }
    }
}

/// What one tick produced for the network layer.
#[derive(Debug, Default)]
pub struct TickOutcome {
    /// Players struck this tick, already removed from the world.
    pub killed: Vec<u8>,
    /// Present iff the player set changed since the last broadcast.
    pub player_list: Option<Message>,
    /// Present iff the projectile set changed since the last broadcast.
    pub projectile_list: Option<Message>,
}

pub struct GameState {
    pub tick: u64,
    players: BTreeMap<u8, Player>,
    projectiles: Vec<Projectile>,
    players_dirty: bool,
    projectiles_dirty: bool,
    rng: StdRng,
}

impl GameState {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Deterministic spawns for tests and replays.
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            tick: 0,
            players: BTreeMap::new(),
            projectiles: Vec::new(),
            players_dirty: false,
            projectiles_dirty: false,
            rng,
        }
    }

    /// Spawns a player at a random in-bounds position with a random colour.
    pub fn add_random_player(&mut self, id: u8) -> &Player {
        let pos = Vec2::new(
            self.rng.gen_range(PLAYER_RADIUS..=WORLD_WIDTH - PLAYER_RADIUS),
            self.rng.gen_range(PLAYER_RADIUS..=WORLD_HEIGHT - PLAYER_RADIUS),
        );
        let color = Color::new(self.rng.gen(), self.rng.gen(), self.rng.gen());
        self.add_player(Player::new(id, pos, color))
    }

    pub fn add_player(&mut self, player: Player) -> &Player {
        let id = player.id;
        info!("Added player {} at {}", id, player.pos);
        self.players.insert(id, player);
        &self.players[&id]
    }

    pub fn remove_player(&mut self, id: u8) -> Option<Player> {
        let removed = self.players.remove(&id);
        if removed.is_some() {
            info!("Removed player {}", id);
        }
        removed
    }

    pub fn player(&self, id: u8) -> Option<&Player> {
        self.players.get(&id)
    }

    pub fn players(&self) -> impl Iterator<Item = &Player> {
        self.players.values()
    }

    pub fn projectiles(&self) -> &[Projectile] {
        &self.projectiles
    }

    pub fn set_intent(&mut self, id: u8, intent: MoveIntent) -> Result<(), SimulationError> {
        let player = self
            .players
            .get_mut(&id)
            .ok_or(SimulationError::UnknownPlayer(id))?;
        player.intent = intent;
        Ok(())
    }

    /// Fires a projectile from the owner's current position.
    pub fn spawn_projectile(&mut self, owner: u8, heading: u16) -> Result<(), SimulationError> {
        if heading >= HEADING_RANGE {
            return Err(SimulationError::InvalidHeading(heading));
        }
        let origin = self
            .players
            .get(&owner)
            .ok_or(SimulationError::UnknownPlayer(owner))?
            .pos;

        self.projectiles.push(Projectile {
            pos: origin,
            heading,
            owner: Some(owner),
        });
        Ok(())
    }

    pub fn add_projectile(&mut self, projectile: Projectile) {
        self.projectiles.push(projectile);
    }

    pub fn player_list_message(&self) -> Message {
        Message::PlayerList {
            players: self.players.values().map(Player::record).collect(),
        }
    }

    pub fn projectile_list_message(&self) -> Message {
        Message::ProjectileList {
            projectiles: self.projectiles.iter().map(Projectile::record).collect(),
        }
    }

    /// Advances the world by one tick.
    pub fn update(&mut self) -> TickOutcome {
        self.tick += 1;

        self.move_players();
        self.move_projectiles();
        let killed = self.resolve_hits();

        let outcome = TickOutcome {
            player_list: self.players_dirty.then(|| self.player_list_message()),
            projectile_list: self.projectiles_dirty.then(|| self.projectile_list_message()),
            killed,
        };
        self.players_dirty = false;
        self.projectiles_dirty = false;

        if !outcome.killed.is_empty() {
            debug!("Tick {}: killed {:?}", self.tick, outcome.killed);
        }
        outcome
    }

    fn move_players(&mut self) {
        for player in self.players.values_mut() {
            if player.intent.is_none() {
                continue;
            }

            let mut velocity = player.intent.as_vec() * PLAYER_SPEED;
            if player.intent.is_diagonal() {
                velocity = velocity.div_away_from_zero(DIAGONAL_DIVISOR);
            }

            let target = player.pos + velocity;
            let clamped = Vec2::new(
                target.x.clamp(PLAYER_RADIUS, WORLD_WIDTH - PLAYER_RADIUS),
                target.y.clamp(PLAYER_RADIUS, WORLD_HEIGHT - PLAYER_RADIUS),
            );

            if clamped != player.pos {
                player.pos = clamped;
                self.players_dirty = true;
            }
        }
    }

    fn move_projectiles(&mut self) {
        if self.projectiles.is_empty() {
            return;
        }
        self.projectiles_dirty = true;

        for projectile in &mut self.projectiles {
            projectile.pos = projectile.pos + heading_step(projectile.heading);
        }
        self.projectiles.retain(|p| in_world(p.pos));
    }

    /// Removes every projectile inside a player's hit square and that player.
    fn resolve_hits(&mut self) -> Vec<u8> {
        let mut killed = Vec::new();

        for player in self.players.values() {
            let before = self.projectiles.len();
            self.projectiles
                .retain(|p| p.owner == Some(player.id) || !player.hit_square_contains(p.pos));

            if self.projectiles.len() != before {
                killed.push(player.id);
            }
        }

        if !killed.is_empty() {
            for id in &killed {
                self.players.remove(id);
            }
            self.players_dirty = true;
            self.projectiles_dirty = true;
        }

        killed
    }
}

impl Default for GameState {
    fn default() -> Self {
        Self::new()
    }
}
