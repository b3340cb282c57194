//! # Arena Server Library
//!
//! Authoritative server for a top-down arena shooter played over TCP. The
//! server owns the only copy of the world: clients send intents (move, fire,
//! leave) and receive player and projectile lists whenever something changed.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Simulation
//! Players move on a fixed tick, clamped to the 1600x900 world. Projectiles
//! travel along their heading until they leave the world or land inside a
//! player's hit square, which removes both and sends that player a `Killed`
//! notice.
//!
//! ### Connection Lifecycle
//! Every accepted socket gets a handshake probe and a short deadline to
//! answer it. Peers that answer correctly receive the lowest free player id;
//! the others receive `HandshakeFailed` and are closed. Ids return to the
//! pool as soon as their connection closes.
//!
//! ### Change Broadcasting
//! Lists are only broadcast on ticks where they changed, plus after every
//! join and leave. A failed send to one peer never blocks the others.
//!
//! ## Architecture Design
//!
//! ### Tasks
//! - **Accept**: takes sockets off the listener and spawns a connection task
//! - **Connection** (one per peer): handshake, then decode frames and queue them
//! - **Dispatch**: drains the inbound queue in order and applies it to the world
//! - **Tick**: steps the simulation at the configured rate and broadcasts
//! - **Console**: optional stdin reader for operator commands
//!
//! Only dispatch and tick touch the world, always under the game mutex. The
//! registry is only mutated while the game mutex is held, so a recipients
//! snapshot taken under it never sees a player list before that peer's
//! `AssignId`.
//!
//! ## Module Organization
//!
//! ### Client Manager Module (`client_manager`)
//! Id allocation, deregistration and broadcast.
//!
//! ### Connection Module (`connection`)
//! Write half of one socket with idempotent close.
//!
//! ### Game Module (`game`)
//! World state and the tick update.
//!
//! ### Protocol Module (`protocol`)
//! Handshake, read loop and the dispatcher.
//!
//! ### Network Module (`network`)
//! Listener, tick loop, configuration and shutdown.
//!
//! ### Console Module (`console`)
//! Operator commands: quit, players, bullets, connections, kick.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::{Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig {
//!         bind_addr: "127.0.0.1:8080".to_string(),
//!         ..ServerConfig::default()
//!     };
//!
//!     let server = Server::bind(config).await?;
//!     let handle = server.handle();
//!
//!     tokio::spawn(async move {
//!         let _ = tokio::signal::ctrl_c().await;
//!         handle.shutdown();
//!     });
//!
//!     // Runs until shutdown, then sends every peer `ServerClosed`
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod client_manager;
pub mod connection;
pub mod console;
pub mod error;
pub mod game;
pub mod network;
pub mod protocol;

pub use console::ConsoleCommand;
pub use error::ServerError;
pub use network::{start, Server, ServerConfig, ServerHandle};
