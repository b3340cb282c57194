//! # Arena Client Library
//!
//! A headless client for the arena server. It performs the handshake,
//! exposes the assigned player id and lets callers send intents and read
//! the lists the server broadcasts. There is no local simulation: every
//! position a client sees comes from the server.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::network::GameClient;
//! use shared::{Message, MoveIntent};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut client = GameClient::connect("127.0.0.1:8080").await?;
//!     println!("playing as {}", client.player_id());
//!
//!     client.set_movement(MoveIntent::new(1, 0)).await?;
//!     client.fire(9000).await?;
//!
//!     while let Some(message) = client.recv().await? {
//!         if let Message::DisconnectNotice { reason } = message {
//!             println!("disconnected: {}", reason);
//!             break;
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod network;

pub use network::{ClientError, GameClient};
