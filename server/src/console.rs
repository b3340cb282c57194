//! Line-oriented operator console.

use crate::connection::Connection;
use crate::game::GameState;
use crate::network::{close_all, ServerContext};
use log::{info, warn};
use shared::DisconnectReason;
use std::fmt::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleCommand {
    Quit,
    Players,
    Projectiles,
    Connections,
    /// Force-close every open connection, including those still in the handshake.
    Kick,
}

impl ConsoleCommand {
    /// Unrecognized input yields `None`.
    pub fn parse(line: &str) -> Option<Self> {
        match line.trim().to_lowercase().as_str() {
            "q" | "quit" => Some(ConsoleCommand::Quit),
            "p" | "players" => Some(ConsoleCommand::Players),
            "b" | "bullets" => Some(ConsoleCommand::Projectiles),
            "c" | "connections" => Some(ConsoleCommand::Connections),
            "k" | "kick" => Some(ConsoleCommand::Kick),
            _ => None,
        }
    }
}

pub async fn console_loop<R>(ctx: Arc<ServerContext>, input: R)
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();

    loop {
        let line = tokio::select! {
            _ = ctx.stopped() => break,
            line = lines.next_line() => line,
        };

        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!("Console input failed: {}", e);
                break;
            }
        };

        let Some(command) = ConsoleCommand::parse(&line) else {
            continue;
        };

        let output = execute(&ctx, command).await;
        if !output.is_empty() {
            println!("{}", output);
        }
        if command == ConsoleCommand::Quit {
            break;
        }
    }
}

/// Runs one command and returns what should be shown to the operator.
pub async fn execute(ctx: &ServerContext, command: ConsoleCommand) -> String {
    match command {
        ConsoleCommand::Quit => {
            ctx.request_shutdown();
            String::new()
        }
        ConsoleCommand::Players => render_players(&*ctx.game.lock().await),
        ConsoleCommand::Projectiles => render_projectiles(&*ctx.game.lock().await),
        ConsoleCommand::Connections => render_connections(&ctx.clients.everyone().await),
        ConsoleCommand::Kick => {
            let kicked = close_all(ctx, DisconnectReason::Kicked).await;
            info!("Kicked {} connection(s)", kicked);
            format!("kicked {} connection(s)", kicked)
        }
    }
}

pub fn render_players(game: &GameState) -> String {
    let mut out = String::from("players:");
    for player in game.players() {
        let _ = write!(out, "\n  {}", player);
    }
    out
}

pub fn render_projectiles(game: &GameState) -> String {
    let mut out = format!("bullets ({}):", game.projectiles().len());
    for projectile in game.projectiles() {
        let _ = write!(out, "\n  {}", projectile);
    }
    out
}

pub fn render_connections(connections: &[Arc<Connection>]) -> String {
    let mut out = format!("connections ({}):", connections.len());
    for conn in connections {
        let _ = write!(out, "\n  {}", conn);
    }
    out
}
