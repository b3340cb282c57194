//! Scripted client for poking a running server by hand.

use clap::Parser;
use client::network::GameClient;
use log::info;
use shared::{Message, MoveIntent};
use std::time::Duration;
use tokio::time::{sleep, timeout};

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server address
    #[clap(short, long, default_value = "127.0.0.1:8080")]
    server: String,
    /// Number of movement intents to cycle through
    #[clap(short, long, default_value = "8")]
    moves: usize,
    /// Fire once per move, rotating the heading
    #[clap(long)]
    shoot: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut client = GameClient::connect(&args.server).await?;
    println!("Connected as player {}", client.player_id());

    let directions = [(1, 0), (1, 1), (0, 1), (-1, 1), (-1, 0), (-1, -1), (0, -1), (1, -1)];

    for step in 0..args.moves {
        let (dx, dy) = directions[step % directions.len()];
        client.set_movement(MoveIntent::new(dx, dy)).await?;

        if args.shoot {
            let heading = ((step * 4500) % shared::HEADING_RANGE as usize) as u16;
            client.fire(heading).await?;
        }

        sleep(Duration::from_millis(100)).await;
        drain(&mut client).await?;
    }

    client.set_movement(MoveIntent::NONE).await?;
    client.request_players().await?;
    drain(&mut client).await?;

    client.disconnect().await?;
    info!("Disconnected");
    Ok(())
}

/// Prints whatever arrived within a short window.
async fn drain(client: &mut GameClient) -> Result<(), Box<dyn std::error::Error>> {
    while let Ok(next) = timeout(Duration::from_millis(20), client.recv()).await {
        match next? {
            Some(Message::PlayerList { players }) => {
                for p in &players {
                    println!("  player {} at ({}, {})", p.id, p.x, p.y);
                }
            }
            Some(Message::ProjectileList { projectiles }) => {
                println!("  {} projectile(s) in flight", projectiles.len());
            }
            Some(Message::DisconnectNotice { reason }) => {
                println!("Server disconnected us: {}", reason);
                std::process::exit(0);
            }
            Some(other) => println!("  {}", other.name()),
            None => return Err("server closed the connection".into()),
        }
    }
    Ok(())
}
