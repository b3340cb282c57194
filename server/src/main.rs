use clap::Parser;
use log::{error, info};
use server::network::{Server, ServerConfig};
use std::time::Duration;

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server IP address to bind to
    #[clap(short = 'H', long, default_value = "127.0.0.1")]
    host: String,
    /// Server port to listen on (0 picks a free one)
    #[clap(short, long, default_value = "0")]
    port: u16,
    /// Tick rate (updates per second)
    #[clap(short, long, default_value = "60")]
    tick_rate: u32,
    /// Maximum concurrent players
    #[clap(short, long, default_value = "256")]
    max_players: usize,
    /// Milliseconds a new peer has to answer the handshake probe
    #[clap(long, default_value = "5000")]
    handshake_timeout_ms: u64,
    /// Do not read operator commands from stdin
    #[clap(long)]
    no_console: bool,
}

impl From<Args> for ServerConfig {
    fn from(args: Args) -> Self {
        ServerConfig {
            bind_addr: format!("{}:{}", args.host, args.port),
            tick_rate: args.tick_rate,
            max_players: args.max_players,
            handshake_timeout: Duration::from_millis(args.handshake_timeout_ms),
            enable_console: !args.no_console,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let server = Server::bind(args.into()).await?;
    let handle = server.handle();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, shutting down gracefully...");
            handle.shutdown();
        }
    });

    if let Err(e) = server.run().await {
        error!("Server error: {}", e);
        return Err(e.into());
    }

    // the stdin reader may still be parked in a blocking read
    std::process::exit(0)
}
