//! Server network layer: listening socket, tick loop and lifecycle

use crate::client_manager::{broadcast_to, ClientManager};
use crate::connection::Connection;
use crate::console::{self, ConsoleCommand};
use crate::error::ServerError;
use crate::game::GameState;
use crate::protocol::{self, Inbound};
use log::{debug, error, info, warn};
use shared::{DisconnectReason, FrameReader, Message, DEFAULT_TICK_RATE, MAX_PLAYERS};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::BufReader;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    /// Simulation steps per second
    pub tick_rate: u32,
    pub max_players: usize,
    /// How long a new peer has to answer the probe
    pub handshake_timeout: Duration,
    /// Read operator commands from stdin
    pub enable_console: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:0".to_string(),
            tick_rate: DEFAULT_TICK_RATE,
            max_players: MAX_PLAYERS,
            handshake_timeout: Duration::from_secs(5),
            enable_console: false,
        }
    }
}

impl ServerConfig {
    pub fn tick_duration(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.tick_rate.max(1) as f64)
    }
}

/// State shared by every server task.
///
/// Lock order is always `game` before the registry's internal lock.
pub struct ServerContext {
    pub config: ServerConfig,
    pub clients: ClientManager,
    pub game: Mutex<GameState>,
    pub(crate) inbound: mpsc::UnboundedSender<Inbound>,
    stop: watch::Sender<bool>,
}

impl ServerContext {
    pub(crate) fn new(
        config: ServerConfig,
        game: GameState,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<Inbound>) {
        let (inbound, inbound_rx) = mpsc::unbounded_channel();
        let (stop, _) = watch::channel(false);

        let ctx = Arc::new(Self {
            clients: ClientManager::new(config.max_players),
            config,
            game: Mutex::new(game),
            inbound,
            stop,
        });
        (ctx, inbound_rx)
    }

    pub fn request_shutdown(&self) {
        if !self.stop.send_replace(true) {
            info!("Shutdown requested");
        }
    }

    pub fn is_stopping(&self) -> bool {
        *self.stop.borrow()
    }

    /// Resolves once shutdown has been requested.
    pub async fn stopped(&self) {
        let mut rx = self.stop.subscribe();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

/// Cloneable remote control for a running server.
#[derive(Clone)]
pub struct ServerHandle {
    ctx: Arc<ServerContext>,
}

impl ServerHandle {
    pub fn shutdown(&self) {
        self.ctx.request_shutdown();
    }

    /// Runs an operator command as if it had been typed on the console.
    pub async fn execute(&self, command: ConsoleCommand) -> String {
        console::execute(&self.ctx, command).await
    }

    pub fn context(&self) -> &Arc<ServerContext> {
        &self.ctx
    }
}

pub struct Server {
    listener: TcpListener,
    ctx: Arc<ServerContext>,
    inbound_rx: mpsc::UnboundedReceiver<Inbound>,
}

impl Server {
    pub async fn bind(config: ServerConfig) -> Result<Self, ServerError> {
        Self::bind_with_game(config, GameState::new()).await
    }

    /// Binds with a caller-provided world, e.g. a seeded one.
    pub async fn bind_with_game(config: ServerConfig, game: GameState) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(&config.bind_addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: config.bind_addr.clone(),
                source,
            })?;

        let (ctx, inbound_rx) = ServerContext::new(config, game);
        Ok(Self {
            listener,
            ctx,
            inbound_rx,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            ctx: Arc::clone(&self.ctx),
        }
    }

    /// Runs every server activity until shutdown is requested, then tells
    /// remaining peers the server closed.
    pub async fn run(self) -> Result<(), ServerError> {
        let Server {
            listener,
            ctx,
            inbound_rx,
        } = self;

        info!(
            "Server listening on {} ({} Hz, up to {} players)",
            listener.local_addr()?,
            ctx.config.tick_rate,
            ctx.clients.capacity()
        );

        let dispatcher = tokio::spawn(protocol::dispatch_loop(Arc::clone(&ctx), inbound_rx));
        let ticker = tokio::spawn(tick_loop(Arc::clone(&ctx)));
        let console = ctx.config.enable_console.then(|| {
            let input = BufReader::new(tokio::io::stdin());
            tokio::spawn(console::console_loop(Arc::clone(&ctx), input))
        });

        accept_loop(&ctx, listener).await;

        for (name, task) in [("dispatch", dispatcher), ("tick", ticker)] {
            if let Err(e) = task.await {
                error!("{} task failed: {}", name, e);
            }
        }
        if let Some(console) = console {
            console.abort();
        }

        close_all(&ctx, DisconnectReason::ServerClosed).await;
        info!("Server stopped");
        Ok(())
    }
}

/// Binds and runs the server in the background.
pub async fn start(
    config: ServerConfig,
) -> Result<(SocketAddr, ServerHandle, JoinHandle<Result<(), ServerError>>), ServerError> {
    let server = Server::bind(config).await?;
    let addr = server.local_addr()?;
    let handle = server.handle();
    let task = tokio::spawn(server.run());
    Ok((addr, handle, task))
}

async fn accept_loop(ctx: &Arc<ServerContext>, listener: TcpListener) {
    loop {
        let accepted = tokio::select! {
            _ = ctx.stopped() => break,
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok((stream, peer)) => {
                if let Err(e) = stream.set_nodelay(true) {
                    debug!("Could not set TCP_NODELAY for {}: {}", peer, e);
                }
                let (read_half, write_half) = stream.into_split();
                let conn = Arc::new(Connection::new(peer, Box::new(write_half)));
                debug!("Accepted {}", conn);

                tokio::spawn(protocol::run_connection(
                    Arc::clone(ctx),
                    conn,
                    FrameReader::new(read_half),
                ));
            }
            Err(e) => {
                warn!("Failed to accept connection: {}", e);
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        }
    }
}

async fn tick_loop(ctx: Arc<ServerContext>) {
    let mut timer = interval(ctx.config.tick_duration());
    timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ctx.stopped() => break,
            _ = timer.tick() => {}
        }
        run_tick(&ctx).await;
    }
}

/// Advances the simulation one step and delivers what changed.
///
/// Victims are unregistered and retired under the game lock, so their id is
/// never free while their connection still counts as open.
pub async fn run_tick(ctx: &ServerContext) {
    let (outcome, victims, recipients) = {
        let mut game = ctx.game.lock().await;
        let outcome = game.update();

        let mut victims = Vec::with_capacity(outcome.killed.len());
        for &id in &outcome.killed {
            match ctx.clients.get(id).await {
                Some(conn) => {
                    ctx.clients.unregister(&conn).await;
                    if conn.retire() {
                        victims.push(conn);
                    }
                }
                None => error!(
                    "{}",
                    ServerError::StateConsistency(format!("killed player {} has no connection", id))
                ),
            }
        }

        (outcome, victims, ctx.clients.connections().await)
    };

    for conn in victims {
        info!("{} was killed", conn);
        send_notice(&conn, DisconnectReason::Killed).await;
    }

    for message in [outcome.player_list, outcome.projectile_list].into_iter().flatten() {
        if let Err(e) = broadcast_to(&recipients, &message).await {
            debug!("Tick broadcast incomplete: {}", e);
        }
    }
}

/// Sends a disconnect notice, then closes from our side. Does nothing if the
/// connection is already closed.
pub(crate) async fn notify_and_close(conn: &Connection, reason: DisconnectReason) -> bool {
    if !conn.retire() {
        return false;
    }
    send_notice(conn, reason).await;
    true
}

/// Last write to a connection this task retired.
async fn send_notice(conn: &Connection, reason: DisconnectReason) {
    if let Err(e) = conn.finish(&Message::DisconnectNotice { reason }).await {
        if !e.is_benign() {
            warn!("Could not notify {} ({}): {}", conn, reason, e);
        }
    }
}

/// Disconnects every open peer with `reason`, including those still in the
/// handshake. Returns how many were closed.
pub(crate) async fn close_all(ctx: &ServerContext, reason: DisconnectReason) -> usize {
    let mut closed = 0;
    for conn in ctx.clients.everyone().await {
        if notify_and_close(&conn, reason).await {
            closed += 1;
        }
    }
    if closed > 0 {
        info!("Closed {} connection(s): {}", closed, reason);
    }
    closed
}
