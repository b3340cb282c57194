//! Per-connection protocol state machine and the inbound dispatcher.
//!
//! A connection moves through `AwaitingReply -> Registered -> Closed`. Read
//! tasks only decode frames and queue them; every simulation change they
//! cause is applied in order by the single dispatch task.

use crate::client_manager::broadcast_to;
use crate::connection::Connection;
use crate::error::ServerError;
use crate::game::SimulationError;
use crate::network::ServerContext;
use log::{debug, error, info, warn};
use shared::codec::HANDSHAKE_REPLY_TEXT;
use shared::{FrameReader, Message};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncRead;
use tokio::sync::mpsc;

/// Time given to a rejected peer to read `HandshakeFailed` before the close.
pub const REJECT_GRACE: Duration = Duration::from_millis(100);

/// Work queued for the dispatch task.
#[derive(Debug)]
pub enum Inbound {
    /// Handshake succeeded; allocate an identity and spawn a player.
    Joined(Arc<Connection>),
    Message {
        conn: Arc<Connection>,
        message: Message,
    },
    /// The read task ended. Queued exactly once per joined connection.
    Disconnected {
        conn: Arc<Connection>,
        peer_initiated: bool,
    },
}

/// Drives one accepted socket: handshake, then the read loop.
pub async fn run_connection<R>(ctx: Arc<ServerContext>, conn: Arc<Connection>, mut reader: FrameReader<R>)
where
    R: AsyncRead + Unpin,
{
    ctx.clients.begin_handshake(&conn).await;

    if let Err(e) = handshake(&ctx, &conn, &mut reader).await {
        ctx.clients.abandon_handshake(&conn).await;
        if e.is_benign() {
            debug!("{} left during handshake: {}", conn, e);
        } else {
            info!("Rejected {}: {}", conn, e);
        }
        return;
    }

    if ctx.inbound.send(Inbound::Joined(Arc::clone(&conn))).is_err() {
        ctx.clients.abandon_handshake(&conn).await;
        conn.close(true).await;
        return;
    }

    let peer_initiated = read_loop(&ctx, &conn, &mut reader).await;
    let _ = ctx.inbound.send(Inbound::Disconnected {
        conn,
        peer_initiated,
    });
}

async fn handshake<R>(
    ctx: &ServerContext,
    conn: &Connection,
    reader: &mut FrameReader<R>,
) -> Result<(), ServerError>
where
    R: AsyncRead + Unpin,
{
    if !ctx.clients.has_capacity().await {
        reject(conn).await;
        return Err(ServerError::RegistryFull);
    }

    conn.send(&Message::probe()).await?;

    let reply = tokio::select! {
        _ = ctx.stopped() => {
            conn.close(true).await;
            return Err(ServerError::ConnectionClosed(conn.peer()));
        }
        _ = conn.closed() => return Err(ServerError::ConnectionClosed(conn.peer())),
        reply = tokio::time::timeout(ctx.config.handshake_timeout, next_message(reader)) => reply,
    };

    let failure = match reply {
        Ok(Ok(Message::HandshakeReply { text })) if text == HANDSHAKE_REPLY_TEXT => {
            return Ok(());
        }
        Ok(Ok(Message::HandshakeReply { text })) => format!("wrong reply {:?}", text),
        Ok(Ok(other)) => format!("expected HandshakeReply, got {}", other.name()),
        Ok(Err(e)) if e.is_benign() => {
            conn.close(false).await;
            return Err(e);
        }
        Ok(Err(e)) => e.to_string(),
        Err(_) => format!("no reply within {:?}", ctx.config.handshake_timeout),
    };

    reject(conn).await;
    Err(ServerError::HandshakeFailure(failure))
}

async fn reject(conn: &Connection) {
    if conn.send(&Message::HandshakeFailed).await.is_ok() {
        tokio::time::sleep(REJECT_GRACE).await;
    }
    conn.close(true).await;
}

/// Reads one message; a zero-length read becomes `PeerClosed`.
async fn next_message<R>(reader: &mut FrameReader<R>) -> Result<Message, ServerError>
where
    R: AsyncRead + Unpin,
{
    reader.read_message().await?.ok_or(ServerError::PeerClosed)
}

/// Forwards decoded messages until the connection ends.
///
/// Returns whether the peer ended it.
async fn read_loop<R>(ctx: &ServerContext, conn: &Arc<Connection>, reader: &mut FrameReader<R>) -> bool
where
    R: AsyncRead + Unpin,
{
    loop {
        let result = tokio::select! {
            _ = conn.closed() => return false,
            result = next_message(reader) => result,
        };

        match result {
            Ok(Message::ClientDisconnect) => {
                debug!("{} said goodbye", conn);
                return true;
            }
            Ok(message) => {
                let queued = ctx.inbound.send(Inbound::Message {
                    conn: Arc::clone(conn),
                    message,
                });
                if queued.is_err() {
                    return false;
                }
            }
            Err(e) if e.is_benign() => {
                debug!("{} ended: {}", conn, e);
                return true;
            }
            Err(e) => {
                warn!("Dropping {}: {}", conn, e);
                return false;
            }
        }
    }
}

/// Applies queued work in arrival order until shutdown.
pub async fn dispatch_loop(ctx: Arc<ServerContext>, mut inbound: mpsc::UnboundedReceiver<Inbound>) {
    loop {
        let item = tokio::select! {
            _ = ctx.stopped() => break,
            item = inbound.recv() => item,
        };
        let Some(item) = item else {
            break;
        };

        if let Err(e) = dispatch(&ctx, item).await {
            report(&e);
        }
    }
    debug!("Dispatch loop finished");
}

pub async fn dispatch(ctx: &ServerContext, item: Inbound) -> Result<(), ServerError> {
    match item {
        Inbound::Joined(conn) => on_joined(ctx, &conn).await,
        Inbound::Message { conn, message } => {
            let result = on_message(ctx, &conn, message).await;
            if let Err(ServerError::UnexpectedMessage(_) | ServerError::Protocol(_)) = &result {
                close_connection(ctx, &conn, false).await;
            }
            result
        }
        Inbound::Disconnected {
            conn,
            peer_initiated,
        } => {
            close_connection(ctx, &conn, peer_initiated).await;
            Ok(())
        }
    }
}

fn report(err: &ServerError) {
    match err {
        ServerError::StateConsistency(_) => error!("{}", err),
        e if e.is_benign() => debug!("{}", e),
        e => warn!("{}", e),
    }
}

async fn on_joined(ctx: &ServerContext, conn: &Arc<Connection>) -> Result<(), ServerError> {
    if !conn.is_open() {
        ctx.clients.abandon_handshake(conn).await;
        return Ok(());
    }

    let (list, recipients) = {
        let mut game = ctx.game.lock().await;
        let id = match ctx.clients.register(conn).await {
            Ok(id) => id,
            Err(e) => {
                drop(game);
                ctx.clients.abandon_handshake(conn).await;
                reject(conn).await;
                return Err(e);
            }
        };

        if let Err(e) = conn.send(&Message::AssignId { id }).await {
            debug!("AssignId to {} failed: {}", conn, e);
        }
        let player = game.add_random_player(id);
        info!("{} joined as {}", conn, player);

        (game.player_list_message(), ctx.clients.connections().await)
    };

    broadcast_to(&recipients, &list).await
}

async fn on_message(ctx: &ServerContext, conn: &Arc<Connection>, message: Message) -> Result<(), ServerError> {
    if !conn.is_open() {
        return Ok(());
    }
    let id = conn
        .player_id()
        .ok_or_else(|| ServerError::StateConsistency(format!("{} sent {} without an id", conn, message.name())))?;

    let mut game = ctx.game.lock().await;
    // Killed or replaced after the message was queued: `id` may belong to someone else now.
    if !conn.is_open() || !ctx.clients.is_current(conn).await {
        debug!("Ignoring {} from stale {}", message.name(), conn);
        return Ok(());
    }

    match message {
        Message::MovementUpdate { intent } => game.set_intent(id, intent).map_err(inconsistent),
        Message::CreateProjectile { heading } => {
            match game.spawn_projectile(id, heading) {
                Ok(()) => Ok(()),
                Err(SimulationError::InvalidHeading(h)) => {
                    warn!("{} fired with invalid heading {}", conn, h);
                    Ok(())
                }
                Err(e) => Err(inconsistent(e)),
            }
        }
        Message::PlayerListRequest => {
            let list = game.player_list_message();
            drop(game);
            conn.send(&list).await
        }
        Message::ClientDisconnect => Ok(()),
        other => Err(ServerError::UnexpectedMessage(other.name())),
    }
}

fn inconsistent(err: SimulationError) -> ServerError {
    ServerError::StateConsistency(err.to_string())
}

/// Tears a connection down and removes its player. Safe to call repeatedly.
pub async fn close_connection(ctx: &ServerContext, conn: &Arc<Connection>, peer_initiated: bool) {
    conn.close(!peer_initiated).await;

    let (list, recipients) = {
        let mut game = ctx.game.lock().await;
        if !ctx.clients.unregister(conn).await {
            return;
        }
        if let Some(id) = conn.player_id() {
            if game.remove_player(id).is_none() {
                debug!("Player {} was already gone", id);
            }
        }
        (game.player_list_message(), ctx.clients.connections().await)
    };

    if peer_initiated {
        info!("{} disconnected", conn);
    } else {
        info!("{} dropped by server", conn);
    }

    if let Err(e) = broadcast_to(&recipients, &list).await {
        debug!("Player list after disconnect incomplete: {}", e);
    }
}
