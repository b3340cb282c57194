//! Headless client connection: handshake, intents and incoming lists.

use log::{debug, info};
use shared::codec::HANDSHAKE_PROBE_TEXT;
use shared::{FrameError, FrameReader, FrameWriter, Message, MoveIntent};
use std::io;
use std::net::SocketAddr;
use thiserror::Error;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, ToSocketAddrs};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("transport error: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error("server rejected the handshake")]
    Rejected,

    #[error("unexpected {0} during handshake")]
    Unexpected(&'static str),

    #[error("server closed the connection")]
    Closed,
}

pub struct GameClient {
    reader: FrameReader<OwnedReadHalf>,
    writer: FrameWriter<OwnedWriteHalf>,
    player_id: u8,
    local_addr: SocketAddr,
}

impl GameClient {
    /// Connects, answers the probe and waits for the assigned player id.
    pub async fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self, ClientError> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        let local_addr = stream.local_addr()?;

        let (read_half, write_half) = stream.into_split();
        let mut reader = FrameReader::new(read_half);
        let mut writer = FrameWriter::new(write_half);

        match reader.read_message().await? {
            Some(Message::HandshakeProbe { text }) if text == HANDSHAKE_PROBE_TEXT => {}
            Some(Message::HandshakeFailed) => return Err(ClientError::Rejected),
            Some(other) => return Err(ClientError::Unexpected(other.name())),
            None => return Err(ClientError::Closed),
        }
        writer.write_message(&Message::reply()).await?;

        let player_id = match reader.read_message().await? {
            Some(Message::AssignId { id }) => id,
            Some(Message::HandshakeFailed) => return Err(ClientError::Rejected),
            Some(other) => return Err(ClientError::Unexpected(other.name())),
            None => return Err(ClientError::Closed),
        };
        info!("Connected from {} as player {}", local_addr, player_id);

        Ok(Self {
            reader,
            writer,
            player_id,
            local_addr,
        })
    }

    pub fn player_id(&self) -> u8 {
        self.player_id
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub async fn send(&mut self, message: &Message) -> Result<(), ClientError> {
        debug!("-> {}", message.name());
        self.writer.write_message(message).await?;
        Ok(())
    }

    pub async fn set_movement(&mut self, intent: MoveIntent) -> Result<(), ClientError> {
        self.send(&Message::MovementUpdate { intent }).await
    }

    /// Fires along `heading` in centidegrees, 0 pointing up.
    pub async fn fire(&mut self, heading: u16) -> Result<(), ClientError> {
        self.send(&Message::CreateProjectile { heading }).await
    }

    pub async fn request_players(&mut self) -> Result<(), ClientError> {
        self.send(&Message::PlayerListRequest).await
    }

    /// Next message from the server. `Ok(None)` once the server closed.
    pub async fn recv(&mut self) -> Result<Option<Message>, ClientError> {
        Ok(self.reader.read_message().await?)
    }

    /// Skips messages until one satisfies `pred`.
    pub async fn recv_until<F>(&mut self, mut pred: F) -> Result<Message, ClientError>
    where
        F: FnMut(&Message) -> bool,
    {
        loop {
            match self.recv().await? {
                Some(message) if pred(&message) => return Ok(message),
                Some(message) => debug!("skipping {}", message.name()),
                None => return Err(ClientError::Closed),
            }
        }
    }

    /// Says goodbye and closes the write half.
    pub async fn disconnect(mut self) -> Result<(), ClientError> {
        self.send(&Message::ClientDisconnect).await?;
        self.writer.shutdown().await?;
        Ok(())
    }
}
