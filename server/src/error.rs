//! Error taxonomy for the server.
//!
//! Everything that can go wrong on one connection is contained at that
//! connection's boundary; only `Bind` ever stops the server.

use shared::{CodecError, FrameError};
use std::io;
use std::net::SocketAddr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("protocol error: {0}")]
    Protocol(#[from] CodecError),

    #[error("client sent {0}, which only the server may send")]
    UnexpectedMessage(&'static str),

    #[error("handshake failed: {0}")]
    HandshakeFailure(String),

    #[error("peer closed the connection")]
    PeerClosed,

    #[error("transport error: {0}")]
    Transport(#[from] io::Error),

    #[error("inconsistent state: {0}")]
    StateConsistency(String),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("no free player id")]
    RegistryFull,

    #[error("connection {0} is closed")]
    ConnectionClosed(SocketAddr),
}

impl From<FrameError> for ServerError {
    fn from(err: FrameError) -> Self {
        match err {
            FrameError::Io(e) => ServerError::Transport(e),
            FrameError::Codec(e) => ServerError::Protocol(e),
        }
    }
}

impl ServerError {
    /// True for failures that only mean the peer is already gone.
    pub fn is_benign(&self) -> bool {
        match self {
            ServerError::PeerClosed | ServerError::ConnectionClosed(_) => true,
            ServerError::Transport(e) => is_disconnect(e),
            _ => false,
        }
    }
}

/// I/O error kinds a socket reports once the other side has gone away.
pub fn is_disconnect(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::UnexpectedEof
    )
}
