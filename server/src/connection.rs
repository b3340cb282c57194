//! One peer socket as the server sees it.
//!
//! A `Connection` owns the write half of its socket; the read half lives in
//! the connection's own read task. Closing from any task marks the connection
//! closed, wakes that read task and (for server-initiated closes) shuts the
//! write half down so the peer sees FIN.

use crate::error::ServerError;
use log::debug;
use shared::{FrameWriter, Message};
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{Mutex, Notify};

pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

pub struct Connection {
    peer: SocketAddr,
    player_id: OnceLock<u8>,
    open: AtomicBool,
    writer: Mutex<FrameWriter<BoxedWriter>>,
    closed: Notify,
}

impl Connection {
    pub fn new(peer: SocketAddr, writer: BoxedWriter) -> Self {
        Self {
            peer,
            player_id: OnceLock::new(),
            open: AtomicBool::new(true),
            writer: Mutex::new(FrameWriter::new(writer)),
            closed: Notify::new(),
        }
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// The player identity, once the handshake has completed.
    pub fn player_id(&self) -> Option<u8> {
        self.player_id.get().copied()
    }

    /// Binds the connection to a player id. Returns false if one was already set.
    pub(crate) fn assign(&self, id: u8) -> bool {
        self.player_id.set(id).is_ok()
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    pub async fn send(&self, message: &Message) -> Result<(), ServerError> {
        let frame = shared::frame::encode_frame(message)?;
        self.send_frame(&frame).await
    }

    /// Writes an already length-prefixed frame.
    pub async fn send_frame(&self, frame: &[u8]) -> Result<(), ServerError> {
        if !self.is_open() {
            return Err(ServerError::ConnectionClosed(self.peer));
        }

        let mut writer = self.writer.lock().await;
        let stream = writer.get_mut();
        stream.write_all(frame).await?;
        stream.flush().await?;
        Ok(())
    }

    /// Closes the connection. Returns false if it was already closed.
    ///
    /// `orderly` shuts the write half down first; peer-initiated closes skip
    /// that since the other side is already gone.
    pub async fn close(&self, orderly: bool) -> bool {
        if !self.retire() {
            return false;
        }
        if orderly {
            self.shutdown_writer().await;
        }
        true
    }

    /// Marks the connection closed and wakes its read task without touching
    /// the socket. Returns false if it was already closed.
    ///
    /// Whoever retires a connection owns its last write, see `finish`.
    pub(crate) fn retire(&self) -> bool {
        if !self.open.swap(false, Ordering::AcqRel) {
            return false;
        }
        self.closed.notify_one();
        true
    }

    /// Writes a final message to a retired connection, then shuts its write half.
    pub(crate) async fn finish(&self, message: &Message) -> Result<(), ServerError> {
        let frame = shared::frame::encode_frame(message)?;
        let mut writer = self.writer.lock().await;
        let stream = writer.get_mut();
        let written = match stream.write_all(&frame).await {
            Ok(()) => stream.flush().await,
            Err(e) => Err(e),
        };
        if let Err(e) = writer.shutdown().await {
            debug!("Shutdown of {} failed: {}", self.peer, e);
        }
        Ok(written?)
    }

    async fn shutdown_writer(&self) {
        let mut writer = self.writer.lock().await;
        if let Err(e) = writer.shutdown().await {
            debug!("Shutdown of {} failed: {}", self.peer, e);
        }
    }

    /// Resolves once the connection has been closed by someone else.
    pub async fn closed(&self) {
        if !self.is_open() {
            return;
        }
        self.closed.notified().await;
    }
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.player_id() {
            Some(id) => write!(f, "Conn[id={}, peer={}, open={}]", id, self.peer, self.is_open()),
            None => write!(f, "Conn[id=-, peer={}, open={}]", self.peer, self.is_open()),
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use shared::FrameReader;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::io::{duplex, DuplexStream};

    /// A connection whose far end is an in-memory stream the test can read.
    pub(crate) fn test_connection(port: u16) -> (Arc<Connection>, FrameReader<DuplexStream>) {
        let (ours, theirs) = duplex(64 * 1024);
        let peer: SocketAddr = format!("127.0.0.1:{}", port).parse().unwrap();
        (
            Arc::new(Connection::new(peer, Box::new(ours))),
            FrameReader::new(theirs),
        )
    }

    #[tokio::test]
    async fn test_send_reaches_peer() {
        let (conn, mut peer) = test_connection(9000);
        conn.send(&Message::AssignId { id: 4 }).await.unwrap();
        assert_eq!(
            peer.read_message().await.unwrap(),
            Some(Message::AssignId { id: 4 })
        );
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (conn, _peer) = test_connection(9001);
        assert!(conn.is_open());
        assert!(conn.close(true).await);
        assert!(!conn.close(true).await);
        assert!(!conn.is_open());
    }

    #[tokio::test]
    async fn test_orderly_close_sends_eof() {
        let (conn, mut peer) = test_connection(9002);
        conn.close(true).await;
        assert!(peer.read_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_send_after_close_is_benign() {
        let (conn, _peer) = test_connection(9003);
        conn.close(false).await;
        let err = conn.send(&Message::HandshakeFailed).await.unwrap_err();
        assert!(err.is_benign());
    }

    #[tokio::test]
    async fn test_retired_connection_refuses_sends_but_finishes() {
        let (conn, mut peer) = test_connection(9006);
        assert!(conn.retire());
        assert!(!conn.retire());
        assert!(!conn.is_open());
        assert!(conn.send(&Message::AssignId { id: 1 }).await.unwrap_err().is_benign());

        conn.finish(&Message::HandshakeFailed).await.unwrap();
        assert_eq!(peer.read_message().await.unwrap(), Some(Message::HandshakeFailed));
        assert!(peer.read_message().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_closed_wakes_waiter() {
        let (conn, _peer) = test_connection(9004);
        let waiter = {
            let conn = Arc::clone(&conn);
            tokio::spawn(async move { conn.closed().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        conn.close(false).await;
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[test]
    fn test_display_before_and_after_assignment() {
        let (conn, _peer) = test_connection(9005);
        assert_eq!(conn.to_string(), "Conn[id=-, peer=127.0.0.1:9005, open=true]");
        assert!(conn.assign(3));
        assert!(!conn.assign(4));
        assert_eq!(conn.to_string(), "Conn[id=3, peer=127.0.0.1:9005, open=true]");
    }
}
