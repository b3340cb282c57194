//! Length-prefixed framing over a byte stream.
//!
//! Each frame is a 2-byte big-endian length followed by exactly that many
//! payload bytes holding one encoded [`Message`]. A clean end-of-stream at
//! either step reads as `None`. There is no resynchronisation: after a bad
//! prefix the stream must be dropped.

use crate::codec::{CodecError, Message};
use std::io;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub const HEADER_SIZE: usize = 2;
pub const MAX_PAYLOAD: usize = u16::MAX as usize;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("transport error: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Prefixes an encoded message with its length.
pub fn encode_frame(message: &Message) -> Result<Vec<u8>, CodecError> {
    let payload = message.encode();
    if payload.len() > MAX_PAYLOAD {
        return Err(CodecError::FrameTooLarge(payload.len()));
    }

    let mut frame = Vec::with_capacity(HEADER_SIZE + payload.len());
    frame.extend_from_slice(&(payload.len() as u16).to_be_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// Reads whole frames from the read half of a stream.
pub struct FrameReader<R> {
    inner: R,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    /// Reads one raw payload. `Ok(None)` means the peer closed the stream.
    pub async fn read_frame(&mut self) -> io::Result<Option<Vec<u8>>> {
        let mut header = [0u8; HEADER_SIZE];
        if !read_exact_or_eof(&mut self.inner, &mut header).await? {
            return Ok(None);
        }

        let len = u16::from_be_bytes(header) as usize;
        let mut payload = vec![0u8; len];
        if !read_exact_or_eof(&mut self.inner, &mut payload).await? {
            return Ok(None);
        }

        Ok(Some(payload))
    }

    /// Reads and decodes one message. `Ok(None)` means the peer closed the stream.
    pub async fn read_message(&mut self) -> Result<Option<Message>, FrameError> {
        match self.read_frame().await? {
            Some(payload) => Ok(Some(Message::decode(&payload)?)),
            None => Ok(None),
        }
    }
}

/// Writes whole frames to the write half of a stream.
pub struct FrameWriter<W> {
    inner: W,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub async fn write_message(&mut self, message: &Message) -> Result<(), FrameError> {
        let frame = encode_frame(message)?;
        self.inner.write_all(&frame).await?;
        self.inner.flush().await?;
        Ok(())
    }

    /// Sends FIN to the peer.
    pub async fn shutdown(&mut self) -> io::Result<()> {
        self.inner.shutdown().await
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }
}

/// Fills `buf` completely. Returns `false` if the stream ended first.
async fn read_exact_or_eof<R: AsyncRead + Unpin>(reader: &mut R, buf: &mut [u8]) -> io::Result<bool> {
    match reader.read_exact(buf).await {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}
