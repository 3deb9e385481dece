//! Transport layer for Tuya local protocol
//!
//! Provides the TCP link to a device and the stream framing that turns
//! it into whole frames.

pub mod codec;
pub mod error;
pub mod tcp;

pub use codec::FrameCodec;
pub use error::{Error, Result};
pub use tcp::TcpTransport;

use async_trait::async_trait;
use bytes::BytesMut;
use futures::StreamExt;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio_util::codec::FramedRead;
use tracing::trace;

/// Transport trait for different communication methods
///
/// A transport only knows how to open links. Each successful
/// [`Transport::connect`] yields an independent [`Connection`], so one
/// transport can serve any number of reconnects.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open a new link to the device
    async fn connect(&self) -> Result<Connection>;

    /// Get remote address
    fn remote_addr(&self) -> String;
}

/// An open link, split into its read and write halves
pub struct Connection {
    pub reader: FrameReader,
    pub writer: FrameWriter,
}

impl Connection {
    pub fn new<R, W>(reader: R, writer: W, peer: impl Into<String>) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let peer = peer.into();
        Self {
            reader: FrameReader::new(reader, peer.clone()),
            writer: FrameWriter::new(writer, peer),
        }
    }

    /// Wrap any duplex stream
    pub fn from_stream<S>(stream: S, peer: impl Into<String>) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        Self::new(reader, writer, peer)
    }

    pub fn into_split(self) -> (FrameReader, FrameWriter) {
        (self.reader, self.writer)
    }
}

/// Inbound half, yielding raw frames
pub struct FrameReader {
    inner: FramedRead<Box<dyn AsyncRead + Send + Unpin>, FrameCodec>,
    peer: String,
}

impl FrameReader {
    fn new<R>(reader: R, peer: String) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        let boxed: Box<dyn AsyncRead + Send + Unpin> = Box::new(reader);
        Self {
            inner: FramedRead::new(boxed, FrameCodec::new()),
            peer,
        }
    }

    /// Wait for the next complete frame
    ///
    /// Returns `None` once the peer has closed the stream.
    pub async fn next_frame(&mut self) -> Option<Result<BytesMut>> {
        let frame = self.inner.next().await?;

        Some(frame.map_err(Error::from).inspect(|buf| {
            trace!(peer = %self.peer, "Received {} bytes: {:02X?}", buf.len(), &buf[..buf.len().min(16)]);
        }))
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }
}

/// Outbound half
pub struct FrameWriter {
    inner: Box<dyn AsyncWrite + Send + Unpin>,
    peer: String,
}

impl FrameWriter {
    fn new<W>(writer: W, peer: String) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            inner: Box::new(writer),
            peer,
        }
    }

    /// Send raw bytes
    pub async fn send(&mut self, data: &[u8]) -> Result<()> {
        trace!(peer = %self.peer, "Sending {} bytes: {:02X?}", data.len(), &data[..data.len().min(16)]);

        self.inner.write_all(data).await?;
        self.inner.flush().await?;

        Ok(())
    }

    /// Graceful shutdown of the write side
    pub async fn shutdown(&mut self) -> Result<()> {
        self.inner.shutdown().await?;
        Ok(())
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BufMut;
    use tuyalan_core::constants::{MAGIC_PREFIX, MAGIC_SUFFIX};

    fn ping_frame() -> Vec<u8> {
        let mut buf = BytesMut::new();
        buf.put_u32(MAGIC_PREFIX);
        buf.put_u32(0);
        buf.put_u32(0x09);
        buf.put_u32(8);
        buf.put_u32(0);
        buf.put_u32(MAGIC_SUFFIX);
        buf.to_vec()
    }

    #[tokio::test]
    async fn test_connection_round_trip() {
        let (near, far) = tokio::io::duplex(256);
        let (mut near_reader, mut near_writer) = Connection::from_stream(near, "near").into_split();
        let (mut far_reader, mut far_writer) = Connection::from_stream(far, "far").into_split();

        near_writer.send(&ping_frame()).await.unwrap();
        let frame = far_reader.next_frame().await.unwrap().unwrap();
        assert_eq!(&frame[..], &ping_frame()[..]);

        far_writer.send(&ping_frame()).await.unwrap();
        assert!(near_reader.next_frame().await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_reader_ends_on_close() {
        let (near, far) = tokio::io::duplex(256);
        let mut reader = Connection::from_stream(near, "near").reader;

        drop(far);
        assert!(reader.next_frame().await.is_none());
    }
}
