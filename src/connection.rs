use crate::error::{HeosError, Result};
use bytes::{Bytes, BytesMut};
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Low-level byte stream to a device
///
/// Owns one persistent stream and knows nothing about message boundaries.
/// Generic over the stream so tests can substitute an in-memory pipe.
pub struct Connection<S = TcpStream> {
    stream: Option<S>,
    peer: String,
    read_buf: BytesMut,
}

impl Connection<TcpStream> {
    /// Open a TCP connection to `host:port`
    pub async fn connect(host: &str, port: u16, connect_timeout: Duration) -> Result<Self> {
        let peer = format!("{}:{}", host, port);
        tracing::info!("Connecting to {}", peer);

        let stream = match timeout(connect_timeout, TcpStream::connect((host, port))).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                tracing::warn!("Connection to {} failed: {}", peer, e);
                return Err(e.into());
            }
            Err(_) => {
                tracing::warn!("Connection to {} timed out after {:?}", peer, connect_timeout);
                return Err(HeosError::Transport(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("connect to {} timed out", peer),
                )));
            }
        };

        // Command frames are tiny; send each one immediately.
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!("Failed to set TCP_NODELAY on {}: {}", peer, e);
        }

        tracing::info!("Connected to {}", peer);
        Ok(Self::from_stream(stream, peer))
    }

    /// Local address of the socket, i.e. the interface that reaches the device
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.stream.as_ref().and_then(|s| s.local_addr().ok())
    }
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap an already connected stream
    pub fn from_stream(stream: S, peer: impl Into<String>) -> Self {
        Self {
            stream: Some(stream),
            peer: peer.into(),
            read_buf: BytesMut::new(),
        }
    }

    /// Description of the remote end, for logging
    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    /// Write a complete frame
    ///
    /// An I/O error closes the connection.
    pub async fn send(&mut self, data: &[u8]) -> Result<()> {
        let stream = self.stream.as_mut().ok_or(HeosError::ConnectionClosed)?;
        let written = match stream.write_all(data).await {
            Ok(()) => stream.flush().await,
            Err(e) => Err(e),
        };

        if let Err(e) = written {
            tracing::warn!("Write to {} failed: {}", self.peer, e);
            self.abandon();
            return Err(e.into());
        }
        Ok(())
    }

    /// Read whatever is available, up to `max_size` bytes
    ///
    /// End of stream is reported as `ConnectionClosed`. Both end of stream and
    /// I/O errors close the connection.
    pub async fn receive(&mut self, max_size: usize) -> Result<Bytes> {
        let stream = self.stream.as_mut().ok_or(HeosError::ConnectionClosed)?;

        let limit = max_size.max(1);
        self.read_buf.reserve(limit);
        let read = (&mut *stream)
            .take(limit as u64)
            .read_buf(&mut self.read_buf)
            .await;

        match read {
            Ok(0) => {
                tracing::info!("Connection to {} closed by peer", self.peer);
                self.stream = None;
                Err(HeosError::ConnectionClosed)
            }
            Ok(_) => Ok(self.read_buf.split().freeze()),
            Err(e) => {
                tracing::warn!("Read from {} failed: {}", self.peer, e);
                self.abandon();
                Err(e.into())
            }
        }
    }

    /// Drop the stream without a shutdown handshake
    ///
    /// Used once the stream is known to be unusable, e.g. after a failed or
    /// partial write.
    pub fn abandon(&mut self) {
        if self.stream.take().is_some() {
            self.read_buf.clear();
            tracing::info!("Dropped connection to {}", self.peer);
        }
    }

    /// Shut the stream down; calling this again is a no-op
    pub async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.shutdown().await {
                tracing::debug!("Error shutting down connection to {}: {}", self.peer, e);
            }
            tracing::info!("Closed connection to {}", self.peer);
        }
    }
}
