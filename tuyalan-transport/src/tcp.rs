//! TCP transport

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

use tuyalan_core::DEFAULT_PORT;
use tuyalan_core::constants::DEFAULT_TIMEOUT;

use crate::{error::*, Connection, Transport};

/// TCP transport for Tuya devices
///
/// The host is resolved on every connect, so a device that changed address
/// is picked up on the next reconnect.
#[derive(Debug, Clone)]
pub struct TcpTransport {
    addr: String,
    port: u16,
    connect_timeout: Duration,
}

impl TcpTransport {
    /// Create new TCP transport
    pub fn new(addr: impl Into<String>, port: u16) -> Self {
        Self {
            addr: addr.into(),
            port,
            connect_timeout: Duration::from_secs(DEFAULT_TIMEOUT),
        }
    }

    /// Transport on the standard device port
    pub fn with_default_port(addr: impl Into<String>) -> Self {
        Self::new(addr, DEFAULT_PORT)
    }

    /// Set connection timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    /// Resolve address to SocketAddr
    async fn resolve_addr(&self) -> Result<SocketAddr> {
        let addr_str = format!("{}:{}", self.addr, self.port);

        let mut addrs = tokio::net::lookup_host(&addr_str)
            .await
            .map_err(|e| Error::InvalidAddress(format!("{}: {}", addr_str, e)))?;

        addrs
            .next()
            .ok_or_else(|| Error::InvalidAddress(format!("No addresses found for {}", addr_str)))
    }

    async fn open(&self) -> Result<TcpStream> {
        let addr = self.resolve_addr().await?;

        debug!("Connecting to {}...", addr);

        let stream = TcpStream::connect(addr).await?;

        // Disable Nagle's algorithm for low latency
        stream.set_nodelay(true)?;

        debug!("Connected to {}", addr);
        Ok(stream)
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn connect(&self) -> Result<Connection> {
        let stream = timeout(self.connect_timeout, self.open())
            .await
            .map_err(|_| Error::ConnectionTimeout(self.connect_timeout))??;

        let peer = stream
            .peer_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|_| self.remote_addr());

        let (reader, writer) = stream.into_split();
        Ok(Connection::new(reader, writer, peer))
    }

    fn remote_addr(&self) -> String {
        format!("{}:{}", self.addr, self.port)
    }
}
