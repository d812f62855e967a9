/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 19/10/26
******************************************************************************/

//! Outbound connection establishment.
//!
//! The initiator only ever dials out. A [`Transport`] turns a host and port
//! into a duplex byte stream; [`TcpConnector`] is the production
//! implementation and tests substitute in-memory streams.

use async_trait::async_trait;
use fixlink_core::error::TransportError;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tracing::debug;

/// A bidirectional byte stream usable as a session transport.
pub trait DuplexStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T> DuplexStream for T where T: AsyncRead + AsyncWrite + Send + Unpin {}

/// Type-erased transport stream handed to session handles.
pub type BoxedStream = Box<dyn DuplexStream>;

/// Dials a remote counterparty.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Opens a connection to `host:port`.
    ///
    /// # Errors
    /// Returns `TransportError::Connect` if the connection cannot be opened.
    async fn connect(&self, host: &str, port: u16) -> Result<BoxedStream, TransportError>;
}

/// TCP transport.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    /// Whether to disable Nagle's algorithm on new sockets.
    nodelay: bool,
}

impl TcpConnector {
    /// Creates a connector with `TCP_NODELAY` enabled.
    #[must_use]
    pub const fn new() -> Self {
        Self { nodelay: true }
    }

    /// Sets whether `TCP_NODELAY` is enabled.
    #[must_use]
    pub const fn with_nodelay(mut self, nodelay: bool) -> Self {
        self.nodelay = nodelay;
        self
    }
}

impl Default for TcpConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for TcpConnector {
    async fn connect(&self, host: &str, port: u16) -> Result<BoxedStream, TransportError> {
        let stream = TcpStream::connect((host, port))
            .await
            .map_err(|e| TransportError::Connect {
                addr: format!("{host}:{port}"),
                reason: e.to_string(),
            })?;
        stream.set_nodelay(self.nodelay)?;
        debug!(host, port, "tcp connection established");
        Ok(Box::new(stream))
    }
}
