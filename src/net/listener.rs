//! TCP listener with backpressure.
//!
//! # Responsibilities
//! - Bind to the configured address
//! - Accept incoming TCP connections
//! - Enforce max_connections via a semaphore

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::config::ListenerConfig;

#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    #[error("Failed to bind: {0}")]
    Bind(std::io::Error),

    #[error("Failed to accept: {0}")]
    Accept(std::io::Error),

    #[error("Connection limiter closed")]
    Closed,
}

/// A TCP listener that limits concurrent connections.
///
/// When the limit is reached, `accept` waits until a slot is released.
#[derive(Debug)]
pub struct Listener {
    inner: TcpListener,
    connection_limit: Arc<Semaphore>,
    max_connections: usize,
}

impl Listener {
    pub async fn bind(config: &ListenerConfig) -> Result<Self, ListenerError> {
        let addr: SocketAddr = config.bind_address.parse().map_err(|e| {
            ListenerError::Bind(std::io::Error::new(std::io::ErrorKind::InvalidInput, e))
        })?;

        let listener = TcpListener::bind(addr).await.map_err(ListenerError::Bind)?;
        Self::from_tcp(listener, config.max_connections)
    }

    /// Wrap an already bound listener.
    pub fn from_tcp(inner: TcpListener, max_connections: usize) -> Result<Self, ListenerError> {
        let local_addr = inner.local_addr().map_err(ListenerError::Bind)?;

        tracing::info!(
            address = %local_addr,
            max_connections,
            "Listener bound"
        );

        Ok(Self {
            inner,
            connection_limit: Arc::new(Semaphore::new(max_connections)),
            max_connections,
        })
    }

    /// Accept a connection, waiting for a free slot first.
    ///
    /// The returned permit must be held for the connection's lifetime.
    pub async fn accept(&self) -> Result<(TcpStream, SocketAddr, ConnectionPermit), ListenerError> {
        let permit = self
            .connection_limit
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ListenerError::Closed)?;

        let (stream, addr) = self.inner.accept().await.map_err(ListenerError::Accept)?;

        tracing::trace!(
            peer_addr = %addr,
            available_permits = self.connection_limit.available_permits(),
            "Connection accepted"
        );

        Ok((stream, addr, ConnectionPermit { _permit: permit }))
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ListenerError> {
        self.inner.local_addr().map_err(ListenerError::Bind)
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    pub fn available_permits(&self) -> usize {
        self.connection_limit.available_permits()
    }
}

/// Connection slot; released back to the listener on drop, even if the
/// connection task panics.
#[derive(Debug)]
pub struct ConnectionPermit {
    _permit: OwnedSemaphorePermit,
}
