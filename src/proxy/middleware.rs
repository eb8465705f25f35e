//! Connection middleware
//!
//! Middlewares are interceptors applied to every accepted TCP connection
//! before the backend is dialed. Each one can observe the connection, wrap
//! the stream, or reject it; a rejection closes the client connection and
//! the backend is never contacted.
//!
//! The chain is injected into each TCP proxy at construction time and shared
//! between them through an `Arc`. UDP proxies do not invoke it: the chain is
//! stream-oriented and datagram traffic has no stream to intercept.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use log::info;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::common::{ProxyError, Result};

/// Object-safe stream bound: anything a middleware may hand back
pub trait ClientStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> ClientStream for T {}

/// A client connection as it travels through the chain
pub type BoxedStream = Box<dyn ClientStream>;

/// A single connection interceptor
pub trait Middleware: Send + Sync {
    /// Identity of the middleware; registration is deduplicated by name
    fn name(&self) -> &'static str;

    /// Observe, wrap or reject the connection
    fn handle(&self, conn: BoxedStream, peer: SocketAddr) -> Result<BoxedStream>;
}

/// Ordered chain of interceptors shared by the TCP proxies of one manager
#[derive(Default)]
pub struct MiddlewareChain {
    middlewares: RwLock<Vec<Arc<dyn Middleware>>>,
}

impl MiddlewareChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a middleware to the chain
    ///
    /// Registering a second middleware with the same name fails with
    /// `MiddlewareAlreadyRegistered`.
    pub fn register(&self, middleware: Arc<dyn Middleware>) -> Result<()> {
        let mut middlewares = self.middlewares.write().unwrap();

        if middlewares.iter().any(|m| m.name() == middleware.name()) {
            return Err(ProxyError::MiddlewareAlreadyRegistered(
                middleware.name().to_string(),
            ));
        }

        middlewares.push(middleware);
        Ok(())
    }

    /// Fold a connection through every middleware in registration order
    ///
    /// Short-circuits on the first error.
    pub fn apply(&self, conn: BoxedStream, peer: SocketAddr) -> Result<BoxedStream> {
        let snapshot: Vec<Arc<dyn Middleware>> = self.middlewares.read().unwrap().clone();

        let mut conn = conn;
        for middleware in snapshot {
            conn = middleware.handle(conn, peer)?;
        }

        Ok(conn)
    }

    pub fn len(&self) -> usize {
        self.middlewares.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Records every accepted connection
///
/// The minimal observation middleware for a honeypot: the peer address is
/// what the operator wants even when the payload is opaque.
#[derive(Default)]
pub struct ConnectionLogger {
    accepted: AtomicU64,
}

impl ConnectionLogger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total connections seen by this middleware
    pub fn accepted(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }
}

impl Middleware for ConnectionLogger {
    fn name(&self) -> &'static str {
        "connection-logger"
    }

    fn handle(&self, conn: BoxedStream, peer: SocketAddr) -> Result<BoxedStream> {
        let total = self.accepted.fetch_add(1, Ordering::Relaxed) + 1;
        info!("connection #{} from {}", total, peer);
        Ok(conn)
    }
}
