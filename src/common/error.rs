//! Error handling module
//!
//! This module defines the error types and result type aliases used in the application.

use thiserror::Error;
use std::io;

use super::types::Network;

/// Hivegate error type
#[derive(Error, Debug)]
pub enum ProxyError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Port number outside 1-65535
    #[error("invalid port {0}")]
    InvalidPort(u16),

    /// Port already bound on the host network stack
    #[error("port {0} unavailable")]
    PortUnavailable(u16),

    /// A proxy already occupies the (network, port) pair
    #[error("proxy already registered for {0}:{1}")]
    ProxyAlreadyRegistered(Network, u16),

    /// No proxy matched the lookup
    #[error("proxy not found")]
    ProxyNotFound,

    /// Stop called on a proxy that is not running
    #[error("proxy not running")]
    ProxyNotRunning,

    /// Start called on a proxy that is already running
    #[error("proxy already running")]
    ProxyAlreadyRunning,

    /// Start called without a bound service
    #[error("no service bound to the proxy")]
    ServiceNotBound,

    /// No service matched the lookup
    #[error("service not found")]
    ServiceNotFound,

    /// A service with the same id is already registered
    #[error("service {0} already registered")]
    ServiceAlreadyRegistered(String),

    /// Delete attempted on a locked service
    #[error("service {0} is locked")]
    ServiceLocked(String),

    /// Register called twice with the same middleware
    #[error("middleware {0} already registered")]
    MiddlewareAlreadyRegistered(String),

    /// A middleware rejected the connection
    #[error("middleware {0} rejected the connection: {1}")]
    Middleware(String, String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias
///
/// This is a `Result` type alias that uses our custom `ProxyError`.
pub type Result<T> = std::result::Result<T, ProxyError>;
