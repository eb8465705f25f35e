//! Hivegate: protocol-agnostic proxy core for honeypot deployments
//!
//! This library implements the forwarding engine of a honeypot: proxies that
//! listen on arbitrary ports and relay opaque traffic to backend services
//! (real daemons or emulators), with lifecycle control that never leaks a
//! listener or a forwarding task. TCP connections pass through a middleware
//! chain before the backend is dialed; UDP datagrams are pumped best-effort.
//!
//! # Main Features
//!
//! - TCP and UDP forwarding behind one `ProxyEndpoint` surface
//! - Start/stop lifecycle that drains in-flight connections on shutdown
//! - Connection middleware applied before the backend is dialed
//! - A registry enforcing (network, port) uniqueness with cascading delete
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use hivegate::common::{Network, Result};
//! use hivegate::proxy::{ConnectionLogger, MiddlewareChain, ProxyManager};
//! use hivegate::service::ServiceRegistry;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let services = Arc::new(ServiceRegistry::new());
//!     let middlewares = Arc::new(MiddlewareChain::new());
//!     middlewares.register(Arc::new(ConnectionLogger::new()))?;
//!
//!     let manager = ProxyManager::new(Arc::clone(&services), middlewares);
//!
//!     // Expose port 2323 and forward it to a telnet emulator on 12323
//!     let service = services.create_service("telnetd", Network::Tcp, 12323, "")?;
//!     let proxy = manager.create_proxy(Network::Tcp, 2323)?;
//!     proxy.set_service(service);
//!     proxy.start().await?;
//!
//!     tokio::signal::ctrl_c().await?;
//!     proxy.stop().await?;
//!     Ok(())
//! }
//! ```

// Public modules
pub mod common;
pub mod config;
pub mod proxy;
pub mod service;

// Re-export commonly used structures and functions for convenience
pub use common::{Network, ProxyError, Result, Status};
pub use proxy::{ProxyEndpoint, ProxyManager};
pub use service::{Service, ServiceRegistry};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
