//! Proxy core
//!
//! This module implements the forwarding engine: the TCP and UDP proxy
//! variants behind one [`ProxyEndpoint`] surface, the middleware chain
//! applied to accepted TCP connections, and the [`ProxyManager`] registry
//! that enforces (network, port) uniqueness and binds proxies to backend
//! services. The engine relays opaque bytes; it never parses payloads.

mod base;
mod forwarder;
pub mod manager;
pub mod middleware;
mod tcp;
mod udp;

pub use manager::ProxyManager;
pub use middleware::{BoxedStream, ClientStream, ConnectionLogger, Middleware, MiddlewareChain};
pub use tcp::TcpProxy;
pub use udp::UdpProxy;

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::common::{Network, Result, Status};
use crate::service::Service;

use base::ProxyCore;

/// Tuning knobs shared by the proxies of one manager
#[derive(Debug, Clone)]
pub struct ProxySettings {
    /// How long a backend dial may take before the connection is dropped
    pub connect_timeout: Duration,
    /// Size of each TCP relay buffer
    pub buffer_size: usize,
    /// Upper bound on concurrently borrowed relay buffers per proxy
    pub max_relay_buffers: usize,
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(1),
            buffer_size: 8192,
            max_relay_buffers: 1024,
        }
    }
}

/// A listening endpoint that forwards traffic to a backend service
///
/// The two transport variants share one lifecycle surface; which one backs
/// an endpoint is fixed at construction by the network argument.
pub enum ProxyEndpoint {
    Tcp(TcpProxy),
    Udp(UdpProxy),
}

impl ProxyEndpoint {
    /// Factory keyed on the network enumeration
    pub fn new(
        network: Network,
        port: u16,
        middlewares: Arc<MiddlewareChain>,
        settings: &ProxySettings,
    ) -> Result<Self> {
        match network {
            Network::Tcp => Ok(Self::Tcp(TcpProxy::new(port, middlewares, settings)?)),
            Network::Udp => Ok(Self::Udp(UdpProxy::new(port)?)),
        }
    }

    fn core(&self) -> &ProxyCore {
        match self {
            Self::Tcp(proxy) => proxy.core(),
            Self::Udp(proxy) => proxy.core(),
        }
    }

    /// Open the listener and begin forwarding
    pub async fn start(&self) -> Result<()> {
        match self {
            Self::Tcp(proxy) => proxy.start().await,
            Self::Udp(proxy) => proxy.start().await,
        }
    }

    /// Stop forwarding and wait for in-flight work to drain
    pub async fn stop(&self) -> Result<()> {
        match self {
            Self::Tcp(proxy) => proxy.stop().await,
            Self::Udp(proxy) => proxy.stop().await,
        }
    }

    pub fn id(&self) -> Uuid {
        self.core().id()
    }

    pub fn network(&self) -> Network {
        self.core().network()
    }

    pub fn port(&self) -> u16 {
        self.core().port()
    }

    /// Change the port used by the next start; the live listener keeps its
    /// port until the proxy is restarted.
    pub fn set_port(&self, port: u16) -> Result<u16> {
        self.core().set_port(port)
    }

    pub fn status(&self) -> Status {
        self.core().status()
    }

    pub fn service(&self) -> Option<Arc<dyn Service>> {
        self.core().service()
    }

    /// Bind a backend service
    ///
    /// Allowed while running; only connections accepted afterwards use the
    /// new backend.
    pub fn set_service(&self, service: Arc<dyn Service>) -> Arc<dyn Service> {
        self.core().set_service(Arc::clone(&service));
        service
    }

    /// Number of in-flight forwarding tasks
    pub fn active_connections(&self) -> usize {
        self.core().active_connections()
    }
}
