//! TCP proxy
//!
//! Accepts stream connections on the proxy port, runs them through the
//! middleware chain, dials the bound service and relays bytes until both
//! sides are done. Each accepted connection is one forwarding task tracked
//! in the accept loop's `JoinSet`; stopping the proxy drains that set before
//! returning.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, warn};
use metrics::counter;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::timeout;

use crate::common::{BufferPool, Network, ProxyError, Result, Status};
use crate::service::Service;

use super::base::{ConnectionGuard, ProxyCore, ProxyTask};
use super::forwarder::relay;
use super::middleware::{BoxedStream, MiddlewareChain};
use super::ProxySettings;

/// Stream forwarder bound to one listening port
pub struct TcpProxy {
    core: Arc<ProxyCore>,
    middlewares: Arc<MiddlewareChain>,
    pool: BufferPool,
    connect_timeout: Duration,
}

impl TcpProxy {
    /// Create a stopped TCP proxy for the given port
    pub fn new(port: u16, middlewares: Arc<MiddlewareChain>, settings: &ProxySettings) -> Result<Self> {
        Ok(Self {
            core: Arc::new(ProxyCore::new(Network::Tcp, port)?),
            middlewares,
            pool: BufferPool::new(settings.max_relay_buffers, settings.buffer_size),
            connect_timeout: settings.connect_timeout,
        })
    }

    pub(crate) fn core(&self) -> &ProxyCore {
        &self.core
    }

    /// Bind the listener and spawn the accept loop
    ///
    /// Fails with `ServiceNotBound` when no service is attached, with
    /// `ProxyAlreadyRunning` when already started, and with `Io` when the
    /// port cannot be bound.
    pub async fn start(&self) -> Result<()> {
        let mut lifecycle = self.core.lifecycle_lock().await;
        if lifecycle.is_some() {
            return Err(ProxyError::ProxyAlreadyRunning);
        }
        if self.core.service().is_none() {
            return Err(ProxyError::ServiceNotBound);
        }

        let addr = SocketAddr::from(([0, 0, 0, 0], self.core.port()));
        let listener = TcpListener::bind(addr).await.map_err(ProxyError::Io)?;
        debug!("tcp proxy {} listening on {}", self.core.id(), addr);

        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(accept_loop(
            listener,
            stop_rx,
            Arc::clone(&self.core),
            Arc::clone(&self.middlewares),
            self.pool.clone(),
            self.connect_timeout,
        ));

        *lifecycle = Some(ProxyTask { stop: stop_tx, handle });
        self.core.set_status(Status::Running);
        Ok(())
    }

    /// Stop the proxy and wait for in-flight connections to finish
    pub async fn stop(&self) -> Result<()> {
        self.core.stop().await
    }
}

/// Accept connections until stopped or the listener fails
///
/// A listener-level error is fatal to this proxy instance: the loop exits
/// and the proxy stays unable to accept until explicitly restarted.
async fn accept_loop(
    listener: TcpListener,
    mut stop: watch::Receiver<bool>,
    core: Arc<ProxyCore>,
    middlewares: Arc<MiddlewareChain>,
    pool: BufferPool,
    connect_timeout: Duration,
) {
    let mut tasks = JoinSet::new();

    loop {
        tokio::select! {
            biased;

            _ = stop.changed() => {
                debug!("tcp proxy {} stopping", core.id());
                break;
            }

            accepted = listener.accept() => {
                match accepted {
                    Ok((client, peer)) => {
                        // Snapshot the service so a rebind only affects
                        // connections accepted after it
                        let Some(service) = core.service() else {
                            warn!("no service bound, dropping connection from {}", peer);
                            continue;
                        };

                        counter!("hivegate_connections_total").increment(1);
                        let guard = ConnectionGuard::new(Arc::clone(&core));
                        let middlewares = Arc::clone(&middlewares);
                        let pool = pool.clone();

                        tasks.spawn(async move {
                            let _guard = guard;
                            forward(client, peer, service, middlewares, pool, connect_timeout).await;
                        });
                    }
                    Err(e) => {
                        error!("tcp proxy {} accept failed: {}", core.id(), e);
                        break;
                    }
                }
            }

            Some(finished) = tasks.join_next(), if !tasks.is_empty() => {
                if let Err(e) = finished {
                    error!("forwarding task failed: {}", e);
                }
            }
        }
    }

    // Close the listener before draining so no new connection sneaks in
    drop(listener);

    while let Some(finished) = tasks.join_next().await {
        if let Err(e) = finished {
            error!("forwarding task failed during drain: {}", e);
        }
    }

    debug!("tcp proxy {} drained", core.id());
}

/// Handle one accepted connection end to end
async fn forward(
    client: TcpStream,
    peer: SocketAddr,
    service: Arc<dyn Service>,
    middlewares: Arc<MiddlewareChain>,
    pool: BufferPool,
    connect_timeout: Duration,
) {
    let client: BoxedStream = Box::new(client);

    // Middleware first; a rejection means the backend is never dialed
    let client = match middlewares.apply(client, peer) {
        Ok(conn) => conn,
        Err(e) => {
            warn!("connection from {} rejected: {}", peer, e);
            return;
        }
    };

    let address = service.address();
    let backend = match timeout(connect_timeout, TcpStream::connect(&address)).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => {
            error!("dial to {} failed: {}", address, e);
            return;
        }
        Err(_) => {
            error!("dial to {} timed out", address);
            return;
        }
    };

    debug!("forwarding {} -> {}", peer, address);
    relay(client, backend, &pool).await;
}
