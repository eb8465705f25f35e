//! UDP proxy
//!
//! Datagram forwarder without a connection or session concept: one socket
//! faces the clients, one ephemeral socket is connected to the backend, and
//! two pump directions move datagrams between them. Replies go to whichever
//! client peer was seen last, which is the behavior honeypot emulators
//! expect for request/response datagram protocols. The middleware chain is
//! not consulted for UDP traffic.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use log::{debug, warn};
use metrics::counter;
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tokio::task::JoinSet;

use crate::common::{BufferPool, Network, ProxyError, Result, Status};

use super::base::{ProxyCore, ProxyTask};

/// Buffer size for a single datagram, sized to a typical UDP MTU
const DATAGRAM_BUFFER_SIZE: usize = 2048;

/// Datagram forwarder bound to one listening port
pub struct UdpProxy {
    core: Arc<ProxyCore>,
    pool: BufferPool,
}

impl UdpProxy {
    /// Create a stopped UDP proxy for the given port
    pub fn new(port: u16) -> Result<Self> {
        Ok(Self {
            core: Arc::new(ProxyCore::new(Network::Udp, port)?),
            // One fixed-size buffer per pump direction
            pool: BufferPool::new(2, DATAGRAM_BUFFER_SIZE),
        })
    }

    pub(crate) fn core(&self) -> &ProxyCore {
        &self.core
    }

    /// Bind the client-facing socket, dial the backend and spawn the pump
    pub async fn start(&self) -> Result<()> {
        let mut lifecycle = self.core.lifecycle_lock().await;
        if lifecycle.is_some() {
            return Err(ProxyError::ProxyAlreadyRunning);
        }
        let Some(service) = self.core.service() else {
            return Err(ProxyError::ServiceNotBound);
        };

        let addr = SocketAddr::from(([0, 0, 0, 0], self.core.port()));
        let listener = UdpSocket::bind(addr).await.map_err(ProxyError::Io)?;

        // The backend socket is dialed once; all client traffic shares it
        let backend = UdpSocket::bind(SocketAddr::from(([0, 0, 0, 0], 0)))
            .await
            .map_err(ProxyError::Io)?;
        backend.connect(service.address()).await.map_err(ProxyError::Io)?;

        debug!(
            "udp proxy {} listening on {} for backend {}",
            self.core.id(),
            addr,
            service.address()
        );

        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(pump(
            Arc::new(listener),
            Arc::new(backend),
            stop_rx,
            Arc::clone(&self.core),
            self.pool.clone(),
        ));

        *lifecycle = Some(ProxyTask { stop: stop_tx, handle });
        self.core.set_status(Status::Running);
        Ok(())
    }

    /// Stop the proxy; pending datagrams are dropped
    pub async fn stop(&self) -> Result<()> {
        self.core.stop().await
    }
}

/// Run both pump directions until the stop signal fires
///
/// Datagram errors are logged and the pump keeps going: datagram traffic is
/// best-effort, unlike a TCP relay where an error ends the forwarding task.
async fn pump(
    listener: Arc<UdpSocket>,
    backend: Arc<UdpSocket>,
    mut stop: watch::Receiver<bool>,
    core: Arc<ProxyCore>,
    pool: BufferPool,
) {
    let last_peer: Arc<Mutex<Option<SocketAddr>>> = Arc::new(Mutex::new(None));
    let mut directions: JoinSet<()> = JoinSet::new();

    {
        let listener = Arc::clone(&listener);
        let backend = Arc::clone(&backend);
        let last_peer = Arc::clone(&last_peer);
        let pool = pool.clone();

        directions.spawn(async move {
            let mut pooled = pool.get_buffer().await;
            loop {
                match listener.recv_from(&mut pooled.buffer).await {
                    Ok((n, peer)) => {
                        *last_peer.lock().unwrap() = Some(peer);
                        counter!("hivegate_datagrams_total").increment(1);
                        if let Err(e) = backend.send(&pooled.buffer[..n]).await {
                            warn!("udp forward to backend failed: {}", e);
                        }
                    }
                    Err(e) => warn!("udp receive from client failed: {}", e),
                }
            }
        });
    }

    {
        let listener = Arc::clone(&listener);
        let backend = Arc::clone(&backend);
        let last_peer = Arc::clone(&last_peer);

        directions.spawn(async move {
            let mut pooled = pool.get_buffer().await;
            loop {
                match backend.recv(&mut pooled.buffer).await {
                    Ok(n) => {
                        let peer = *last_peer.lock().unwrap();
                        match peer {
                            Some(peer) => {
                                if let Err(e) = listener.send_to(&pooled.buffer[..n], peer).await {
                                    warn!("udp reply to {} failed: {}", peer, e);
                                }
                            }
                            // A reply before any client datagram has nowhere to go
                            None => debug!("dropping backend datagram with no known peer"),
                        }
                    }
                    Err(e) => warn!("udp receive from backend failed: {}", e),
                }
            }
        });
    }

    let _ = stop.changed().await;

    // Abort both directions; sockets close when the last Arc drops
    directions.shutdown().await;
    debug!("udp proxy {} pump stopped", core.id());
}
