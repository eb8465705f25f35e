//! Shared proxy state
//!
//! [`ProxyCore`] carries everything the TCP and UDP variants have in common:
//! identity, port, network, the bound service slot, the explicit status and
//! the handle of the running accept/pump task. Status is stored as an atomic
//! value instead of being inferred from the stop channel, so a status query
//! never races with shutdown.

use std::sync::atomic::{AtomicU16, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use log::error;
use metrics::gauge;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::common::{validate_port_number, Network, ProxyError, Result, Status};
use crate::service::Service;

/// The running accept loop (TCP) or datagram pump (UDP) of a proxy
///
/// Dropping the sender alone is not how shutdown works: stop() sends the
/// signal explicitly and then awaits the task, which drains its connections.
pub(crate) struct ProxyTask {
    pub(crate) stop: watch::Sender<bool>,
    pub(crate) handle: JoinHandle<()>,
}

/// State shared between a proxy handle and its background task
pub(crate) struct ProxyCore {
    id: Uuid,
    network: Network,
    port: AtomicU16,
    status: AtomicU8,
    service: RwLock<Option<Arc<dyn Service>>>,
    active: AtomicUsize,
    lifecycle: Mutex<Option<ProxyTask>>,
}

impl ProxyCore {
    pub(crate) fn new(network: Network, port: u16) -> Result<Self> {
        validate_port_number(port)?;

        Ok(Self {
            id: Uuid::new_v4(),
            network,
            port: AtomicU16::new(port),
            status: AtomicU8::new(Status::Stopped.as_u8()),
            service: RwLock::new(None),
            active: AtomicUsize::new(0),
            lifecycle: Mutex::new(None),
        })
    }

    pub(crate) fn id(&self) -> Uuid {
        self.id
    }

    pub(crate) fn network(&self) -> Network {
        self.network
    }

    pub(crate) fn port(&self) -> u16 {
        self.port.load(Ordering::Relaxed)
    }

    /// Change the port for the next start
    ///
    /// A running listener keeps its old port until the proxy is restarted.
    pub(crate) fn set_port(&self, port: u16) -> Result<u16> {
        validate_port_number(port)?;
        self.port.store(port, Ordering::Relaxed);
        Ok(port)
    }

    pub(crate) fn status(&self) -> Status {
        Status::from_u8(self.status.load(Ordering::Acquire))
    }

    pub(crate) fn set_status(&self, status: Status) {
        self.status.store(status.as_u8(), Ordering::Release);
    }

    pub(crate) fn service(&self) -> Option<Arc<dyn Service>> {
        self.service.read().unwrap().clone()
    }

    pub(crate) fn set_service(&self, service: Arc<dyn Service>) {
        *self.service.write().unwrap() = Some(service);
    }

    /// Number of in-flight forwarding tasks
    pub(crate) fn active_connections(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    /// Serialize start against concurrent start/stop calls
    ///
    /// The guard is held across listener binding so two racing starts cannot
    /// both install a task.
    pub(crate) async fn lifecycle_lock(&self) -> tokio::sync::MutexGuard<'_, Option<ProxyTask>> {
        self.lifecycle.lock().await
    }

    /// Signal the background task and wait until it has drained
    ///
    /// When this returns, the listener is closed and no forwarding task for
    /// this proxy instance remains.
    pub(crate) async fn stop(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock().await;
        let task = lifecycle.take().ok_or(ProxyError::ProxyNotRunning)?;

        let _ = task.stop.send(true);
        if let Err(e) = task.handle.await {
            error!("proxy {} task failed during shutdown: {}", self.id, e);
        }

        self.set_status(Status::Stopped);
        Ok(())
    }
}

/// Tracks one in-flight forwarding task
///
/// Incremented when the task is spawned, decremented when it completes, so
/// shutdown can observe the drain.
pub(crate) struct ConnectionGuard {
    core: Arc<ProxyCore>,
}

impl ConnectionGuard {
    pub(crate) fn new(core: Arc<ProxyCore>) -> Self {
        core.active.fetch_add(1, Ordering::AcqRel);
        gauge!("hivegate_active_connections").increment(1.0);
        Self { core }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.core.active.fetch_sub(1, Ordering::AcqRel);
        gauge!("hivegate_active_connections").decrement(1.0);
    }
}
