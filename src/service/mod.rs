//! Backend service registry
//!
//! A service is the backend a proxy forwards traffic to: a real daemon or an
//! emulator, identified by network, host and port. The proxy core only
//! consumes the narrow [`Service`] contract; where service implementations
//! come from (plugins, emulators, configuration) is not its concern.
//!
//! Locked services are the built-in ones that must survive management
//! operations: deleting them through the registry fails, which in turn makes
//! the proxy manager's cascade delete fail without touching the proxy.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use uuid::Uuid;

use crate::common::{validate_port_number, Network, ProxyError, Result};

/// Contract every backend service exposes to the proxy core
#[cfg_attr(test, mockall::automock)]
pub trait Service: Send + Sync {
    /// Process-unique identifier
    fn id(&self) -> Uuid;

    /// Human-readable name, used in logs only
    fn name(&self) -> String;

    /// Transport the service speaks
    fn network(&self) -> Network;

    /// Port the service listens on
    fn port(&self) -> u16;

    /// Host the service listens on; empty means loopback
    fn host(&self) -> String;

    /// Dialable "host:port" address of the service
    fn address(&self) -> String {
        let host = self.host();
        if host.is_empty() {
            format!("127.0.0.1:{}", self.port())
        } else {
            format!("{}:{}", host, self.port())
        }
    }

    /// Whether the service may be removed through the registry
    fn is_locked(&self) -> bool;
}

/// Plain service entry backed by configuration
#[derive(Debug)]
pub struct ServiceEntry {
    id: Uuid,
    name: String,
    network: Network,
    port: u16,
    host: String,
    locked: AtomicBool,
}

impl ServiceEntry {
    /// Create a service entry, validating the port number
    pub fn new(name: &str, network: Network, port: u16, host: &str) -> Result<Self> {
        validate_port_number(port)?;

        Ok(Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            network,
            port,
            host: host.to_string(),
            locked: AtomicBool::new(false),
        })
    }

    /// Mark the service as removable or not
    pub fn set_locked(&self, locked: bool) {
        self.locked.store(locked, Ordering::Relaxed);
    }
}

impl Service for ServiceEntry {
    fn id(&self) -> Uuid {
        self.id
    }

    fn name(&self) -> String {
        self.name.clone()
    }

    fn network(&self) -> Network {
        self.network
    }

    fn port(&self) -> u16 {
        self.port
    }

    fn host(&self) -> String {
        self.host.clone()
    }

    fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Relaxed)
    }
}

/// Registry of the services known to this process
///
/// Shared behind an `Arc`; all mutation happens under the internal lock.
#[derive(Default)]
pub struct ServiceRegistry {
    services: RwLock<Vec<Arc<dyn Service>>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a service entry and register it
    pub fn create_service(
        &self,
        name: &str,
        network: Network,
        port: u16,
        host: &str,
    ) -> Result<Arc<ServiceEntry>> {
        let entry = Arc::new(ServiceEntry::new(name, network, port, host)?);
        self.add_service(entry.clone())?;
        Ok(entry)
    }

    /// Register an externally constructed service
    pub fn add_service(&self, service: Arc<dyn Service>) -> Result<()> {
        let mut services = self.services.write().unwrap();

        if services.iter().any(|s| s.id() == service.id()) {
            return Err(ProxyError::ServiceAlreadyRegistered(service.id().to_string()));
        }

        services.push(service);
        Ok(())
    }

    /// Look up a service by id
    pub fn get_service(&self, id: Uuid) -> Result<Arc<dyn Service>> {
        self.services
            .read()
            .unwrap()
            .iter()
            .find(|s| s.id() == id)
            .cloned()
            .ok_or(ProxyError::ServiceNotFound)
    }

    /// Snapshot of all registered services
    pub fn get_services(&self) -> Vec<Arc<dyn Service>> {
        self.services.read().unwrap().clone()
    }

    /// Remove a service unless it is locked
    ///
    /// Removal does not preserve registration order.
    pub fn delete_service(&self, id: Uuid) -> Result<()> {
        let mut services = self.services.write().unwrap();

        let index = services
            .iter()
            .position(|s| s.id() == id)
            .ok_or(ProxyError::ServiceNotFound)?;

        if services[index].is_locked() {
            return Err(ProxyError::ServiceLocked(services[index].name()));
        }

        services.swap_remove(index);
        Ok(())
    }
}
