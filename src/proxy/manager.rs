//! Proxy registry
//!
//! The manager owns every proxy of the process and enforces that no two of
//! them share a (network, port) pair. It is also where deletion cascades:
//! removing a proxy first removes its bound service from the service
//! registry, and a locked service vetoes the whole operation.
//!
//! All registry mutation happens under one lock, since create and delete are
//! routinely called from concurrent management requests.

use std::sync::{Arc, RwLock};

use log::{debug, info};
use uuid::Uuid;

use crate::common::{Network, ProxyError, Result};
use crate::service::{Service, ServiceRegistry};

use super::{MiddlewareChain, ProxyEndpoint, ProxySettings};

/// Registry and factory for the process's proxies
pub struct ProxyManager {
    proxies: RwLock<Vec<Arc<ProxyEndpoint>>>,
    middlewares: Arc<MiddlewareChain>,
    services: Arc<ServiceRegistry>,
    settings: ProxySettings,
}

impl ProxyManager {
    /// Create a manager with default proxy settings
    pub fn new(services: Arc<ServiceRegistry>, middlewares: Arc<MiddlewareChain>) -> Self {
        Self::with_settings(services, middlewares, ProxySettings::default())
    }

    /// Create a manager with explicit proxy settings
    pub fn with_settings(
        services: Arc<ServiceRegistry>,
        middlewares: Arc<MiddlewareChain>,
        settings: ProxySettings,
    ) -> Self {
        Self {
            proxies: RwLock::new(Vec::new()),
            middlewares,
            services,
            settings,
        }
    }

    /// The middleware chain shared by this manager's TCP proxies
    pub fn middlewares(&self) -> &Arc<MiddlewareChain> {
        &self.middlewares
    }

    /// The service registry deletion cascades into
    pub fn services(&self) -> &Arc<ServiceRegistry> {
        &self.services
    }

    /// Create and register a proxy for the (network, port) pair
    ///
    /// Fails with `ProxyAlreadyRegistered` when the pair is taken. Port
    /// availability on the host is not probed here; that surfaces when the
    /// proxy is started.
    pub fn create_proxy(&self, network: Network, port: u16) -> Result<Arc<ProxyEndpoint>> {
        // Uniqueness check and insertion under one write lock
        let mut proxies = self.proxies.write().unwrap();

        if proxies.iter().any(|p| p.network() == network && p.port() == port) {
            return Err(ProxyError::ProxyAlreadyRegistered(network, port));
        }

        let proxy = Arc::new(ProxyEndpoint::new(
            network,
            port,
            Arc::clone(&self.middlewares),
            &self.settings,
        )?);

        debug!("registered {} proxy {} on port {}", network, proxy.id(), port);
        proxies.push(Arc::clone(&proxy));
        Ok(proxy)
    }

    /// Look up a proxy by id
    pub fn get_proxy(&self, id: Uuid) -> Result<Arc<ProxyEndpoint>> {
        self.proxies
            .read()
            .unwrap()
            .iter()
            .find(|p| p.id() == id)
            .cloned()
            .ok_or(ProxyError::ProxyNotFound)
    }

    /// Look up a proxy by (network, port)
    pub fn get_proxy_from_params(&self, network: Network, port: u16) -> Result<Arc<ProxyEndpoint>> {
        self.proxies
            .read()
            .unwrap()
            .iter()
            .find(|p| p.network() == network && p.port() == port)
            .cloned()
            .ok_or(ProxyError::ProxyNotFound)
    }

    /// Snapshot of all registered proxies
    pub fn get_proxies(&self) -> Vec<Arc<ProxyEndpoint>> {
        self.proxies.read().unwrap().clone()
    }

    /// Delete a proxy, cascading into its bound service
    ///
    /// The service is removed first; a locked service fails the whole
    /// operation and leaves the proxy untouched. The proxy is then stopped
    /// (tolerating "already stopped") and dropped from the registry.
    /// Removal does not preserve registration order.
    pub async fn delete_proxy(&self, id: Uuid) -> Result<()> {
        let proxy = self.get_proxy(id)?;

        if let Some(service) = proxy.service() {
            self.services.delete_service(service.id())?;
        }

        match proxy.stop().await {
            Ok(()) | Err(ProxyError::ProxyNotRunning) => {}
            Err(e) => return Err(e),
        }

        let mut proxies = self.proxies.write().unwrap();
        if let Some(index) = proxies.iter().position(|p| p.id() == id) {
            proxies.swap_remove(index);
        }

        info!("deleted proxy {}", id);
        Ok(())
    }

    /// Attach a service to the proxy matching (service network, port)
    pub fn set_service(&self, port: u16, service: Arc<dyn Service>) -> Result<Arc<ProxyEndpoint>> {
        let proxy = self.get_proxy_from_params(service.network(), port)?;
        proxy.set_service(service);
        Ok(proxy)
    }
}
