//! Hivegate command line tool
//!
//! Loads the proxy configuration, assembles the registries and runs every
//! configured proxy until interrupted.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use log::{error, info, warn};

use hivegate::common::{init_logger, validate_port, ProxyError, Result};
use hivegate::config::AppConfig;
use hivegate::proxy::{ConnectionLogger, MiddlewareChain, ProxyManager};
use hivegate::service::{Service, ServiceRegistry};
use hivegate::{APP_NAME, VERSION};

/// Protocol-agnostic proxy core for honeypot deployments
#[derive(Parser, Debug)]
#[clap(author, version = VERSION, about, long_about = None)]
struct Args {
    /// Path to the JSON configuration file
    #[clap(short, long, env = "HIVEGATE_CONFIG")]
    config: Option<PathBuf>,

    /// Log level, overriding the configured one
    #[clap(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = AppConfig::load(args.config.as_deref())?;
    init_logger(args.log_level.as_deref().unwrap_or(&config.log_level));

    info!("Starting {} v{}", APP_NAME, VERSION);

    let services = Arc::new(ServiceRegistry::new());
    let middlewares = Arc::new(MiddlewareChain::new());
    middlewares.register(Arc::new(ConnectionLogger::new()))?;

    let manager = ProxyManager::with_settings(
        Arc::clone(&services),
        middlewares,
        config.settings(),
    );

    if config.proxies.is_empty() {
        warn!("no proxies configured; nothing to expose");
    }

    for spec in &config.proxies {
        validate_port(spec.port)?;

        let service = services.create_service(
            &spec.service.name,
            spec.network,
            spec.service.port,
            &spec.service.host,
        )?;
        service.set_locked(spec.service.locked);

        let proxy = manager.create_proxy(spec.network, spec.port)?;
        proxy.set_service(service.clone());
        proxy.start().await?;

        info!(
            "{} proxy on port {} forwarding to {} ({})",
            spec.network,
            spec.port,
            service.name(),
            service.address()
        );
    }

    info!("Press Ctrl+C to stop");
    tokio::signal::ctrl_c().await.map_err(ProxyError::Io)?;

    info!("Shutting down");
    let proxies = manager.get_proxies();
    let results = futures::future::join_all(proxies.iter().map(|p| p.stop())).await;

    for (proxy, result) in proxies.iter().zip(results) {
        if let Err(e) = result {
            error!(
                "failed to stop {} proxy on port {}: {}",
                proxy.network(),
                proxy.port(),
                e
            );
        }
    }

    info!("Shutdown complete");
    Ok(())
}
