//! Registry and lifecycle integration tests
//!
//! These tests exercise the proxy manager against real sockets: uniqueness,
//! lifecycle-misuse errors, bind failures and cascading deletion.

use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;

use once_cell::sync::Lazy;
use serial_test::serial;

use hivegate::common::{Network, ProxyError, Status};
use hivegate::proxy::{MiddlewareChain, ProxyManager};
use hivegate::service::ServiceRegistry;

// Each test takes fresh ports so the suites can run in parallel
static NEXT_PORT: Lazy<AtomicU16> = Lazy::new(|| AtomicU16::new(42000));

fn next_port() -> u16 {
    NEXT_PORT.fetch_add(1, Ordering::Relaxed)
}

fn manager() -> (ProxyManager, Arc<ServiceRegistry>) {
    let services = Arc::new(ServiceRegistry::new());
    let manager = ProxyManager::new(Arc::clone(&services), Arc::new(MiddlewareChain::new()));
    (manager, services)
}

#[tokio::test]
async fn port_uniqueness_is_per_network() {
    let (manager, _) = manager();
    let port = next_port();

    manager.create_proxy(Network::Tcp, port).unwrap();

    match manager.create_proxy(Network::Tcp, port) {
        Err(ProxyError::ProxyAlreadyRegistered(network, p)) => {
            assert_eq!(network, Network::Tcp);
            assert_eq!(p, port);
        }
        other => panic!("expected ProxyAlreadyRegistered, got {:?}", other.err()),
    }

    // The same port over UDP is a distinct endpoint
    manager.create_proxy(Network::Udp, port).unwrap();
}

#[tokio::test]
async fn start_requires_a_bound_service() {
    let (manager, services) = manager();
    let port = next_port();

    let proxy = manager.create_proxy(Network::Tcp, port).unwrap();

    match proxy.start().await {
        Err(ProxyError::ServiceNotBound) => {}
        other => panic!("expected ServiceNotBound, got {:?}", other),
    }
    assert_eq!(proxy.status(), Status::Stopped);

    // Binding a service makes start succeed even if the backend is down;
    // dialing only happens per accepted connection
    let service = services
        .create_service("echo", Network::Tcp, next_port(), "")
        .unwrap();
    proxy.set_service(service);

    proxy.start().await.unwrap();
    assert_eq!(proxy.status(), Status::Running);
    proxy.stop().await.unwrap();
}

#[tokio::test]
async fn stop_twice_fails_cleanly() {
    let (manager, services) = manager();
    let port = next_port();

    let proxy = manager.create_proxy(Network::Tcp, port).unwrap();
    let service = services
        .create_service("echo", Network::Tcp, next_port(), "")
        .unwrap();
    proxy.set_service(service);

    proxy.start().await.unwrap();
    proxy.stop().await.unwrap();
    assert_eq!(proxy.status(), Status::Stopped);

    match proxy.stop().await {
        Err(ProxyError::ProxyNotRunning) => {}
        other => panic!("expected ProxyNotRunning, got {:?}", other),
    }
}

#[tokio::test]
async fn start_twice_fails_cleanly() {
    let (manager, services) = manager();
    let port = next_port();

    let proxy = manager.create_proxy(Network::Udp, port).unwrap();
    let service = services
        .create_service("coapd", Network::Udp, next_port(), "")
        .unwrap();
    proxy.set_service(service);

    proxy.start().await.unwrap();
    match proxy.start().await {
        Err(ProxyError::ProxyAlreadyRunning) => {}
        other => panic!("expected ProxyAlreadyRunning, got {:?}", other),
    }

    proxy.stop().await.unwrap();
}

#[tokio::test]
#[serial]
async fn start_surfaces_bind_errors() {
    let (manager, services) = manager();
    let port = next_port();

    // Occupy the port out from under the proxy
    let blocker = std::net::TcpListener::bind(("0.0.0.0", port)).unwrap();

    let proxy = manager.create_proxy(Network::Tcp, port).unwrap();
    let service = services
        .create_service("echo", Network::Tcp, next_port(), "")
        .unwrap();
    proxy.set_service(service);

    match proxy.start().await {
        Err(ProxyError::Io(_)) => {}
        other => panic!("expected Io error, got {:?}", other),
    }
    assert_eq!(proxy.status(), Status::Stopped);

    // Releasing the port lets the same proxy start
    drop(blocker);
    proxy.start().await.unwrap();
    proxy.stop().await.unwrap();
}

#[tokio::test]
async fn set_port_takes_effect_on_next_start() {
    let (manager, services) = manager();
    let first = next_port();
    let second = next_port();

    let proxy = manager.create_proxy(Network::Tcp, first).unwrap();
    let service = services
        .create_service("echo", Network::Tcp, next_port(), "")
        .unwrap();
    proxy.set_service(service);

    assert_eq!(proxy.set_port(second).unwrap(), second);
    proxy.start().await.unwrap();

    // The listener is on the new port, not the old one
    tokio::net::TcpStream::connect(("127.0.0.1", second))
        .await
        .unwrap();
    assert!(tokio::net::TcpStream::connect(("127.0.0.1", first))
        .await
        .is_err());

    proxy.stop().await.unwrap();
}

#[tokio::test]
async fn delete_stops_running_proxy_and_removes_service() {
    let (manager, services) = manager();
    let port = next_port();

    let service = services
        .create_service("echo", Network::Tcp, next_port(), "")
        .unwrap();
    let proxy = manager.create_proxy(Network::Tcp, port).unwrap();
    proxy.set_service(service);
    proxy.start().await.unwrap();

    manager.delete_proxy(proxy.id()).await.unwrap();

    assert!(manager.get_proxies().is_empty());
    assert!(services.get_services().is_empty());
    assert_eq!(proxy.status(), Status::Stopped);

    // The port is released
    assert!(tokio::net::TcpStream::connect(("127.0.0.1", port))
        .await
        .is_err());
}

#[tokio::test]
async fn delete_with_locked_service_leaves_everything_intact() {
    let (manager, services) = manager();
    let port = next_port();

    let service = services
        .create_service("builtin", Network::Tcp, next_port(), "")
        .unwrap();
    service.set_locked(true);

    let proxy = manager.create_proxy(Network::Tcp, port).unwrap();
    proxy.set_service(service);
    proxy.start().await.unwrap();

    match manager.delete_proxy(proxy.id()).await {
        Err(ProxyError::ServiceLocked(_)) => {}
        other => panic!("expected ServiceLocked, got {:?}", other),
    }

    // Proxy still registered and still accepting
    assert_eq!(manager.get_proxies().len(), 1);
    assert_eq!(services.get_services().len(), 1);
    assert_eq!(proxy.status(), Status::Running);
    tokio::net::TcpStream::connect(("127.0.0.1", port))
        .await
        .unwrap();

    proxy.stop().await.unwrap();
}
