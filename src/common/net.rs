//! Network utility functions
//!
//! Address parsing and port validators shared by the proxy core and the
//! configuration layer. The availability probe binds a throwaway socket, so
//! it reflects the host network stack at the time of the call only.

use std::net::{SocketAddr, ToSocketAddrs};
use std::str::FromStr;

use socket2::{Domain, Protocol, Socket, Type};

use super::error::{ProxyError, Result};

/// Parse a socket address
///
/// Tries direct parsing first and falls back to resolution through
/// `ToSocketAddrs` for host names.
pub fn parse_socket_addr(addr: &str) -> Result<SocketAddr> {
    if let Ok(socket_addr) = SocketAddr::from_str(addr) {
        return Ok(socket_addr);
    }

    match addr.to_socket_addrs() {
        Ok(mut addrs) => match addrs.next() {
            Some(addr) => Ok(addr),
            None => Err(ProxyError::Config(format!("failed to parse address: {}", addr))),
        },
        Err(e) => Err(ProxyError::Config(format!("failed to parse address {}: {}", addr, e))),
    }
}

/// Check that a port number is in the valid 1-65535 range
pub fn validate_port_number(port: u16) -> Result<u16> {
    if port == 0 {
        return Err(ProxyError::InvalidPort(port));
    }
    Ok(port)
}

/// Check that a port can currently be bound on the host
///
/// Probes with a TCP socket; a UDP service can still collide with another
/// UDP listener that this probe does not see.
pub fn validate_port_available(port: u16) -> Result<u16> {
    let probe = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP))
        .map_err(ProxyError::Io)?;
    // Reuse lets the probe succeed on ports lingering in TIME_WAIT
    probe.set_reuse_address(true).map_err(ProxyError::Io)?;

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    probe
        .bind(&addr.into())
        .map_err(|_| ProxyError::PortUnavailable(port))?;

    Ok(port)
}

/// Check that a port is a valid number and currently available
pub fn validate_port(port: u16) -> Result<u16> {
    validate_port_number(port)?;
    validate_port_available(port)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    #[test]
    fn test_parse_socket_addr() {
        let addr = parse_socket_addr("127.0.0.1:8080").unwrap();
        assert_eq!(addr.port(), 8080);

        assert!(parse_socket_addr("not-an-address").is_err());
    }

    #[test]
    fn test_validate_port_number() {
        assert!(validate_port_number(0).is_err());
        assert_eq!(validate_port_number(1).unwrap(), 1);
        assert_eq!(validate_port_number(65535).unwrap(), 65535);
    }

    #[test]
    fn test_validate_port_available_detects_bound_port() {
        // Hold a listener open and probe its port
        let listener = TcpListener::bind("0.0.0.0:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        match validate_port_available(port) {
            Err(ProxyError::PortUnavailable(p)) => assert_eq!(p, port),
            other => panic!("expected PortUnavailable, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_port_rejects_zero_first() {
        match validate_port(0) {
            Err(ProxyError::InvalidPort(0)) => {}
            other => panic!("expected InvalidPort, got {:?}", other),
        }
    }
}
