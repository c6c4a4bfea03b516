//! Port search for listening endpoints

use std::io;
use std::net::{IpAddr, SocketAddr};
use tandem_config::TransportConfig;
use tokio::net::TcpListener;
use tracing::{debug, info};

use crate::error::IpcError;

/// Binds a listener to the first free port at or above a starting port
///
/// Only "address in use" advances the search. Any other bind failure is
/// returned immediately, and the search gives up after `max_attempts`
/// candidates or at the top of the port range.
#[derive(Debug, Clone)]
pub struct PortBinder {
    address: IpAddr,
    max_attempts: u32,
}

impl PortBinder {
    pub fn new(address: IpAddr, max_attempts: u32) -> Self {
        Self {
            address,
            max_attempts,
        }
    }

    pub fn from_config(config: &TransportConfig) -> Self {
        Self::new(config.bind_address, config.max_bind_attempts)
    }

    /// Bind to the first free port `>= start`, returning the listener and its port
    pub async fn bind(&self, start: u16) -> Result<(TcpListener, u16), IpcError> {
        let mut candidate = start;
        let mut attempts = 0;

        while attempts < self.max_attempts {
            attempts += 1;
            let addr = SocketAddr::new(self.address, candidate);
            debug!(port = candidate, attempt = attempts, "Attempting to bind");

            match TcpListener::bind(addr).await {
                Ok(listener) => {
                    let port = listener.local_addr()?.port();
                    info!(port, attempts, "Bound listening endpoint");
                    return Ok((listener, port));
                }
                Err(e) if e.kind() == io::ErrorKind::AddrInUse => {
                    debug!(port = candidate, "Port in use, trying next");
                }
                Err(source) => return Err(IpcError::Bind { addr, source }),
            }

            candidate = match candidate.checked_add(1) {
                Some(next) => next,
                None => break,
            };
        }

        Err(IpcError::PortsExhausted { start, attempts })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn localhost_binder(max_attempts: u32) -> PortBinder {
        PortBinder::new(IpAddr::V4(Ipv4Addr::LOCALHOST), max_attempts)
    }

    async fn occupied_port() -> (TcpListener, u16) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        (listener, port)
    }

    #[tokio::test]
    async fn test_binds_free_start_port() {
        // Find a port, release it, then ask for it back
        let (listener, port) = occupied_port().await;
        drop(listener);

        let (_bound, bound_port) = localhost_binder(50).bind(port).await.unwrap();
        assert!(bound_port >= port);
    }

    #[tokio::test]
    async fn test_skips_port_in_use() {
        let (_held, port) = occupied_port().await;

        let (bound, bound_port) = localhost_binder(50).bind(port).await.unwrap();
        assert!(bound_port > port);
        assert_eq!(bound.local_addr().unwrap().port(), bound_port);
    }

    #[tokio::test]
    async fn test_search_is_monotonic_over_a_run_of_taken_ports() {
        let (first, port) = occupied_port().await;
        let binder = localhost_binder(50);

        let mut held = vec![first];
        let mut last = port;
        for _ in 0..3 {
            let (listener, next) = binder.bind(port).await.unwrap();
            assert!(next > last);
            last = next;
            held.push(listener);
        }
    }

    #[tokio::test]
    async fn test_attempt_cap() {
        let (_held, port) = occupied_port().await;

        let err = localhost_binder(1).bind(port).await.unwrap_err();
        assert!(matches!(err, IpcError::PortsExhausted { attempts: 1, .. }));
    }

    #[tokio::test]
    async fn test_non_local_address_is_fatal() {
        // TEST-NET-3 is never assigned to a local interface
        let binder = PortBinder::new("203.0.113.7".parse().unwrap(), 50);
        let err = binder.bind(40000).await.unwrap_err();
        assert!(matches!(err, IpcError::Bind { .. }));
        assert!(err.is_fatal());
    }
}
