//
// Copyright 2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Listener port selection and advertised address resolution.

use crate::transport::TransportError;
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use tokio::net::TcpListener;
use tracing::debug;

/// How many consecutive ports are tried above a preferred port that is
/// already taken.
pub const PORT_SCAN_LIMIT: u16 = 100;

/// Binds a listener on `host`.
///
/// With a preferred port the first free port in
/// `preferred..preferred + PORT_SCAN_LIMIT` is used. Without one the
/// operating system picks an ephemeral port.
///
/// # Errors
///
/// Returns [`TransportError::BindFailed`] when no port could be bound.
///
/// # Examples
///
/// ```rust,no_run
/// use dotrpc::transport::bind_preferred;
/// use std::net::Ipv4Addr;
///
/// # async fn example() -> Result<(), dotrpc::TransportError> {
/// let listener = bind_preferred(Ipv4Addr::LOCALHOST.into(), Some(7000)).await?;
/// println!("listening on {}", listener.local_addr()?);
/// # Ok(())
/// # }
/// ```
pub async fn bind_preferred(
    host: IpAddr,
    preferred: Option<u16>,
) -> Result<TcpListener, TransportError> {
    let Some(first) = preferred.filter(|port| *port > 0) else {
        return bind(SocketAddr::new(host, 0)).await;
    };

    let last = first.saturating_add(PORT_SCAN_LIMIT - 1);
    let mut last_error = None;
    for port in first..=last {
        let address = SocketAddr::new(host, port);
        match TcpListener::bind(address).await {
            Ok(listener) => {
                if port != first {
                    debug!(preferred = first, port, "Preferred port taken, using next free port");
                }
                return Ok(listener);
            }
            Err(error) if error.kind() == io::ErrorKind::AddrInUse => last_error = Some(error),
            Err(source) => {
                return Err(TransportError::BindFailed {
                    address: address.to_string(),
                    source,
                });
            }
        }
    }

    Err(TransportError::BindFailed {
        address: format!("{host}:{first}-{last}"),
        source: last_error.unwrap_or_else(|| io::Error::from(io::ErrorKind::AddrInUse)),
    })
}

async fn bind(address: SocketAddr) -> Result<TcpListener, TransportError> {
    TcpListener::bind(address)
        .await
        .map_err(|source| TransportError::BindFailed {
            address: address.to_string(),
            source,
        })
}

/// Resolves the address a server advertises to its peers.
///
/// An explicit interface address wins. Otherwise the local address of the
/// outbound route is used, falling back to loopback when there is no route.
pub fn advertised_address(iface: Option<IpAddr>) -> IpAddr {
    match iface {
        Some(address) if !address.is_unspecified() => address,
        _ => outbound_address().unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST)),
    }
}

// Connecting a UDP socket sends nothing; it only selects the route.
fn outbound_address() -> Option<IpAddr> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).ok()?;
    socket.connect((Ipv4Addr::new(192, 0, 2, 1), 9)).ok()?;
    let address = socket.local_addr().ok()?.ip();
    (!address.is_unspecified()).then_some(address)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ephemeral_bind() {
        let listener = bind_preferred(Ipv4Addr::LOCALHOST.into(), None).await.unwrap();
        assert_ne!(listener.local_addr().unwrap().port(), 0);
    }

    #[tokio::test]
    async fn test_taken_port_scans_upward() {
        let first = bind_preferred(Ipv4Addr::LOCALHOST.into(), None).await.unwrap();
        let taken = first.local_addr().unwrap().port();

        let second = bind_preferred(Ipv4Addr::LOCALHOST.into(), Some(taken))
            .await
            .unwrap();
        let port = second.local_addr().unwrap().port();
        assert!(port > taken);
        assert!(port < taken.saturating_add(PORT_SCAN_LIMIT));
    }

    #[test]
    fn test_explicit_iface_is_advertised() {
        let iface: IpAddr = "10.1.2.3".parse().unwrap();
        assert_eq!(advertised_address(Some(iface)), iface);
        assert!(!advertised_address(None).is_unspecified());
    }
}
