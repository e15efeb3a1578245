//! Host network sanity check
//!
//! The controllers only answer on their own /24. Before sending anything the
//! NAL asks the OS which local address it would use to reach controller 0
//! and refuses to start when that address is on a different subnet.

use crate::error::{NalError, Result};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use t100k_core::NalConfig;
use tokio::net::UdpSocket;

/// Local address the host uses to reach the controller subnet
///
/// Fails with [`NalError::NoUsableInterface`] when there is no route or the
/// route leaves through an interface on another subnet.
pub async fn find_subnet_address(config: &NalConfig) -> Result<Ipv4Addr> {
    let probe = SocketAddr::new(IpAddr::V4(config.controller_addr(0)), config.port);

    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await?;
    // Connecting a UDP socket sends nothing; it only resolves the route.
    socket
        .connect(probe)
        .await
        .map_err(|e| NalError::NoUsableInterface(format!("no route to {}: {}", probe, e)))?;

    match socket.local_addr()?.ip() {
        IpAddr::V4(local) if same_subnet(local, config.subnet) => {
            tracing::debug!("Host address {} is on controller subnet", local);
            Ok(local)
        }
        other => Err(NalError::NoUsableInterface(format!(
            "host reaches {} via {}, which is not on {}/24",
            probe.ip(),
            other,
            config.subnet
        ))),
    }
}

/// Whether two addresses share the first three octets
pub fn same_subnet(a: Ipv4Addr, b: Ipv4Addr) -> bool {
    a.octets()[..3] == b.octets()[..3]
}
