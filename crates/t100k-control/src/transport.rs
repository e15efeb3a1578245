//! UDP transport shared by all controllers

use crate::error::Result;
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::{timeout_at, Instant};

/// Largest acknowledgment we care to read
const ACK_BUFFER_SIZE: usize = 64;

/// UDP socket used to send frames and receive acknowledgments
pub struct Transport {
    socket: UdpSocket,
    ack_timeout: Duration,
}

impl Transport {
    /// Bind a transport on `local` (port 0 picks an ephemeral port)
    pub async fn bind(local: SocketAddr, ack_timeout: Duration) -> Result<Self> {
        let socket = UdpSocket::bind(local).await?;
        tracing::info!(
            "Transport bound to {} (ack timeout {:?})",
            socket.local_addr()?,
            ack_timeout
        );
        Ok(Self {
            socket,
            ack_timeout,
        })
    }

    /// Local socket address
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Send one datagram
    pub async fn send(&self, target: SocketAddr, payload: &[u8]) -> Result<()> {
        let sent = self.socket.send_to(payload, target).await?;
        if sent != payload.len() {
            tracing::warn!(
                "Short UDP write to {}: {} of {} bytes",
                target,
                sent,
                payload.len()
            );
        }
        Ok(())
    }

    /// Drop every datagram already queued on the socket
    ///
    /// Called before probing a controller so that a late answer to an earlier
    /// cycle is not mistaken for a fresh acknowledgment.
    pub fn discard_pending(&self) -> Result<usize> {
        let mut buf = [0u8; ACK_BUFFER_SIZE];
        let mut discarded = 0;
        loop {
            match self.socket.try_recv_from(&mut buf) {
                Ok((len, source)) => {
                    tracing::trace!("Discarding stale {} byte datagram from {}", len, source);
                    discarded += 1;
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(discarded),
                Err(e)
                    if matches!(
                        e.kind(),
                        ErrorKind::ConnectionReset | ErrorKind::ConnectionRefused
                    ) => {}
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Wait for an acknowledgment from `from`
    ///
    /// Returns `Ok(None)` when nothing arrives in time. Datagrams from other
    /// hosts (late answers of other controllers) are skipped.
    pub async fn wait_ack(&self, from: SocketAddr) -> Result<Option<usize>> {
        let deadline = Instant::now() + self.ack_timeout;
        let mut buf = [0u8; ACK_BUFFER_SIZE];

        loop {
            match timeout_at(deadline, self.socket.recv_from(&mut buf)).await {
                Err(_) => return Ok(None),
                Ok(Ok((len, source))) if source.ip() == from.ip() => return Ok(Some(len)),
                Ok(Ok((len, source))) => {
                    tracing::trace!("Ignoring {} byte datagram from {}", len, source);
                }
                // Some platforms surface ICMP port-unreachable on the next read
                Ok(Err(e))
                    if matches!(
                        e.kind(),
                        ErrorKind::ConnectionReset | ErrorKind::ConnectionRefused
                    ) =>
                {
                    return Ok(None);
                }
                Ok(Err(e)) => return Err(e.into()),
            }
        }
    }
}
