use std::{io, net::Ipv4Addr, time::Duration};

use common::{AsyncICMPSocket, ICMPSocket};
use thiserror::Error;

/// Socket-level failure. Session-fatal: it signals an environment problem
/// (missing CAP_NET_RAW, unreachable interface), not packet loss.
#[derive(Debug, Error)]
#[error("icmp transport: {0}")]
pub struct TransportError(#[from] io::Error);

/// Outcome of one bounded receive. An expired wait is routine, not an
/// error.
pub enum Received {
    Datagram(usize),
    TimedOut,
}

pub trait Transport {
    async fn send(&mut self, packet: &[u8], dst: Ipv4Addr) -> Result<(), TransportError>;
    async fn recv(&mut self, buf: &mut [u8], wait: Duration) -> Result<Received, TransportError>;
}

/// The real transport: one raw ICMP socket, exclusively owned for the
/// lifetime of a session.
pub struct IcmpTransport {
    socket: AsyncICMPSocket,
}

impl IcmpTransport {
    pub fn new(bind_interface: Option<&str>) -> Result<IcmpTransport, TransportError> {
        let socket = ICMPSocket::new(bind_interface)?;
        Ok(IcmpTransport {
            socket: AsyncICMPSocket::new(socket)?,
        })
    }
}

impl Transport for IcmpTransport {
    async fn send(&mut self, packet: &[u8], dst: Ipv4Addr) -> Result<(), TransportError> {
        self.socket.send_to(packet, dst).await?;
        Ok(())
    }

    async fn recv(&mut self, buf: &mut [u8], wait: Duration) -> Result<Received, TransportError> {
        match tokio::time::timeout(wait, self.socket.read(buf)).await {
            Ok(len) => Ok(Received::Datagram(len?)),
            Err(_elapsed) => Ok(Received::TimedOut),
        }
    }
}
