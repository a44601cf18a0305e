use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

/// Well-known PSM of the Service Discovery Protocol ([Assigned Numbers] Section 2.5).
pub const SDP_PSM: u16 = 0x0001;
/// PSM commonly advertised for AVDTP signalling ([Assigned Numbers] Section 2.5).
pub const AVDTP_PSM: u16 = 0x0019;

/// ([AVDTP] Section 5.4.1).
pub const DEFAULT_MTU: u16 = 672;

/// Base deadline for one protocol round trip; clients derive theirs from it.
pub const COMMUNICATION_TIMEOUT: Duration = Duration::from_secs(1);
/// Deadline for establishing an outgoing channel.
pub const OPEN_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum ConnectError {
    #[error("the remote device refused the connection")]
    Refused,
    #[error("the connection attempt timed out")]
    Timeout,
    #[error("no transport available to the remote device")]
    NoTransport,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
#[error("the l2cap channel has been disconnected")]
pub struct Disconnected;

/// A connected L2CAP channel, packet oriented.
///
/// The platform (or a test fixture) creates these in connected pairs. Dropping
/// a socket closes the channel: the peer's `recv` ends and its `send` starts
/// failing. There is no half-open state.
pub struct L2capSocket {
    tx: UnboundedSender<Bytes>,
    rx: UnboundedReceiver<Bytes>,
    remote_mtu: u16,
}

impl L2capSocket {
    pub fn pair() -> (L2capSocket, L2capSocket) {
        Self::pair_with_mtu(DEFAULT_MTU)
    }

    pub fn pair_with_mtu(remote_mtu: u16) -> (L2capSocket, L2capSocket) {
        let (tx_a, rx_a) = unbounded_channel();
        let (tx_b, rx_b) = unbounded_channel();
        (
            L2capSocket { tx: tx_a, rx: rx_b, remote_mtu },
            L2capSocket { tx: tx_b, rx: rx_a, remote_mtu },
        )
    }

    /// MTU the remote end advertised during channel configuration.
    pub fn remote_mtu(&self) -> u16 {
        self.remote_mtu
    }

    pub fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }

    pub fn send(&self, data: Bytes) -> Result<(), Disconnected> {
        self.tx.send(data).map_err(|_| Disconnected)
    }

    /// Next incoming packet, or `None` once the channel is closed.
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.rx.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pair_is_duplex() {
        let (a, mut b) = L2capSocket::pair();
        a.send(Bytes::from_static(b"ping")).unwrap();
        assert_eq!(b.recv().await.unwrap(), Bytes::from_static(b"ping"));
        b.send(Bytes::from_static(b"pong")).unwrap();
    }

    #[tokio::test]
    async fn drop_closes_channel() {
        let (a, mut b) = L2capSocket::pair();
        assert!(a.is_open());
        drop(b.rx);
        assert!(!a.is_open());
        assert_eq!(a.send(Bytes::from_static(b"late")), Err(Disconnected));

        let (a, mut b) = L2capSocket::pair();
        drop(a);
        assert_eq!(b.recv().await, None);
    }
}
