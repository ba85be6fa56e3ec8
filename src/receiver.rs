//! Announcement listener.
//!
//! Every datagram on the discovery port is decoded and, unless it is foreign
//! traffic or our own broadcast looping back, refreshes the sender's entry in
//! the [`PeerTable`].

use std::net::{IpAddr, SocketAddr};

use log::{debug, info, warn};
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;

use crate::codec;
use crate::peer_table::PeerTable;

/// What happened to a received datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Accepted,
    Malformed,
    SelfOrigin,
}

pub struct Receiver {
    socket: UdpSocket,
    local_ip: IpAddr,
    table: PeerTable,
}

impl Receiver {
    pub async fn bind(
        listen: SocketAddr,
        local_ip: IpAddr,
        table: PeerTable,
    ) -> std::io::Result<Self> {
        let socket = UdpSocket::bind(listen).await?;
        Ok(Self::new(socket, local_ip, table))
    }

    pub fn new(socket: UdpSocket, local_ip: IpAddr, table: PeerTable) -> Self {
        Self {
            socket,
            local_ip,
            table,
        }
    }

    pub async fn handle_datagram(&self, payload: &[u8], from: SocketAddr) -> Disposition {
        let announcement = match codec::decode(payload) {
            Ok(a) => a,
            Err(e) => {
                debug!("Dropping datagram from {}: {}", from, e);
                return Disposition::Malformed;
            }
        };
        if from.ip() == self.local_ip {
            return Disposition::SelfOrigin;
        }
        self.table.upsert(from.ip(), announcement).await;
        Disposition::Accepted
    }

    pub async fn run(self, cancel: CancellationToken) {
        match self.socket.local_addr() {
            Ok(addr) => info!("Receiver listening on {}", addr),
            Err(e) => warn!("Receiver socket has no local address: {}", e),
        }
        let mut buf = vec![0u8; codec::MAX_DATAGRAM];
        loop {
            let received = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                r = self.socket.recv_from(&mut buf) => r,
            };
            match received {
                Ok((n, from)) => {
                    self.handle_datagram(&buf[..n], from).await;
                }
                Err(e) => warn!("Receive error: {}", e),
            }
        }
        info!("Receiver stopped");
    }
}
