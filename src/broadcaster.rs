//! Periodic self-announcement.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::net::UdpSocket;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::codec;
use crate::jitter::IntervalProvider;
use crate::sampler::Sampler;
use crate::types::Announcement;

pub struct Broadcaster {
    socket: UdpSocket,
    target: SocketAddr,
    hostname: String,
    custom: String,
    sampler: Arc<Sampler>,
    jitter: Box<dyn IntervalProvider>,
}

impl Broadcaster {
    /// Binds an ephemeral send socket with `SO_BROADCAST` enabled.
    pub async fn bind(
        target: SocketAddr,
        hostname: String,
        custom: String,
        sampler: Arc<Sampler>,
        jitter: Box<dyn IntervalProvider>,
    ) -> std::io::Result<Self> {
        let local: IpAddr = if target.is_ipv4() {
            Ipv4Addr::UNSPECIFIED.into()
        } else {
            Ipv6Addr::UNSPECIFIED.into()
        };
        let socket = UdpSocket::bind((local, 0)).await?;
        socket.set_broadcast(true)?;
        Ok(Self {
            socket,
            target,
            hostname,
            custom,
            sampler,
            jitter,
        })
    }

    /// Sends exactly one announcement built from the current averages.
    pub async fn broadcast_once(&self) -> anyhow::Result<usize> {
        let averages = self.sampler.current_averages().await;
        let announcement = Announcement::new(&self.hostname, &self.custom, averages);
        let payload = codec::encode(&announcement)?;
        let sent = self.socket.send_to(&payload, self.target).await?;
        debug!("Broadcast {} bytes to {}: {:?}", sent, self.target, announcement);
        Ok(sent)
    }

    /// Announces after a jittered delay each cycle until cancelled.  When
    /// `warm_up` is set the first cycle waits for it to elapse so the first
    /// broadcast carries a populated averaging window.
    pub async fn run(mut self, warm_up: Option<Duration>, cancel: CancellationToken) {
        info!("Broadcaster started: target {}", self.target);
        if let Some(delay) = warm_up {
            info!("Collecting samples for {:?} before first broadcast", delay);
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Broadcaster stopped");
                    return;
                }
                _ = sleep(delay) => {}
            }
        }
        loop {
            let delay = self.jitter.next_interval();
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = sleep(delay) => {}
            }
            if let Err(e) = self.broadcast_once().await {
                warn!("Broadcast to {} failed: {}", self.target, e);
            }
        }
        info!("Broadcaster stopped");
    }
}
