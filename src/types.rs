//! Data structures shared by the sampling, broadcast and discovery paths.
//!
//! [`Announcement`] is what goes on the wire.  It deliberately carries no
//! address: the receiving side keys peers by the address the datagram
//! actually arrived from, which is attached later as a [`PeerRecord`].

use std::net::IpAddr;

use serde::{Deserialize, Serialize};

/// One sampling tick worth of raw measurements.
///
/// A field is `None` when the probe failed to produce that metric during
/// the tick; the corresponding rolling window is left untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MetricSample {
    pub cpu_percent: Option<f64>,
    pub mem_percent: Option<f64>,
    pub tx_kbps: Option<f64>,
    pub rx_kbps: Option<f64>,
    pub active_conns: Option<f64>,
}

/// Window averages ready to be broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Averages {
    pub cpu: f64,
    pub memory: f64,
    pub tx_kbps: f64,
    pub rx_kbps: f64,
    pub active_conns: f64,
}

/// The payload a node broadcasts about itself.
///
/// Every field is required on decode and unknown fields are rejected, so a
/// payload either matches this shape exactly or is discarded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Announcement {
    pub hostname: String,
    pub cpu: f64,
    pub memory: f64,
    pub tx_kbps: f64,
    pub rx_kbps: f64,
    pub active_conns: f64,
    pub custom: String,
}

impl Announcement {
    pub fn new(hostname: impl Into<String>, custom: impl Into<String>, avg: Averages) -> Self {
        Self {
            hostname: hostname.into(),
            cpu: avg.cpu,
            memory: avg.memory,
            tx_kbps: avg.tx_kbps,
            rx_kbps: avg.rx_kbps,
            active_conns: avg.active_conns,
            custom: custom.into(),
        }
    }
}

/// A peer as seen by this node: the sender address observed on the socket
/// plus the last announcement received from it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeerRecord {
    pub address: IpAddr,
    #[serde(flatten)]
    pub announcement: Announcement,
}
