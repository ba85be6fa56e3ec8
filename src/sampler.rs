//! Resource sampling and rolling-window aggregation.
//!
//! The sampler turns noisy instantaneous readings from a [`MetricsProbe`]
//! into per-metric moving averages over a fixed time window.  Each metric
//! keeps its own bounded FIFO ([`RollingWindow`]); the capacity is derived
//! from the averaging window and the sampling interval, so memory use is
//! bounded no matter how long the daemon runs.
//!
//! Probing happens without any lock held.  The windows are locked only to
//! append a finished [`MetricSample`] and to compute averages, so a reader
//! never observes a half-appended sample.

use std::collections::VecDeque;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::probe::MetricsProbe;
use crate::types::{Averages, MetricSample};

/// Throughput averages below this many kbps are reported as zero.
const THROUGHPUT_NOISE_FLOOR_KBPS: f64 = 1.0;

/// Fixed-capacity FIFO of recent scalar samples.
#[derive(Debug, Clone)]
pub struct RollingWindow {
    values: VecDeque<f64>,
    capacity: usize,
}

impl RollingWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            values: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, value: f64) {
        if self.values.len() == self.capacity {
            self.values.pop_front();
        }
        self.values.push_back(value);
    }

    /// Arithmetic mean, or 0 when empty.
    pub fn mean(&self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        self.values.iter().sum::<f64>() / self.values.len() as f64
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[derive(Debug)]
struct Windows {
    cpu: RollingWindow,
    memory: RollingWindow,
    tx_kbps: RollingWindow,
    rx_kbps: RollingWindow,
    active_conns: RollingWindow,
}

impl Windows {
    fn new(capacity: usize) -> Self {
        Self {
            cpu: RollingWindow::new(capacity),
            memory: RollingWindow::new(capacity),
            tx_kbps: RollingWindow::new(capacity),
            rx_kbps: RollingWindow::new(capacity),
            active_conns: RollingWindow::new(capacity),
        }
    }
}

pub struct Sampler {
    sample_interval: Duration,
    windows: RwLock<Windows>,
}

impl Sampler {
    /// Window capacity is `averaging_window / sample_interval` in whole
    /// seconds, never less than one.
    pub fn new(sample_interval: Duration, averaging_window: Duration) -> Self {
        let capacity = window_capacity(sample_interval, averaging_window);
        Self {
            sample_interval,
            windows: RwLock::new(Windows::new(capacity)),
        }
    }

    /// Takes one measurement over the sampling interval.  Byte counters are
    /// read right before and right after the CPU measurement so the
    /// throughput denominator is the same interval.  A metric whose probe
    /// call fails is left out of the sample.
    pub async fn sample(&self, probe: &mut dyn MetricsProbe) -> MetricSample {
        let before = probe
            .network_byte_counters()
            .await
            .map_err(|e| warn!("Network counter error: {}", e))
            .ok();

        let cpu_percent = probe
            .cpu_percent_over(self.sample_interval)
            .await
            .map_err(|e| warn!("CPU probe error: {}", e))
            .ok();

        let after = probe
            .network_byte_counters()
            .await
            .map_err(|e| warn!("Network counter error: {}", e))
            .ok();

        let mem_percent = probe
            .memory_used_percent()
            .await
            .map_err(|e| warn!("Memory probe error: {}", e))
            .ok();

        let active_conns = probe
            .established_tcp_connections()
            .await
            .map_err(|e| warn!("Connection count error: {}", e))
            .ok()
            .map(|n| n as f64);

        let secs = self.sample_interval.as_secs_f64();
        let (tx_kbps, rx_kbps) = match (before, after) {
            (Some((tx0, rx0)), Some((tx1, rx1))) => (
                throughput_kbps(tx0, tx1, secs),
                throughput_kbps(rx0, rx1, secs),
            ),
            _ => (None, None),
        };

        MetricSample {
            cpu_percent,
            mem_percent,
            tx_kbps,
            rx_kbps,
            active_conns,
        }
    }

    pub async fn record(&self, sample: MetricSample) {
        let mut guard = self.windows.write().await;
        let w = &mut *guard;
        let pairs = [
            (&mut w.cpu, sample.cpu_percent),
            (&mut w.memory, sample.mem_percent),
            (&mut w.tx_kbps, sample.tx_kbps),
            (&mut w.rx_kbps, sample.rx_kbps),
            (&mut w.active_conns, sample.active_conns),
        ];
        for (window, value) in pairs {
            if let Some(v) = value {
                window.push(v);
            }
        }
    }

    pub async fn current_averages(&self) -> Averages {
        let w = self.windows.read().await;
        Averages {
            cpu: round2(w.cpu.mean()),
            memory: round2(w.memory.mean()),
            tx_kbps: floor_noise(round2(w.tx_kbps.mean())),
            rx_kbps: floor_noise(round2(w.rx_kbps.mean())),
            active_conns: round2(w.active_conns.mean()),
        }
    }

    /// Samples on a fixed cadence until `cancel` fires.  A measurement in
    /// progress at cancellation is discarded.
    pub async fn run(&self, mut probe: Box<dyn MetricsProbe>, cancel: CancellationToken) {
        info!(
            "Sampler started: every {:?}, window of {} samples",
            self.sample_interval,
            self.windows.read().await.cpu.capacity()
        );
        loop {
            let sample = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                s = self.sample(probe.as_mut()) => s,
            };
            debug!("Recorded sample: {:?}", sample);
            self.record(sample).await;
        }
        info!("Sampler stopped");
    }
}

fn window_capacity(sample_interval: Duration, averaging_window: Duration) -> usize {
    let step = sample_interval.as_secs().max(1);
    ((averaging_window.as_secs() / step) as usize).max(1)
}

/// Kilobits per second between two cumulative byte counters.  Returns
/// `None` if the counter went backwards (interface reset or removal).
fn throughput_kbps(before: u64, after: u64, secs: f64) -> Option<f64> {
    if secs <= 0.0 {
        return None;
    }
    let delta = after.checked_sub(before)?;
    Some(delta as f64 * 8.0 / 1000.0 / secs)
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

fn floor_noise(kbps: f64) -> f64 {
    if kbps < THROUGHPUT_NOISE_FLOOR_KBPS {
        0.0
    } else {
        kbps
    }
}
