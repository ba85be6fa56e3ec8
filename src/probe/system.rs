use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use sysinfo::{Networks, System};
use tokio::time::sleep;

use super::{is_excluded_interface, MetricsProbe, ProbeError};

const PROC_TCP: &str = "/proc/net/tcp";
const PROC_TCP6: &str = "/proc/net/tcp6";

/// Kernel socket state code for ESTABLISHED in `/proc/net/tcp*`.
const TCP_ESTABLISHED: &str = "01";

/// Host metrics backed by `sysinfo`, with connection counts read from procfs.
pub struct SystemProbe {
    system: System,
}

impl SystemProbe {
    pub fn new() -> Self {
        Self {
            system: System::new(),
        }
    }
}

impl Default for SystemProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MetricsProbe for SystemProbe {
    async fn cpu_percent_over(&mut self, interval: Duration) -> Result<f64, ProbeError> {
        self.system.refresh_cpu_usage();
        sleep(interval.max(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL)).await;
        self.system.refresh_cpu_usage();
        Ok(f64::from(self.system.global_cpu_usage()))
    }

    async fn memory_used_percent(&mut self) -> Result<f64, ProbeError> {
        self.system.refresh_memory();
        let total = self.system.total_memory();
        if total == 0 {
            return Err(ProbeError::Unavailable("memory statistics"));
        }
        Ok(self.system.used_memory() as f64 / total as f64 * 100.0)
    }

    async fn network_byte_counters(&mut self) -> Result<(u64, u64), ProbeError> {
        let networks = Networks::new_with_refreshed_list();
        let (mut tx, mut rx) = (0u64, 0u64);
        for (name, data) in networks.list() {
            if is_excluded_interface(name) {
                continue;
            }
            tx = tx.saturating_add(data.total_transmitted());
            rx = rx.saturating_add(data.total_received());
        }
        Ok((tx, rx))
    }

    async fn established_tcp_connections(&mut self) -> Result<usize, ProbeError> {
        let v4 = tokio::fs::read_to_string(PROC_TCP)
            .await
            .map_err(|source| ProbeError::Io {
                path: PROC_TCP,
                source,
            })?;
        let mut count = count_established(&v4);
        // IPv6 may be disabled on the host.
        match tokio::fs::read_to_string(PROC_TCP6).await {
            Ok(v6) => count += count_established(&v6),
            Err(e) => debug!("Skipping {}: {}", PROC_TCP6, e),
        }
        Ok(count)
    }
}

/// Counts ESTABLISHED rows in a `/proc/net/tcp`-formatted table.
fn count_established(table: &str) -> usize {
    table
        .lines()
        .skip(1)
        .filter(|line| line.split_whitespace().nth(3) == Some(TCP_ESTABLISHED))
        .count()
}
