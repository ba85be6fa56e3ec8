use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub mod system;
pub use system::SystemProbe;

/// Interface name prefixes excluded from throughput accounting: loopback,
/// container bridges and virtual ethernet pairs.
pub const EXCLUDED_INTERFACE_PREFIXES: &[&str] = &["lo", "docker", "veth", "br-"];

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("i/o error reading {path}: {source}")]
    Io {
        path: &'static str,
        source: std::io::Error,
    },
    #[error("{0} is not available on this host")]
    Unavailable(&'static str),
}

/// Source of instantaneous OS resource metrics.
#[async_trait]
pub trait MetricsProbe: Send {
    /// CPU utilisation averaged over `interval`.  Suspends for the whole
    /// interval.
    async fn cpu_percent_over(&mut self, interval: Duration) -> Result<f64, ProbeError>;

    async fn memory_used_percent(&mut self) -> Result<f64, ProbeError>;

    /// Cumulative `(tx, rx)` byte counters summed over every interface not
    /// matching [`EXCLUDED_INTERFACE_PREFIXES`].
    async fn network_byte_counters(&mut self) -> Result<(u64, u64), ProbeError>;

    async fn established_tcp_connections(&mut self) -> Result<usize, ProbeError>;
}

pub fn is_excluded_interface(name: &str) -> bool {
    EXCLUDED_INTERFACE_PREFIXES
        .iter()
        .any(|prefix| name.starts_with(prefix))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn excludes_virtual_interfaces() {
        for name in ["lo", "lo0", "docker0", "veth12ab", "br-5f2c"] {
            assert!(is_excluded_interface(name), "{name} should be excluded");
        }
        for name in ["eth0", "enp3s0", "wlan0", "bond0"] {
            assert!(!is_excluded_interface(name), "{name} should be counted");
        }
    }
}
