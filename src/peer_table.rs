//! Table of currently-alive peers.
//!
//! The table owns its lock; callers only see [`PeerTable::upsert`],
//! [`PeerTable::sweep`] and [`PeerTable::snapshot`].  Entries are keyed by
//! the sender IP observed on the socket and carry the instant they were
//! last heard from.  Last write wins.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info};
use tokio::sync::RwLock;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::types::{Announcement, PeerRecord};

#[derive(Debug, Clone)]
struct PeerEntry {
    announcement: Announcement,
    last_seen: Instant,
}

#[derive(Debug, Clone, Default)]
pub struct PeerTable {
    inner: Arc<RwLock<HashMap<IpAddr, PeerEntry>>>,
}

impl PeerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces the entry for `addr`, marking it seen now.
    pub async fn upsert(&self, addr: IpAddr, announcement: Announcement) {
        self.upsert_at(addr, announcement, Instant::now()).await;
    }

    /// Like [`upsert`](Self::upsert) with an explicit receive instant.
    /// `last_seen` never moves backwards.
    pub async fn upsert_at(&self, addr: IpAddr, announcement: Announcement, seen: Instant) {
        let mut map = self.inner.write().await;
        match map.get_mut(&addr) {
            Some(entry) => {
                entry.announcement = announcement;
                entry.last_seen = entry.last_seen.max(seen);
            }
            None => {
                info!("Discovered peer {} ({})", addr, announcement.hostname);
                map.insert(
                    addr,
                    PeerEntry {
                        announcement,
                        last_seen: seen,
                    },
                );
            }
        }
    }

    /// Removes every entry silent for longer than `timeout` as of `now`.
    /// Returns the number of evicted peers.
    pub async fn sweep(&self, now: Instant, timeout: Duration) -> usize {
        let mut map = self.inner.write().await;
        let before = map.len();
        map.retain(|addr, entry| {
            let alive = now.saturating_duration_since(entry.last_seen) <= timeout;
            if !alive {
                info!(
                    "Peer {} ({}) timed out",
                    addr, entry.announcement.hostname
                );
            }
            alive
        });
        before - map.len()
    }

    /// Point-in-time copy of every peer, ordered by address.
    pub async fn snapshot(&self) -> Vec<PeerRecord> {
        let mut records: Vec<PeerRecord> = {
            let map = self.inner.read().await;
            map.iter()
                .map(|(addr, entry)| PeerRecord {
                    address: *addr,
                    announcement: entry.announcement.clone(),
                })
                .collect()
        };
        records.sort_by_key(|r| r.address);
        records
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }
}

/// Sweeps `table` every `every` until cancelled.
pub async fn run_sweeper(
    table: PeerTable,
    every: Duration,
    timeout: Duration,
    cancel: CancellationToken,
) {
    info!("Sweeper started: every {:?}, timeout {:?}", every, timeout);
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let evicted = table.sweep(Instant::now(), timeout).await;
                debug!("Sweep evicted {} peers, {} remain", evicted, table.len().await);
            }
        }
    }
    info!("Sweeper stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn announcement(host: &str, cpu: f64) -> Announcement {
        Announcement {
            hostname: host.into(),
            cpu,
            memory: 40.0,
            tx_kbps: 0.0,
            rx_kbps: 0.0,
            active_conns: 2.0,
            custom: "svc".into(),
        }
    }

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn upsert_new_address_creates_one_entry() {
        let table = PeerTable::new();
        table.upsert(ip("10.0.0.2"), announcement("a", 1.0)).await;

        let snap = table.snapshot().await;
        assert_eq!(snap.len(), 1);
        assert_eq!(snap[0].address, ip("10.0.0.2"));
        assert_eq!(snap[0].announcement, announcement("a", 1.0));
    }

    #[tokio::test]
    async fn upsert_same_address_replaces_record() {
        let table = PeerTable::new();
        let t0 = Instant::now();
        table.upsert_at(ip("10.0.0.2"), announcement("a", 1.0), t0).await;
        table
            .upsert_at(ip("10.0.0.2"), announcement("a", 9.5), t0 + Duration::from_secs(30))
            .await;

        let snap = table.snapshot().await;
        assert_eq!(snap.len(), 1);
        assert_eq!(snap[0].announcement.cpu, 9.5);

        // Refreshed last_seen keeps the entry alive past the first timestamp.
        let evicted = table
            .sweep(t0 + Duration::from_secs(140), Duration::from_secs(120))
            .await;
        assert_eq!(evicted, 0);
    }

    #[tokio::test]
    async fn last_seen_never_moves_backwards() {
        let table = PeerTable::new();
        let t0 = Instant::now();
        let later = t0 + Duration::from_secs(100);
        table.upsert_at(ip("10.0.0.3"), announcement("b", 1.0), later).await;
        table.upsert_at(ip("10.0.0.3"), announcement("b", 2.0), t0).await;

        let evicted = table
            .sweep(t0 + Duration::from_secs(150), Duration::from_secs(120))
            .await;
        assert_eq!(evicted, 0);
        assert_eq!(table.snapshot().await[0].announcement.cpu, 2.0);
    }

    #[tokio::test]
    async fn sweep_evicts_only_stale_entries() {
        let table = PeerTable::new();
        let now = Instant::now() + Duration::from_secs(1_000);
        let timeout = Duration::from_secs(120);
        table
            .upsert_at(ip("10.0.0.4"), announcement("stale", 1.0), now - Duration::from_secs(121))
            .await;
        table
            .upsert_at(ip("10.0.0.5"), announcement("fresh", 1.0), now - Duration::from_secs(119))
            .await;
        table
            .upsert_at(ip("10.0.0.6"), announcement("edge", 1.0), now - timeout)
            .await;

        assert_eq!(table.sweep(now, timeout).await, 1);
        let hosts: Vec<_> = table
            .snapshot()
            .await
            .into_iter()
            .map(|r| r.announcement.hostname)
            .collect();
        assert_eq!(hosts, vec!["fresh", "edge"]);
    }

    #[tokio::test]
    async fn snapshot_is_a_detached_copy() {
        let table = PeerTable::new();
        table.upsert(ip("10.0.0.7"), announcement("c", 1.0)).await;
        let snap = table.snapshot().await;
        table.upsert(ip("10.0.0.7"), announcement("c", 50.0)).await;
        table.upsert(ip("10.0.0.8"), announcement("d", 1.0)).await;

        assert_eq!(snap.len(), 1);
        assert_eq!(snap[0].announcement.cpu, 1.0);
        assert_eq!(table.len().await, 2);
    }

    #[tokio::test]
    async fn concurrent_upserts_keep_one_entry_per_address() {
        let table = PeerTable::new();
        let mut handles = Vec::new();
        for i in 0..64u8 {
            let table = table.clone();
            handles.push(tokio::spawn(async move {
                let addr = IpAddr::from([10, 0, 1, i % 8]);
                table.upsert(addr, announcement("n", f64::from(i))).await;
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(table.len().await, 8);
    }

    #[tokio::test]
    async fn sweeper_stops_on_cancel() {
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_sweeper(
            PeerTable::new(),
            Duration::from_millis(10),
            Duration::from_secs(1),
            cancel.clone(),
        ));
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
    }
}
