//! Read-only peer snapshot over TCP.
//!
//! Each accepted connection receives the current peer table as a single
//! JSON array followed by a newline, and is then closed.  Intended for
//! `nc host port` style inspection and simple scrapers.

use std::time::Duration;

use log::{debug, info, warn};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::peer_table::PeerTable;

/// Pause after a failed accept (e.g. descriptor exhaustion) before retrying.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(200);

pub async fn run_snapshot_server(
    listener: TcpListener,
    table: PeerTable,
    cancel: CancellationToken,
) {
    match listener.local_addr() {
        Ok(addr) => info!("Snapshot exporter listening on {}", addr),
        Err(e) => warn!("Snapshot listener has no local address: {}", e),
    }
    loop {
        let accepted = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            a = listener.accept() => a,
        };
        match accepted {
            Ok((stream, peer)) => {
                debug!("Snapshot requested by {}", peer);
                let table = table.clone();
                tokio::spawn(async move {
                    if let Err(e) = write_snapshot(stream, &table).await {
                        warn!("Failed to send snapshot to {}: {}", peer, e);
                    }
                });
            }
            Err(e) => {
                warn!("Accept error: {}", e);
                if !backoff(&cancel).await {
                    break;
                }
            }
        }
    }
    info!("Snapshot exporter stopped");
}

/// Waits out [`ACCEPT_BACKOFF`].  Returns `false` if cancelled first.
async fn backoff(cancel: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = sleep(ACCEPT_BACKOFF) => true,
    }
}

async fn write_snapshot(mut stream: TcpStream, table: &PeerTable) -> anyhow::Result<()> {
    let mut body = serde_json::to_vec(&table.snapshot().await)?;
    body.push(b'\n');
    stream.write_all(&body).await?;
    stream.shutdown().await?;
    Ok(())
}
