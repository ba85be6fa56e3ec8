//! lanbeacon daemon entry point.

use std::sync::Arc;

use anyhow::Context;
use log::{error, info};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

mod broadcaster;
mod codec;
mod config;
mod export;
mod jitter;
mod net;
mod peer_table;
mod probe;
mod receiver;
mod sampler;
mod types;

use broadcaster::Broadcaster;
use config::Config;
use export::run_snapshot_server;
use jitter::OsJitter;
use peer_table::{run_sweeper, PeerTable};
use probe::SystemProbe;
use receiver::Receiver;
use sampler::Sampler;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    env_logger::init();

    // Load configuration; any error here exits before tasks start.
    let cfg = Config::load()?;
    info!("Starting lanbeacon with config: {:?}", cfg);

    let hostname = match cfg.hostname.clone() {
        Some(name) => name,
        None => hostname::get()
            .context("Failed to read hostname")?
            .to_string_lossy()
            .into_owned(),
    };
    let local_ip = net::resolve_local_ip(cfg.network()?.as_ref())
        .context("Failed to resolve local address")?;
    info!("Announcing as {} from {}", hostname, local_ip);

    let cancel = CancellationToken::new();
    let table = PeerTable::new();
    let sampler = Arc::new(Sampler::new(cfg.sample_interval(), cfg.averaging_window()));

    // Bind everything up front so socket errors are fatal at startup.
    let (min, max) = cfg.jitter_bounds();
    let broadcaster = Broadcaster::bind(
        cfg.broadcast_target(),
        hostname,
        cfg.custom.clone(),
        Arc::clone(&sampler),
        Box::new(OsJitter::new(min, max)),
    )
    .await
    .context("Failed to open broadcast socket")?;
    let receiver = Receiver::bind(cfg.listen_addr(), local_ip, table.clone())
        .await
        .with_context(|| format!("Failed to listen on {}", cfg.listen_addr()))?;
    let exporter = match cfg.export_bind {
        Some(addr) => Some(
            TcpListener::bind(addr)
                .await
                .with_context(|| format!("Failed to bind snapshot exporter on {}", addr))?,
        ),
        None => None,
    };

    let mut tasks: Vec<(&str, JoinHandle<()>)> = Vec::new();

    // Sampler
    let sampler_for_task = Arc::clone(&sampler);
    let token = cancel.clone();
    tasks.push((
        "sampler",
        tokio::spawn(async move {
            sampler_for_task
                .run(Box::new(SystemProbe::new()), token)
                .await
        }),
    ));

    // Broadcaster
    let warm_up = cfg.warm_up.then(|| cfg.averaging_window());
    tasks.push(("broadcaster", tokio::spawn(broadcaster.run(warm_up, cancel.clone()))));

    // Receiver
    tasks.push(("receiver", tokio::spawn(receiver.run(cancel.clone()))));

    // Sweeper
    tasks.push((
        "sweeper",
        tokio::spawn(run_sweeper(
            table.clone(),
            cfg.sweep_interval(),
            cfg.peer_timeout(),
            cancel.clone(),
        )),
    ));

    // Snapshot exporter
    if let Some(listener) = exporter {
        tasks.push((
            "exporter",
            tokio::spawn(run_snapshot_server(listener, table.clone(), cancel.clone())),
        ));
    }

    // Graceful Shutdown
    shutdown_signal().await;
    cancel.cancel();
    for (name, handle) in tasks {
        if let Err(e) = handle.await {
            error!("{} task failed: {}", name, e);
        }
    }

    info!("Shutdown complete.");
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    r = tokio::signal::ctrl_c() => report_ctrl_c(r),
                    _ = term.recv() => info!("Received SIGTERM, shutting down..."),
                }
                return;
            }
            Err(e) => error!("Unable to listen for SIGTERM: {}", e),
        }
    }
    report_ctrl_c(tokio::signal::ctrl_c().await);
}

fn report_ctrl_c(result: std::io::Result<()>) {
    match result {
        Ok(()) => info!("Received Ctrl+C, shutting down..."),
        Err(err) => error!("Unable to listen for shutdown signal: {}", err),
    }
}
