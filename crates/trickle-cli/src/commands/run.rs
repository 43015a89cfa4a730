//! Run command: sync stdin activations with the server until interrupted.

use std::io::Write;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::BufReader;
use tokio::sync::{mpsc, watch};
use trickle_client::{
    ClientEvent, ClientEventKind, PublishedState, SyncCoordinator, WsTransport, read_activations,
};
use trickle_core::SessionSnapshot;

use crate::Config;
use crate::render::{render_connection, render_snapshot, render_usage};

const FEED_CAPACITY: usize = 64;

pub fn run(config: &Config) -> Result<()> {
    let runtime = tokio::runtime::Runtime::new().context("failed to initialize tokio runtime")?;
    let result = runtime.block_on(sync(config));
    // Stdin reads block a worker thread; don't wait for them.
    runtime.shutdown_background();
    result
}

async fn sync(config: &Config) -> Result<()> {
    let transport = WsTransport::new(&config.server_url, config.handshake_timeout())
        .context("invalid server_url")?;
    let credentials = config
        .token_source()
        .context("invalid token in configuration")?;

    let mut coordinator = SyncCoordinator::new(transport, credentials, config.sync_settings());
    coordinator.on(ClientEventKind::AuthError, |event| {
        if let ClientEvent::AuthError { reason } = event {
            tracing::error!(reason = %reason, "server rejected the access token");
        }
    });
    let handle = coordinator
        .handle()
        .context("coordinator is already running")?;

    let (feed_tx, feed_rx) = mpsc::channel(FEED_CAPACITY);
    coordinator
        .start(feed_rx)
        .context("failed to load access token")?;
    tracing::info!(server = %config.server_url, "sync started");

    let mut feed = tokio::spawn(read_activations(BufReader::new(tokio::io::stdin()), feed_tx));
    let printer = tokio::spawn(print_updates(handle.subscribe()));
    let sync = tokio::spawn(coordinator.run());

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for ctrl-c")?;
            tracing::info!("interrupted");
        }
        result = &mut feed => match result {
            Ok(Ok(count)) => tracing::debug!(count, "end of input"),
            Ok(Err(e)) => tracing::warn!(error = %e, "failed to read activations"),
            Err(e) => tracing::warn!(error = %e, "activation reader failed"),
        },
    }

    handle.stop().await;
    let usage = sync.await.context("sync task failed")?;
    feed.abort();
    printer.abort();

    let mut stdout = std::io::stdout().lock();
    write!(stdout, "{}", render_usage(&usage))?;
    stdout.flush()?;
    Ok(())
}

/// Prints connection changes and new snapshots as they are published.
async fn print_updates(mut state: watch::Receiver<PublishedState>) {
    let mut last_connection = None;
    let mut last_snapshot: Option<Arc<SessionSnapshot>> = None;

    while state.changed().await.is_ok() {
        let current = state.borrow_and_update().clone();
        if last_connection.as_ref() != Some(&current.connection) {
            println!("{}", render_connection(&current.connection));
            last_connection = Some(current.connection);
        }
        let fresh = match (&current.snapshot, &last_snapshot) {
            (Some(new), Some(old)) => !Arc::ptr_eq(new, old),
            (Some(_), None) => true,
            (None, _) => false,
        };
        if fresh {
            if let Some(snapshot) = &current.snapshot {
                print!("{}", render_snapshot(snapshot));
            }
            last_snapshot = current.snapshot;
        }
    }
}
