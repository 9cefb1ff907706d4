//! Shared helpers for CLI commands.

use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use indicatif::ProgressBar;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::{Instant, sleep_until};
use unu_core::{
    BtleTransport, EventChannel, ManagerConfig, ScooterEvent, ScooterHandle, ScooterManager,
    Transport,
};

use crate::style;

/// How long to wait for the first telemetry after connecting.
const TELEMETRY_WAIT: Duration = Duration::from_secs(5);

/// How long to wait for the manager to disconnect on exit.
const SHUTDOWN_WAIT: Duration = Duration::from_secs(3);

/// Open the Bluetooth adapter and connect to the scooter.
pub async fn connect(config: ManagerConfig, quiet: bool) -> Result<ScooterHandle> {
    let channel = EventChannel::new();
    let transport = BtleTransport::new(channel.sink(), config.connection.clone())
        .await
        .context("Failed to open the Bluetooth adapter")?;
    connect_with(Arc::new(transport), channel, config, quiet).await
}

/// Spawn a manager over `transport` and wait until the scooter is connected.
///
/// The spinner follows the scooter's status line. Fails when the scan ends
/// without a match or when nothing connects within the scan and connection
/// timeouts combined.
pub async fn connect_with<T: Transport + 'static>(
    transport: Arc<T>,
    channel: EventChannel,
    config: ManagerConfig,
    quiet: bool,
) -> Result<ScooterHandle> {
    let name = config.device_name.clone();
    let limit = config.scan_timeout
        + config.connection.connection_timeout
        + config.connection.discovery_timeout;
    let scooter = ScooterManager::spawn(transport, channel, config)?;

    let spinner = style::status_spinner(&format!("Looking for {:?}...", name), quiet);
    let result = wait_for_connection(&scooter, &spinner, limit).await;
    spinner.finish_and_clear();

    if let Err(e) = result {
        finish(&scooter).await;
        return Err(e.context(format!("Could not connect to {:?}", name)));
    }

    // The first values arrive right after subscribing; a scooter that stays
    // silent is still usable.
    if scooter
        .wait_until(TELEMETRY_WAIT, |s| s.last_update.is_some())
        .await
        .is_err()
    {
        tracing::debug!("No telemetry within {:?}", TELEMETRY_WAIT);
    }
    Ok(scooter)
}

async fn wait_for_connection(
    scooter: &ScooterHandle,
    spinner: &ProgressBar,
    limit: Duration,
) -> Result<()> {
    let mut snapshots = scooter.watch();
    let mut events = scooter.subscribe();
    let deadline = Instant::now() + limit;
    scooter.start_scanning()?;

    loop {
        {
            let snapshot = snapshots.borrow_and_update();
            if snapshot.is_connected() {
                return Ok(());
            }
            if !snapshot.status.is_empty() {
                spinner.set_message(snapshot.status.clone());
            }
        }

        tokio::select! {
            changed = snapshots.changed() => {
                if changed.is_err() {
                    bail!("Scooter manager stopped");
                }
            }
            event = events.recv() => match event {
                Ok(ScooterEvent::NoDeviceFound) => bail!("No scooter found"),
                Ok(ScooterEvent::DiscoveryFailed { message }) => bail!(message),
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => bail!("Scooter manager stopped"),
            },
            _ = sleep_until(deadline) => bail!("Timed out after {:?}", limit),
        }
    }
}

/// Stop the manager and wait for it to release the scooter.
pub async fn finish(scooter: &ScooterHandle) {
    let mut snapshots = scooter.watch();
    if scooter.shutdown().is_err() {
        return;
    }
    // The snapshot channel closes once the manager has torn down the link.
    let closed = async { while snapshots.changed().await.is_ok() {} };
    if tokio::time::timeout(SHUTDOWN_WAIT, closed).await.is_err() {
        tracing::debug!("Manager still running after {:?}", SHUTDOWN_WAIT);
    }
}

/// Write output to file or stdout.
pub fn write_output(output: Option<&PathBuf>, content: &str) -> Result<()> {
    match output {
        Some(path) => {
            std::fs::write(path, content)
                .with_context(|| format!("Failed to write to {}", path.display()))?;
        }
        None => {
            print!("{}", content);
            io::stdout().flush()?;
        }
    }
    Ok(())
}
