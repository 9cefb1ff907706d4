//! Watch command implementation.
//!
//! Keeps one connection open and prints every event and telemetry change.
//! Reconnects after link loss are left to the manager; the command only
//! exits on Ctrl-C or once the manager gives up.

use std::fs::OpenOptions;
use std::future::Future;
use std::io::{self, Write};

use anyhow::{Context, Result};
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use unu_core::{DisconnectReason, ManagerConfig, ScooterEvent, ScooterHandle, ScooterSnapshot};

use super::OutputOptions;
use crate::cli::OutputFormat;
use crate::format::{format_event_text, format_json_line, format_watch_line};
use crate::util::{connect, finish};

/// Arguments for the watch command.
pub struct WatchArgs<'a> {
    pub config: ManagerConfig,
    pub opts: OutputOptions<'a>,
}

/// One line of JSON watch output.
#[derive(Debug, Serialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
enum WatchRecord<'a> {
    Event(&'a ScooterEvent),
    Snapshot(&'a ScooterSnapshot),
}

/// Why the watch loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WatchEnd {
    Interrupted,
    GaveUp,
    ManagerStopped,
}

pub async fn cmd_watch(args: WatchArgs<'_>) -> Result<()> {
    let WatchArgs { config, opts } = args;

    let scooter = connect(config, opts.quiet).await?;
    let mut out: Box<dyn Write> = match opts.output {
        Some(path) => Box::new(
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open {}", path.display()))?,
        ),
        None => Box::new(io::stdout()),
    };

    let end = watch_loop(&scooter, &mut out, opts, tokio::signal::ctrl_c()).await;
    finish(&scooter).await;

    match end? {
        WatchEnd::Interrupted => {
            if !opts.quiet {
                eprintln!("\nShutting down...");
            }
            Ok(())
        }
        WatchEnd::GaveUp => anyhow::bail!("Gave up reconnecting to the scooter"),
        WatchEnd::ManagerStopped => anyhow::bail!("Scooter manager stopped"),
    }
}

/// Whether anything worth printing differs between two snapshots.
fn telemetry_changed(previous: &ScooterSnapshot, current: &ScooterSnapshot) -> bool {
    previous.status != current.status
        || previous.phase != current.phase
        || previous.scooter_state != current.scooter_state
        || previous.lock_state != current.lock_state
        || previous.batteries != current.batteries
        || previous.cbb_charging != current.cbb_charging
        || previous.power_state != current.power_state
        || previous.hazards_on != current.hazards_on
}

pub(crate) async fn watch_loop<W, F>(
    scooter: &ScooterHandle,
    out: &mut W,
    opts: OutputOptions<'_>,
    interrupt: F,
) -> Result<WatchEnd>
where
    W: Write + ?Sized,
    F: Future,
{
    let mut snapshots = scooter.watch();
    let mut events = scooter.subscribe();
    let mut shown = snapshots.borrow_and_update().clone();
    write_snapshot(out, &shown, opts)?;

    tokio::pin!(interrupt);
    loop {
        tokio::select! {
            _ = &mut interrupt => return Ok(WatchEnd::Interrupted),
            event = events.recv() => match event {
                Ok(event) => {
                    write_event(out, &event, opts)?;
                    if event == (ScooterEvent::Disconnected { reason: DisconnectReason::ReconnectExhausted }) {
                        return Ok(WatchEnd::GaveUp);
                    }
                }
                Err(RecvError::Lagged(missed)) => {
                    tracing::warn!("Missed {} events", missed);
                }
                Err(RecvError::Closed) => return Ok(WatchEnd::ManagerStopped),
            },
            changed = snapshots.changed() => {
                if changed.is_err() {
                    return Ok(WatchEnd::ManagerStopped);
                }
                let current = snapshots.borrow_and_update().clone();
                if telemetry_changed(&shown, &current) {
                    write_snapshot(out, &current, opts)?;
                    shown = current;
                }
            }
        }
    }
}

fn write_event<W: Write + ?Sized>(
    out: &mut W,
    event: &ScooterEvent,
    opts: OutputOptions<'_>,
) -> Result<()> {
    let line = match opts.format {
        OutputFormat::Json => format_json_line(&WatchRecord::Event(event))?,
        OutputFormat::Text => format!("{}\n", format_event_text(event, opts.no_color)),
    };
    out.write_all(line.as_bytes())?;
    out.flush()?;
    Ok(())
}

fn write_snapshot<W: Write + ?Sized>(
    out: &mut W,
    snapshot: &ScooterSnapshot,
    opts: OutputOptions<'_>,
) -> Result<()> {
    let line = match opts.format {
        OutputFormat::Json => format_json_line(&WatchRecord::Snapshot(snapshot))?,
        OutputFormat::Text => format!("{}\n", format_watch_line(snapshot, opts.no_color)),
    };
    out.write_all(line.as_bytes())?;
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use unu_core::uuid as uuids;
    use unu_core::{EventChannel, MockTransport, ReconnectOptions};

    use crate::util::connect_with;

    fn text_opts() -> OutputOptions<'static> {
        OutputOptions {
            format: OutputFormat::Text,
            no_color: true,
            quiet: true,
            output: None,
        }
    }

    async fn connected(config: ManagerConfig) -> (Arc<MockTransport>, ScooterHandle) {
        let channel = EventChannel::new();
        let mock = Arc::new(MockTransport::new(channel.sink()));
        mock.set_value(uuids::SCOOTER_STATE, "parked").await;
        mock.set_value(uuids::HANDLEBAR_LOCK, "locked").await;
        let advertiser = Arc::clone(&mock);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            advertiser.advertise().await;
        });
        let scooter = connect_with(Arc::clone(&mock), channel, config, true)
            .await
            .unwrap();
        (mock, scooter)
    }

    #[tokio::test(start_paused = true)]
    async fn test_watch_prints_changes_until_interrupted() {
        let (mock, scooter) = connected(ManagerConfig::default()).await;

        let notifier = Arc::clone(&mock);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            notifier.notify(uuids::PRIMARY_SOC, vec![42u8, 0, 0, 0]).await;
        });

        let mut out = Vec::new();
        let end = watch_loop(
            &scooter,
            &mut out,
            text_opts(),
            tokio::time::sleep(Duration::from_secs(5)),
        )
        .await
        .unwrap();
        assert_eq!(end, WatchEnd::Interrupted);

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].starts_with("Parked"), "{text}");
        assert!(lines.iter().any(|l| l.contains("primary SoC 42%")), "{text}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_watch_stops_when_reconnects_are_exhausted() {
        let config = ManagerConfig::default().reconnect(ReconnectOptions::default().max_attempts(1));
        let (mock, scooter) = connected(config).await;
        mock.fail_connects(10);

        let dropper = Arc::clone(&mock);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            dropper.drop_link(Some("out of range"));
        });

        let mut out = Vec::new();
        let opts = OutputOptions {
            format: OutputFormat::Json,
            ..text_opts()
        };
        let end = watch_loop(&scooter, &mut out, opts, std::future::pending::<()>())
            .await
            .unwrap();
        assert_eq!(end, WatchEnd::GaveUp);

        let text = String::from_utf8(out).unwrap();
        let records: Vec<serde_json::Value> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(records[0]["kind"], "snapshot");
        assert!(
            records
                .iter()
                .any(|r| r["kind"] == "event" && r["data"]["type"] == "reconnect_started")
        );
    }

    #[test]
    fn test_telemetry_changed_ignores_timestamp() {
        let previous = ScooterSnapshot::default();
        let mut current = previous.clone();
        current.last_update = Some(time::OffsetDateTime::UNIX_EPOCH);
        assert!(!telemetry_changed(&previous, &current));
        current.hazards_on = true;
        assert!(telemetry_changed(&previous, &current));
    }
}
