//! Lock, unlock and the other scooter commands.

use anyhow::Result;
use serde::Serialize;
use unu_core::{Error, ManagerConfig, ScooterHandle, ScooterSnapshot};

use super::OutputOptions;
use crate::cli::{BlinkerState, OutputFormat};
use crate::format::{format_json, format_snapshot_text};
use crate::style;
use crate::util::{connect, finish, write_output};

/// A command to send to the scooter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Lock,
    Unlock,
    OpenSeat,
    Blinker(BlinkerState),
    ToggleHazards,
    RestartAndLock,
}

impl Action {
    fn name(&self) -> &'static str {
        match self {
            Self::Lock => "lock",
            Self::Unlock => "unlock",
            Self::OpenSeat => "seat",
            Self::Blinker(_) => "blinker",
            Self::ToggleHazards => "hazards",
            Self::RestartAndLock => "restart-and-lock",
        }
    }

    fn success_message(&self, hazards_on: bool) -> String {
        match self {
            Self::Lock | Self::RestartAndLock => "Locked.".to_string(),
            Self::Unlock => "Unlocked.".to_string(),
            Self::OpenSeat => "Seat box opened.".to_string(),
            Self::Blinker(state) => format!("Blinkers set to {}.", state.as_str()),
            Self::ToggleHazards if hazards_on => "Hazard lights on.".to_string(),
            Self::ToggleHazards => "Hazard lights off.".to_string(),
        }
    }
}

/// Outcome of an action, as printed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionReport {
    pub action: &'static str,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Set when `restart-and-lock` may get the scooter locked.
    pub retry_with_restart: bool,
    pub scooter: ScooterSnapshot,
}

/// Arguments for the scooter commands.
pub struct ControlArgs<'a> {
    pub action: Action,
    pub config: ManagerConfig,
    pub opts: OutputOptions<'a>,
}

/// Run `action` on a connected scooter.
pub async fn perform(scooter: &ScooterHandle, action: Action) -> ActionReport {
    let mut hazards = None;
    let result = match action {
        Action::Lock => scooter.lock().await,
        Action::Unlock => scooter.unlock().await,
        Action::OpenSeat => scooter.open_seat().await,
        Action::Blinker(state) => scooter.send_blinker(state.as_str()).await,
        Action::ToggleHazards => scooter.toggle_hazards().await.map(|on| hazards = Some(on)),
        Action::RestartAndLock => scooter.restart_and_lock().await,
    };
    // The hazard flag reaches the snapshot after the call returns.
    let mut snapshot = scooter.snapshot();
    if let Some(on) = hazards {
        snapshot.hazards_on = on;
    }
    report(action, result, snapshot)
}

fn report(action: Action, result: unu_core::Result<()>, scooter: ScooterSnapshot) -> ActionReport {
    match result {
        Ok(()) => ActionReport {
            action: action.name(),
            ok: true,
            error: None,
            retry_with_restart: false,
            scooter,
        },
        Err(e) => ActionReport {
            action: action.name(),
            ok: false,
            retry_with_restart: action == Action::Lock
                && matches!(e, Error::LockVerificationFailed { .. }),
            error: Some(e.to_string()),
            scooter,
        },
    }
}

fn format_report_text(report: &ActionReport, action: Action, no_color: bool) -> String {
    let mut out = String::new();
    match &report.error {
        None => {
            let message = action.success_message(report.scooter.hazards_on);
            out.push_str(&style::format_success(&message, no_color));
        }
        Some(error) => {
            out.push_str(&style::format_warning(error, no_color));
            if report.retry_with_restart {
                out.push('\n');
                out.push_str(&style::format_info(
                    "Try `unu restart-and-lock` to restart the scooter and lock again.",
                    no_color,
                ));
            }
        }
    }
    out.push_str("\n\n");
    out.push_str(&format_snapshot_text(&report.scooter, no_color));
    out
}

pub async fn cmd_control(args: ControlArgs<'_>) -> Result<()> {
    let ControlArgs {
        action,
        config,
        opts,
    } = args;

    let scooter = connect(config, opts.quiet).await?;
    let spinner = style::status_spinner(&format!("Sending {}...", action.name()), opts.quiet);
    let report = perform(&scooter, action).await;
    spinner.finish_and_clear();
    finish(&scooter).await;

    let content = match opts.format {
        OutputFormat::Json => format_json(&report)?,
        OutputFormat::Text => format_report_text(&report, action, opts.no_color),
    };
    write_output(opts.output, &content)?;

    match report.error {
        Some(error) => Err(anyhow::anyhow!(error).context(format!("{} failed", action.name()))),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use unu_core::uuid as uuids;
    use unu_core::{CharacteristicRole, EventChannel, MockTransport};

    use crate::util::connect_with;

    async fn connected(
        state: &'static str,
        handlebar: &'static str,
    ) -> (Arc<MockTransport>, ScooterHandle) {
        let channel = EventChannel::new();
        let mock = Arc::new(MockTransport::new(channel.sink()));
        mock.set_value(uuids::SCOOTER_STATE, state).await;
        mock.set_value(uuids::HANDLEBAR_LOCK, handlebar).await;

        let advertiser = Arc::clone(&mock);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            advertiser.advertise().await;
        });
        let scooter = connect_with(Arc::clone(&mock), channel, ManagerConfig::default(), true)
            .await
            .unwrap();
        mock.clear_calls().await;
        (mock, scooter)
    }

    #[tokio::test(start_paused = true)]
    async fn test_lock_reports_success() {
        let (mock, scooter) = connected("parked", "unlocked").await;
        mock.on_write("scooter:state lock", uuids::HANDLEBAR_LOCK, "locked")
            .await;

        let report = perform(&scooter, Action::Lock).await;
        assert!(report.ok, "{:?}", report.error);
        assert_eq!(report.action, "lock");
        assert!(report.scooter.lock_state.is_locked());
        assert!(!report.retry_with_restart);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_lock_suggests_restart() {
        let (_mock, scooter) = connected("parked", "unlocked").await;

        let report = perform(&scooter, Action::Lock).await;
        assert!(!report.ok);
        assert!(report.retry_with_restart);

        let text = format_report_text(&report, Action::Lock, true);
        assert!(text.contains("The handlebar wasn't in a lockable position."));
        assert!(text.contains("unu restart-and-lock"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_blinker_writes_state() {
        let (mock, scooter) = connected("parked", "unlocked").await;

        let report = perform(&scooter, Action::Blinker(BlinkerState::Left)).await;
        assert!(report.ok);
        assert_eq!(
            mock.writes().await,
            vec![(CharacteristicRole::Command, "scooter:blinker left".to_string())]
        );
        assert_eq!(
            format_report_text(&report, Action::Blinker(BlinkerState::Left), true)
                .lines()
                .next(),
            Some("[OK] Blinkers set to left.")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_hazards_message_follows_state() {
        let (_mock, scooter) = connected("parked", "unlocked").await;

        let report = perform(&scooter, Action::ToggleHazards).await;
        assert!(report.ok);
        assert!(report.scooter.hazards_on);
        assert!(
            format_report_text(&report, Action::ToggleHazards, true)
                .starts_with("[OK] Hazard lights on.")
        );
    }

    #[test]
    fn test_report_json_shape() {
        let report = report(
            Action::Unlock,
            Err(Error::NotConnected),
            ScooterSnapshot::default(),
        );
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["action"], "unlock");
        assert_eq!(value["ok"], false);
        assert_eq!(value["retry_with_restart"], false);
        assert!(value["error"].is_string());
        assert_eq!(value["scooter"]["phase"], "idle");
    }
}
