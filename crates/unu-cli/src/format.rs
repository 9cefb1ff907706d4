//! Output formatting for text and JSON output.

use anyhow::Result;
use serde::Serialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use unu_core::{DisconnectReason, PeripheralHandle, ScooterEvent, ScooterSnapshot};

use crate::style;

/// Pretty JSON followed by a newline.
pub fn format_json<T: Serialize>(value: &T) -> Result<String> {
    Ok(format!("{}\n", serde_json::to_string_pretty(value)?))
}

/// Compact single-line JSON, for streams.
pub fn format_json_line<T: Serialize>(value: &T) -> Result<String> {
    Ok(format!("{}\n", serde_json::to_string(value)?))
}

fn format_time(time: OffsetDateTime) -> String {
    time.format(&Rfc3339).unwrap_or_else(|_| time.to_string())
}

fn format_peripheral(peripheral: &PeripheralHandle) -> String {
    match &peripheral.name {
        Some(name) => format!("{} ({})", name, peripheral.id),
        None => peripheral.id.clone(),
    }
}

/// Multi-line telemetry report.
pub fn format_snapshot_text(snapshot: &ScooterSnapshot, no_color: bool) -> String {
    let mut out = String::new();
    out.push_str(&format!("Status:     {}\n", snapshot.status));
    out.push_str(&format!(
        "Connection: {}\n",
        style::format_phase_colored(snapshot.phase, no_color)
    ));
    out.push_str(&format!("Scooter:    {}\n", snapshot.scooter_state));
    out.push_str(&format!("Handlebar:  {}\n", snapshot.lock_state));
    if let Some(power) = &snapshot.power_state {
        out.push_str(&format!("Power:      {}\n", power));
    }
    out.push_str(&format!(
        "CBB:        {}\n",
        if snapshot.cbb_charging {
            "charging"
        } else {
            "not charging"
        }
    ));
    if snapshot.hazards_on {
        out.push_str("Hazards:    on\n");
    }
    if !snapshot.batteries.is_empty() {
        out.push_str("Batteries:\n");
        for battery in &snapshot.batteries {
            out.push_str(&format!(
                "  {:<14} {}\n",
                battery.role.to_string(),
                style::format_battery_colored(battery.percent, no_color)
            ));
        }
    }
    if let Some(updated) = snapshot.last_update {
        out.push_str(&format!("Updated:    {}\n", format_time(updated)));
    }
    out
}

/// Single-line telemetry summary for the watch command.
pub fn format_watch_line(snapshot: &ScooterSnapshot, no_color: bool) -> String {
    let mut parts = vec![
        snapshot.status.clone(),
        style::format_phase_colored(snapshot.phase, no_color),
        format!("handlebar {}", snapshot.lock_state),
    ];
    for battery in &snapshot.batteries {
        parts.push(format!(
            "{} {}",
            battery.role,
            style::format_battery_colored(battery.percent, no_color)
        ));
    }
    if snapshot.cbb_charging {
        parts.push("CBB charging".to_string());
    }
    if snapshot.hazards_on {
        parts.push("hazards on".to_string());
    }
    parts.join(" | ")
}

fn format_reason(reason: &DisconnectReason) -> String {
    match reason {
        DisconnectReason::UserRequested => "requested".to_string(),
        DisconnectReason::LinkLoss(Some(detail)) => format!("link lost: {}", detail),
        DisconnectReason::LinkLoss(None) => "link lost".to_string(),
        DisconnectReason::AdapterUnavailable => "Bluetooth unavailable".to_string(),
        DisconnectReason::ReconnectExhausted => "gave up reconnecting".to_string(),
        _ => format!("{:?}", reason),
    }
}

/// One-line description of an event, without a trailing newline.
pub fn format_event_text(event: &ScooterEvent, no_color: bool) -> String {
    match event {
        ScooterEvent::PhaseChanged { phase } => style::format_info(
            &format!("Phase: {}", style::format_phase_colored(*phase, no_color)),
            no_color,
        ),
        ScooterEvent::Discovered { peripheral, rssi } => {
            let rssi = rssi.map(|r| format!(" at {} dBm", r)).unwrap_or_default();
            style::format_info(
                &format!("Found {}{}", format_peripheral(peripheral), rssi),
                no_color,
            )
        }
        ScooterEvent::Connected { peripheral } => style::format_success(
            &format!("Connected to {}", format_peripheral(peripheral)),
            no_color,
        ),
        ScooterEvent::Disconnected { reason } => style::format_warning(
            &format!("Disconnected ({})", format_reason(reason)),
            no_color,
        ),
        ScooterEvent::ReconnectStarted { attempt } => style::format_info(
            &format!("Reconnecting (attempt {})", attempt),
            no_color,
        ),
        ScooterEvent::NoDeviceFound => style::format_warning("No scooter found.", no_color),
        ScooterEvent::DiscoveryFailed { message }
        | ScooterEvent::WakeFailed { message }
        | ScooterEvent::LockVerificationFailed { message } => {
            style::format_warning(message, no_color)
        }
        ScooterEvent::DecodeFailed { role, message } => style::format_warning(
            &format!("Could not decode {}: {}", role, message),
            no_color,
        ),
        ScooterEvent::CommandWriteFailed { role, message } => style::format_warning(
            &format!("Write to {} failed: {}", role, message),
            no_color,
        ),
        _ => style::format_info(&format!("{:?}", event), no_color),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use unu_core::{BatteryReading, CharacteristicRole, ConnectionPhase, ScooterState};

    fn sample() -> ScooterSnapshot {
        ScooterSnapshot {
            phase: ConnectionPhase::Connected,
            scooter_state: ScooterState::Standby,
            status: "Stand-by".to_string(),
            batteries: vec![
                BatteryReading::new(CharacteristicRole::PrimarySoC, 87),
                BatteryReading::new(CharacteristicRole::CbbSoC, 150),
            ],
            cbb_charging: true,
            power_state: Some("running".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_snapshot_text() {
        let text = format_snapshot_text(&sample(), true);
        assert!(text.contains("Status:     Stand-by\n"));
        assert!(text.contains("Connection: connected\n"));
        assert!(text.contains("Scooter:    Standby\n"));
        assert!(text.contains("Handlebar:  Locked\n"));
        assert!(text.contains("Power:      running\n"));
        assert!(text.contains("CBB:        charging\n"));
        assert!(text.contains("primary SoC"));
        assert!(text.contains("150%"));
        assert!(!text.contains("Updated:"));
        assert!(!text.contains("Hazards:"));
    }

    #[test]
    fn test_watch_line() {
        assert_eq!(
            format_watch_line(&sample(), true),
            "Stand-by | connected | handlebar Locked | primary SoC 87% | CBB SoC 150% | CBB charging"
        );
    }

    #[test]
    fn test_snapshot_json() {
        let json = format_json(&sample()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["phase"], "connected");
        assert_eq!(value["status"], "Stand-by");
        assert_eq!(value["batteries"][1]["percent"], 150);
        assert!(json.ends_with('\n'));
    }

    #[test]
    fn test_event_text() {
        let connected = ScooterEvent::Connected {
            peripheral: PeripheralHandle::new("AA:BB", Some("unu Scooter".to_string())),
        };
        assert_eq!(
            format_event_text(&connected, true),
            "[OK] Connected to unu Scooter (AA:BB)"
        );

        let lost = ScooterEvent::Disconnected {
            reason: DisconnectReason::LinkLoss(None),
        };
        assert_eq!(format_event_text(&lost, true), "[!!] Disconnected (link lost)");

        let attempt = ScooterEvent::ReconnectStarted { attempt: 2 };
        assert_eq!(
            format_event_text(&attempt, true),
            "[--] Reconnecting (attempt 2)"
        );
    }

    #[test]
    fn test_event_json_line() {
        let line = format_json_line(&ScooterEvent::NoDeviceFound).unwrap();
        assert_eq!(line, "{\"type\":\"no_device_found\"}\n");
    }
}
