//! Scan command implementation.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use unu_core::{
    BtleTransport, EventChannel, ManagerConfig, PeripheralHandle, ScooterEvent, ScooterManager,
    Transport,
};

use super::OutputOptions;
use crate::cli::OutputFormat;
use crate::format::format_json;
use crate::style;
use crate::util::{finish, write_output};

/// Result of a scan.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sighting {
    pub name: String,
    pub found: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peripheral: Option<PeripheralHandle>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rssi: Option<i16>,
}

pub async fn cmd_scan(config: ManagerConfig, opts: OutputOptions<'_>) -> Result<()> {
    let channel = EventChannel::new();
    let transport = BtleTransport::new(channel.sink(), config.connection.clone())
        .await
        .context("Failed to open the Bluetooth adapter")?;

    let spinner = style::status_spinner(
        &format!(
            "Scanning for {:?}... ({}s)",
            config.device_name,
            config.scan_timeout.as_secs()
        ),
        opts.quiet,
    );
    let sighting = scan_with(Arc::new(transport), channel, config).await;
    spinner.finish_and_clear();
    let sighting = sighting?;

    let content = match opts.format {
        OutputFormat::Json => format_json(&sighting)?,
        OutputFormat::Text => format_sighting_text(&sighting, opts.no_color),
    };
    write_output(opts.output, &content)
}

/// Scan until the scooter is seen or the scan times out.
///
/// The manager connects on a match, so the link is torn down again before
/// returning.
pub async fn scan_with<T: Transport + 'static>(
    transport: Arc<T>,
    channel: EventChannel,
    config: ManagerConfig,
) -> Result<Sighting> {
    let name = config.device_name.clone();
    // Covers a scan that waits for the radio to come up.
    let limit = config.scan_timeout + Duration::from_secs(5);
    let scooter = ScooterManager::spawn(transport, channel, config)?;
    let mut events = scooter.subscribe();
    scooter.start_scanning()?;

    let mut sighting = Sighting {
        name,
        found: false,
        peripheral: None,
        rssi: None,
    };
    let outcome = tokio::time::timeout(limit, async {
        loop {
            match events.recv().await {
                Ok(ScooterEvent::Discovered { peripheral, rssi }) => return Some((peripheral, rssi)),
                Ok(ScooterEvent::NoDeviceFound) | Err(RecvError::Closed) => return None,
                Ok(_) | Err(RecvError::Lagged(_)) => {}
            }
        }
    })
    .await;

    if let Ok(Some((peripheral, rssi))) = outcome {
        sighting.found = true;
        sighting.peripheral = Some(peripheral);
        sighting.rssi = rssi;
    }
    finish(&scooter).await;
    Ok(sighting)
}

fn format_sighting_text(sighting: &Sighting, no_color: bool) -> String {
    match &sighting.peripheral {
        Some(peripheral) => {
            let rssi = sighting
                .rssi
                .map(|r| format!(", {} dBm", r))
                .unwrap_or_default();
            format!(
                "{}\n",
                style::format_success(
                    &format!("Found {:?} ({}{})", sighting.name, peripheral.id, rssi),
                    no_color
                )
            )
        }
        None => format!(
            "{}\n",
            style::format_warning(&format!("{:?} not found", sighting.name), no_color)
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use unu_core::MockTransport;

    #[tokio::test(start_paused = true)]
    async fn test_scan_finds_scooter() {
        let channel = EventChannel::new();
        let mock = Arc::new(MockTransport::new(channel.sink()));
        let advertiser = Arc::clone(&mock);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(2)).await;
            advertiser.advertise().await;
        });

        let sighting = scan_with(Arc::clone(&mock), channel, ManagerConfig::default())
            .await
            .unwrap();
        assert!(sighting.found);
        assert_eq!(sighting.peripheral.as_ref(), Some(mock.peripheral()));
        assert!(!mock.is_connected(mock.peripheral()).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scan_times_out() {
        let channel = EventChannel::new();
        let mock = Arc::new(MockTransport::new(channel.sink()));
        let other = Arc::clone(&mock);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            other.advertise_other("AA:BB:CC:DD:EE:FF", Some("Other Scooter"));
        });
        let config = ManagerConfig::default().scan_timeout(Duration::from_secs(10));

        let sighting = scan_with(mock, channel, config).await.unwrap();
        assert!(!sighting.found);
        assert_eq!(sighting.peripheral, None);
    }

    #[test]
    fn test_sighting_text() {
        let sighting = Sighting {
            name: "unu Scooter".to_string(),
            found: true,
            peripheral: Some(PeripheralHandle::new("AA:BB", None)),
            rssi: Some(-61),
        };
        assert_eq!(
            format_sighting_text(&sighting, true),
            "[OK] Found \"unu Scooter\" (AA:BB, -61 dBm)\n"
        );

        let missing = Sighting {
            found: false,
            peripheral: None,
            rssi: None,
            ..sighting
        };
        assert_eq!(
            format_sighting_text(&missing, true),
            "[!!] \"unu Scooter\" not found\n"
        );
    }

    #[test]
    fn test_sighting_json_omits_missing_fields() {
        let missing = Sighting {
            name: "unu Scooter".to_string(),
            found: false,
            peripheral: None,
            rssi: None,
        };
        let json = serde_json::to_string(&missing).unwrap();
        assert_eq!(json, r#"{"name":"unu Scooter","found":false}"#);
    }
}
