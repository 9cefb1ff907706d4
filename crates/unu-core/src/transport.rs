//! The seam between the scooter manager and a Bluetooth stack.
//!
//! A [`Transport`] accepts requests (scan, connect, discover, read, subscribe,
//! write) and reports their completions asynchronously as [`BleEvent`]s
//! through an [`EventSink`]. Request methods return as soon as the request
//! has been issued; only [`Transport::write`] waits for the peripheral's
//! acknowledgement.
//!
//! Two implementations ship with the crate: [`crate::btle::BtleTransport`]
//! for real hardware and [`crate::mock::MockTransport`] for tests.

use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::Result;

/// Availability of the local Bluetooth radio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterState {
    /// State not yet known.
    #[default]
    Unknown,
    /// The radio is resetting.
    Resetting,
    /// No usable Bluetooth LE radio.
    Unsupported,
    /// The process may not use Bluetooth.
    Unauthorized,
    /// The radio is off.
    PoweredOff,
    /// The radio is on and usable.
    PoweredOn,
}

impl AdapterState {
    /// Whether scanning and connecting are possible.
    pub fn is_powered_on(&self) -> bool {
        matches!(self, Self::PoweredOn)
    }

    /// Status text shown while the radio is unavailable.
    ///
    /// Returns `None` for [`AdapterState::PoweredOn`].
    pub fn status_message(&self) -> Option<&'static str> {
        match self {
            Self::PoweredOn => None,
            Self::PoweredOff => Some("Please turn on Bluetooth"),
            Self::Unauthorized => Some("Bluetooth permission required"),
            Self::Unsupported => Some("Bluetooth not supported"),
            Self::Resetting => Some("Bluetooth is resetting"),
            Self::Unknown => Some("Bluetooth state unknown"),
        }
    }
}

impl fmt::Display for AdapterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unknown => "unknown",
            Self::Resetting => "resetting",
            Self::Unsupported => "unsupported",
            Self::Unauthorized => "unauthorized",
            Self::PoweredOff => "powered off",
            Self::PoweredOn => "powered on",
        };
        f.write_str(name)
    }
}

/// Opaque reference to a discovered peripheral.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeripheralHandle {
    /// Platform identifier (MAC address, or a CoreBluetooth UUID on macOS).
    pub id: String,
    /// Advertised local name.
    pub name: Option<String>,
}

impl PeripheralHandle {
    /// Create a handle with an advertised name.
    pub fn new(id: impl Into<String>, name: Option<String>) -> Self {
        Self {
            id: id.into(),
            name,
        }
    }
}

/// A resolved characteristic on a specific connection.
///
/// `generation` is the connection epoch the handle was resolved in. Handles
/// from an earlier connection are never accepted by the manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CharacteristicHandle {
    /// Service containing the characteristic.
    pub service: Uuid,
    /// Characteristic UUID.
    pub uuid: Uuid,
    /// Connection epoch.
    pub generation: u64,
}

/// Parameters for a scan request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanRequest {
    /// Only report peripherals advertising one of these services.
    /// Empty means every peripheral.
    pub services: Vec<Uuid>,
}

impl ScanRequest {
    /// Scan for every advertising peripheral.
    pub fn all() -> Self {
        Self::default()
    }

    /// Scan for peripherals advertising the given service.
    pub fn with_service(service: Uuid) -> Self {
        Self {
            services: vec![service],
        }
    }
}

/// Completion and state-change notifications from a transport.
#[derive(Debug, Clone)]
pub enum BleEvent {
    /// The radio changed state.
    AdapterStateChanged(AdapterState),
    /// A peripheral advertised while scanning.
    PeripheralDiscovered {
        peripheral: PeripheralHandle,
        rssi: Option<i16>,
        /// Advertised service UUIDs.
        services: Vec<Uuid>,
    },
    /// A connect request succeeded.
    Connected { peripheral: PeripheralHandle },
    /// A connect request failed.
    ConnectFailed {
        peripheral: PeripheralHandle,
        reason: String,
    },
    /// The link dropped. `error` is `None` for a clean disconnect.
    Disconnected {
        peripheral: PeripheralHandle,
        error: Option<String>,
    },
    /// Service discovery finished; `Ok` lists the services found.
    ServicesDiscovered {
        peripheral: PeripheralHandle,
        result: std::result::Result<Vec<Uuid>, String>,
    },
    /// Characteristic discovery for one service finished.
    CharacteristicsDiscovered {
        peripheral: PeripheralHandle,
        service: Uuid,
        result: std::result::Result<Vec<Uuid>, String>,
    },
    /// A read completed or a notification arrived.
    ValueUpdated { characteristic: Uuid, value: Bytes },
    /// An acknowledged write finished.
    WriteCompleted {
        characteristic: Uuid,
        error: Option<String>,
    },
}

/// Sending half of the event channel, handed to transports.
#[derive(Debug, Clone)]
pub struct EventSink {
    sender: mpsc::UnboundedSender<BleEvent>,
}

impl EventSink {
    /// Deliver an event to the manager.
    pub fn send(&self, event: BleEvent) {
        // Ignore error if the manager has stopped
        let _ = self.sender.send(event);
    }

    /// Whether the manager side has gone away.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// Unbounded, ordered channel carrying [`BleEvent`]s to the manager.
///
/// Create one, give [`EventChannel::sink`] to the transport, then hand the
/// channel itself to [`crate::ScooterManager::spawn`].
#[derive(Debug)]
pub struct EventChannel {
    sender: mpsc::UnboundedSender<BleEvent>,
    pub(crate) receiver: mpsc::UnboundedReceiver<BleEvent>,
}

impl EventChannel {
    /// Create a new channel.
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self { sender, receiver }
    }

    /// A sink feeding this channel.
    pub fn sink(&self) -> EventSink {
        EventSink {
            sender: self.sender.clone(),
        }
    }
}

impl Default for EventChannel {
    fn default() -> Self {
        Self::new()
    }
}

/// Request interface to a Bluetooth LE central.
///
/// Implementations report completions through the [`EventSink`] they were
/// constructed with. Errors returned directly mean the request could not be
/// issued at all.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Current radio state.
    async fn adapter_state(&self) -> AdapterState;

    /// Start scanning. Discoveries arrive as [`BleEvent::PeripheralDiscovered`].
    async fn start_scan(&self, request: ScanRequest) -> Result<()>;

    /// Stop scanning.
    async fn stop_scan(&self) -> Result<()>;

    /// Connect. Completes with [`BleEvent::Connected`] or [`BleEvent::ConnectFailed`].
    async fn connect(&self, peripheral: &PeripheralHandle) -> Result<()>;

    /// Cancel a pending or established connection.
    async fn cancel_connection(&self, peripheral: &PeripheralHandle) -> Result<()>;

    /// Whether the stack currently reports the peripheral as connected.
    async fn is_connected(&self, peripheral: &PeripheralHandle) -> bool;

    /// Discover the given services. Completes with [`BleEvent::ServicesDiscovered`].
    async fn discover_services(&self, peripheral: &PeripheralHandle, services: &[Uuid])
    -> Result<()>;

    /// Discover characteristics of one service.
    /// Completes with [`BleEvent::CharacteristicsDiscovered`].
    async fn discover_characteristics(
        &self,
        peripheral: &PeripheralHandle,
        service: Uuid,
        characteristics: &[Uuid],
    ) -> Result<()>;

    /// Read a characteristic. The value arrives as [`BleEvent::ValueUpdated`].
    async fn read(&self, peripheral: &PeripheralHandle, handle: &CharacteristicHandle)
    -> Result<()>;

    /// Enable notifications. Values arrive as [`BleEvent::ValueUpdated`].
    async fn subscribe(
        &self,
        peripheral: &PeripheralHandle,
        handle: &CharacteristicHandle,
    ) -> Result<()>;

    /// Write with response, returning once the peripheral acknowledged it.
    async fn write(
        &self,
        peripheral: &PeripheralHandle,
        handle: &CharacteristicHandle,
        payload: &[u8],
    ) -> Result<()>;
}
