//! Discrete scooter events.
//!
//! Snapshots tell observers what the scooter looks like now; events tell them
//! what just happened. Events are broadcast, so slow receivers may lag and
//! miss some.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use unu_types::CharacteristicRole;

use crate::store::ConnectionPhase;
use crate::transport::PeripheralHandle;

/// Events emitted by the scooter manager and command engine.
///
/// All events are serializable for logging and IPC.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new event types
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum ScooterEvent {
    /// The connection phase changed.
    PhaseChanged { phase: ConnectionPhase },
    /// The scooter was seen while scanning.
    Discovered {
        peripheral: PeripheralHandle,
        rssi: Option<i16>,
    },
    /// Connected to the scooter.
    Connected { peripheral: PeripheralHandle },
    /// The link dropped.
    Disconnected { reason: DisconnectReason },
    /// A reconnect attempt is about to start.
    ReconnectStarted { attempt: u32 },
    /// The scan ended without finding the scooter.
    NoDeviceFound,
    /// Part of the GATT layout could not be resolved.
    DiscoveryFailed { message: String },
    /// A characteristic value could not be decoded.
    DecodeFailed {
        role: CharacteristicRole,
        message: String,
    },
    /// The scooter did not wake to standby.
    WakeFailed { message: String },
    /// The handlebar stayed unlocked after a lock command.
    LockVerificationFailed { message: String },
    /// An acknowledged write failed.
    CommandWriteFailed {
        role: CharacteristicRole,
        message: String,
    },
}

/// Reason for disconnection.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new reasons
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum DisconnectReason {
    /// Disconnect requested by the caller.
    UserRequested,
    /// The peripheral or the stack dropped the link.
    LinkLoss(Option<String>),
    /// The radio became unavailable.
    AdapterUnavailable,
    /// Reconnect attempts were exhausted.
    ReconnectExhausted,
}

/// Sender for scooter events.
pub type EventSender = broadcast::Sender<ScooterEvent>;

/// Receiver for scooter events.
pub type EventReceiver = broadcast::Receiver<ScooterEvent>;

/// Event dispatcher for sending events to multiple receivers.
#[derive(Debug, Clone)]
pub struct EventDispatcher {
    sender: EventSender,
}

impl EventDispatcher {
    /// Create a new event dispatcher.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to events.
    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    /// Send an event.
    pub fn send(&self, event: ScooterEvent) {
        // Ignore error if no receivers
        let _ = self.sender.send(event);
    }

    /// Get the number of active receivers.
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new(100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = ScooterEvent::LockVerificationFailed {
            message: "still unlocked".to_string(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"lock_verification_failed\""));
        assert!(json.contains("still unlocked"));

        let back: ScooterEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_phase_event_serialization() {
        let event = ScooterEvent::PhaseChanged {
            phase: ConnectionPhase::Reconnecting,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(json, r#"{"type":"phase_changed","phase":"reconnecting"}"#);
    }

    #[tokio::test]
    async fn test_dispatcher_fan_out() {
        let dispatcher = EventDispatcher::new(8);
        let mut a = dispatcher.subscribe();
        let mut b = dispatcher.subscribe();
        assert_eq!(dispatcher.receiver_count(), 2);

        dispatcher.send(ScooterEvent::NoDeviceFound);
        assert_eq!(a.recv().await.unwrap(), ScooterEvent::NoDeviceFound);
        assert_eq!(b.recv().await.unwrap(), ScooterEvent::NoDeviceFound);
    }

    #[test]
    fn test_send_without_receivers() {
        let dispatcher = EventDispatcher::default();
        dispatcher.send(ScooterEvent::NoDeviceFound);
        assert_eq!(dispatcher.receiver_count(), 0);
    }
}
