//! Logical scooter state and its observable snapshot.
//!
//! [`ScooterStore`] is mutated only by decoded characteristic values. The
//! manager publishes it, together with connection state, as a
//! [`ScooterSnapshot`] on every change.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::debug;

use unu_types::decode;
use unu_types::{BatteryReading, CharacteristicRole, DecodeResult, LockState, ScooterState};

use crate::transport::AdapterState;

/// Connection lifecycle phase. Exactly one is active at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionPhase {
    /// Not scanning, no peripheral.
    #[default]
    Idle,
    /// Scanning for the scooter.
    Scanning,
    /// Connect request in flight.
    Connecting,
    /// Link established.
    Connected,
    /// Link lost; reconnecting to the retained peripheral.
    Reconnecting,
    /// Link gone and not reconnecting.
    Disconnected,
}

impl fmt::Display for ConnectionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Scanning => "scanning",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Disconnected => "disconnected",
        };
        f.write_str(name)
    }
}

/// Human-readable status for a scooter/handlebar state pair.
///
/// An unlocked or riding scooter whose handlebar still reads locked is
/// reported as a mismatch.
pub fn status_for(state: &ScooterState, lock: LockState) -> String {
    match state {
        ScooterState::Unlocked | ScooterState::Riding => {
            if lock.is_locked() {
                "Warning: mismatch".to_string()
            } else {
                "Unlocked".to_string()
            }
        }
        other => other.to_string(),
    }
}

/// Telemetry-derived scooter state.
#[derive(Debug, Clone, Default)]
pub struct ScooterStore {
    scooter_state: ScooterState,
    lock_state: LockState,
    batteries: BTreeMap<CharacteristicRole, BatteryReading>,
    cbb_charging: bool,
    power_state: Option<String>,
    last_update: Option<OffsetDateTime>,
}

impl ScooterStore {
    /// Create a store in its initial state (disconnected, locked).
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode `bytes` for `role` and apply the result.
    ///
    /// Returns `true` when the scooter state or lock state changed input to
    /// the status projection. A payload that fails to decode leaves the
    /// store untouched.
    pub fn apply(&mut self, role: CharacteristicRole, bytes: &[u8]) -> DecodeResult<bool> {
        let affects_status = match role {
            CharacteristicRole::ScooterState => {
                self.scooter_state = decode::decode_scooter_state(bytes);
                true
            }
            CharacteristicRole::HandlebarLock => {
                self.lock_state = decode::decode_lock_state(bytes);
                true
            }
            CharacteristicRole::PowerState => {
                self.power_state = Some(decode::decode_power_state(bytes));
                false
            }
            CharacteristicRole::CbbCharging => {
                self.cbb_charging = decode::decode_charging_flag(bytes);
                false
            }
            CharacteristicRole::AuxSoC
            | CharacteristicRole::CbbSoC
            | CharacteristicRole::PrimarySoC
            | CharacteristicRole::SecondarySoC => {
                let percent = decode::decode_soc(bytes, role.is_cbb())?;
                self.batteries
                    .insert(role, BatteryReading::new(role, percent));
                false
            }
            CharacteristicRole::Command | CharacteristicRole::HibernationWake => {
                debug!("Ignoring value for write-only role {}", role);
                return Ok(false);
            }
        };
        self.last_update = Some(OffsetDateTime::now_utc());
        Ok(affects_status)
    }

    /// Current scooter state.
    pub fn scooter_state(&self) -> &ScooterState {
        &self.scooter_state
    }

    /// Current handlebar lock state.
    pub fn lock_state(&self) -> LockState {
        self.lock_state
    }

    /// Latest reading for a battery role.
    pub fn battery(&self, role: CharacteristicRole) -> Option<BatteryReading> {
        self.batteries.get(&role).copied()
    }

    /// All battery readings received so far, in role order.
    pub fn batteries(&self) -> Vec<BatteryReading> {
        self.batteries.values().copied().collect()
    }

    /// Whether the CBB reports charging.
    pub fn cbb_charging(&self) -> bool {
        self.cbb_charging
    }

    /// Latest power state text.
    pub fn power_state(&self) -> Option<&str> {
        self.power_state.as_deref()
    }

    /// Time of the last applied value.
    pub fn last_update(&self) -> Option<OffsetDateTime> {
        self.last_update
    }

    /// Status projection of the current scooter and lock state.
    pub fn status(&self) -> String {
        status_for(&self.scooter_state, self.lock_state)
    }
}

/// Everything observers can see, published on every change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScooterSnapshot {
    /// Connection lifecycle phase.
    pub phase: ConnectionPhase,
    /// Radio availability.
    pub adapter: AdapterState,
    /// Whether a scan is active.
    pub scanning: bool,
    /// Last decoded scooter state.
    pub scooter_state: ScooterState,
    /// Last decoded handlebar state.
    pub lock_state: LockState,
    /// Human-readable status line.
    pub status: String,
    /// Battery readings received so far.
    pub batteries: Vec<BatteryReading>,
    /// CBB charging flag.
    pub cbb_charging: bool,
    /// Last power state text.
    pub power_state: Option<String>,
    /// Whether the hazard lights were last switched on.
    pub hazards_on: bool,
    /// Time of the last telemetry value.
    pub last_update: Option<OffsetDateTime>,
}

impl Default for ScooterSnapshot {
    fn default() -> Self {
        Self {
            phase: ConnectionPhase::Idle,
            adapter: AdapterState::Unknown,
            scanning: false,
            scooter_state: ScooterState::Disconnected,
            lock_state: LockState::Locked,
            status: String::new(),
            batteries: Vec::new(),
            cbb_charging: false,
            power_state: None,
            hazards_on: false,
            last_update: None,
        }
    }
}

impl ScooterSnapshot {
    /// Whether a link to the scooter is up.
    pub fn is_connected(&self) -> bool {
        self.phase == ConnectionPhase::Connected
    }

    /// Reading for a battery role, if received.
    pub fn battery(&self, role: CharacteristicRole) -> Option<BatteryReading> {
        self.batteries.iter().find(|b| b.role == role).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use unu_types::DecodeError;

    #[test]
    fn test_initial_state() {
        let store = ScooterStore::new();
        assert_eq!(store.scooter_state(), &ScooterState::Disconnected);
        assert_eq!(store.lock_state(), LockState::Locked);
        assert!(store.batteries().is_empty());
        assert!(!store.cbb_charging());
        assert_eq!(store.status(), "Disconnected");
        assert!(store.last_update().is_none());
    }

    #[test]
    fn test_status_projection() {
        use LockState::{Locked, Unlocked};
        let cases = [
            (ScooterState::Unlocked, Locked, "Warning: mismatch"),
            (ScooterState::Riding, Locked, "Warning: mismatch"),
            (ScooterState::Unlocked, Unlocked, "Unlocked"),
            (ScooterState::Riding, Unlocked, "Unlocked"),
            (ScooterState::Standby, Locked, "Standby"),
            (ScooterState::Parked, Unlocked, "Parked"),
            (ScooterState::Charging, Locked, "Charging"),
            (ScooterState::Linking, Locked, "Linking"),
            (ScooterState::Disconnected, Locked, "Disconnected"),
            (ScooterState::ShuttingDown, Locked, "Shutting Down"),
            (ScooterState::Unknown("hibernating".into()), Locked, "hibernating"),
        ];
        for (state, lock, expected) in cases {
            assert_eq!(status_for(&state, lock), expected, "{state:?}/{lock:?}");
        }
    }

    #[test]
    fn test_apply_state_and_lock() {
        let mut store = ScooterStore::new();
        assert_eq!(store.apply(CharacteristicRole::ScooterState, b"riding"), Ok(true));
        assert_eq!(store.status(), "Warning: mismatch");
        assert_eq!(
            store.apply(CharacteristicRole::HandlebarLock, b"unlocked"),
            Ok(true)
        );
        assert_eq!(store.status(), "Unlocked");
        assert!(store.last_update().is_some());
    }

    #[test]
    fn test_apply_batteries() {
        let mut store = ScooterStore::new();
        assert_eq!(
            store.apply(CharacteristicRole::PrimarySoC, &[0, 1, 0, 0]),
            Ok(false)
        );
        assert_eq!(store.apply(CharacteristicRole::CbbSoC, &[200]), Ok(false));

        let primary = store.battery(CharacteristicRole::PrimarySoC).unwrap();
        assert_eq!(primary.percent, 100);
        assert!(!primary.is_cbb);

        let cbb = store.battery(CharacteristicRole::CbbSoC).unwrap();
        assert_eq!(cbb.percent, 200);
        assert!(cbb.is_cbb);
    }

    #[test]
    fn test_bad_soc_does_not_mutate() {
        let mut store = ScooterStore::new();
        store.apply(CharacteristicRole::AuxSoC, &[50, 0, 0, 0]).unwrap();
        let before = store.last_update();

        assert_eq!(
            store.apply(CharacteristicRole::AuxSoC, &[1, 2, 3]),
            Err(DecodeError::InvalidLength {
                expected: 4,
                actual: 3
            })
        );
        assert_eq!(store.battery(CharacteristicRole::AuxSoC).unwrap().percent, 50);
        assert_eq!(store.last_update(), before);
    }

    #[test]
    fn test_apply_text_roles() {
        let mut store = ScooterStore::new();
        store.apply(CharacteristicRole::CbbCharging, b"charging\0").unwrap();
        store.apply(CharacteristicRole::PowerState, b"running\n").unwrap();
        assert!(store.cbb_charging());
        assert_eq!(store.power_state(), Some("running"));
    }

    #[test]
    fn test_write_only_roles_ignored() {
        let mut store = ScooterStore::new();
        assert_eq!(store.apply(CharacteristicRole::Command, b"x"), Ok(false));
        assert!(store.last_update().is_none());
    }

    #[test]
    fn test_snapshot_serialization() {
        let snapshot = ScooterSnapshot {
            phase: ConnectionPhase::Connected,
            batteries: vec![BatteryReading::new(CharacteristicRole::CbbSoC, 80)],
            ..Default::default()
        };
        let json = serde_json::to_string(&snapshot).unwrap();
        assert!(json.contains("\"phase\":\"connected\""));
        assert!(json.contains("\"cbb_soc\""));
        assert!(snapshot.is_connected());
        assert_eq!(
            snapshot.battery(CharacteristicRole::CbbSoC).map(|b| b.percent),
            Some(80)
        );
    }
}
