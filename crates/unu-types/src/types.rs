//! Core types for unu scooter state and telemetry.

use core::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::uuid as uuids;

/// Logical role of a GATT characteristic on the scooter.
///
/// Each role maps to exactly one characteristic UUID inside one service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum CharacteristicRole {
    /// Text command input (write only).
    Command,
    /// Hibernation wake input (write only).
    HibernationWake,
    /// Scooter state text.
    ScooterState,
    /// Handlebar lock sensor text.
    HandlebarLock,
    /// Power state text.
    PowerState,
    /// Auxiliary battery state of charge.
    #[cfg_attr(feature = "serde", serde(rename = "aux_soc"))]
    AuxSoC,
    /// CBB state of charge.
    #[cfg_attr(feature = "serde", serde(rename = "cbb_soc"))]
    CbbSoC,
    /// CBB charging status text.
    CbbCharging,
    /// Primary battery state of charge.
    #[cfg_attr(feature = "serde", serde(rename = "primary_soc"))]
    PrimarySoC,
    /// Secondary battery state of charge.
    #[cfg_attr(feature = "serde", serde(rename = "secondary_soc"))]
    SecondarySoC,
}

impl CharacteristicRole {
    /// Every role, in table order.
    pub const ALL: [CharacteristicRole; 10] = [
        CharacteristicRole::Command,
        CharacteristicRole::HibernationWake,
        CharacteristicRole::ScooterState,
        CharacteristicRole::HandlebarLock,
        CharacteristicRole::PowerState,
        CharacteristicRole::AuxSoC,
        CharacteristicRole::CbbSoC,
        CharacteristicRole::CbbCharging,
        CharacteristicRole::PrimarySoC,
        CharacteristicRole::SecondarySoC,
    ];

    /// The characteristic UUID carrying this role.
    #[must_use]
    pub fn uuid(&self) -> Uuid {
        match self {
            Self::Command => uuids::COMMAND,
            Self::HibernationWake => uuids::HIBERNATION_COMMAND,
            Self::ScooterState => uuids::SCOOTER_STATE,
            Self::HandlebarLock => uuids::HANDLEBAR_LOCK,
            Self::PowerState => uuids::POWER_STATE,
            Self::AuxSoC => uuids::AUX_SOC,
            Self::CbbSoC => uuids::CBB_SOC,
            Self::CbbCharging => uuids::CBB_CHARGING,
            Self::PrimarySoC => uuids::PRIMARY_SOC,
            Self::SecondarySoC => uuids::SECONDARY_SOC,
        }
    }

    /// The service UUID the characteristic lives in.
    #[must_use]
    pub fn service(&self) -> Uuid {
        match self {
            Self::Command | Self::HibernationWake => uuids::COMMAND_SERVICE,
            Self::ScooterState | Self::HandlebarLock => uuids::MAIN_SERVICE,
            Self::PowerState => uuids::POWER_SERVICE,
            Self::AuxSoC => uuids::AUX_BATTERY_SERVICE,
            Self::CbbSoC | Self::CbbCharging => uuids::CBB_SERVICE,
            Self::PrimarySoC | Self::SecondarySoC => uuids::BATTERY_SERVICE,
        }
    }

    /// Look up the role for a characteristic UUID.
    ///
    /// # Examples
    ///
    /// ```
    /// use unu_types::{CharacteristicRole, uuid};
    ///
    /// assert_eq!(
    ///     CharacteristicRole::from_uuid(uuid::HANDLEBAR_LOCK),
    ///     Some(CharacteristicRole::HandlebarLock)
    /// );
    /// assert_eq!(CharacteristicRole::from_uuid(uuid::MAIN_SERVICE), None);
    /// ```
    #[must_use]
    pub fn from_uuid(uuid: Uuid) -> Option<Self> {
        Self::ALL.into_iter().find(|role| role.uuid() == uuid)
    }

    /// Telemetry roles are read once and subscribed on discovery.
    ///
    /// `Command` and `HibernationWake` are write-only inputs.
    #[must_use]
    pub fn is_telemetry(&self) -> bool {
        !matches!(self, Self::Command | Self::HibernationWake)
    }

    /// Whether this role reports a battery state of charge.
    #[must_use]
    pub fn is_battery(&self) -> bool {
        matches!(
            self,
            Self::AuxSoC | Self::CbbSoC | Self::PrimarySoC | Self::SecondarySoC
        )
    }

    /// Whether this role uses the single-byte, unclamped CBB layout.
    #[must_use]
    pub fn is_cbb(&self) -> bool {
        matches!(self, Self::CbbSoC)
    }
}

impl fmt::Display for CharacteristicRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Command => "command",
            Self::HibernationWake => "hibernation wake",
            Self::ScooterState => "scooter state",
            Self::HandlebarLock => "handlebar lock",
            Self::PowerState => "power state",
            Self::AuxSoC => "aux SoC",
            Self::CbbSoC => "CBB SoC",
            Self::CbbCharging => "CBB charging",
            Self::PrimarySoC => "primary SoC",
            Self::SecondarySoC => "secondary SoC",
        };
        f.write_str(name)
    }
}

/// Operating state reported by the scooter.
///
/// Only ever derived from the scooter state characteristic.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ScooterState {
    /// Awake, locked, ready for commands.
    Standby,
    /// Unlocked and powered.
    Unlocked,
    /// Moving.
    Riding,
    /// Parked with the kickstand down.
    Parked,
    /// Charging.
    Charging,
    /// Pairing with a key card or phone.
    Linking,
    /// Not reporting (also the state before any telemetry arrives).
    #[default]
    Disconnected,
    /// Going into hibernation.
    ShuttingDown,
    /// A state string outside the known vocabulary.
    Unknown(String),
}

impl ScooterState {
    /// Parse a trimmed state string, case-insensitively.
    ///
    /// Unrecognised text is kept verbatim in [`ScooterState::Unknown`].
    ///
    /// # Examples
    ///
    /// ```
    /// use unu_types::ScooterState;
    ///
    /// assert_eq!(ScooterState::from_text("Stand-By"), ScooterState::Standby);
    /// assert_eq!(ScooterState::from_text("foo"), ScooterState::Unknown("foo".into()));
    /// ```
    #[must_use]
    pub fn from_text(text: &str) -> Self {
        match text.to_lowercase().as_str() {
            "standby" | "stand-by" => Self::Standby,
            "unlocked" => Self::Unlocked,
            "riding" => Self::Riding,
            "parked" => Self::Parked,
            "charging" => Self::Charging,
            "linking" => Self::Linking,
            "disconnected" => Self::Disconnected,
            "shutting-down" => Self::ShuttingDown,
            _ => Self::Unknown(text.to_string()),
        }
    }

    /// Whether the scooter accepts commands without a hibernation wake.
    #[must_use]
    pub fn is_awake(&self) -> bool {
        matches!(
            self,
            Self::Standby
                | Self::Parked
                | Self::Unlocked
                | Self::Riding
                | Self::Charging
                | Self::Linking
        )
    }
}

impl fmt::Display for ScooterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Standby => write!(f, "Standby"),
            Self::Unlocked => write!(f, "Unlocked"),
            Self::Riding => write!(f, "Riding"),
            Self::Parked => write!(f, "Parked"),
            Self::Charging => write!(f, "Charging"),
            Self::Linking => write!(f, "Linking"),
            Self::Disconnected => write!(f, "Disconnected"),
            Self::ShuttingDown => write!(f, "Shutting Down"),
            Self::Unknown(raw) => write!(f, "{}", raw),
        }
    }
}

/// Handlebar lock sensor reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum LockState {
    /// Handlebar locked (or any value other than `unlocked`).
    #[default]
    Locked,
    /// Handlebar unlocked.
    Unlocked,
}

impl LockState {
    /// Whether the handlebar is locked.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        matches!(self, Self::Locked)
    }
}

impl fmt::Display for LockState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Locked => write!(f, "Locked"),
            Self::Unlocked => write!(f, "Unlocked"),
        }
    }
}

/// A decoded battery state of charge.
///
/// `percent` is clamped to 0-100 for every battery except the CBB, which
/// reports the raw byte value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BatteryReading {
    /// Which battery characteristic produced the reading.
    pub role: CharacteristicRole,
    /// State of charge.
    pub percent: u8,
    /// Whether `percent` is the unclamped CBB value.
    pub is_cbb: bool,
}

impl BatteryReading {
    /// Create a reading for a battery role.
    #[must_use]
    pub fn new(role: CharacteristicRole, percent: u8) -> Self {
        Self {
            role,
            percent,
            is_cbb: role.is_cbb(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_uuid_round_trip() {
        for role in CharacteristicRole::ALL {
            assert_eq!(CharacteristicRole::from_uuid(role.uuid()), Some(role));
        }
    }

    #[test]
    fn test_role_services() {
        assert_eq!(CharacteristicRole::Command.service(), uuids::COMMAND_SERVICE);
        assert_eq!(
            CharacteristicRole::HibernationWake.service(),
            uuids::COMMAND_SERVICE
        );
        assert_eq!(
            CharacteristicRole::CbbCharging.service(),
            uuids::CBB_SERVICE
        );
        assert_eq!(
            CharacteristicRole::SecondarySoC.service(),
            uuids::BATTERY_SERVICE
        );
    }

    #[test]
    fn test_telemetry_roles() {
        let telemetry: Vec<_> = CharacteristicRole::ALL
            .into_iter()
            .filter(CharacteristicRole::is_telemetry)
            .collect();
        assert_eq!(telemetry.len(), 8);
        assert!(!CharacteristicRole::Command.is_telemetry());
        assert!(!CharacteristicRole::HibernationWake.is_telemetry());
    }

    #[test]
    fn test_only_cbb_soc_is_cbb() {
        for role in CharacteristicRole::ALL {
            assert_eq!(role.is_cbb(), role == CharacteristicRole::CbbSoC);
        }
        assert!(!CharacteristicRole::CbbCharging.is_battery());
    }

    #[test]
    fn test_scooter_state_vocabulary() {
        assert_eq!(ScooterState::from_text("standby"), ScooterState::Standby);
        assert_eq!(ScooterState::from_text("STAND-BY"), ScooterState::Standby);
        assert_eq!(ScooterState::from_text("Parked"), ScooterState::Parked);
        assert_eq!(
            ScooterState::from_text("shutting-down"),
            ScooterState::ShuttingDown
        );
        assert_eq!(
            ScooterState::from_text("Hibernating"),
            ScooterState::Unknown("Hibernating".to_string())
        );
    }

    #[test]
    fn test_awake_states() {
        assert!(ScooterState::Standby.is_awake());
        assert!(ScooterState::Parked.is_awake());
        assert!(ScooterState::Linking.is_awake());
        assert!(!ScooterState::ShuttingDown.is_awake());
        assert!(!ScooterState::Disconnected.is_awake());
        assert!(!ScooterState::Unknown("hibernating".into()).is_awake());
    }

    #[test]
    fn test_defaults() {
        assert_eq!(ScooterState::default(), ScooterState::Disconnected);
        assert_eq!(LockState::default(), LockState::Locked);
    }

    #[test]
    fn test_battery_reading_flags_cbb() {
        assert!(BatteryReading::new(CharacteristicRole::CbbSoC, 200).is_cbb);
        assert!(!BatteryReading::new(CharacteristicRole::AuxSoC, 80).is_cbb);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&ScooterState::ShuttingDown).unwrap();
        assert_eq!(json, "\"shutting_down\"");
        let json = serde_json::to_string(&CharacteristicRole::CbbSoC).unwrap();
        assert_eq!(json, "\"cbb_soc\"");
    }
}
