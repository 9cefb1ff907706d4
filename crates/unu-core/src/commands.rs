//! Text commands understood by the scooter.
//!
//! Commands are plain ASCII written with response to either the command
//! characteristic or, for `wakeup`, the hibernation characteristic.

use std::fmt;

use unu_types::CharacteristicRole;

/// Wake the scooter from hibernation. Written to the hibernation characteristic.
pub const WAKE_UP: &str = "wakeup";

/// Lock the handlebar and power down.
pub const STATE_LOCK: &str = "scooter:state lock";

/// Unlock the handlebar and power up.
pub const STATE_UNLOCK: &str = "scooter:state unlock";

/// Open the seat box.
pub const SEATBOX_OPEN: &str = "scooter:seatbox open";

/// Prefix for blinker commands, followed by the blinker state.
pub const BLINKER_PREFIX: &str = "scooter:blinker ";

/// Blinker state that turns both indicators on (hazard lights).
pub const BLINKER_BOTH: &str = "both";

/// Blinker state that turns the indicators off.
pub const BLINKER_OFF: &str = "off";

/// A single command write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `wakeup`
    WakeUp,
    /// `scooter:state lock`
    Lock,
    /// `scooter:state unlock`
    Unlock,
    /// `scooter:seatbox open`
    OpenSeat,
    /// `scooter:blinker <state>`; the state is passed through unvalidated.
    Blinker(String),
}

impl Command {
    /// The characteristic this command is written to.
    pub fn role(&self) -> CharacteristicRole {
        match self {
            Self::WakeUp => CharacteristicRole::HibernationWake,
            _ => CharacteristicRole::Command,
        }
    }

    /// The ASCII payload.
    pub fn payload(&self) -> Vec<u8> {
        self.to_string().into_bytes()
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WakeUp => f.write_str(WAKE_UP),
            Self::Lock => f.write_str(STATE_LOCK),
            Self::Unlock => f.write_str(STATE_UNLOCK),
            Self::OpenSeat => f.write_str(SEATBOX_OPEN),
            Self::Blinker(state) => write!(f, "{BLINKER_PREFIX}{state}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_payloads() {
        assert_eq!(Command::WakeUp.payload(), b"wakeup");
        assert_eq!(Command::Lock.payload(), b"scooter:state lock");
        assert_eq!(Command::Unlock.payload(), b"scooter:state unlock");
        assert_eq!(Command::OpenSeat.payload(), b"scooter:seatbox open");
        assert_eq!(
            Command::Blinker("left".into()).payload(),
            b"scooter:blinker left"
        );
        assert_eq!(
            Command::Blinker(BLINKER_BOTH.into()).to_string(),
            "scooter:blinker both"
        );
    }

    #[test]
    fn test_command_roles() {
        assert_eq!(Command::WakeUp.role(), CharacteristicRole::HibernationWake);
        assert_eq!(Command::Lock.role(), CharacteristicRole::Command);
        assert_eq!(
            Command::Blinker(BLINKER_OFF.into()).role(),
            CharacteristicRole::Command
        );
    }
}
