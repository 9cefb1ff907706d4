//! Platform-agnostic types for unu electric scooters.
//!
//! This crate holds everything about the scooter's BLE profile that does not
//! need a Bluetooth stack, so it can be shared by the native client
//! (unu-core) and any other front end.
//!
//! # Features
//!
//! - GATT service and characteristic UUIDs
//! - Characteristic roles and their service layout
//! - Scooter, lock and battery types
//! - Telemetry decoding for every characteristic
//!
//! # Example
//!
//! ```
//! use unu_types::{CharacteristicRole, ScooterState, decode};
//!
//! let state = decode::decode_scooter_state(b"stand-by\0");
//! assert_eq!(state, ScooterState::Standby);
//! assert!(state.is_awake());
//!
//! let role = CharacteristicRole::PrimarySoC;
//! assert_eq!(decode::decode_soc(&[87, 0, 0, 0], role.is_cbb()), Ok(87));
//! ```

pub mod decode;
pub mod error;
pub mod types;
pub mod uuid;

pub use error::{DecodeError, DecodeResult};
pub use types::{BatteryReading, CharacteristicRole, LockState, ScooterState};
pub use uuid as uuids;

/// Advertised name of the scooter's BLE peripheral.
pub const DEVICE_NAME: &str = "unu Scooter";
