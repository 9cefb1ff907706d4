//! Telemetry decoding for unu scooter characteristics.
//!
//! Every function here is pure: raw characteristic bytes in, typed value out.
//! Text characteristics are ASCII; battery characteristics are either a single
//! byte (CBB) or a little-endian `u32`.

use bytes::Buf;

use crate::error::{DecodeError, DecodeResult};
use crate::types::{LockState, ScooterState};

/// Payload size of the 4-byte state-of-charge characteristics.
pub const SOC_PAYLOAD_BYTES: usize = 4;

/// Upper bound applied to non-CBB state of charge values.
pub const MAX_PERCENT: u32 = 100;

/// Decode bytes as ASCII text.
///
/// Payloads containing any non-ASCII byte decode to an empty string.
pub fn ascii_text(bytes: &[u8]) -> String {
    if bytes.is_ascii() {
        bytes.iter().map(|&b| char::from(b)).collect()
    } else {
        String::new()
    }
}

fn trim_text(text: &str) -> &str {
    text.trim_matches(|c: char| c.is_whitespace() || c.is_control())
}

/// Decode the handlebar lock sensor.
///
/// Only the exact (case-sensitive) text `unlocked` means unlocked; anything
/// else, including an empty payload, reads as locked.
///
/// # Examples
///
/// ```
/// use unu_types::{LockState, decode::decode_lock_state};
///
/// assert_eq!(decode_lock_state(b"unlocked\0"), LockState::Unlocked);
/// assert_eq!(decode_lock_state(b"UNLOCKED"), LockState::Locked);
/// ```
pub fn decode_lock_state(bytes: &[u8]) -> LockState {
    if trim_text(&ascii_text(bytes)) == "unlocked" {
        LockState::Unlocked
    } else {
        LockState::Locked
    }
}

/// Decode the scooter state characteristic.
pub fn decode_scooter_state(bytes: &[u8]) -> ScooterState {
    ScooterState::from_text(trim_text(&ascii_text(bytes)))
}

/// Decode a battery state of charge.
///
/// CBB payloads use the first byte as-is (0-255, not clamped). All other
/// batteries send exactly four bytes, a little-endian `u32` clamped to 0-100.
///
/// # Errors
///
/// Returns [`DecodeError::Empty`] for an empty CBB payload and
/// [`DecodeError::InvalidLength`] for a non-CBB payload that is not four bytes.
///
/// # Examples
///
/// ```
/// use unu_types::decode::decode_soc;
///
/// assert_eq!(decode_soc(&[100, 0, 0, 0], false), Ok(100));
/// assert_eq!(decode_soc(&[0, 1, 0, 0], false), Ok(100));
/// assert_eq!(decode_soc(&[200], true), Ok(200));
/// assert!(decode_soc(&[1, 2, 3], false).is_err());
/// ```
pub fn decode_soc(bytes: &[u8], is_cbb: bool) -> DecodeResult<u8> {
    if is_cbb {
        return bytes.first().copied().ok_or(DecodeError::Empty);
    }

    if bytes.len() != SOC_PAYLOAD_BYTES {
        return Err(DecodeError::InvalidLength {
            expected: SOC_PAYLOAD_BYTES,
            actual: bytes.len(),
        });
    }

    let mut buf = bytes;
    let raw = buf.get_u32_le();
    // Clamped to MAX_PERCENT so the cast cannot truncate.
    Ok(raw.min(MAX_PERCENT) as u8)
}

/// Decode the CBB charging characteristic.
///
/// Only control characters are trimmed here, so surrounding spaces make the
/// flag false.
pub fn decode_charging_flag(bytes: &[u8]) -> bool {
    ascii_text(bytes).trim_matches(|c: char| c.is_control()) == "charging"
}

/// Decode the power state characteristic into its trimmed text.
pub fn decode_power_state(bytes: &[u8]) -> String {
    trim_text(&ascii_text(bytes)).to_string()
}


/// Property-based tests for the telemetry decoder.
#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Four-byte payloads always decode to the clamped little-endian value.
        #[test]
        fn soc_is_clamped_le_u32(v: u32) {
            let decoded = decode_soc(&v.to_le_bytes(), false).unwrap();
            prop_assert_eq!(u32::from(decoded), v.min(100));
        }

        /// Any other length is rejected.
        #[test]
        fn soc_rejects_other_lengths(data in proptest::collection::vec(any::<u8>(), 0..16)) {
            prop_assume!(data.len() != 4);
            prop_assert!(decode_soc(&data, false).is_err());
        }

        /// CBB payloads report the first byte unchanged.
        #[test]
        fn cbb_soc_is_first_byte(data in proptest::collection::vec(any::<u8>(), 1..8)) {
            prop_assert_eq!(decode_soc(&data, true).unwrap(), data[0]);
        }

        /// Text decoders never panic on arbitrary input.
        #[test]
        fn text_decoders_never_panic(data: Vec<u8>) {
            let _ = decode_lock_state(&data);
            let _ = decode_scooter_state(&data);
            let _ = decode_charging_flag(&data);
            let _ = decode_power_state(&data);
        }
    }
}
