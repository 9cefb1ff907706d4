//! Error types for telemetry decoding in unu-types.

use thiserror::Error;

/// Errors that can occur when decoding scooter telemetry.
///
/// This error type is platform-agnostic and does not include
/// BLE-specific errors (those belong in unu-core).
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum DecodeError {
    /// A fixed-width payload had the wrong length.
    #[error("Invalid payload length: expected {expected} bytes, got {actual}")]
    InvalidLength {
        /// Required number of bytes.
        expected: usize,
        /// Number of bytes received.
        actual: usize,
    },

    /// The payload was empty but at least one byte is required.
    #[error("Empty payload")]
    Empty,
}

/// Result type alias using unu-types' DecodeError type.
pub type DecodeResult<T> = std::result::Result<T, DecodeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_error_display() {
        let err = DecodeError::InvalidLength {
            expected: 4,
            actual: 3,
        };
        assert_eq!(
            err.to_string(),
            "Invalid payload length: expected 4 bytes, got 3"
        );
        assert_eq!(DecodeError::Empty.to_string(), "Empty payload");
    }
}
