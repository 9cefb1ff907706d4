//! Error types for unu-core.
//!
//! This module defines every error that can surface while talking to a unu
//! scooter over Bluetooth Low Energy.
//!
//! # Error Recovery
//!
//! | Error Type | Strategy |
//! |------------|----------|
//! | [`Error::WakeTimeout`] | Retry via `restart_and_lock()` |
//! | [`Error::LockVerificationFailed`] | Move the handlebar, then retry via `restart_and_lock()` |
//! | [`Error::CommandWriteFailed`] | Retry once the link is back |
//! | [`Error::NotConnected`] / [`Error::CharacteristicUnavailable`] | Wait for `Connected` |
//! | [`Error::CommandInProgress`] | Wait for the running sequence or `abort()` it |
//! | [`Error::Discovery`] / [`Error::Decode`] | Do not retry, firmware mismatch |
//! | [`Error::InvalidConfig`] | Fix configuration and restart |
//!
//! Link loss and connect failures are handled by the reconnect policy inside
//! the manager and only show up in the status string and event stream.

use std::time::Duration;

use thiserror::Error;
use unu_types::{CharacteristicRole, DecodeError};

use crate::resolver::DiscoveryError;

/// Errors that can occur when driving a unu scooter.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Bluetooth Low Energy error.
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),

    /// No Bluetooth adapter is available.
    #[error("No Bluetooth adapter available")]
    NoAdapter,

    /// GATT layout resolution failed.
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    /// A characteristic payload could not be decoded.
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// The scooter did not reach standby after a wake-up request.
    #[error("Could not wake scooter to standby")]
    WakeTimeout,

    /// The handlebar stayed unlocked after a lock command.
    #[error("Lock verification failed: {message}")]
    LockVerificationFailed {
        /// User-facing explanation.
        message: String,
    },

    /// An acknowledged write was rejected or never acknowledged.
    #[error("Write to {role} failed: {reason}")]
    CommandWriteFailed {
        /// The characteristic that was written.
        role: CharacteristicRole,
        /// The reason reported by the transport.
        reason: String,
    },

    /// Connecting to the scooter failed.
    #[error("Connection failed: {reason}")]
    ConnectionFailed {
        /// The peripheral that failed to connect, if known.
        device_id: Option<String>,
        /// The reason reported by the transport.
        reason: String,
    },

    /// The link dropped while an operation depended on it.
    #[error("Connection to scooter lost")]
    LinkLoss,

    /// Operation attempted while not connected to the scooter.
    #[error("Not connected to scooter")]
    NotConnected,

    /// The characteristic for this role has not been resolved on the current connection.
    #[error("Characteristic unavailable: {0}")]
    CharacteristicUnavailable(CharacteristicRole),

    /// Another lock/unlock sequence is already running.
    #[error("A command sequence is already in progress")]
    CommandInProgress,

    /// Operation was cancelled.
    #[error("Operation cancelled")]
    Cancelled,

    /// Operation timed out.
    #[error("Operation '{operation}' timed out after {duration:?}")]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// The timeout duration.
        duration: Duration,
    },

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The manager task has stopped.
    #[error("Scooter manager is not running")]
    ManagerClosed,
}

impl Error {
    /// Create a timeout error with operation context.
    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    /// Create a configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    /// Create a write failure for the given role.
    pub fn write_failed(role: CharacteristicRole, reason: impl Into<String>) -> Self {
        Self::CommandWriteFailed {
            role,
            reason: reason.into(),
        }
    }

    /// Create a connection failure with a string reason.
    pub fn connection_failed(device_id: Option<String>, reason: impl Into<String>) -> Self {
        Self::ConnectionFailed {
            device_id,
            reason: reason.into(),
        }
    }

    /// Whether the scooter may accept the command after a restart.
    ///
    /// These are the failures `restart_and_lock()` exists for.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::WakeTimeout | Self::LockVerificationFailed { .. })
    }
}

/// Result type alias using unu-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;
