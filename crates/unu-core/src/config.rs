//! Configuration for the scooter manager and the btleplug transport.

use std::time::Duration;

use unu_types::DEVICE_NAME;

use crate::error::{Error, Result};
use crate::reconnect::ReconnectOptions;

/// How long a scan runs before giving up.
pub const DEFAULT_SCAN_TIMEOUT: Duration = Duration::from_secs(30);

/// Interval of the connection supervision tick.
pub const DEFAULT_SUPERVISION_INTERVAL: Duration = Duration::from_secs(5);

/// Default timeout for BLE characteristic read operations.
const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Default timeout for BLE characteristic write operations.
const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Default timeout for BLE connection operations.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Default timeout for service discovery.
const DEFAULT_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration for BLE operation timeouts.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use unu_core::ConnectionConfig;
///
/// let config = ConnectionConfig::default()
///     .connection_timeout(Duration::from_secs(20))
///     .write_timeout(Duration::from_secs(5));
/// assert_eq!(config.write_timeout, Duration::from_secs(5));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Timeout for establishing a BLE connection.
    pub connection_timeout: Duration,
    /// Timeout for BLE read operations.
    pub read_timeout: Duration,
    /// Timeout for acknowledged writes.
    pub write_timeout: Duration,
    /// Timeout for service discovery after connection.
    pub discovery_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connection_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            discovery_timeout: DEFAULT_DISCOVERY_TIMEOUT,
        }
    }
}

impl ConnectionConfig {
    /// Create a new connection config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the connection timeout.
    #[must_use]
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Set the read timeout.
    #[must_use]
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Set the write timeout.
    #[must_use]
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Set the service discovery timeout.
    #[must_use]
    pub fn discovery_timeout(mut self, timeout: Duration) -> Self {
        self.discovery_timeout = timeout;
        self
    }
}

/// How the manager looks for the scooter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanStrategy {
    /// One unfiltered scan matching the advertised name only.
    #[default]
    NameOnly,
    /// Name-only at first, then restart the scan filtered by the command
    /// service and also accept peripherals advertising that service.
    Phased {
        /// When to switch to the service-filtered scan.
        switch_after: Duration,
    },
}

impl ScanStrategy {
    /// Phased scan switching after five seconds.
    pub fn phased() -> Self {
        Self::Phased {
            switch_after: Duration::from_secs(5),
        }
    }
}

/// Timings of the wake / command / verify protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandTimings {
    /// Interval between scooter state reads while waiting for standby.
    pub wake_poll_interval: Duration,
    /// How long to wait for standby.
    pub wake_timeout: Duration,
    /// Delay between a state command and the handlebar read.
    pub verify_delay: Duration,
    /// Delay after the handlebar read before checking the lock state.
    pub settle_delay: Duration,
}

impl Default for CommandTimings {
    fn default() -> Self {
        Self {
            wake_poll_interval: Duration::from_secs(2),
            wake_timeout: Duration::from_secs(30),
            verify_delay: Duration::from_secs(2),
            settle_delay: Duration::from_secs(1),
        }
    }
}

/// Configuration for [`crate::ScooterManager`].
#[derive(Debug, Clone, PartialEq)]
pub struct ManagerConfig {
    /// Advertised name to connect to (exact match).
    pub device_name: String,
    /// Scan lifetime.
    pub scan_timeout: Duration,
    /// Scan strategy.
    pub scan_strategy: ScanStrategy,
    /// Connection supervision interval.
    pub supervision_interval: Duration,
    /// Reconnect policy after link loss.
    pub reconnect: ReconnectOptions,
    /// BLE operation timeouts.
    pub connection: ConnectionConfig,
    /// Command protocol timings.
    pub commands: CommandTimings,
    /// Event channel capacity.
    pub event_capacity: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            device_name: DEVICE_NAME.to_string(),
            scan_timeout: DEFAULT_SCAN_TIMEOUT,
            scan_strategy: ScanStrategy::default(),
            supervision_interval: DEFAULT_SUPERVISION_INTERVAL,
            reconnect: ReconnectOptions::default(),
            connection: ConnectionConfig::default(),
            commands: CommandTimings::default(),
            event_capacity: 100,
        }
    }
}

impl ManagerConfig {
    /// Create a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the advertised name to match.
    #[must_use]
    pub fn device_name(mut self, name: impl Into<String>) -> Self {
        self.device_name = name.into();
        self
    }

    /// Set the scan timeout.
    #[must_use]
    pub fn scan_timeout(mut self, timeout: Duration) -> Self {
        self.scan_timeout = timeout;
        self
    }

    /// Set the scan strategy.
    #[must_use]
    pub fn scan_strategy(mut self, strategy: ScanStrategy) -> Self {
        self.scan_strategy = strategy;
        self
    }

    /// Set the supervision interval.
    #[must_use]
    pub fn supervision_interval(mut self, interval: Duration) -> Self {
        self.supervision_interval = interval;
        self
    }

    /// Set the reconnect policy.
    #[must_use]
    pub fn reconnect(mut self, options: ReconnectOptions) -> Self {
        self.reconnect = options;
        self
    }

    /// Set the BLE timeouts.
    #[must_use]
    pub fn connection(mut self, config: ConnectionConfig) -> Self {
        self.connection = config;
        self
    }

    /// Set the command timings.
    #[must_use]
    pub fn commands(mut self, timings: CommandTimings) -> Self {
        self.commands = timings;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.device_name.is_empty() {
            return Err(Error::invalid_config("device_name must not be empty"));
        }
        if self.scan_timeout.is_zero() {
            return Err(Error::invalid_config("scan_timeout must be > 0"));
        }
        if self.supervision_interval.is_zero() {
            return Err(Error::invalid_config("supervision_interval must be > 0"));
        }
        if let ScanStrategy::Phased { switch_after } = self.scan_strategy
            && switch_after >= self.scan_timeout
        {
            return Err(Error::invalid_config(
                "phased scan must switch before scan_timeout",
            ));
        }
        if self.commands.wake_poll_interval.is_zero() {
            return Err(Error::invalid_config("wake_poll_interval must be > 0"));
        }
        if self.event_capacity == 0 {
            return Err(Error::invalid_config("event_capacity must be > 0"));
        }
        self.reconnect.validate()
    }
}
