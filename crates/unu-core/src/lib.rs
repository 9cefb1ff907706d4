//! Bluetooth LE client for unu electric scooters.
//!
//! This crate keeps a single connection to a unu scooter alive, publishes its
//! telemetry, and runs the lock and unlock sequences the scooter expects.
//!
//! # Features
//!
//! - **Discovery**: scan for the scooter by advertised name, optionally
//!   falling back to its command service
//! - **Connection lifecycle**: supervision and automatic reconnect after link loss
//! - **Telemetry**: scooter state, handlebar lock, battery charge, CBB charging
//! - **Commands**: wake from hibernation, lock with verification, unlock,
//!   seat box, blinkers and hazard lights
//! - **Testing**: a [`MockTransport`] that simulates the scooter
//!
//! # Architecture
//!
//! A [`ScooterManager`] task owns all connection state and talks to the radio
//! through a [`Transport`]. Callers hold a cloneable [`ScooterHandle`], watch
//! [`ScooterSnapshot`]s and subscribe to [`ScooterEvent`]s.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use unu_core::{BtleTransport, ConnectionConfig, EventChannel, ManagerConfig, ScooterManager};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let channel = EventChannel::new();
//!     let transport = BtleTransport::new(channel.sink(), ConnectionConfig::default()).await?;
//!     let scooter = ScooterManager::spawn(Arc::new(transport), channel, ManagerConfig::default())?;
//!
//!     scooter.start_scanning()?;
//!     scooter
//!         .wait_until(Duration::from_secs(30), |s| s.is_connected())
//!         .await?;
//!
//!     scooter.lock().await?;
//!     println!("{}", scooter.snapshot().status);
//!     Ok(())
//! }
//! ```

pub mod btle;
pub mod commands;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod manager;
pub mod mock;
pub mod reconnect;
pub mod resolver;
pub mod store;
pub mod transport;
pub mod util;

pub use unu_types::types;
pub use unu_types::uuid;
pub use unu_types::{BatteryReading, CharacteristicRole, DEVICE_NAME, LockState, ScooterState};

pub use btle::BtleTransport;
pub use commands::Command;
pub use config::{CommandTimings, ConnectionConfig, ManagerConfig, ScanStrategy};
pub use error::{Error, Result};
pub use events::{DisconnectReason, EventDispatcher, EventReceiver, EventSender, ScooterEvent};
pub use manager::{ScooterHandle, ScooterManager};
pub use mock::{MockTransport, TransportCall};
pub use reconnect::ReconnectOptions;
pub use resolver::{DiscoveryError, RoleTable};
pub use store::{ConnectionPhase, ScooterSnapshot, ScooterStore};
pub use transport::{
    AdapterState, BleEvent, CharacteristicHandle, EventChannel, EventSink, PeripheralHandle,
    ScanRequest, Transport,
};
