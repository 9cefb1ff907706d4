//! Hardware tests for unu-core.
//!
//! These tests require a unu scooter in range and should be run with:
//! ```
//! cargo test --package unu-core --test hardware_tests -- --ignored --nocapture
//! ```
//!
//! Set `UNU_DEVICE_NAME` if the scooter advertises a different name.

use std::env;
use std::sync::Arc;
use std::time::Duration;

use unu_core::{
    BtleTransport, ConnectionConfig, ConnectionPhase, EventChannel, ManagerConfig, ScooterHandle,
    ScooterManager,
};

/// Default timeout for finding and connecting to the scooter.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(45);

fn device_name() -> String {
    env::var("UNU_DEVICE_NAME")
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| unu_core::DEVICE_NAME.to_string())
}

async fn connect() -> ScooterHandle {
    let channel = EventChannel::new();
    let transport = BtleTransport::new(channel.sink(), ConnectionConfig::default())
        .await
        .expect("no Bluetooth adapter");
    let config = ManagerConfig::default().device_name(device_name());
    let scooter = ScooterManager::spawn(Arc::new(transport), channel, config).unwrap();
    scooter.start_scanning().unwrap();
    scooter
        .wait_until(CONNECT_TIMEOUT, |s| s.is_connected())
        .await
        .expect("scooter not found");
    scooter
}

#[tokio::test]
#[ignore = "requires BLE hardware"]
async fn test_connect_and_read_state() {
    let scooter = connect().await;
    let snapshot = scooter
        .wait_until(Duration::from_secs(10), |s| s.last_update.is_some())
        .await
        .unwrap();
    println!("State: {}", snapshot.scooter_state);
    println!("Handlebar: {}", snapshot.lock_state);
    println!("Status: {}", snapshot.status);
    for battery in &snapshot.batteries {
        println!("  {}: {}%", battery.role, battery.percent);
    }
    scooter.shutdown().unwrap();
}

#[tokio::test]
#[ignore = "requires BLE hardware"]
async fn test_disconnect() {
    let scooter = connect().await;
    scooter.disconnect().unwrap();
    let snapshot = scooter
        .wait_until(Duration::from_secs(5), |s| {
            s.phase == ConnectionPhase::Disconnected
        })
        .await
        .unwrap();
    assert_eq!(snapshot.status, "Disconnected");
}

#[tokio::test]
#[ignore = "moves the handlebar lock; run deliberately"]
async fn test_lock() {
    let scooter = connect().await;
    match scooter.lock().await {
        Ok(()) => println!("Locked: {}", scooter.snapshot().status),
        Err(e) if e.is_recoverable() => println!("Lock needs a retry: {}", e),
        Err(e) => panic!("Lock failed: {}", e),
    }
    scooter.shutdown().unwrap();
}
