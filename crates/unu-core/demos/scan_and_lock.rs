//! Example: Find the Scooter and Lock It
//!
//! This example scans for a unu scooter, connects, prints its telemetry and
//! locks it. A failed lock is retried once with `restart_and_lock`.
//!
//! Run with: `cargo run --example scan_and_lock -- [DEVICE_NAME]`

use std::env;
use std::sync::Arc;
use std::time::Duration;

use unu_core::{BtleTransport, ConnectionConfig, EventChannel, ManagerConfig, ScooterManager};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    let name = env::args()
        .nth(1)
        .unwrap_or_else(|| unu_core::DEVICE_NAME.to_string());
    println!("Looking for {:?}...", name);

    let channel = EventChannel::new();
    let transport = BtleTransport::new(channel.sink(), ConnectionConfig::default()).await?;
    let config = ManagerConfig::default().device_name(name);
    let scooter = ScooterManager::spawn(Arc::new(transport), channel, config)?;

    scooter.start_scanning()?;
    scooter
        .wait_until(Duration::from_secs(35), |s| s.is_connected())
        .await?;
    println!("Connected!");

    let snapshot = scooter
        .wait_until(Duration::from_secs(10), |s| s.last_update.is_some())
        .await?;
    println!();
    println!("Scooter:   {}", snapshot.scooter_state);
    println!("Handlebar: {}", snapshot.lock_state);
    for battery in &snapshot.batteries {
        println!("  {:<16} {:>3}%", battery.role.to_string(), battery.percent);
    }
    println!();

    println!("Locking...");
    match scooter.lock().await {
        Ok(()) => println!("Locked."),
        Err(e) if e.is_recoverable() => {
            println!("{e}; restarting and trying again...");
            scooter.restart_and_lock().await?;
            println!("Locked.");
        }
        Err(e) => return Err(e.into()),
    }

    println!("Status: {}", scooter.snapshot().status);
    scooter.shutdown()?;
    Ok(())
}
