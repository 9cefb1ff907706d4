//! [`Transport`] over btleplug.
//!
//! Adapter events are pumped into the manager's event sink by a background
//! task. Slow requests (connect, service discovery, reads) are spawned so the
//! manager never waits on the radio; each one is bounded by the matching
//! [`ConnectionConfig`] timeout and reports its outcome as a [`BleEvent`].

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use btleplug::api::{
    Central, CentralEvent, CentralState, Characteristic, Manager as _, Peripheral as _,
    ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use bytes::Bytes;
use futures::StreamExt;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::config::ConnectionConfig;
use crate::error::{Error, Result};
use crate::transport::{
    AdapterState, BleEvent, CharacteristicHandle, EventSink, PeripheralHandle, ScanRequest,
    Transport,
};
use crate::util::{payload_preview, peripheral_handle};

type PeripheralMap = Arc<RwLock<HashMap<String, Peripheral>>>;
type CharacteristicCache = Arc<RwLock<HashMap<Uuid, Characteristic>>>;

fn adapter_state_from(state: CentralState) -> AdapterState {
    #[allow(unreachable_patterns)]
    match state {
        CentralState::PoweredOn => AdapterState::PoweredOn,
        CentralState::PoweredOff => AdapterState::PoweredOff,
        _ => AdapterState::Unknown,
    }
}

/// Get the first available Bluetooth adapter.
pub async fn get_adapter() -> Result<Adapter> {
    let manager = Manager::new().await?;
    let adapters = manager.adapters().await?;
    adapters.into_iter().next().ok_or(Error::NoAdapter)
}

/// A btleplug-backed transport.
pub struct BtleTransport {
    adapter: Adapter,
    sink: EventSink,
    config: ConnectionConfig,
    peripherals: PeripheralMap,
    /// Characteristics of the connected peripheral, by UUID.
    characteristics: CharacteristicCache,
    central_events: JoinHandle<()>,
    notifications: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl std::fmt::Debug for BtleTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BtleTransport")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl BtleTransport {
    /// Open the first Bluetooth adapter and start forwarding its events.
    ///
    /// # Errors
    ///
    /// [`Error::NoAdapter`] without an adapter, or the btleplug error if the
    /// adapter's event stream cannot be opened.
    #[tracing::instrument(level = "info", skip_all)]
    pub async fn new(sink: EventSink, config: ConnectionConfig) -> Result<Self> {
        let adapter = get_adapter().await?;
        if let Ok(info) = adapter.adapter_info().await {
            info!("Using adapter {}", info);
        }
        let peripherals: PeripheralMap = Arc::default();
        let central_events = tokio::spawn(pump_central_events(
            adapter.clone(),
            sink.clone(),
            Arc::clone(&peripherals),
        ));
        Ok(Self {
            adapter,
            sink,
            config,
            peripherals,
            characteristics: Arc::default(),
            central_events,
            notifications: Arc::default(),
        })
    }

    async fn peripheral(&self, handle: &PeripheralHandle) -> Result<Peripheral> {
        self.peripherals
            .read()
            .await
            .get(&handle.id)
            .cloned()
            .ok_or_else(|| Error::connection_failed(Some(handle.id.clone()), "unknown peripheral"))
    }

    async fn characteristic(&self, handle: &CharacteristicHandle) -> Result<Characteristic> {
        self.characteristics
            .read()
            .await
            .get(&handle.uuid)
            .cloned()
            .ok_or_else(|| {
                Error::Discovery(crate::resolver::DiscoveryError::CharacteristicNotFound {
                    service: handle.service,
                    characteristic: handle.uuid,
                })
            })
    }

    async fn stop_notifications(&self) {
        if let Some(task) = self.notifications.lock().await.take() {
            task.abort();
        }
    }
}

impl Drop for BtleTransport {
    fn drop(&mut self) {
        self.central_events.abort();
        if let Ok(mut guard) = self.notifications.try_lock()
            && let Some(task) = guard.take()
        {
            task.abort();
        }
    }
}

async fn pump_central_events(adapter: Adapter, sink: EventSink, peripherals: PeripheralMap) {
    let mut events = match adapter.events().await {
        Ok(events) => events,
        Err(e) => {
            warn!("Failed to open adapter event stream: {}", e);
            return;
        }
    };

    while let Some(event) = events.next().await {
        if sink.is_closed() {
            break;
        }
        match event {
            CentralEvent::DeviceDiscovered(id)
            | CentralEvent::DeviceUpdated(id)
            | CentralEvent::ServicesAdvertisement { id, .. } => {
                let Ok(peripheral) = adapter.peripheral(&id).await else {
                    continue;
                };
                let properties = peripheral.properties().await.ok().flatten();
                let handle = peripheral_handle(&id, properties.as_ref());
                let rssi = properties.as_ref().and_then(|p| p.rssi);
                let services = properties.map(|p| p.services).unwrap_or_default();
                peripherals
                    .write()
                    .await
                    .insert(handle.id.clone(), peripheral);
                sink.send(BleEvent::PeripheralDiscovered {
                    peripheral: handle,
                    rssi,
                    services,
                });
            }
            CentralEvent::DeviceDisconnected(id) => {
                let Ok(peripheral) = adapter.peripheral(&id).await else {
                    continue;
                };
                let properties = peripheral.properties().await.ok().flatten();
                sink.send(BleEvent::Disconnected {
                    peripheral: peripheral_handle(&id, properties.as_ref()),
                    error: None,
                });
            }
            CentralEvent::StateUpdate(state) => {
                sink.send(BleEvent::AdapterStateChanged(adapter_state_from(state)));
            }
            other => trace!("Ignoring central event {:?}", other),
        }
    }
    debug!("Adapter event stream ended");
}

async fn pump_notifications(peripheral: Peripheral, sink: EventSink) {
    let mut stream = match peripheral.notifications().await {
        Ok(stream) => stream,
        Err(e) => {
            warn!("Failed to open notification stream: {}", e);
            return;
        }
    };
    while let Some(notification) = stream.next().await {
        sink.send(BleEvent::ValueUpdated {
            characteristic: notification.uuid,
            value: Bytes::from(notification.value),
        });
    }
    debug!("Notification stream ended");
}

#[async_trait]
impl Transport for BtleTransport {
    async fn adapter_state(&self) -> AdapterState {
        match self.adapter.adapter_state().await {
            Ok(state) => adapter_state_from(state),
            Err(e) => {
                warn!("Failed to query adapter state: {}", e);
                AdapterState::Unknown
            }
        }
    }

    async fn start_scan(&self, request: ScanRequest) -> Result<()> {
        debug!("Starting scan (services: {:?})", request.services);
        self.adapter
            .start_scan(ScanFilter {
                services: request.services,
            })
            .await?;
        Ok(())
    }

    async fn stop_scan(&self) -> Result<()> {
        self.adapter.stop_scan().await?;
        Ok(())
    }

    #[tracing::instrument(level = "info", skip_all, fields(device = %handle.id))]
    async fn connect(&self, handle: &PeripheralHandle) -> Result<()> {
        let peripheral = self.peripheral(handle).await?;
        let sink = self.sink.clone();
        let handle = handle.clone();
        let connect_timeout = self.config.connection_timeout;
        let notifications = Arc::clone(&self.notifications);

        tokio::spawn(async move {
            info!("Connecting...");
            match timeout(connect_timeout, peripheral.connect()).await {
                Ok(Ok(())) => {
                    let task = tokio::spawn(pump_notifications(peripheral, sink.clone()));
                    if let Some(old) = notifications.lock().await.replace(task) {
                        old.abort();
                    }
                    sink.send(BleEvent::Connected { peripheral: handle });
                }
                Ok(Err(e)) => sink.send(BleEvent::ConnectFailed {
                    peripheral: handle,
                    reason: e.to_string(),
                }),
                Err(_) => sink.send(BleEvent::ConnectFailed {
                    peripheral: handle,
                    reason: Error::timeout("connect", connect_timeout).to_string(),
                }),
            }
        });
        Ok(())
    }

    async fn cancel_connection(&self, handle: &PeripheralHandle) -> Result<()> {
        self.stop_notifications().await;
        self.characteristics.write().await.clear();
        let peripheral = self.peripheral(handle).await?;
        peripheral.disconnect().await?;
        Ok(())
    }

    async fn is_connected(&self, handle: &PeripheralHandle) -> bool {
        match self.peripheral(handle).await {
            Ok(peripheral) => peripheral.is_connected().await.unwrap_or(false),
            Err(_) => false,
        }
    }

    async fn discover_services(&self, handle: &PeripheralHandle, services: &[Uuid]) -> Result<()> {
        let peripheral = self.peripheral(handle).await?;
        let sink = self.sink.clone();
        let handle = handle.clone();
        let wanted = services.to_vec();
        let cache = Arc::clone(&self.characteristics);
        let discovery_timeout = self.config.discovery_timeout;

        tokio::spawn(async move {
            let result = match timeout(discovery_timeout, peripheral.discover_services()).await {
                Ok(Ok(())) => {
                    let found = peripheral.services();
                    let mut cache = cache.write().await;
                    cache.clear();
                    for service in &found {
                        for characteristic in &service.characteristics {
                            cache.insert(characteristic.uuid, characteristic.clone());
                        }
                    }
                    debug!(
                        "Found {} services, cached {} characteristics",
                        found.len(),
                        cache.len()
                    );
                    Ok(found
                        .iter()
                        .map(|s| s.uuid)
                        .filter(|uuid| wanted.is_empty() || wanted.contains(uuid))
                        .collect())
                }
                Ok(Err(e)) => Err(e.to_string()),
                Err(_) => Err(Error::timeout("discover services", discovery_timeout).to_string()),
            };
            sink.send(BleEvent::ServicesDiscovered {
                peripheral: handle,
                result,
            });
        });
        Ok(())
    }

    async fn discover_characteristics(
        &self,
        handle: &PeripheralHandle,
        service: Uuid,
        characteristics: &[Uuid],
    ) -> Result<()> {
        // btleplug resolves characteristics together with services.
        let peripheral = self.peripheral(handle).await?;
        let result = peripheral
            .services()
            .into_iter()
            .find(|s| s.uuid == service)
            .map(|s| {
                s.characteristics
                    .iter()
                    .map(|c| c.uuid)
                    .filter(|uuid| characteristics.is_empty() || characteristics.contains(uuid))
                    .collect()
            })
            .ok_or_else(|| format!("service {service} not discovered"));
        self.sink.send(BleEvent::CharacteristicsDiscovered {
            peripheral: handle.clone(),
            service,
            result,
        });
        Ok(())
    }

    async fn read(&self, handle: &PeripheralHandle, characteristic: &CharacteristicHandle) -> Result<()> {
        let peripheral = self.peripheral(handle).await?;
        let target = self.characteristic(characteristic).await?;
        let sink = self.sink.clone();
        let read_timeout = self.config.read_timeout;

        tokio::spawn(async move {
            match timeout(read_timeout, peripheral.read(&target)).await {
                Ok(Ok(value)) => sink.send(BleEvent::ValueUpdated {
                    characteristic: target.uuid,
                    value: Bytes::from(value),
                }),
                Ok(Err(e)) => warn!("Read of {} failed: {}", target.uuid, e),
                Err(_) => warn!("Read of {} timed out after {:?}", target.uuid, read_timeout),
            }
        });
        Ok(())
    }

    async fn subscribe(
        &self,
        handle: &PeripheralHandle,
        characteristic: &CharacteristicHandle,
    ) -> Result<()> {
        let peripheral = self.peripheral(handle).await?;
        let target = self.characteristic(characteristic).await?;
        timeout(self.config.read_timeout, peripheral.subscribe(&target))
            .await
            .map_err(|_| Error::timeout(format!("subscribe {}", target.uuid), self.config.read_timeout))??;
        Ok(())
    }

    async fn write(
        &self,
        handle: &PeripheralHandle,
        characteristic: &CharacteristicHandle,
        payload: &[u8],
    ) -> Result<()> {
        let peripheral = self.peripheral(handle).await?;
        let target = self.characteristic(characteristic).await?;
        debug!("Writing {:?} to {}", payload_preview(payload), target.uuid);
        timeout(
            self.config.write_timeout,
            peripheral.write(&target, payload, WriteType::WithResponse),
        )
        .await
        .map_err(|_| Error::Timeout {
            operation: format!("write characteristic {}", target.uuid),
            duration: self.config.write_timeout,
        })??;
        Ok(())
    }
}
