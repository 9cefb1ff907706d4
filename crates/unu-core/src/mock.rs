//! Mock transport for testing.
//!
//! [`MockTransport`] plays the part of a Bluetooth stack with a single unu
//! scooter in range. It answers every request immediately through its event
//! sink, records each call, and lets tests steer the scooter: advertised name,
//! characteristic values, failures, latency and link drops.
//!
//! # Features
//!
//! - **Call log**: every request is recorded as a [`TransportCall`]
//! - **Characteristic values**: reads report the stored value for the UUID
//! - **Write reactions**: a write can update another characteristic, the way
//!   the scooter reports `locked` after `scooter:state lock`
//! - **Failure injection**: failing connects, writes and discovery
//! - **Latency simulation**: delay write acknowledgements
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use unu_core::{EventChannel, ManagerConfig, MockTransport, ScooterManager};
//!
//! #[tokio::main]
//! async fn main() {
//!     let channel = EventChannel::new();
//!     let mock = Arc::new(MockTransport::new(channel.sink()));
//!     let scooter = ScooterManager::spawn(mock.clone(), channel, ManagerConfig::default()).unwrap();
//!
//!     scooter.start_scanning().unwrap();
//!     mock.advertise().await;
//! }
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::RwLock;
use unu_types::uuid as uuids;
use unu_types::{CharacteristicRole, DEVICE_NAME};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::resolver::service_spec;
use crate::transport::{
    AdapterState, BleEvent, CharacteristicHandle, EventSink, PeripheralHandle, ScanRequest,
    Transport,
};

/// A request received by [`MockTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCall {
    StartScan(ScanRequest),
    StopScan,
    Connect(String),
    CancelConnection(String),
    DiscoverServices,
    DiscoverCharacteristics(Uuid),
    Read(Uuid),
    Subscribe(Uuid),
    Write { uuid: Uuid, payload: String },
}

/// A value the mock reports after a matching write.
#[derive(Debug, Clone)]
struct WriteReaction {
    payload: Vec<u8>,
    characteristic: Uuid,
    value: Bytes,
}

/// A mock Bluetooth stack with one scooter in range.
pub struct MockTransport {
    sink: EventSink,
    peripheral: PeripheralHandle,
    adapter: RwLock<AdapterState>,
    connected: AtomicBool,
    scanning: AtomicBool,
    calls: RwLock<Vec<TransportCall>>,
    values: RwLock<HashMap<Uuid, Bytes>>,
    reactions: RwLock<Vec<WriteReaction>>,
    /// Services reported by discovery.
    services: RwLock<Vec<Uuid>>,
    /// Characteristics that discovery leaves out.
    missing: RwLock<HashSet<Uuid>>,
    service_discovery_error: RwLock<Option<String>>,
    /// Connect attempts to fail before succeeding.
    remaining_connect_failures: AtomicU32,
    /// Leave connects pending with no outcome event.
    hold_connects: AtomicBool,
    write_error: RwLock<Option<String>>,
    /// Simulated write acknowledgement latency in milliseconds.
    write_latency_ms: AtomicU64,
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransport")
            .field("peripheral", &self.peripheral)
            .field("connected", &self.connected.load(Ordering::Relaxed))
            .field("scanning", &self.scanning.load(Ordering::Relaxed))
            .finish()
    }
}

impl MockTransport {
    /// Create a mock with the radio on and a scooter advertising the default
    /// name and exposing the full GATT layout.
    pub fn new(sink: EventSink) -> Self {
        Self::with_name(sink, DEVICE_NAME)
    }

    /// Create a mock whose scooter advertises `name`.
    pub fn with_name(sink: EventSink, name: &str) -> Self {
        let id = format!("MOCK-{:06X}", rand::random::<u32>() % 0xFFFFFF);
        Self {
            sink,
            peripheral: PeripheralHandle::new(id, Some(name.to_string())),
            adapter: RwLock::new(AdapterState::PoweredOn),
            connected: AtomicBool::new(false),
            scanning: AtomicBool::new(false),
            calls: RwLock::new(Vec::new()),
            values: RwLock::new(HashMap::new()),
            reactions: RwLock::new(Vec::new()),
            services: RwLock::new(uuids::ALL_SERVICES.to_vec()),
            missing: RwLock::new(HashSet::new()),
            service_discovery_error: RwLock::new(None),
            remaining_connect_failures: AtomicU32::new(0),
            hold_connects: AtomicBool::new(false),
            write_error: RwLock::new(None),
            write_latency_ms: AtomicU64::new(0),
        }
    }

    /// The simulated scooter.
    pub fn peripheral(&self) -> &PeripheralHandle {
        &self.peripheral
    }

    async fn record(&self, call: TransportCall) {
        self.calls.write().await.push(call);
    }

    // --- Scooter simulation ---

    /// Advertise the scooter, if scanning.
    pub async fn advertise(&self) {
        self.advertise_with_services(Vec::new()).await;
    }

    /// Advertise the scooter with a service list, if scanning.
    pub async fn advertise_with_services(&self, services: Vec<Uuid>) {
        if self.scanning.load(Ordering::Relaxed) {
            self.sink.send(BleEvent::PeripheralDiscovered {
                peripheral: self.peripheral.clone(),
                rssi: Some(-60),
                services,
            });
        }
    }

    /// Advertise an unrelated peripheral.
    pub fn advertise_other(&self, id: &str, name: Option<&str>) {
        self.sink.send(BleEvent::PeripheralDiscovered {
            peripheral: PeripheralHandle::new(id, name.map(str::to_string)),
            rssi: Some(-80),
            services: Vec::new(),
        });
    }

    /// Store a characteristic value, reported on the next read.
    pub async fn set_value(&self, characteristic: Uuid, value: impl Into<Bytes>) {
        self.values
            .write()
            .await
            .insert(characteristic, value.into());
    }

    /// Store a value and push it as a notification.
    pub async fn notify(&self, characteristic: Uuid, value: impl Into<Bytes>) {
        let value = value.into();
        self.set_value(characteristic, value.clone()).await;
        self.sink.send(BleEvent::ValueUpdated {
            characteristic,
            value,
        });
    }

    /// After a successful write of `payload`, store `value` for
    /// `characteristic` and notify it.
    pub async fn on_write(
        &self,
        payload: &str,
        characteristic: Uuid,
        value: impl Into<Bytes>,
    ) {
        self.reactions.write().await.push(WriteReaction {
            payload: payload.as_bytes().to_vec(),
            characteristic,
            value: value.into(),
        });
    }

    /// Drop the link, as the peripheral or the stack would.
    pub fn drop_link(&self, error: Option<&str>) {
        self.connected.store(false, Ordering::Relaxed);
        self.sink.send(BleEvent::Disconnected {
            peripheral: self.peripheral.clone(),
            error: error.map(str::to_string),
        });
    }

    /// Change the connection flag without an event, so only supervision
    /// can notice.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Relaxed);
    }

    /// Change the radio state and report it.
    pub async fn set_adapter_state(&self, state: AdapterState) {
        *self.adapter.write().await = state;
        if !state.is_powered_on() {
            self.scanning.store(false, Ordering::Relaxed);
            self.connected.store(false, Ordering::Relaxed);
        }
        self.sink.send(BleEvent::AdapterStateChanged(state));
    }

    // --- Failure injection ---

    /// Fail the next `count` connect attempts.
    pub fn fail_connects(&self, count: u32) {
        self.remaining_connect_failures
            .store(count, Ordering::Relaxed);
    }

    /// Accept connect requests without ever reporting an outcome.
    pub fn hold_connects(&self, hold: bool) {
        self.hold_connects.store(hold, Ordering::Relaxed);
    }

    /// Fail every write with `message`, or stop failing with `None`.
    pub async fn set_write_error(&self, message: Option<&str>) {
        *self.write_error.write().await = message.map(str::to_string);
    }

    /// Set simulated write acknowledgement latency.
    pub fn set_write_latency(&self, latency: Duration) {
        self.write_latency_ms
            .store(latency.as_millis() as u64, Ordering::Relaxed);
    }

    /// Fail service discovery with `message`.
    pub async fn set_service_discovery_error(&self, message: Option<&str>) {
        *self.service_discovery_error.write().await = message.map(str::to_string);
    }

    /// Report only these services on discovery.
    pub async fn set_services(&self, services: Vec<Uuid>) {
        *self.services.write().await = services;
    }

    /// Leave `characteristic` out of characteristic discovery.
    pub async fn hide_characteristic(&self, characteristic: Uuid) {
        self.missing.write().await.insert(characteristic);
    }

    // --- Inspection ---

    /// Every call received so far.
    pub async fn calls(&self) -> Vec<TransportCall> {
        self.calls.read().await.clone()
    }

    /// Forget recorded calls.
    pub async fn clear_calls(&self) {
        self.calls.write().await.clear();
    }

    /// Payloads written so far, as `(role, text)`.
    pub async fn writes(&self) -> Vec<(CharacteristicRole, String)> {
        self.calls
            .read()
            .await
            .iter()
            .filter_map(|call| match call {
                TransportCall::Write { uuid, payload } => CharacteristicRole::from_uuid(*uuid)
                    .map(|role| (role, payload.clone())),
                _ => None,
            })
            .collect()
    }

    /// Number of recorded calls matching `predicate`.
    pub async fn count(&self, predicate: impl Fn(&TransportCall) -> bool) -> usize {
        self.calls.read().await.iter().filter(|c| predicate(*c)).count()
    }

    /// Whether a scan is running.
    pub fn is_scanning(&self) -> bool {
        self.scanning.load(Ordering::Relaxed)
    }

    fn check_ours(&self, peripheral: &PeripheralHandle) -> Result<()> {
        if peripheral.id == self.peripheral.id {
            Ok(())
        } else {
            Err(Error::connection_failed(
                Some(peripheral.id.clone()),
                "unknown peripheral",
            ))
        }
    }

    fn check_connected(&self) -> Result<()> {
        if self.connected.load(Ordering::Relaxed) {
            Ok(())
        } else {
            Err(Error::NotConnected)
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn adapter_state(&self) -> AdapterState {
        *self.adapter.read().await
    }

    async fn start_scan(&self, request: ScanRequest) -> Result<()> {
        self.record(TransportCall::StartScan(request)).await;
        self.scanning.store(true, Ordering::Relaxed);
        Ok(())
    }

    async fn stop_scan(&self) -> Result<()> {
        self.record(TransportCall::StopScan).await;
        self.scanning.store(false, Ordering::Relaxed);
        Ok(())
    }

    async fn connect(&self, peripheral: &PeripheralHandle) -> Result<()> {
        self.record(TransportCall::Connect(peripheral.id.clone()))
            .await;
        self.check_ours(peripheral)?;

        if self.remaining_connect_failures.load(Ordering::Relaxed) > 0 {
            self.remaining_connect_failures
                .fetch_sub(1, Ordering::Relaxed);
            self.sink.send(BleEvent::ConnectFailed {
                peripheral: peripheral.clone(),
                reason: "Mock connect failure".to_string(),
            });
            return Ok(());
        }
        if self.hold_connects.load(Ordering::Relaxed) {
            return Ok(());
        }

        self.connected.store(true, Ordering::Relaxed);
        self.sink.send(BleEvent::Connected {
            peripheral: peripheral.clone(),
        });
        Ok(())
    }

    async fn cancel_connection(&self, peripheral: &PeripheralHandle) -> Result<()> {
        self.record(TransportCall::CancelConnection(peripheral.id.clone()))
            .await;
        if peripheral.id == self.peripheral.id {
            self.connected.store(false, Ordering::Relaxed);
        }
        Ok(())
    }

    async fn is_connected(&self, peripheral: &PeripheralHandle) -> bool {
        peripheral.id == self.peripheral.id && self.connected.load(Ordering::Relaxed)
    }

    async fn discover_services(
        &self,
        peripheral: &PeripheralHandle,
        services: &[Uuid],
    ) -> Result<()> {
        self.record(TransportCall::DiscoverServices).await;
        self.check_ours(peripheral)?;
        self.check_connected()?;

        let result = match self.service_discovery_error.read().await.clone() {
            Some(message) => Err(message),
            None => Ok(self
                .services
                .read()
                .await
                .iter()
                .filter(|s| services.is_empty() || services.contains(s))
                .copied()
                .collect()),
        };
        self.sink.send(BleEvent::ServicesDiscovered {
            peripheral: peripheral.clone(),
            result,
        });
        Ok(())
    }

    async fn discover_characteristics(
        &self,
        peripheral: &PeripheralHandle,
        service: Uuid,
        characteristics: &[Uuid],
    ) -> Result<()> {
        self.record(TransportCall::DiscoverCharacteristics(service))
            .await;
        self.check_ours(peripheral)?;
        self.check_connected()?;

        let missing = self.missing.read().await;
        let found = service_spec(service)
            .map(|spec| spec.characteristic_uuids())
            .unwrap_or_default()
            .into_iter()
            .filter(|c| characteristics.is_empty() || characteristics.contains(c))
            .filter(|c| !missing.contains(c))
            .collect();
        self.sink.send(BleEvent::CharacteristicsDiscovered {
            peripheral: peripheral.clone(),
            service,
            result: Ok(found),
        });
        Ok(())
    }

    async fn read(
        &self,
        peripheral: &PeripheralHandle,
        characteristic: &CharacteristicHandle,
    ) -> Result<()> {
        self.record(TransportCall::Read(characteristic.uuid)).await;
        self.check_ours(peripheral)?;
        self.check_connected()?;

        if let Some(value) = self.values.read().await.get(&characteristic.uuid).cloned() {
            self.sink.send(BleEvent::ValueUpdated {
                characteristic: characteristic.uuid,
                value,
            });
        }
        Ok(())
    }

    async fn subscribe(
        &self,
        peripheral: &PeripheralHandle,
        characteristic: &CharacteristicHandle,
    ) -> Result<()> {
        self.record(TransportCall::Subscribe(characteristic.uuid))
            .await;
        self.check_ours(peripheral)?;
        self.check_connected()
    }

    async fn write(
        &self,
        peripheral: &PeripheralHandle,
        characteristic: &CharacteristicHandle,
        payload: &[u8],
    ) -> Result<()> {
        self.record(TransportCall::Write {
            uuid: characteristic.uuid,
            payload: String::from_utf8_lossy(payload).into_owned(),
        })
        .await;
        self.check_ours(peripheral)?;
        self.check_connected()?;

        let latency = self.write_latency_ms.load(Ordering::Relaxed);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }

        if let Some(message) = self.write_error.read().await.clone() {
            return Err(match CharacteristicRole::from_uuid(characteristic.uuid) {
                Some(role) => Error::write_failed(role, message),
                None => Error::Bluetooth(btleplug::Error::Other(message.into())),
            });
        }

        let reactions: Vec<_> = self
            .reactions
            .read()
            .await
            .iter()
            .filter(|r| r.payload == payload)
            .cloned()
            .collect();
        for reaction in reactions {
            self.notify(reaction.characteristic, reaction.value).await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::EventChannel;

    fn handle(uuid: Uuid) -> CharacteristicHandle {
        CharacteristicHandle {
            service: uuids::MAIN_SERVICE,
            uuid,
            generation: 1,
        }
    }

    #[tokio::test]
    async fn test_mock_id_format() {
        let channel = EventChannel::new();
        let mock = MockTransport::new(channel.sink());
        assert!(mock.peripheral().id.starts_with("MOCK-"));
        assert_eq!(mock.peripheral().name.as_deref(), Some("unu Scooter"));
    }

    #[tokio::test]
    async fn test_advertise_requires_scan() {
        let mut channel = EventChannel::new();
        let mock = MockTransport::new(channel.sink());

        mock.advertise().await;
        assert!(channel.receiver.try_recv().is_err());

        mock.start_scan(ScanRequest::all()).await.unwrap();
        mock.advertise().await;
        assert!(matches!(
            channel.receiver.try_recv(),
            Ok(BleEvent::PeripheralDiscovered { .. })
        ));
    }

    #[tokio::test]
    async fn test_connect_failure_injection() {
        let mut channel = EventChannel::new();
        let mock = MockTransport::new(channel.sink());
        let peripheral = mock.peripheral().clone();
        mock.fail_connects(1);

        mock.connect(&peripheral).await.unwrap();
        assert!(matches!(
            channel.receiver.try_recv(),
            Ok(BleEvent::ConnectFailed { .. })
        ));
        assert!(!mock.is_connected(&peripheral).await);

        mock.connect(&peripheral).await.unwrap();
        assert!(matches!(
            channel.receiver.try_recv(),
            Ok(BleEvent::Connected { .. })
        ));
        assert!(mock.is_connected(&peripheral).await);
    }

    #[tokio::test]
    async fn test_read_reports_stored_value() {
        let mut channel = EventChannel::new();
        let mock = MockTransport::new(channel.sink());
        let peripheral = mock.peripheral().clone();
        mock.set_connected(true);
        mock.set_value(uuids::SCOOTER_STATE, "parked").await;

        mock.read(&peripheral, &handle(uuids::SCOOTER_STATE))
            .await
            .unwrap();
        match channel.receiver.try_recv() {
            Ok(BleEvent::ValueUpdated {
                characteristic,
                value,
            }) => {
                assert_eq!(characteristic, uuids::SCOOTER_STATE);
                assert_eq!(&value[..], b"parked");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_write_reaction_and_log() {
        let mut channel = EventChannel::new();
        let mock = MockTransport::new(channel.sink());
        let peripheral = mock.peripheral().clone();
        mock.set_connected(true);
        mock.on_write("scooter:state lock", uuids::HANDLEBAR_LOCK, "locked")
            .await;

        mock.write(&peripheral, &handle(uuids::COMMAND), b"scooter:state lock")
            .await
            .unwrap();
        assert!(matches!(
            channel.receiver.try_recv(),
            Ok(BleEvent::ValueUpdated { characteristic, .. }) if characteristic == uuids::HANDLEBAR_LOCK
        ));
        assert_eq!(
            mock.writes().await,
            vec![(
                CharacteristicRole::Command,
                "scooter:state lock".to_string()
            )]
        );
    }

    #[tokio::test]
    async fn test_write_error_injection() {
        let channel = EventChannel::new();
        let mock = MockTransport::new(channel.sink());
        let peripheral = mock.peripheral().clone();
        mock.set_connected(true);
        mock.set_write_error(Some("GATT error")).await;

        let err = mock
            .write(&peripheral, &handle(uuids::COMMAND), b"x")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::CommandWriteFailed { .. }));
        assert!(err.to_string().contains("GATT error"));
    }

    #[tokio::test]
    async fn test_write_error_on_unknown_characteristic() {
        let channel = EventChannel::new();
        let mock = MockTransport::new(channel.sink());
        let peripheral = mock.peripheral().clone();
        mock.set_connected(true);
        mock.set_write_error(Some("GATT error")).await;

        let unknown = Uuid::from_u128(0x1234);
        let err = mock
            .write(&peripheral, &handle(unknown), b"x")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Bluetooth(_)));
        assert!(err.to_string().contains("GATT error"));
    }

    #[tokio::test]
    async fn test_held_connect_reports_nothing() {
        let mut channel = EventChannel::new();
        let mock = MockTransport::new(channel.sink());
        let peripheral = mock.peripheral().clone();
        mock.hold_connects(true);

        mock.connect(&peripheral).await.unwrap();
        assert!(channel.receiver.try_recv().is_err());
        assert!(!mock.is_connected(&peripheral).await);
        assert_eq!(mock.calls().await.len(), 1);
    }

    #[tokio::test]
    async fn test_requests_need_connection() {
        let channel = EventChannel::new();
        let mock = MockTransport::new(channel.sink());
        let peripheral = mock.peripheral().clone();
        assert!(matches!(
            mock.read(&peripheral, &handle(uuids::SCOOTER_STATE)).await,
            Err(Error::NotConnected)
        ));
    }
}
