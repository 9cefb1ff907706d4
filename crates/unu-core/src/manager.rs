//! Connection lifecycle manager.
//!
//! A single [`ScooterManager`] task owns the connection phase, the role
//! table, the telemetry store, the status line and every timer. Caller
//! requests, transport events, deadline expiries and the supervision tick are
//! serialized through one `select!` loop, so no state is ever shared.
//!
//! Callers talk to the task through a cloneable [`ScooterHandle`]. The lock,
//! unlock and other command sequences live in [`crate::engine`] and run in the
//! caller's task.
//!
//! ```text
//!  Idle ──start──▶ Scanning ──name match──▶ Connecting ──▶ Connected
//!   ▲                 │ 30 s                    │ fail           │ link loss
//!   └─────────────────┴─────────────────────────┘                ▼
//!                                     Disconnected ◀── Reconnecting
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, mpsc, oneshot, watch};
use tokio::time::{Instant, MissedTickBehavior, interval_at, sleep_until, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use unu_types::CharacteristicRole;
use unu_types::uuid as uuids;

use crate::config::{CommandTimings, ManagerConfig, ScanStrategy};
use crate::error::{Error, Result};
use crate::events::{DisconnectReason, EventDispatcher, EventReceiver, ScooterEvent};
use crate::resolver::{
    DiscoveryError, RoleTable, plan_characteristic_discovery, resolve_characteristics,
};
use crate::store::{ConnectionPhase, ScooterSnapshot, ScooterStore};
use crate::transport::{
    AdapterState, BleEvent, CharacteristicHandle, EventChannel, EventSink, PeripheralHandle,
    ScanRequest, Transport,
};
use crate::util::payload_preview;

/// Requests from handles to the manager task.
#[derive(Debug)]
pub(crate) enum Request {
    StartScanning,
    StopScanning,
    Disconnect,
    Foregrounded,
    Backgrounded,
    Abort,
    /// A cancellation token scoped to the current connection.
    Session {
        reply: oneshot::Sender<Result<CancellationToken>>,
    },
    /// Whether a role is resolved on the current connection.
    Resolved {
        role: CharacteristicRole,
        reply: oneshot::Sender<bool>,
    },
    Read {
        role: CharacteristicRole,
        reply: oneshot::Sender<Result<()>>,
    },
    Write {
        role: CharacteristicRole,
        payload: Vec<u8>,
        reply: oneshot::Sender<Result<()>>,
    },
    SetStatus(String),
    SetHazards(bool),
    Emit(ScooterEvent),
    Shutdown,
}

/// Sleep until `deadline`, or forever when there is none.
async fn until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// The connection lifecycle actor.
pub struct ScooterManager {
    transport: Arc<dyn Transport>,
    config: ManagerConfig,
    /// Feeds write completions back into our own event queue.
    sink: EventSink,
    events: EventDispatcher,
    snapshot: watch::Sender<ScooterSnapshot>,

    phase: ConnectionPhase,
    adapter: AdapterState,
    scanning: bool,
    /// Scanning by advertised service as well as by name.
    service_matching: bool,
    pending_start: bool,
    peripheral: Option<PeripheralHandle>,
    roles: RoleTable,
    generation: u64,
    store: ScooterStore,
    status: String,
    hazards_on: bool,
    session: Option<CancellationToken>,

    scan_deadline: Option<Instant>,
    phase_switch_deadline: Option<Instant>,
    reconnect_deadline: Option<Instant>,
    reconnect_attempt: u32,
}

impl ScooterManager {
    /// Start the manager task.
    ///
    /// `channel` must be the channel whose sink was given to `transport`.
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if `config` does not validate.
    pub fn spawn<T>(
        transport: Arc<T>,
        channel: EventChannel,
        config: ManagerConfig,
    ) -> Result<ScooterHandle>
    where
        T: Transport + 'static,
    {
        config.validate()?;

        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(ScooterSnapshot::default());
        let events = EventDispatcher::new(config.event_capacity);

        let handle = ScooterHandle {
            requests: request_tx,
            snapshot: snapshot_rx,
            events: events.clone(),
            timings: config.commands,
            sequence: Arc::new(Mutex::new(())),
        };

        let manager = ScooterManager {
            transport,
            sink: channel.sink(),
            events,
            snapshot: snapshot_tx,
            config,
            phase: ConnectionPhase::Idle,
            adapter: AdapterState::Unknown,
            scanning: false,
            service_matching: false,
            pending_start: false,
            peripheral: None,
            roles: RoleTable::new(),
            generation: 0,
            store: ScooterStore::new(),
            status: String::new(),
            hazards_on: false,
            session: None,
            scan_deadline: None,
            phase_switch_deadline: None,
            reconnect_deadline: None,
            reconnect_attempt: 0,
        };

        tokio::spawn(manager.run(channel.receiver, request_rx));
        Ok(handle)
    }

    async fn run(
        mut self,
        mut ble_events: mpsc::UnboundedReceiver<BleEvent>,
        mut requests: mpsc::UnboundedReceiver<Request>,
    ) {
        info!("Scooter manager started");
        let initial = self.transport.adapter_state().await;
        self.on_adapter_state(initial).await;
        self.publish();

        let period = self.config.supervision_interval;
        let mut supervision = interval_at(Instant::now() + period, period);
        supervision.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                request = requests.recv() => match request {
                    Some(Request::Shutdown) | None => break,
                    Some(request) => self.handle_request(request).await,
                },
                Some(event) = ble_events.recv() => self.handle_event(event).await,
                _ = until(self.scan_deadline) => self.on_scan_timeout().await,
                _ = until(self.phase_switch_deadline) => self.on_phase_switch().await,
                _ = until(self.reconnect_deadline) => self.on_reconnect_due().await,
                _ = supervision.tick(), if self.peripheral.is_some() => self.supervise().await,
            }
            self.publish();
        }

        self.teardown().await;
        self.publish();
        info!("Scooter manager stopped");
    }

    // --- Observables ---

    fn publish(&self) {
        let next = ScooterSnapshot {
            phase: self.phase,
            adapter: self.adapter,
            scanning: self.scanning,
            scooter_state: self.store.scooter_state().clone(),
            lock_state: self.store.lock_state(),
            status: self.status.clone(),
            batteries: self.store.batteries(),
            cbb_charging: self.store.cbb_charging(),
            power_state: self.store.power_state().map(str::to_string),
            hazards_on: self.hazards_on,
            last_update: self.store.last_update(),
        };
        self.snapshot.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }

    fn set_phase(&mut self, phase: ConnectionPhase) {
        if self.phase != phase {
            info!("Phase {} -> {}", self.phase, phase);
            self.phase = phase;
            self.events.send(ScooterEvent::PhaseChanged { phase });
        }
    }

    fn set_status(&mut self, status: impl Into<String>) {
        self.status = status.into();
        debug!(status = %self.status, "Status updated");
    }

    fn is_current(&self, peripheral: &PeripheralHandle) -> bool {
        self.peripheral
            .as_ref()
            .is_some_and(|p| p.id == peripheral.id)
    }

    // --- Requests ---

    async fn handle_request(&mut self, request: Request) {
        match request {
            Request::StartScanning => self.start_scanning().await,
            Request::StopScanning => self.stop_scanning().await,
            Request::Disconnect => self.disconnect().await,
            Request::Foregrounded => {
                if self.phase != ConnectionPhase::Connected && self.adapter.is_powered_on() {
                    self.start_scanning().await;
                }
            }
            Request::Backgrounded => self.stop_scanning().await,
            Request::Abort => self.abort_session(),
            Request::Session { reply } => {
                let result = match (&self.session, self.phase) {
                    (Some(session), ConnectionPhase::Connected) => Ok(session.child_token()),
                    _ => Err(Error::NotConnected),
                };
                let _ = reply.send(result);
            }
            Request::Resolved { role, reply } => {
                let _ = reply.send(self.roles.get(role).is_some());
            }
            Request::Read { role, reply } => {
                let result = self.read(role).await;
                let _ = reply.send(result);
            }
            Request::Write {
                role,
                payload,
                reply,
            } => self.write(role, payload, reply),
            Request::SetStatus(status) => self.set_status(status),
            Request::SetHazards(on) => self.hazards_on = on,
            Request::Emit(event) => self.events.send(event),
            Request::Shutdown => {}
        }
    }

    async fn start_scanning(&mut self) {
        if self.scanning || self.peripheral.is_some() {
            debug!("Start scanning ignored: already scanning or holding a peripheral");
            return;
        }
        self.pending_start = true;
        if self.adapter.is_powered_on() {
            self.initiate_scan().await;
        } else {
            info!("Radio is {}, scan left pending", self.adapter);
        }
    }

    async fn initiate_scan(&mut self) {
        self.pending_start = false;
        if let Err(e) = self.transport.start_scan(ScanRequest::all()).await {
            warn!("Failed to start scan: {}", e);
            self.set_status(format!("Scan failed: {e}"));
            return;
        }
        info!("Scanning for {:?}", self.config.device_name);
        let now = Instant::now();
        self.scanning = true;
        self.service_matching = false;
        self.scan_deadline = Some(now + self.config.scan_timeout);
        self.phase_switch_deadline = match self.config.scan_strategy {
            ScanStrategy::NameOnly => None,
            ScanStrategy::Phased { switch_after } => Some(now + switch_after),
        };
        self.set_phase(ConnectionPhase::Scanning);
        self.set_status("Searching...");
    }

    /// Stop the radio scan and clear its timers. Returns whether a scan was active.
    async fn halt_scan(&mut self) -> bool {
        self.scan_deadline = None;
        self.phase_switch_deadline = None;
        self.service_matching = false;
        if !self.scanning {
            return false;
        }
        self.scanning = false;
        if let Err(e) = self.transport.stop_scan().await {
            warn!("Failed to stop scan: {}", e);
        }
        true
    }

    async fn stop_scanning(&mut self) {
        self.pending_start = false;
        if self.halt_scan().await {
            info!("Scan stopped");
            if self.phase == ConnectionPhase::Scanning {
                self.set_phase(ConnectionPhase::Idle);
            }
        }
    }

    async fn disconnect(&mut self) {
        info!("Disconnect requested");
        self.pending_start = false;
        self.reconnect_deadline = None;
        self.reconnect_attempt = 0;
        self.cancel_session();
        let was_scanning = self.halt_scan().await;
        self.roles.clear();

        if let Some(peripheral) = self.peripheral.take() {
            if let Err(e) = self.transport.cancel_connection(&peripheral).await {
                warn!("Failed to cancel connection: {}", e);
            }
            self.events.send(ScooterEvent::Disconnected {
                reason: DisconnectReason::UserRequested,
            });
            self.set_phase(ConnectionPhase::Disconnected);
            self.set_status("Disconnected");
        } else if was_scanning {
            self.set_phase(ConnectionPhase::Idle);
        }
    }

    fn cancel_session(&mut self) {
        if let Some(session) = self.session.take() {
            session.cancel();
        }
    }

    fn abort_session(&mut self) {
        if let Some(session) = self.session.take() {
            info!("Aborting command sequence");
            session.cancel();
            self.session = Some(CancellationToken::new());
        }
    }

    // --- GATT access ---

    fn resolve(&self, role: CharacteristicRole) -> Result<(PeripheralHandle, CharacteristicHandle)> {
        let peripheral = match (&self.peripheral, self.phase) {
            (Some(p), ConnectionPhase::Connected) => p.clone(),
            _ => return Err(Error::NotConnected),
        };
        match self.roles.get(role) {
            Some(handle) if handle.generation == self.generation => Ok((peripheral, handle)),
            _ => Err(Error::CharacteristicUnavailable(role)),
        }
    }

    async fn read(&self, role: CharacteristicRole) -> Result<()> {
        let (peripheral, handle) = self.resolve(role)?;
        debug!("Reading {}", role);
        self.transport.read(&peripheral, &handle).await
    }

    fn write(
        &self,
        role: CharacteristicRole,
        payload: Vec<u8>,
        reply: oneshot::Sender<Result<()>>,
    ) {
        let (peripheral, handle) = match self.resolve(role) {
            Ok(resolved) => resolved,
            Err(e) => {
                let _ = reply.send(Err(e));
                return;
            }
        };

        debug!("Writing {:?} to {}", payload_preview(&payload), role);
        let transport = Arc::clone(&self.transport);
        let sink = self.sink.clone();
        let write_timeout = self.config.connection.write_timeout;

        tokio::spawn(async move {
            let result = match timeout(
                write_timeout,
                transport.write(&peripheral, &handle, &payload),
            )
            .await
            {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e @ Error::CommandWriteFailed { .. })) => Err(e),
                Ok(Err(e)) => Err(Error::write_failed(role, e.to_string())),
                Err(_) => Err(Error::write_failed(
                    role,
                    format!("not acknowledged within {write_timeout:?}"),
                )),
            };
            sink.send(BleEvent::WriteCompleted {
                characteristic: handle.uuid,
                error: result.as_ref().err().map(|e| e.to_string()),
            });
            let _ = reply.send(result);
        });
    }

    // --- Transport events ---

    async fn handle_event(&mut self, event: BleEvent) {
        match event {
            BleEvent::AdapterStateChanged(state) => self.on_adapter_state(state).await,
            BleEvent::PeripheralDiscovered {
                peripheral,
                rssi,
                services,
            } => self.on_discovered(peripheral, rssi, &services).await,
            BleEvent::Connected { peripheral } => self.on_connected(peripheral).await,
            BleEvent::ConnectFailed { peripheral, reason } => {
                self.on_connect_failed(&peripheral, &reason)
            }
            BleEvent::Disconnected { peripheral, error } => {
                if self.is_current(&peripheral) {
                    info!("Disconnected: {}", error.as_deref().unwrap_or("no error"));
                    self.on_link_lost(error);
                } else {
                    trace!("Ignoring disconnect of {}", peripheral.id);
                }
            }
            BleEvent::ServicesDiscovered { peripheral, result } => {
                self.on_services(&peripheral, result).await
            }
            BleEvent::CharacteristicsDiscovered {
                peripheral,
                service,
                result,
            } => self.on_characteristics(&peripheral, service, result).await,
            BleEvent::ValueUpdated {
                characteristic,
                value,
            } => self.on_value(characteristic, &value),
            BleEvent::WriteCompleted {
                characteristic,
                error,
            } => match error {
                None => debug!("Write to {} acknowledged", characteristic),
                Some(message) => match CharacteristicRole::from_uuid(characteristic) {
                    Some(role) => {
                        warn!("Write to {} failed: {}", role, message);
                        self.events
                            .send(ScooterEvent::CommandWriteFailed { role, message });
                    }
                    None => trace!("Ignoring failed write to {}: {}", characteristic, message),
                },
            },
        }
    }

    async fn on_adapter_state(&mut self, state: AdapterState) {
        info!("Bluetooth adapter {}", state);
        self.adapter = state;

        if state.is_powered_on() {
            if self.pending_start {
                self.initiate_scan().await;
            } else if self.peripheral.is_none() && !self.scanning {
                self.set_status("Disconnected");
            }
            return;
        }

        let was_scanning = self.scanning;
        self.scanning = false;
        self.service_matching = false;
        self.scan_deadline = None;
        self.phase_switch_deadline = None;
        self.reconnect_deadline = None;
        self.reconnect_attempt = 0;
        self.cancel_session();
        self.roles.clear();

        if was_scanning {
            self.pending_start = true;
            self.set_phase(ConnectionPhase::Idle);
        } else if self.peripheral.take().is_some() {
            self.events.send(ScooterEvent::Disconnected {
                reason: DisconnectReason::AdapterUnavailable,
            });
            self.set_phase(ConnectionPhase::Disconnected);
        }
        if let Some(message) = state.status_message() {
            self.set_status(message);
        }
    }

    async fn on_discovered(
        &mut self,
        peripheral: PeripheralHandle,
        rssi: Option<i16>,
        services: &[uuid::Uuid],
    ) {
        if !self.scanning || self.peripheral.is_some() {
            return;
        }
        let name_match = peripheral.name.as_deref() == Some(self.config.device_name.as_str());
        let service_match =
            self.service_matching && services.contains(&uuids::COMMAND_SERVICE);
        if !name_match && !service_match {
            trace!("Skipping {} ({:?})", peripheral.id, peripheral.name);
            return;
        }

        info!("Found scooter {} (RSSI {:?})", peripheral.id, rssi);
        self.events.send(ScooterEvent::Discovered {
            peripheral: peripheral.clone(),
            rssi,
        });
        self.halt_scan().await;
        self.peripheral = Some(peripheral.clone());
        self.set_phase(ConnectionPhase::Connecting);
        self.set_status("Connecting...");

        if let Err(e) = self.transport.connect(&peripheral).await {
            self.on_connect_failed(&peripheral, &e.to_string());
        }
    }

    async fn on_connected(&mut self, peripheral: PeripheralHandle) {
        if !self.is_current(&peripheral)
            || !matches!(
                self.phase,
                ConnectionPhase::Connecting | ConnectionPhase::Reconnecting
            )
        {
            debug!("Unexpected connection to {}, cancelling", peripheral.id);
            if !self.is_current(&peripheral)
                && let Err(e) = self.transport.cancel_connection(&peripheral).await
            {
                warn!("Failed to cancel connection: {}", e);
            }
            return;
        }
        self.establish(peripheral).await;
    }

    /// Enter `Connected` on a fresh connection epoch and resolve the GATT layout.
    async fn establish(&mut self, peripheral: PeripheralHandle) {
        self.generation += 1;
        self.roles.clear();
        self.cancel_session();
        self.session = Some(CancellationToken::new());
        self.reconnect_deadline = None;
        self.reconnect_attempt = 0;

        info!("Connected to {} (epoch {})", peripheral.id, self.generation);
        self.set_phase(ConnectionPhase::Connected);
        self.set_status("Connected");
        self.events.send(ScooterEvent::Connected {
            peripheral: peripheral.clone(),
        });

        if let Err(e) = self
            .transport
            .discover_services(&peripheral, &uuids::ALL_SERVICES)
            .await
        {
            self.report_discovery_error(DiscoveryError::Services {
                reason: e.to_string(),
            });
        }
    }

    fn on_connect_failed(&mut self, peripheral: &PeripheralHandle, reason: &str) {
        if !self.is_current(peripheral) {
            return;
        }
        warn!("Failed to connect: {}", reason);
        match self.phase {
            ConnectionPhase::Reconnecting => self.schedule_reconnect(),
            _ => {
                self.peripheral = None;
                self.set_phase(ConnectionPhase::Idle);
                self.set_status("Connection failed.");
            }
        }
    }

    fn on_link_lost(&mut self, error: Option<String>) {
        // Some stacks report a failed connect as a disconnect.
        if self.phase == ConnectionPhase::Connecting {
            if let Some(peripheral) = self.peripheral.clone() {
                let reason = error.as_deref().unwrap_or("disconnected while connecting");
                self.on_connect_failed(&peripheral, reason);
            }
            return;
        }

        self.roles.clear();
        self.cancel_session();
        self.events.send(ScooterEvent::Disconnected {
            reason: DisconnectReason::LinkLoss(error.clone()),
        });

        if self.phase == ConnectionPhase::Reconnecting {
            self.schedule_reconnect();
            return;
        }

        if self.adapter.is_powered_on() && self.peripheral.is_some() {
            self.set_phase(ConnectionPhase::Reconnecting);
            self.set_status("Reconnecting...");
            self.reconnect_attempt = 0;
            self.schedule_reconnect();
        } else {
            self.peripheral = None;
            self.set_phase(ConnectionPhase::Disconnected);
            self.set_status(if error.is_some() {
                "Connection lost"
            } else {
                "Disconnected"
            });
        }
    }

    fn schedule_reconnect(&mut self) {
        let attempt = self.reconnect_attempt + 1;
        if !self.config.reconnect.allows_attempt(attempt) {
            warn!("Giving up after {} reconnect attempts", self.reconnect_attempt);
            self.reconnect_deadline = None;
            self.reconnect_attempt = 0;
            self.peripheral = None;
            self.events.send(ScooterEvent::Disconnected {
                reason: DisconnectReason::ReconnectExhausted,
            });
            self.set_phase(ConnectionPhase::Disconnected);
            self.set_status("Disconnected");
            return;
        }
        self.reconnect_attempt = attempt;
        let delay = self.config.reconnect.delay_for_attempt(attempt - 1);
        debug!("Reconnect attempt {} in {:?}", attempt, delay);
        self.reconnect_deadline = Some(Instant::now() + delay);
    }

    async fn on_reconnect_due(&mut self) {
        self.reconnect_deadline = None;
        let Some(peripheral) = self.peripheral.clone() else {
            return;
        };
        if self.phase != ConnectionPhase::Reconnecting {
            return;
        }
        info!("Reconnect attempt {}", self.reconnect_attempt);
        self.events.send(ScooterEvent::ReconnectStarted {
            attempt: self.reconnect_attempt,
        });
        if let Err(e) = self.transport.connect(&peripheral).await {
            self.on_connect_failed(&peripheral, &e.to_string());
        }
    }

    async fn on_scan_timeout(&mut self) {
        self.scan_deadline = None;
        if self.phase != ConnectionPhase::Scanning {
            return;
        }
        info!("No scooter found within {:?}", self.config.scan_timeout);
        self.halt_scan().await;
        self.set_phase(ConnectionPhase::Idle);
        self.set_status("No scooter found.");
        self.events.send(ScooterEvent::NoDeviceFound);
    }

    async fn on_phase_switch(&mut self) {
        self.phase_switch_deadline = None;
        if !self.scanning {
            return;
        }
        info!("Switching to service-filtered scan");
        if let Err(e) = self.transport.stop_scan().await {
            warn!("Failed to stop scan: {}", e);
        }
        match self
            .transport
            .start_scan(ScanRequest::with_service(uuids::COMMAND_SERVICE))
            .await
        {
            Ok(()) => {
                self.service_matching = true;
                self.set_status("Searching by service...");
            }
            Err(e) => {
                warn!("Failed to restart scan: {}", e);
                self.scanning = false;
                self.scan_deadline = None;
                self.set_phase(ConnectionPhase::Idle);
                self.set_status(format!("Scan failed: {e}"));
            }
        }
    }

    async fn supervise(&mut self) {
        let Some(peripheral) = self.peripheral.clone() else {
            return;
        };
        if !self.adapter.is_powered_on() {
            return;
        }
        let connected = self.transport.is_connected(&peripheral).await;
        match (self.phase, connected) {
            (ConnectionPhase::Reconnecting, true) => {
                // The role table was cleared on link loss, so resolve again.
                info!("Link is back");
                self.establish(peripheral).await;
            }
            (ConnectionPhase::Connected, false) => {
                warn!("Supervision found the link down");
                self.on_link_lost(Some("link down".to_string()));
            }
            _ => trace!("Supervision tick: {} / connected={}", self.phase, connected),
        }
    }

    fn report_discovery_error(&mut self, error: DiscoveryError) {
        warn!("{}", error);
        match &error {
            DiscoveryError::Services { reason } => {
                self.set_status(format!("Service discovery error: {reason}"))
            }
            DiscoveryError::Characteristics { reason, .. } => {
                self.set_status(format!("Characteristic discovery error: {reason}"))
            }
            _ => {}
        }
        self.events.send(ScooterEvent::DiscoveryFailed {
            message: error.to_string(),
        });
    }

    async fn on_services(
        &mut self,
        peripheral: &PeripheralHandle,
        result: std::result::Result<Vec<uuid::Uuid>, String>,
    ) {
        if !self.is_current(peripheral) || self.phase != ConnectionPhase::Connected {
            return;
        }
        let plan = plan_characteristic_discovery(result);
        for error in plan.errors {
            self.report_discovery_error(error);
        }
        for (service, characteristics) in plan.requests {
            debug!("Discovering {} characteristics in {}", characteristics.len(), service);
            if let Err(e) = self
                .transport
                .discover_characteristics(peripheral, service, &characteristics)
                .await
            {
                self.report_discovery_error(DiscoveryError::Characteristics {
                    service,
                    reason: e.to_string(),
                });
            }
        }
    }

    async fn on_characteristics(
        &mut self,
        peripheral: &PeripheralHandle,
        service: uuid::Uuid,
        result: std::result::Result<Vec<uuid::Uuid>, String>,
    ) {
        if !self.is_current(peripheral) || self.phase != ConnectionPhase::Connected {
            return;
        }
        let resolution = resolve_characteristics(service, result, self.generation);
        for error in resolution.errors {
            self.report_discovery_error(error);
        }
        for (role, handle) in resolution.resolved {
            debug!("Resolved {} -> {}", role, handle.uuid);
            self.roles.insert(role, handle);
            if role.is_telemetry() {
                if let Err(e) = self.transport.read(peripheral, &handle).await {
                    warn!("Failed to read {}: {}", role, e);
                }
                if let Err(e) = self.transport.subscribe(peripheral, &handle).await {
                    warn!("Failed to subscribe to {}: {}", role, e);
                }
            }
        }
    }

    fn on_value(&mut self, characteristic: uuid::Uuid, value: &[u8]) {
        let Some(role) = self.roles.role_for(characteristic) else {
            trace!("Value for unresolved characteristic {}", characteristic);
            return;
        };
        match self.store.apply(role, value) {
            Ok(true) => {
                debug!(
                    "{} updated: {} / {}",
                    role,
                    self.store.scooter_state(),
                    self.store.lock_state()
                );
                self.status = self.store.status();
            }
            Ok(false) => trace!("{} updated", role),
            Err(e) => {
                warn!("Failed to decode {}: {}", role, e);
                self.events.send(ScooterEvent::DecodeFailed {
                    role,
                    message: e.to_string(),
                });
            }
        }
    }

    async fn teardown(&mut self) {
        self.cancel_session();
        self.halt_scan().await;
        self.reconnect_deadline = None;
        self.roles.clear();
        if let Some(peripheral) = self.peripheral.take() {
            if let Err(e) = self.transport.cancel_connection(&peripheral).await {
                debug!("Cancel on shutdown failed: {}", e);
            }
            self.set_phase(ConnectionPhase::Disconnected);
        }
    }
}

/// Cloneable handle to a running [`ScooterManager`].
///
/// Lifecycle requests are fire-and-forget; observe their effect through
/// [`ScooterHandle::watch`] or [`ScooterHandle::subscribe`].
#[derive(Debug, Clone)]
pub struct ScooterHandle {
    requests: mpsc::UnboundedSender<Request>,
    snapshot: watch::Receiver<ScooterSnapshot>,
    events: EventDispatcher,
    pub(crate) timings: CommandTimings,
    /// Held for the duration of a lock/unlock sequence.
    pub(crate) sequence: Arc<Mutex<()>>,
}

impl ScooterHandle {
    pub(crate) fn send(&self, request: Request) -> Result<()> {
        self.requests
            .send(request)
            .map_err(|_| Error::ManagerClosed)
    }

    pub(crate) async fn call<T>(
        &self,
        request: impl FnOnce(oneshot::Sender<T>) -> Request,
    ) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.send(request(reply))?;
        response.await.map_err(|_| Error::ManagerClosed)
    }

    /// Start scanning for the scooter.
    ///
    /// Ignored while a scan is running or a peripheral is held. If the radio
    /// is off the scan starts once it comes on.
    pub fn start_scanning(&self) -> Result<()> {
        self.send(Request::StartScanning)
    }

    /// Stop scanning.
    pub fn stop_scanning(&self) -> Result<()> {
        self.send(Request::StopScanning)
    }

    /// Drop the connection without reconnecting.
    pub fn disconnect(&self) -> Result<()> {
        self.send(Request::Disconnect)
    }

    /// The host application came to the foreground.
    pub fn on_foregrounded(&self) -> Result<()> {
        self.send(Request::Foregrounded)
    }

    /// The host application went to the background.
    pub fn on_backgrounded(&self) -> Result<()> {
        self.send(Request::Backgrounded)
    }

    /// Cancel the running command sequence at its next suspension point.
    pub fn abort(&self) -> Result<()> {
        self.send(Request::Abort)
    }

    /// Stop the manager task, disconnecting if needed.
    pub fn shutdown(&self) -> Result<()> {
        self.send(Request::Shutdown)
    }

    /// The latest snapshot.
    pub fn snapshot(&self) -> ScooterSnapshot {
        self.snapshot.borrow().clone()
    }

    /// A receiver that is notified on every snapshot change.
    pub fn watch(&self) -> watch::Receiver<ScooterSnapshot> {
        self.snapshot.clone()
    }

    /// Subscribe to discrete events.
    pub fn subscribe(&self) -> EventReceiver {
        self.events.subscribe()
    }

    /// Wait until the snapshot satisfies `predicate`.
    ///
    /// # Errors
    ///
    /// [`Error::Timeout`] if it does not happen within `limit`,
    /// [`Error::ManagerClosed`] if the manager stops first.
    pub async fn wait_until<F>(&self, limit: Duration, predicate: F) -> Result<ScooterSnapshot>
    where
        F: FnMut(&ScooterSnapshot) -> bool,
    {
        let mut rx = self.snapshot.clone();
        match timeout(limit, rx.wait_for(predicate)).await {
            Ok(Ok(snapshot)) => Ok(snapshot.clone()),
            Ok(Err(_)) => Err(Error::ManagerClosed),
            Err(_) => Err(Error::timeout("wait for scooter state", limit)),
        }
    }

    pub(crate) fn emit(&self, event: ScooterEvent) -> Result<()> {
        self.send(Request::Emit(event))
    }

    pub(crate) fn set_status(&self, status: impl Into<String>) -> Result<()> {
        self.send(Request::SetStatus(status.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockTransport;
    use crate::reconnect::ReconnectOptions;
    use uuid::Uuid;

    const WAIT: Duration = Duration::from_secs(5);

    async fn connected(config: ManagerConfig) -> (Arc<MockTransport>, EventSink, ScooterHandle) {
        let channel = EventChannel::new();
        let sink = channel.sink();
        let mock = Arc::new(MockTransport::new(channel.sink()));
        let scooter = ScooterManager::spawn(Arc::clone(&mock), channel, config).unwrap();

        scooter.start_scanning().unwrap();
        scooter.wait_until(WAIT, |s| s.scanning).await.unwrap();
        mock.advertise().await;
        scooter.wait_until(WAIT, |s| s.is_connected()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        (mock, sink, scooter)
    }

    async fn resolved(scooter: &ScooterHandle, role: CharacteristicRole) -> bool {
        scooter
            .call(|reply| Request::Resolved { role, reply })
            .await
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_link_loss_clears_role_table() {
        let config = ManagerConfig::default()
            .reconnect(ReconnectOptions::fixed_delay(Duration::from_secs(20)));
        let (mock, _sink, scooter) = connected(config).await;
        for role in CharacteristicRole::ALL {
            assert!(resolved(&scooter, role).await, "{role} not resolved");
        }

        mock.drop_link(Some("supervision timeout"));
        scooter
            .wait_until(WAIT, |s| s.phase == ConnectionPhase::Reconnecting)
            .await
            .unwrap();
        for role in CharacteristicRole::ALL {
            assert!(!resolved(&scooter, role).await, "{role} still resolved");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_write_to_unknown_characteristic_is_ignored() {
        let (_mock, sink, scooter) = connected(ManagerConfig::default()).await;
        let mut events = scooter.subscribe();

        sink.send(BleEvent::WriteCompleted {
            characteristic: Uuid::from_u128(0x1234),
            error: Some("GATT error".to_string()),
        });
        sink.send(BleEvent::WriteCompleted {
            characteristic: uuids::HIBERNATION_COMMAND,
            error: Some("GATT error".to_string()),
        });
        tokio::time::sleep(Duration::from_millis(100)).await;

        let mut failures = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let ScooterEvent::CommandWriteFailed { role, .. } = event {
                failures.push(role);
            }
        }
        assert_eq!(failures, vec![CharacteristicRole::HibernationWake]);
        assert!(scooter.snapshot().is_connected());
    }
}
