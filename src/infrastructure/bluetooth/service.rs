//! Bluetooth Service Module
//!
//! Session coordinator for one MDASP device. Owns the parameter store and
//! write dispatcher of the active connection and turns transport events
//! into application events.

use crate::domain::device::{Location, WireVersion, WriteRequest};
use crate::domain::models::{
    AppEvent, AudioParameterRecord, ConnectionStatus, MessageSeverity, StatusMessage,
};
use crate::domain::parameters::ParameterStore;
use crate::domain::settings::Settings;
use crate::infrastructure::bluetooth::codec;
use crate::infrastructure::bluetooth::dispatcher::{
    DispatchError, DispatchOutcome, DispatcherConfig, WriteDispatcher,
};
use crate::infrastructure::bluetooth::protocol;
use crate::infrastructure::bluetooth::transport::{
    BleTransport, DeviceHandle, TransportError, TransportEvent,
};
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    pub wire_version: WireVersion,
    pub dispatcher: DispatcherConfig,
}

impl From<&Settings> for SessionConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            wire_version: settings.wire_version,
            dispatcher: DispatcherConfig {
                min_interval: Duration::from_millis(settings.min_write_interval_ms),
                live_mode: settings.live_mode,
                characteristic: settings.ble_parameter_char_uuid,
            },
        }
    }
}

/// State that lives exactly as long as one connection
struct DeviceSession {
    store: ParameterStore,
    dispatcher: WriteDispatcher,
    /// Set once a complete record has been read from the device
    synced: bool,
}

pub struct BluetoothService {
    transport: Arc<dyn BleTransport>,
    event_sender: mpsc::UnboundedSender<AppEvent>,
    config: SessionConfig,
    pending: Option<DeviceHandle>,
    session: Option<DeviceSession>,
}

impl BluetoothService {
    pub fn new(
        transport: Arc<dyn BleTransport>,
        event_sender: mpsc::UnboundedSender<AppEvent>,
        config: SessionConfig,
    ) -> Self {
        Self {
            transport,
            event_sender,
            config,
            pending: None,
            session: None,
        }
    }

    fn characteristic(&self) -> Uuid {
        self.config.dispatcher.characteristic
    }

    /// Start connecting. Completion arrives as `TransportEvent::SetupComplete`.
    pub fn connect(&mut self, device: DeviceHandle) -> Result<()> {
        if self.session.is_some() {
            self.disconnect();
        }
        info!("Connecting to MDASP device {}", device);
        self.pending = Some(device);
        self.send_status(ConnectionStatus::Connecting);
        if let Err(e) = self.transport.connect(device) {
            self.pending = None;
            self.send_status(ConnectionStatus::Error);
            anyhow::bail!("Connection to {} failed: {}", device, e);
        }
        Ok(())
    }

    pub fn disconnect(&mut self) {
        if let Some(session) = self.session.take() {
            session.dispatcher.close();
            self.transport.disconnect(session.dispatcher.device());
            info!("Disconnected from device");
            self.send_log("Disconnected from device", MessageSeverity::Info);
            self.send_status(ConnectionStatus::Disconnected);
        }
        self.pending = None;
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    pub fn device(&self) -> Option<DeviceHandle> {
        self.session.as_ref().map(|s| s.dispatcher.device())
    }

    /// Current parameters; `None` until a connection is set up
    pub fn record(&self) -> Option<&AudioParameterRecord> {
        self.session.as_ref().map(|s| s.store.record())
    }

    /// True once the device state has been read successfully
    pub fn is_synced(&self) -> bool {
        self.session.as_ref().is_some_and(|s| s.synced)
    }

    pub fn set_live_mode(&mut self, enabled: bool) {
        self.config.dispatcher.live_mode = enabled;
        if let Some(session) = &self.session {
            session.dispatcher.set_live_mode(enabled);
        }
    }

    /// Re-read the full parameter record from the device
    pub fn refresh(&self) -> Result<()> {
        let device = self
            .device()
            .ok_or_else(|| anyhow::anyhow!("No device connected"))?;
        self.transport
            .read_characteristic(device, self.characteristic())?;
        Ok(())
    }

    /// Run a store mutation and dispatch the writes it produces.
    ///
    /// ```ignore
    /// service.apply(|store| store.set_eq_passthrough(false))?;
    /// ```
    pub fn apply<F>(&mut self, mutate: F) -> Result<Vec<DispatchOutcome>, DispatchError>
    where
        F: FnOnce(&mut ParameterStore) -> Vec<WriteRequest>,
    {
        let session = self.session.as_mut().ok_or(DispatchError::NotConnected)?;
        let writes = mutate(&mut session.store);
        session.dispatcher.submit_all(writes)
    }

    /// Send a raw command, bypassing the store.
    /// The session is marked unsynced until the next read.
    pub fn write_raw(&mut self, bytes: &[u8]) -> Result<Location, DispatchError> {
        let session = self.session.as_mut().ok_or(DispatchError::NotConnected)?;
        let location = session.dispatcher.submit_raw(bytes)?;
        session.synced = false;
        Ok(location)
    }

    /// React to one transport event
    pub fn handle_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::SetupComplete(device) => self.on_setup_complete(device),
            TransportEvent::CharacteristicRead {
                device,
                characteristic,
                value,
            } => self.on_read(device, characteristic, &value),
            TransportEvent::WriteFailed {
                device,
                bytes,
                reason,
            } => self.on_write_failed(device, &bytes, reason),
            TransportEvent::Disconnected(device) => self.on_disconnected(device),
        }
    }

    fn on_setup_complete(&mut self, device: DeviceHandle) {
        if self.pending != Some(device) {
            debug!("Ignoring setup of unexpected device {}", device);
            return;
        }
        self.pending = None;

        let dispatcher = WriteDispatcher::new(
            self.transport.clone(),
            device,
            self.config.dispatcher.clone(),
        );
        self.session = Some(DeviceSession {
            store: ParameterStore::new(),
            dispatcher,
            synced: false,
        });

        info!("Connected to {}, reading parameters", device);
        self.send_status(ConnectionStatus::Connected);
        self.send_log("Connection established!", MessageSeverity::Success);

        if let Err(e) = self.refresh() {
            self.send_log(
                &format!("Could not read device parameters: {}", e),
                MessageSeverity::Warning,
            );
        }
    }

    fn on_read(&mut self, device: DeviceHandle, characteristic: Uuid, value: &[u8]) {
        let expected_characteristic = self.characteristic();
        let version = self.config.wire_version;
        let Some(session) = self
            .session
            .as_mut()
            .filter(|s| s.dispatcher.device() == device)
        else {
            debug!("Ignoring read from inactive device {}", device);
            return;
        };
        if characteristic != expected_characteristic {
            debug!("Ignoring read of characteristic {}", characteristic);
            return;
        }

        match codec::decode_record(version, value) {
            Ok(record) => {
                session.store.apply_decoded(record);
                session.synced = true;
                let record = *session.store.record();
                debug!("Parameters updated from device");
                let _ = self.event_sender.send(AppEvent::ParametersUpdated(record));
            }
            Err(e) => {
                // Keep the previous values until a valid read arrives
                warn!("Discarding parameter read: {}", e);
                self.send_log(
                    &format!("Device sent an unexpected parameter block: {}", e),
                    MessageSeverity::Warning,
                );
            }
        }
    }

    fn on_write_failed(&mut self, device: DeviceHandle, bytes: &[u8], reason: String) {
        let Some(session) = self
            .session
            .as_mut()
            .filter(|s| s.dispatcher.device() == device)
        else {
            debug!("Ignoring write failure from inactive device {}", device);
            return;
        };
        // The store already holds the rejected value
        session.synced = false;

        let message = match Location::from_command(bytes) {
            Some(location) => {
                let error = DispatchError::WriteFailed {
                    location,
                    source: TransportError::Other(anyhow::anyhow!(reason)),
                };
                format!("{:#}", anyhow::Error::from(error))
            }
            None => format!("write of [{}] failed: {}", protocol::hex(bytes), reason),
        };
        warn!("{}", message);
        self.send_log(&message, MessageSeverity::Error);
    }

    fn on_disconnected(&mut self, device: DeviceHandle) {
        if self.pending == Some(device) {
            self.pending = None;
            self.send_status(ConnectionStatus::Disconnected);
            return;
        }
        if self.device() != Some(device) {
            return;
        }
        if let Some(session) = self.session.take() {
            session.dispatcher.close();
        }
        warn!("Device {} disconnected", device);
        self.send_log("Device disconnected", MessageSeverity::Warning);
        self.send_status(ConnectionStatus::Disconnected);
    }

    fn send_status(&self, status: ConnectionStatus) {
        let _ = self.event_sender.send(AppEvent::ConnectionStatus(status));
    }

    fn send_log(&self, message: &str, severity: MessageSeverity) {
        let _ = self.event_sender.send(AppEvent::LogMessage(StatusMessage {
            message: message.to_string(),
            severity,
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::device::PARAMETER_CHAR_UUID;
    use crate::domain::parameters::{Edit, HighEndFilter};
    use crate::infrastructure::bluetooth::transport::mock::RecordingTransport;

    const DEVICE: DeviceHandle = DeviceHandle(0x24_0A_C4_AA_BB_CC);

    fn connected_service() -> (
        BluetoothService,
        Arc<RecordingTransport>,
        mpsc::UnboundedReceiver<AppEvent>,
    ) {
        let transport = Arc::new(RecordingTransport::default());
        let (tx, rx) = mpsc::unbounded_channel();
        let mut service = BluetoothService::new(transport.clone(), tx, SessionConfig::default());
        service.connect(DEVICE).unwrap();
        service.handle_event(TransportEvent::SetupComplete(DEVICE));
        (service, transport, rx)
    }

    fn read_event(value: Vec<u8>) -> TransportEvent {
        TransportEvent::CharacteristicRead {
            device: DEVICE,
            characteristic: PARAMETER_CHAR_UUID,
            value,
        }
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<AppEvent>) -> Vec<AppEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn test_setup_requests_initial_read() {
        let (service, transport, mut rx) = connected_service();
        assert!(service.is_connected());
        assert!(!service.is_synced());
        assert_eq!(*transport.connects.lock().unwrap(), vec![DEVICE]);
        assert_eq!(
            *transport.reads.lock().unwrap(),
            vec![(DEVICE, PARAMETER_CHAR_UUID)]
        );
        let events = drain(&mut rx);
        assert!(matches!(
            events[0],
            AppEvent::ConnectionStatus(ConnectionStatus::Connecting)
        ));
        assert!(events
            .iter()
            .any(|e| matches!(e, AppEvent::ConnectionStatus(ConnectionStatus::Connected))));
    }

    #[test]
    fn test_read_populates_store() {
        let (mut service, _, mut rx) = connected_service();
        let mut bytes = vec![0u8; 108];
        bytes[0] = 0x01;
        service.handle_event(read_event(bytes));

        assert!(service.is_synced());
        let record = service.record().unwrap();
        assert!(record.eq.passthrough);
        assert_eq!(record.delay, 0);
        assert!(drain(&mut rx)
            .iter()
            .any(|e| matches!(e, AppEvent::ParametersUpdated(r) if r.eq.passthrough)));
    }

    #[test]
    fn test_bad_read_keeps_previous_state() {
        let (mut service, _, mut rx) = connected_service();
        let mut bytes = vec![0u8; 108];
        bytes[0] = 0x01;
        service.handle_event(read_event(bytes));
        drain(&mut rx);

        service.handle_event(read_event(vec![0u8; 104]));
        assert!(service.record().unwrap().eq.passthrough);
        assert!(drain(&mut rx).iter().any(|e| matches!(
            e,
            AppEvent::LogMessage(StatusMessage {
                severity: MessageSeverity::Warning,
                ..
            })
        )));
    }

    #[test]
    fn test_passthrough_off_end_to_end() {
        let (mut service, transport, _rx) = connected_service();
        service.handle_event(read_event({
            let mut bytes = vec![0u8; 108];
            bytes[0] = 0x01;
            bytes
        }));

        let outcomes = service
            .apply(|store| store.set_eq_passthrough(false))
            .unwrap();
        assert_eq!(outcomes, vec![DispatchOutcome::Sent]);
        assert_eq!(transport.written(), vec![vec![0x00, 0x00, 0x00]]);
        assert!(!service.record().unwrap().eq.passthrough);
    }

    #[test]
    fn test_radio_selection_fans_out() {
        let (mut service, transport, _rx) = connected_service();
        service
            .apply(|store| store.select_high_end(Some(HighEndFilter::HighShelf)))
            .unwrap();
        assert_eq!(
            transport.written(),
            vec![vec![0x00, 0x01, 0x00], vec![0x00, 0x02, 0x01]]
        );
    }

    #[test]
    fn test_drag_without_live_mode_is_local_only() {
        let (mut service, transport, _rx) = connected_service();
        let outcomes = service.apply(|store| store.set_volume(-20.0, Edit::Dragging)).unwrap();
        assert_eq!(outcomes, vec![DispatchOutcome::Deferred]);
        assert_eq!(transport.write_count(), 0);
        assert_eq!(service.record().unwrap().volume, -20.0);

        service.apply(|store| store.set_volume(-20.0, Edit::Finished)).unwrap();
        let mut expected = vec![0x02, 0x00];
        expected.extend_from_slice(&(-20.0f32).to_le_bytes());
        assert_eq!(transport.written(), vec![expected]);
    }

    #[test]
    fn test_live_mode_transmits_drag() {
        let (mut service, transport, _rx) = connected_service();
        service.set_live_mode(true);
        let outcomes = service.apply(|store| store.set_delay(120, Edit::Dragging)).unwrap();
        assert_eq!(outcomes, vec![DispatchOutcome::Sent]);
        assert_eq!(transport.write_count(), 1);
    }

    #[test]
    fn test_disconnect_ends_session() {
        let (mut service, transport, mut rx) = connected_service();
        drain(&mut rx);
        service.handle_event(TransportEvent::Disconnected(DEVICE));

        assert!(!service.is_connected());
        let err = service
            .apply(|store| store.save_as_default())
            .unwrap_err();
        assert!(matches!(err, DispatchError::NotConnected));
        assert_eq!(transport.write_count(), 0);
        assert!(drain(&mut rx)
            .iter()
            .any(|e| matches!(e, AppEvent::ConnectionStatus(ConnectionStatus::Disconnected))));
    }

    #[test]
    fn test_reconnect_starts_from_defaults() {
        let (mut service, _, _rx) = connected_service();
        service
            .apply(|store| store.set_makeup_gain(true))
            .unwrap();
        service.disconnect();

        service.connect(DEVICE).unwrap();
        service.handle_event(TransportEvent::SetupComplete(DEVICE));
        assert!(!service.record().unwrap().compressor.makeup_gain);
        assert!(!service.is_synced());
    }

    #[test]
    fn test_ignores_events_for_other_devices() {
        let (mut service, _, _rx) = connected_service();
        let other = DeviceHandle(1);
        service.handle_event(TransportEvent::CharacteristicRead {
            device: other,
            characteristic: PARAMETER_CHAR_UUID,
            value: vec![1u8; 108],
        });
        assert!(!service.is_synced());
        service.handle_event(TransportEvent::Disconnected(other));
        assert!(service.is_connected());
    }

    #[test]
    fn test_rejected_write_reports_location() {
        let (mut service, transport, mut rx) = connected_service();
        service.handle_event(read_event(vec![0u8; 108]));
        service
            .apply(|store| store.set_volume(-6.0, Edit::Finished))
            .unwrap();
        let sent = transport.written().remove(0);
        drain(&mut rx);

        service.handle_event(TransportEvent::WriteFailed {
            device: DEVICE,
            bytes: sent,
            reason: "Unreachable".to_string(),
        });

        assert!(!service.is_synced());
        let events = drain(&mut rx);
        let reported = events.iter().any(|e| match e {
            AppEvent::LogMessage(StatusMessage {
                message,
                severity: MessageSeverity::Error,
            }) => message.contains("0x0200 (Volume)") && message.contains("Unreachable"),
            _ => false,
        });
        assert!(reported, "{events:?}");
    }

    #[test]
    fn test_write_failure_from_other_device_is_ignored() {
        let (mut service, _, mut rx) = connected_service();
        drain(&mut rx);
        service.handle_event(TransportEvent::WriteFailed {
            device: DeviceHandle(1),
            bytes: vec![0x00, 0x00, 0x01],
            reason: "Unreachable".to_string(),
        });
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_raw_write_bypasses_store() {
        let (mut service, transport, _rx) = connected_service();
        service.handle_event(read_event(vec![0u8; 108]));
        assert!(service.is_synced());

        let location = service.write_raw(&[0x00, 0x00, 0x01]).unwrap();
        assert_eq!(location, Location::EqPassthrough);
        assert_eq!(transport.written(), vec![vec![0x00, 0x00, 0x01]]);
        assert!(!service.record().unwrap().eq.passthrough);
        assert!(!service.is_synced());
    }

    #[test]
    fn test_save_as_default_writes_bare_location() {
        let (mut service, transport, _rx) = connected_service();
        service.apply(|store| store.save_as_default()).unwrap();
        assert_eq!(transport.written(), vec![vec![0xCA, 0xFE]]);
    }
}
