//! WinRT BLE Transport
//!
//! [`BleTransport`] backed by the Windows GATT APIs. All WinRT objects live
//! on one worker thread running a current-thread tokio runtime; the
//! transport itself only forwards commands to it.

use crate::domain::device;
use crate::infrastructure::bluetooth::protocol;
use crate::infrastructure::bluetooth::transport::{
    BleTransport, DeviceHandle, TransportError, TransportEvent,
};
use anyhow::Result;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;
use windows::core::GUID;
use windows::Devices::Bluetooth::GenericAttributeProfile::{
    GattCharacteristic, GattCommunicationStatus, GattWriteOption,
};
use windows::Devices::Bluetooth::{BluetoothCacheMode, BluetoothConnectionStatus, BluetoothLEDevice};
use windows::Foundation::TypedEventHandler;
use windows::Storage::Streams::{DataReader, DataWriter, IBuffer};

/// Configuration for connection behavior
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Service UUID to look for
    pub service_uuid: Uuid,
    /// Parameter characteristic UUID
    pub parameter_char_uuid: Uuid,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            service_uuid: device::SERVICE_UUID,
            parameter_char_uuid: device::PARAMETER_CHAR_UUID,
        }
    }
}

enum LinkCommand {
    Connect(DeviceHandle),
    Write(DeviceHandle, Uuid, Vec<u8>),
    Read(DeviceHandle, Uuid),
    Disconnect(DeviceHandle),
    /// Raised by the status watcher of link `generation`
    LinkLost(DeviceHandle, u64),
}

struct Link {
    device: BluetoothLEDevice,
    characteristic: GattCharacteristic,
    generation: u64,
}

pub struct WinRtTransport {
    commands: mpsc::UnboundedSender<LinkCommand>,
    connected: Arc<Mutex<HashSet<DeviceHandle>>>,
}

impl WinRtTransport {
    /// Start the BLE worker thread
    pub fn new(
        event_sender: mpsc::UnboundedSender<TransportEvent>,
        config: ConnectionConfig,
    ) -> Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let connected = Arc::new(Mutex::new(HashSet::new()));
        let worker_connected = connected.clone();
        let status_commands = tx.downgrade();

        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        std::thread::Builder::new()
            .name("ble-link".to_string())
            .spawn(move || {
                let worker = LinkWorker {
                    event_sender,
                    config,
                    connected: worker_connected,
                    status_commands,
                    links: HashMap::new(),
                    next_generation: 0,
                };
                rt.block_on(worker.run(rx))
            })?;

        Ok(Self {
            commands: tx,
            connected,
        })
    }

    fn send(&self, command: LinkCommand) -> Result<(), TransportError> {
        self.commands
            .send(command)
            .map_err(|_| TransportError::Other(anyhow::anyhow!("BLE worker stopped")))
    }

    fn require_connected(&self, device: DeviceHandle) -> Result<(), TransportError> {
        let connected = self
            .connected
            .lock()
            .map_err(|_| TransportError::Other(anyhow::anyhow!("Lock error")))?;
        if connected.contains(&device) {
            Ok(())
        } else {
            Err(TransportError::NotConnected(device))
        }
    }
}

impl BleTransport for WinRtTransport {
    fn connect(&self, device: DeviceHandle) -> Result<(), TransportError> {
        self.send(LinkCommand::Connect(device))
    }

    fn write_characteristic(
        &self,
        device: DeviceHandle,
        characteristic: Uuid,
        bytes: &[u8],
    ) -> Result<(), TransportError> {
        self.require_connected(device)?;
        self.send(LinkCommand::Write(device, characteristic, bytes.to_vec()))
    }

    fn read_characteristic(
        &self,
        device: DeviceHandle,
        characteristic: Uuid,
    ) -> Result<(), TransportError> {
        self.require_connected(device)?;
        self.send(LinkCommand::Read(device, characteristic))
    }

    fn disconnect(&self, device: DeviceHandle) {
        let _ = self.send(LinkCommand::Disconnect(device));
    }
}

struct LinkWorker {
    event_sender: mpsc::UnboundedSender<TransportEvent>,
    config: ConnectionConfig,
    connected: Arc<Mutex<HashSet<DeviceHandle>>>,
    // Weak so the worker stops once the transport is dropped
    status_commands: mpsc::WeakUnboundedSender<LinkCommand>,
    links: HashMap<DeviceHandle, Link>,
    next_generation: u64,
}

impl LinkWorker {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<LinkCommand>) {
        while let Some(command) = commands.recv().await {
            match command {
                LinkCommand::Connect(device) => {
                    self.close_link(device);
                    match self.connect(device).await {
                        Ok(link) => {
                            self.links.insert(device, link);
                            self.set_connected(device, true);
                            let _ = self.event_sender.send(TransportEvent::SetupComplete(device));
                        }
                        Err(e) => {
                            error!("Connection to {} failed: {}", device, e);
                            let _ = self.event_sender.send(TransportEvent::Disconnected(device));
                        }
                    }
                }
                LinkCommand::Write(device, characteristic, bytes) => {
                    if let Err(e) = self.write(device, characteristic, &bytes).await {
                        warn!("Write to {} failed: {}", device, e);
                        let _ = self.event_sender.send(TransportEvent::WriteFailed {
                            device,
                            bytes,
                            reason: e.to_string(),
                        });
                    }
                }
                LinkCommand::Read(device, characteristic) => {
                    match self.read(device, characteristic).await {
                        Ok(value) => {
                            let _ = self.event_sender.send(TransportEvent::CharacteristicRead {
                                device,
                                characteristic,
                                value,
                            });
                        }
                        Err(e) => warn!("Read from {} failed: {}", device, e),
                    }
                }
                LinkCommand::Disconnect(device) => self.close_link(device),
                LinkCommand::LinkLost(device, generation) => {
                    if self.links.get(&device).map(|l| l.generation) != Some(generation) {
                        continue;
                    }
                    warn!("Link to {} lost", device);
                    self.close_link(device);
                    let _ = self.event_sender.send(TransportEvent::Disconnected(device));
                }
            }
        }
    }

    fn close_link(&mut self, device: DeviceHandle) {
        if let Some(link) = self.links.remove(&device) {
            let _ = link.device.Close();
            info!("Closed link to {}", device);
        }
        self.set_connected(device, false);
    }

    fn set_connected(&self, device: DeviceHandle, connected: bool) {
        if let Ok(mut set) = self.connected.lock() {
            if connected {
                set.insert(device);
            } else {
                set.remove(&device);
            }
        }
    }

    /// Connect, resolve the parameter characteristic and watch the link
    async fn connect(&mut self, handle: DeviceHandle) -> Result<Link> {
        info!("Connecting to Bluetooth device: {}", handle);

        let device = BluetoothLEDevice::FromBluetoothAddressAsync(handle.0)?.await?;
        info!("Device connected: {:?}", device.Name()?);

        let characteristic = self.get_characteristic(&device).await?;
        let generation = self.next_generation;
        self.next_generation += 1;
        self.watch_connection(&device, handle, generation)?;

        Ok(Link {
            device,
            characteristic,
            generation,
        })
    }

    async fn get_characteristic(&self, device: &BluetoothLEDevice) -> Result<GattCharacteristic> {
        let service_uuid = GUID::from_u128(self.config.service_uuid.as_u128());
        let char_uuid = GUID::from_u128(self.config.parameter_char_uuid.as_u128());

        let services_result = device.GetGattServicesForUuidAsync(service_uuid)?.await?;
        if services_result.Status()? != GattCommunicationStatus::Success {
            error!(
                "Failed to get GATT services: {:?}",
                services_result.Status()?
            );
            anyhow::bail!("Failed to get GATT services");
        }

        let services = services_result.Services()?;
        if services.Size()? == 0 {
            anyhow::bail!("MDASP service not found");
        }
        let service = services.GetAt(0)?;
        info!("Found MDASP service");

        let chars_result = service.GetCharacteristicsForUuidAsync(char_uuid)?.await?;
        if chars_result.Status()? != GattCommunicationStatus::Success {
            anyhow::bail!("Failed to get characteristics");
        }
        let characteristics = chars_result.Characteristics()?;
        if characteristics.Size()? == 0 {
            return Err(TransportError::CharacteristicNotFound(self.config.parameter_char_uuid).into());
        }

        info!("Found parameter characteristic");
        Ok(characteristics.GetAt(0)?)
    }

    /// Hand link drops back to the worker so the stale link is removed
    fn watch_connection(
        &self,
        device: &BluetoothLEDevice,
        handle: DeviceHandle,
        generation: u64,
    ) -> Result<()> {
        let commands = self.status_commands.clone();
        let connected = self.connected.clone();
        let status_handler =
            TypedEventHandler::new(move |dev: windows::core::Ref<BluetoothLEDevice>, _| {
                if let Some(dev) = dev.as_ref() {
                    if let Ok(BluetoothConnectionStatus::Disconnected) = dev.ConnectionStatus() {
                        if let Ok(mut set) = connected.lock() {
                            set.remove(&handle);
                        }
                        if let Some(commands) = commands.upgrade() {
                            let _ = commands.send(LinkCommand::LinkLost(handle, generation));
                        }
                    }
                }
                Ok(())
            });
        device.ConnectionStatusChanged(&status_handler)?;
        Ok(())
    }

    fn characteristic_for(&self, device: DeviceHandle, uuid: Uuid) -> Result<&GattCharacteristic> {
        let link = self
            .links
            .get(&device)
            .ok_or(TransportError::NotConnected(device))?;
        if uuid != self.config.parameter_char_uuid {
            return Err(TransportError::CharacteristicNotFound(uuid).into());
        }
        Ok(&link.characteristic)
    }

    /// Write without response; fails when the stack reports a status
    /// other than success
    async fn write(&self, device: DeviceHandle, uuid: Uuid, bytes: &[u8]) -> Result<()> {
        let characteristic = self.characteristic_for(device, uuid)?;
        let writer = DataWriter::new()?;
        writer.WriteBytes(bytes)?;
        let buffer = writer.DetachBuffer()?;
        let status = characteristic
            .WriteValueWithOptionAsync(&buffer, GattWriteOption::WriteWithoutResponse)?
            .await?;
        if status != GattCommunicationStatus::Success {
            anyhow::bail!("[{}] returned status {:?}", protocol::hex(bytes), status);
        }
        Ok(())
    }

    async fn read(&self, device: DeviceHandle, uuid: Uuid) -> Result<Vec<u8>> {
        let characteristic = self.characteristic_for(device, uuid)?;
        let result = characteristic
            .ReadValueWithCacheModeAsync(BluetoothCacheMode::Uncached)?
            .await?;
        if result.Status()? != GattCommunicationStatus::Success {
            anyhow::bail!("Read returned status {:?}", result.Status()?);
        }
        buffer_to_vec(&result.Value()?)
    }
}

fn buffer_to_vec(buffer: &IBuffer) -> Result<Vec<u8>> {
    let reader = DataReader::FromBuffer(buffer)?;
    let length = reader.UnconsumedBufferLength()? as usize;
    let mut bytes = vec![0u8; length];
    reader.ReadBytes(&mut bytes)?;
    Ok(bytes)
}
