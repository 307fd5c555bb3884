//! BLE Scanner Module
//!
//! Advertisement watcher reporting MDASP boards as `AppEvent::DeviceFound`.
//! Repeat advertisements are forwarded too; callers deduplicate by address.

use crate::domain::discovery::DeviceFilter;
use crate::domain::models::{AppEvent, MessageSeverity, ScannedDevice, StatusMessage};
use anyhow::Result;
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;
use windows::core::GUID;
use windows::Devices::Bluetooth::Advertisement::{
    BluetoothLEAdvertisement, BluetoothLEAdvertisementReceivedEventArgs,
    BluetoothLEAdvertisementWatcher, BluetoothLEScanningMode,
};
use windows::Foundation::TypedEventHandler;

pub struct BleScanner {
    watcher: Option<BluetoothLEAdvertisementWatcher>,
    event_sender: mpsc::UnboundedSender<AppEvent>,
}

impl BleScanner {
    pub fn new(event_sender: mpsc::UnboundedSender<AppEvent>) -> Self {
        Self {
            watcher: None,
            event_sender,
        }
    }

    /// Start an active scan, reporting advertisers accepted by `filter`
    pub fn start(&mut self, service_uuid: Uuid, filter: DeviceFilter) -> Result<()> {
        self.stop()?;

        info!(
            "Scanning for \"{}\" or service {}",
            filter.name, service_uuid
        );
        let _ = self.event_sender.send(AppEvent::LogMessage(StatusMessage {
            message: "Scanning for MDASP devices...".to_string(),
            severity: MessageSeverity::Info,
        }));

        let watcher = BluetoothLEAdvertisementWatcher::new()?;
        watcher.SetScanningMode(BluetoothLEScanningMode::Active)?;

        let sender = self.event_sender.clone();
        let service = GUID::from_u128(service_uuid.as_u128());

        let handler = TypedEventHandler::new(
            move |_: windows::core::Ref<BluetoothLEAdvertisementWatcher>,
                  args: windows::core::Ref<BluetoothLEAdvertisementReceivedEventArgs>| {
                let Some(args) = args.as_ref() else {
                    return Ok(());
                };
                let adv = args.Advertisement()?;
                let name = adv.LocalName()?.to_string();
                if !filter.matches(&name, advertises(&adv, service)?) {
                    return Ok(());
                }

                let device = ScannedDevice {
                    name: if name.is_empty() {
                        "Unknown".to_string()
                    } else {
                        name
                    },
                    address: args.BluetoothAddress()?,
                    signal_strength: args.RawSignalStrengthInDBm()?,
                };
                debug!("Advertisement from {:#014X}", device.address);
                let _ = sender.send(AppEvent::DeviceFound(device));
                Ok(())
            },
        );

        watcher.Received(&handler)?;
        watcher.Start()?;
        self.watcher = Some(watcher);

        Ok(())
    }

    pub fn stop(&mut self) -> Result<()> {
        if let Some(watcher) = self.watcher.take() {
            info!("Stopping BLE scan");
            watcher.Stop()?;
        }
        Ok(())
    }
}

fn advertises(adv: &BluetoothLEAdvertisement, service: GUID) -> windows::core::Result<bool> {
    let uuids = adv.ServiceUuids()?;
    for i in 0..uuids.Size()? {
        if uuids.GetAt(i)? == service {
            return Ok(true);
        }
    }
    Ok(false)
}

impl Drop for BleScanner {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}
