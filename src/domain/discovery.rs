//! Device discovery results, deduplicated by address.

use crate::domain::models::ScannedDevice;

/// Which advertisements count as MDASP boards
#[derive(Debug, Clone)]
pub struct DeviceFilter {
    pub name: String,
    /// List every advertiser (debugging)
    pub show_all: bool,
}

impl DeviceFilter {
    /// A board matches on its advertised local name or on the MDASP service
    /// appearing in the advertisement.
    pub fn matches(&self, local_name: &str, advertises_service: bool) -> bool {
        self.show_all || advertises_service || local_name == self.name
    }
}

#[derive(Debug, Default)]
pub struct DiscoveredDevices {
    devices: Vec<ScannedDevice>,
}

impl DiscoveredDevices {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a scan result. A repeat advertisement replaces the earlier entry
    /// for the same address. Returns true for a newly seen device.
    pub fn upsert(&mut self, device: ScannedDevice) -> bool {
        match self.devices.iter_mut().find(|d| d.address == device.address) {
            Some(existing) => {
                *existing = device;
                false
            }
            None => {
                self.devices.push(device);
                true
            }
        }
    }

    /// Devices ordered strongest signal first
    pub fn by_signal_strength(&self) -> Vec<&ScannedDevice> {
        let mut sorted: Vec<&ScannedDevice> = self.devices.iter().collect();
        sorted.sort_by(|a, b| b.signal_strength.cmp(&a.signal_strength));
        sorted
    }

    pub fn strongest(&self) -> Option<&ScannedDevice> {
        self.devices.iter().max_by_key(|d| d.signal_strength)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}
