//! BLE Transport Boundary
//!
//! The core never talks to a Bluetooth stack directly. It drives one of
//! these, and receives completions as [`TransportEvent`]s.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Bluetooth address of a peripheral
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceHandle(pub u64);

impl fmt::Display for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#014X}", self.0)
    }
}

impl FromStr for DeviceHandle {
    type Err = anyhow::Error;

    /// Accepts `AA:BB:CC:DD:EE:FF` or a plain hex number (`0x` optional).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let hex: String = if s.contains(':') {
            let parts: Vec<&str> = s.split(':').collect();
            if parts.len() != 6 || parts.iter().any(|p| p.len() != 2) {
                anyhow::bail!("Invalid Bluetooth address: {}", s);
            }
            parts.concat()
        } else {
            s.trim_start_matches("0x").trim_start_matches("0X").to_string()
        };
        let address = u64::from_str_radix(&hex, 16)
            .map_err(|e| anyhow::anyhow!("Invalid Bluetooth address {}: {}", s, e))?;
        if address >> 48 != 0 {
            anyhow::bail!("Bluetooth address out of range: {}", s);
        }
        Ok(Self(address))
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("device {0} is not connected")]
    NotConnected(DeviceHandle),

    #[error("characteristic {0} not found")]
    CharacteristicNotFound(Uuid),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Asynchronous notifications from the transport
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Connection established and GATT services resolved
    SetupComplete(DeviceHandle),
    /// Result of a `read_characteristic` request
    CharacteristicRead {
        device: DeviceHandle,
        characteristic: Uuid,
        value: Vec<u8>,
    },
    /// A write the stack accepted was later rejected by the device or link
    WriteFailed {
        device: DeviceHandle,
        bytes: Vec<u8>,
        reason: String,
    },
    /// Link dropped or closed
    Disconnected(DeviceHandle),
}

/// Operations the core needs from a BLE stack.
///
/// `connect` and `read_characteristic` only start the operation; results
/// arrive on the event channel given to the transport at construction.
/// `write_characteristic` is write-without-response: `Ok` means the write
/// was handed to the stack. A failure the stack reports afterwards arrives
/// as [`TransportEvent::WriteFailed`].
pub trait BleTransport: Send + Sync {
    fn connect(&self, device: DeviceHandle) -> Result<(), TransportError>;

    fn write_characteristic(
        &self,
        device: DeviceHandle,
        characteristic: Uuid,
        bytes: &[u8],
    ) -> Result<(), TransportError>;

    fn read_characteristic(
        &self,
        device: DeviceHandle,
        characteristic: Uuid,
    ) -> Result<(), TransportError>;

    fn disconnect(&self, device: DeviceHandle);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_colon_address() {
        let handle: DeviceHandle = "24:0A:C4:00:11:22".parse().unwrap();
        assert_eq!(handle, DeviceHandle(0x240AC4001122));
        assert_eq!(handle.to_string(), "0x240AC4001122");
    }

    #[test]
    fn test_parse_hex_address() {
        assert_eq!(
            "0x240ac4001122".parse::<DeviceHandle>().unwrap(),
            DeviceHandle(0x240AC4001122)
        );
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("24:0A:C4".parse::<DeviceHandle>().is_err());
        assert!("not-an-address".parse::<DeviceHandle>().is_err());
        assert!("0x1FFFFFFFFFFFFF".parse::<DeviceHandle>().is_err());
    }
}

#[cfg(test)]
pub mod mock {
    //! In-memory transport recording every call.

    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct RecordingTransport {
        pub writes: Mutex<Vec<(DeviceHandle, Uuid, Vec<u8>)>>,
        pub reads: Mutex<Vec<(DeviceHandle, Uuid)>>,
        pub connects: Mutex<Vec<DeviceHandle>>,
        pub disconnects: Mutex<Vec<DeviceHandle>>,
        pub fail_writes: Mutex<bool>,
    }

    impl RecordingTransport {
        pub fn written(&self) -> Vec<Vec<u8>> {
            self.writes
                .lock()
                .unwrap()
                .iter()
                .map(|(_, _, bytes)| bytes.clone())
                .collect()
        }

        pub fn write_count(&self) -> usize {
            self.writes.lock().unwrap().len()
        }

        pub fn set_fail_writes(&self, fail: bool) {
            *self.fail_writes.lock().unwrap() = fail;
        }
    }

    impl BleTransport for RecordingTransport {
        fn connect(&self, device: DeviceHandle) -> Result<(), TransportError> {
            self.connects.lock().unwrap().push(device);
            Ok(())
        }

        fn write_characteristic(
            &self,
            device: DeviceHandle,
            characteristic: Uuid,
            bytes: &[u8],
        ) -> Result<(), TransportError> {
            if *self.fail_writes.lock().unwrap() {
                return Err(TransportError::Other(anyhow::anyhow!("link busy")));
            }
            self.writes
                .lock()
                .unwrap()
                .push((device, characteristic, bytes.to_vec()));
            Ok(())
        }

        fn read_characteristic(
            &self,
            device: DeviceHandle,
            characteristic: Uuid,
        ) -> Result<(), TransportError> {
            self.reads.lock().unwrap().push((device, characteristic));
            Ok(())
        }

        fn disconnect(&self, device: DeviceHandle) {
            self.disconnects.lock().unwrap().push(device);
        }
    }
}
