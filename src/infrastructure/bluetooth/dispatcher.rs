//! Write Dispatcher
//!
//! Serializes parameter writes onto the single characteristic and caps the
//! rate of continuous (drag) updates so the link is not flooded.

use crate::domain::device::{
    Location, WriteRequest, DEFAULT_MIN_WRITE_INTERVAL_MS, PARAMETER_CHAR_UUID,
};
use crate::infrastructure::bluetooth::protocol::{self, CodecError};
use crate::infrastructure::bluetooth::transport::{BleTransport, DeviceHandle, TransportError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, trace, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Handed to the transport
    Sent,
    /// Dropped: too soon after the previous write
    Throttled,
    /// Not transmitted: live mode is off and the value is not committed yet
    Deferred,
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("no device connected")]
    NotConnected,

    #[error("write to {location} failed")]
    WriteFailed {
        location: Location,
        #[source]
        source: TransportError,
    },

    #[error("command [{0}] does not address a known register")]
    UnknownRegister(String),

    #[error(transparent)]
    Encode(#[from] CodecError),
}

/// Time source for rate limiting
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub min_interval: Duration,
    pub live_mode: bool,
    pub characteristic: Uuid,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_millis(DEFAULT_MIN_WRITE_INTERVAL_MS),
            live_mode: false,
            characteristic: PARAMETER_CHAR_UUID,
        }
    }
}

/// Rate-limited writer for one connected device.
///
/// Owned by the connection session; created on connect, closed on
/// disconnect.
pub struct WriteDispatcher {
    transport: Arc<dyn BleTransport>,
    device: DeviceHandle,
    config: DispatcherConfig,
    clock: Arc<dyn Clock>,
    live_mode: AtomicBool,
    open: AtomicBool,
    // Time of the last transmitted write. Held across check-and-send.
    last_write: Mutex<Option<Instant>>,
}

impl WriteDispatcher {
    pub fn new(
        transport: Arc<dyn BleTransport>,
        device: DeviceHandle,
        config: DispatcherConfig,
    ) -> Self {
        Self::with_clock(transport, device, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        transport: Arc<dyn BleTransport>,
        device: DeviceHandle,
        config: DispatcherConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let live_mode = AtomicBool::new(config.live_mode);
        Self {
            transport,
            device,
            config,
            clock,
            live_mode,
            open: AtomicBool::new(true),
            last_write: Mutex::new(None),
        }
    }

    pub fn device(&self) -> DeviceHandle {
        self.device
    }

    pub fn is_live_mode(&self) -> bool {
        self.live_mode.load(Ordering::Relaxed)
    }

    pub fn set_live_mode(&self, enabled: bool) {
        debug!("Live mode {}", if enabled { "on" } else { "off" });
        self.live_mode.store(enabled, Ordering::Relaxed);
    }

    /// Stop issuing writes. Later submits fail with `NotConnected`.
    pub fn close(&self) {
        self.open.store(false, Ordering::Release);
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Send or drop one request according to its urgency and the rate cap.
    pub fn submit(&self, request: WriteRequest) -> Result<DispatchOutcome, DispatchError> {
        if !self.is_open() {
            return Err(DispatchError::NotConnected);
        }

        if !request.immediate && !self.is_live_mode() {
            return Ok(DispatchOutcome::Deferred);
        }

        let mut last_write = self.lock_last_write();
        let now = self.clock.now();

        if !request.immediate {
            if let Some(last) = *last_write {
                if now.saturating_duration_since(last) < self.config.min_interval {
                    trace!("Throttled write to {}", request.location);
                    return Ok(DispatchOutcome::Throttled);
                }
            }
        }

        let bytes = protocol::encode_command(request.location, &request.payload)?;
        self.transmit(request.location, &bytes)?;
        *last_write = Some(now);
        Ok(DispatchOutcome::Sent)
    }

    /// Send a pre-encoded command as-is. Always immediate; the store is not
    /// updated, so the caller should re-read the record afterwards.
    pub fn submit_raw(&self, bytes: &[u8]) -> Result<Location, DispatchError> {
        if !self.is_open() {
            return Err(DispatchError::NotConnected);
        }
        let location = Location::from_command(bytes)
            .ok_or_else(|| DispatchError::UnknownRegister(protocol::hex(bytes)))?;

        let mut last_write = self.lock_last_write();
        let now = self.clock.now();
        self.transmit(location, bytes)?;
        *last_write = Some(now);
        Ok(location)
    }

    fn lock_last_write(&self) -> MutexGuard<'_, Option<Instant>> {
        self.last_write
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn transmit(&self, location: Location, bytes: &[u8]) -> Result<(), DispatchError> {
        trace!("Writing {} -> [{}]", location, protocol::hex(bytes));
        self.transport
            .write_characteristic(self.device, self.config.characteristic, bytes)
            .map_err(|source| {
                warn!("Write to {} failed: {}", location, source);
                DispatchError::WriteFailed { location, source }
            })
    }

    /// Submit a mutator's fan-out in order, stopping at the first error.
    pub fn submit_all(
        &self,
        requests: impl IntoIterator<Item = WriteRequest>,
    ) -> Result<Vec<DispatchOutcome>, DispatchError> {
        requests
            .into_iter()
            .map(|request| self.submit(request))
            .collect()
    }
}

#[cfg(test)]
pub mod test_clock {
    use super::Clock;
    use std::sync::Mutex;
    use std::time::{Duration, Instant};

    /// Clock advanced by hand
    pub struct ManualClock {
        now: Mutex<Instant>,
    }

    impl ManualClock {
        pub fn new() -> Self {
            Self {
                now: Mutex::new(Instant::now()),
            }
        }

        pub fn advance(&self, by: Duration) {
            *self.now.lock().unwrap() += by;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> Instant {
            *self.now.lock().unwrap()
        }
    }
}
