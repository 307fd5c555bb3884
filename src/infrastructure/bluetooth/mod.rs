//! Bluetooth Module
//!
//! Parameter exchange with the MDASP audio DSP board.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                    BluetoothService                      │
//! │   (one session per connection: store + dispatcher)       │
//! └─────────────────────┬───────────────────────────────────┘
//!                       │
//!         ┌─────────────┼──────────────┐
//!         │             │              │
//!         ▼             ▼              ▼
//! ┌────────────┐  ┌────────────┐  ┌──────────────┐
//! │ Dispatcher │  │   Codec    │  │  Transport   │
//! │            │  │            │  │              │
//! │ - Rate cap │  │ - Record   │  │ - connect    │
//! │ - Live     │  │   layout   │  │ - read/write │
//! │   mode     │  │ - Commands │  │ - events     │
//! └────────────┘  └────────────┘  └──────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`protocol`] - Write-command encoding
//! - [`codec`] - Versioned parameter record layout
//! - [`dispatcher`] - Rate-limited write dispatch
//! - [`transport`] - BLE stack boundary and events
//! - [`service`] - Session coordinator
//! - `connection` / `scanner` - WinRT backend (Windows only)
//!
//! The register map and record versions live in `domain::device`.

pub mod codec;
pub mod dispatcher;
pub mod protocol;
pub mod service;
pub mod transport;

#[cfg(windows)]
pub mod connection;
#[cfg(windows)]
pub mod scanner;

// Re-export main service for convenience
pub use service::BluetoothService;
