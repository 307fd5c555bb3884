//! Companion library for the MDASP BLE audio processor: parameter record
//! codec, rate-limited write dispatch, the in-memory parameter store and a
//! line-command console.

pub mod domain;
pub mod infrastructure;
pub mod presentation;
