//! Error types for the relay service.
//!
//! This module defines all error types that can occur while locating the
//! accessory, subscribing to its connection state, and serving the D-Bus
//! interface.

use bluer::Address;
use thiserror::Error;

/// Main error type for the relay service.
#[derive(Error, Debug)]
pub enum RelayError {
   #[error("Bluetooth error: {0}")]
   Bluetooth(#[from] bluer::Error),

   #[error("D-Bus error: {0}")]
   DBus(#[from] zbus::Error),

   #[error("I/O error: {0}")]
   Io(#[from] std::io::Error),

   #[error("Invalid device address: {0}")]
   InvalidAddress(#[from] bluer::InvalidAddress),

   #[error("Device not found: {0}")]
   DeviceNotFound(Address),

   #[error("No Muzik accessory found on adapter {0}")]
   NoAccessory(String),

   #[error("Adapter not found: {0}")]
   AdapterNotFound(String),

   #[error("Connection-state subscription failed: {0}")]
   SubscriptionFailed(String),

   #[error("Could not determine config directory")]
   ConfigDirNotFound,

   #[error("TOML parsing error: {0}")]
   TomlParse(#[from] toml::de::Error),

   #[error("TOML serialization error: {0}")]
   TomlSerialize(#[from] toml::ser::Error),
}

/// Convenience type alias for Results with `RelayError`.
pub type Result<T> = std::result::Result<T, RelayError>;
