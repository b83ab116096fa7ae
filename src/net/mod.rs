//! Wireless connectivity seam.
//!
//! The daemon itself only probes for the managed interface at startup; the
//! actual connection manager is an external collaborator reached through
//! [`NetworkClient`]. The shipped [`UnavailableNetwork`] stub keeps the
//! service functional on boards without a connectivity stack.

use thiserror::Error;
use tracing::warn;

#[derive(Debug, Clone, PartialEq)]
pub struct AccessPoint {
    pub ssid: String,
    /// Signal strength in percent, 0-100.
    pub strength: u8,
    pub frequency_mhz: u32,
}

#[derive(Debug, Error)]
pub enum NetError {
    #[error("network manager unavailable")]
    Unavailable,
    #[error("no wireless device for interface {0}")]
    NoDevice(String),
    #[error("access point '{0}' not found")]
    NoSuchAccessPoint(String),
    #[error("network backend error: {0}")]
    Backend(String),
}

pub trait NetworkClient: Send {
    /// Check that a wireless device exists for the given interface name.
    fn device_by_interface(&mut self, interface: &str) -> Result<(), NetError>;

    /// List access points visible from the managed interface.
    fn scan(&mut self, interface: &str) -> Result<Vec<AccessPoint>, NetError>;

    /// Connect the managed interface to the named access point.
    fn connect(&mut self, interface: &str, ssid: &str, psk: &str) -> Result<(), NetError>;
}

/// Used when no connectivity backend is compiled in or reachable.
pub struct UnavailableNetwork;

impl NetworkClient for UnavailableNetwork {
    fn device_by_interface(&mut self, _interface: &str) -> Result<(), NetError> {
        Err(NetError::Unavailable)
    }

    fn scan(&mut self, interface: &str) -> Result<Vec<AccessPoint>, NetError> {
        warn!(interface, "scan requested but no network backend is available");
        Err(NetError::Unavailable)
    }

    fn connect(&mut self, _interface: &str, _ssid: &str, _psk: &str) -> Result<(), NetError> {
        Err(NetError::Unavailable)
    }
}
