use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

/// Connectivity class as reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionType {
    None,
    Cellular,
    Wifi,
}

impl fmt::Display for ConnectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "none",
            Self::Cellular => "cellular",
            Self::Wifi => "wifi",
        };
        f.write_str(name)
    }
}

/// Current connectivity. Change notifications are pushed to the reporter via
/// `Reporter::network_changed`, not polled.
pub trait INetworkInfo: Send + Sync {
    fn connection_type(&self) -> ConnectionType;
}

/// Battery state relevant to networking decisions.
pub trait IPowerInfo: Send + Sync {
    /// False while the device is critically low and not charging.
    fn battery_safe_for_networking(&self) -> bool;
}

/// Shared-state implementation for hosts that push platform updates into the
/// agent (and for tests).
#[derive(Debug)]
pub struct SharedSignals {
    connection: AtomicU8,
    battery_safe: AtomicBool,
}

impl SharedSignals {
    pub fn new(connection: ConnectionType, battery_safe: bool) -> Self {
        Self {
            connection: AtomicU8::new(Self::encode(connection)),
            battery_safe: AtomicBool::new(battery_safe),
        }
    }

    pub fn set_connection(&self, connection: ConnectionType) {
        self.connection.store(Self::encode(connection), Ordering::Release);
    }

    pub fn set_battery_safe(&self, safe: bool) {
        self.battery_safe.store(safe, Ordering::Release);
    }

    fn encode(connection: ConnectionType) -> u8 {
        match connection {
            ConnectionType::None => 0,
            ConnectionType::Cellular => 1,
            ConnectionType::Wifi => 2,
        }
    }

    fn decode(raw: u8) -> ConnectionType {
        match raw {
            1 => ConnectionType::Cellular,
            2 => ConnectionType::Wifi,
            _ => ConnectionType::None,
        }
    }
}

impl Default for SharedSignals {
    fn default() -> Self {
        Self::new(ConnectionType::Wifi, true)
    }
}

impl INetworkInfo for SharedSignals {
    fn connection_type(&self) -> ConnectionType {
        Self::decode(self.connection.load(Ordering::Acquire))
    }
}

impl IPowerInfo for SharedSignals {
    fn battery_safe_for_networking(&self) -> bool {
        self.battery_safe.load(Ordering::Acquire)
    }
}
