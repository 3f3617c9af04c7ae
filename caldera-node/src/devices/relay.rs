//! Relay switch over a digital output pin
//!
//! GPIO pin numbering follows the BCM scheme; expansion ICs map into the
//! triple and quadruple digit ranges when wired through an MCP expander.

use super::Switchable;
use caldera_core::ControlError;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;

/// Seam between the relay logic and the actual pin backend
pub trait DigitalPin: Send + Sync {
    fn write(&self, high: bool) -> Result<(), ControlError>;
    fn read(&self) -> Result<bool, ControlError>;
}

/// In-memory pin for tests and simulated deployments
#[derive(Default)]
pub struct MemoryPin {
    high: AtomicBool,
}

impl MemoryPin {
    pub fn new(starting_state: bool) -> Self {
        Self { high: AtomicBool::new(starting_state) }
    }
}

impl DigitalPin for MemoryPin {
    fn write(&self, high: bool) -> Result<(), ControlError> {
        self.high.store(high, Ordering::SeqCst);
        Ok(())
    }

    fn read(&self) -> Result<bool, ControlError> {
        Ok(self.high.load(Ordering::SeqCst))
    }
}

/// Sysfs-backed GPIO pin: writes "1"/"0" to the exported value file
pub struct SysfsPin {
    value_path: PathBuf,
}

impl SysfsPin {
    pub fn new(value_path: impl Into<PathBuf>) -> Self {
        Self { value_path: value_path.into() }
    }
}

impl DigitalPin for SysfsPin {
    fn write(&self, high: bool) -> Result<(), ControlError> {
        std::fs::write(&self.value_path, if high { "1" } else { "0" })
            .map_err(|e| ControlError::Device(format!("gpio write {:?}: {}", self.value_path, e)))
    }

    fn read(&self) -> Result<bool, ControlError> {
        let raw = std::fs::read_to_string(&self.value_path)
            .map_err(|e| ControlError::Device(format!("gpio read {:?}: {}", self.value_path, e)))?;
        Ok(raw.trim() == "1")
    }
}

/// Controls a 220v relay switch connected to a digital pin
pub struct RelaySwitch {
    name: String,
    pin: Box<dyn DigitalPin>,
}

impl RelaySwitch {
    pub fn new(name: &str, starting_state: bool, pin: Box<dyn DigitalPin>) -> Self {
        let relay = Self { name: name.to_string(), pin };
        if let Err(e) = relay.pin.write(starting_state) {
            tracing::warn!("unable to apply starting state to relay {}: {}", relay.name, e);
        }
        relay
    }
}

impl Switchable for RelaySwitch {
    fn set(&self, on: bool) -> Result<(), ControlError> {
        info!("turning \"{}\" {}", self.name, if on { "on" } else { "off" });
        self.pin.write(on).map_err(|e| {
            ControlError::Device(format!("unable to set relay {}: {}", self.name, e))
        })
    }

    fn get_state(&self) -> Result<bool, ControlError> {
        self.pin.read()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relay_applies_starting_state() {
        let relay = RelaySwitch::new("pump1", true, Box::new(MemoryPin::default()));
        assert_eq!(relay.get_state().unwrap(), true);
    }

    #[test]
    fn test_relay_set_round_trip() {
        let relay = RelaySwitch::new("pump1", false, Box::new(MemoryPin::default()));
        relay.set(true).unwrap();
        assert_eq!(relay.get_state().unwrap(), true);
        relay.set(false).unwrap();
        assert_eq!(relay.get_state().unwrap(), false);
    }

    #[test]
    fn test_sysfs_pin_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let value_path = dir.path().join("value");
        std::fs::write(&value_path, "0").unwrap();

        let pin = SysfsPin::new(&value_path);
        pin.write(true).unwrap();
        assert_eq!(pin.read().unwrap(), true);
        assert_eq!(std::fs::read_to_string(&value_path).unwrap(), "1");
    }

    #[test]
    fn test_sysfs_pin_missing_file_is_device_error() {
        let pin = SysfsPin::new("/nonexistent/gpio/value");
        assert!(matches!(pin.read(), Err(ControlError::Device(_))));
    }
}
