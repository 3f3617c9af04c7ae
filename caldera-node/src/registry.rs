//! Device registry - uniform dispatch over capability-typed devices
//!
//! Built once at startup from static configuration, immutable afterwards.
//! The registry is pure dispatch: every side effect lives in the device
//! implementations, and every failure comes back as a structured error.

use crate::devices::{
    parse_switch_value, Device, FleetAction, FleetControllable, FleetResult, Readable, Switchable,
};
use caldera_core::ControlError;
use serde_json::Value;
use std::collections::HashMap;
use tracing::warn;

/// The only function name the registry fans out to fleet devices
pub const FLEET_FUNCTION: &str = "miner";

pub struct DeviceRegistry {
    devices: HashMap<String, Device>,
}

impl DeviceRegistry {
    pub fn new(devices: HashMap<String, Device>) -> Self {
        Self { devices }
    }

    pub fn get(&self, name: &str) -> Option<&Device> {
        self.devices.get(name)
    }

    pub fn device_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.devices.keys().cloned().collect();
        names.sort();
        names
    }

    /// cmd::chng dispatch: look the device up, coerce the value, set it
    pub fn dispatch_change(&self, name: &str, raw_value: &str) -> Result<(), ControlError> {
        let device = self
            .devices
            .get(name)
            .ok_or_else(|| ControlError::DeviceNotFound(format!("device {} not found", name)))?;
        match device {
            Device::Switch(switch) => {
                let on = parse_switch_value(raw_value)?;
                switch.set(on)
            }
            _ => Err(ControlError::Device(format!(
                "device {} does not accept state changes",
                name
            ))),
        }
    }

    /// cmd::func dispatch: fan the action out to every fleet device
    pub fn dispatch_function(
        &self,
        function_name: &str,
        params: &[String],
    ) -> Result<Vec<FleetResult>, ControlError> {
        if function_name != FLEET_FUNCTION {
            return Err(ControlError::DeviceNotFound(format!(
                "no device provides function \"{}\"",
                function_name
            )));
        }
        let action = FleetAction::parse(params.first().map(String::as_str).unwrap_or_default())?;
        let targets: Vec<String> = params.iter().skip(1).cloned().collect();
        let targets = if targets.is_empty() { None } else { Some(targets.as_slice()) };

        let mut results = Vec::new();
        let mut fleet_seen = false;
        for device in self.devices.values() {
            if let Device::Fleet(fleet) = device {
                fleet_seen = true;
                results.extend(fleet.command(action, targets)?);
            }
        }
        if !fleet_seen {
            return Err(ControlError::DeviceNotFound(
                "no miner fleet device registered".to_string(),
            ));
        }
        Ok(results)
    }

    /// Flat stats snapshot: one numeric field per sensor, one boolean per
    /// switch state. A device that fails to read is skipped with a warning
    /// rather than poisoning the whole snapshot.
    pub fn stats_snapshot(&self) -> serde_json::Map<String, Value> {
        let mut snapshot = serde_json::Map::new();
        for (name, device) in &self.devices {
            match device {
                Device::Sensor(sensor) => match sensor.read() {
                    Ok(value) => {
                        snapshot.insert(name.clone(), Value::from(value));
                    }
                    Err(e) => warn!("unable to read {}: {}", name, e),
                },
                Device::Switch(switch) => match switch.get_state() {
                    Ok(state) => {
                        snapshot.insert(name.clone(), Value::Bool(state));
                    }
                    Err(e) => warn!("unable to read state of {}: {}", name, e),
                },
                Device::Fleet(_) => {}
            }
        }
        snapshot
    }

    pub fn has_fleet(&self) -> bool {
        self.devices
            .values()
            .any(|device| matches!(device, Device::Fleet(_)))
    }

    /// Merged thermal snapshot of every fleet device; None without a fleet
    pub fn fleet_temperatures(
        &self,
    ) -> Option<Result<serde_json::Map<String, Value>, ControlError>> {
        let mut merged = serde_json::Map::new();
        let mut fleet_seen = false;
        for device in self.devices.values() {
            if let Device::Fleet(fleet) = device {
                fleet_seen = true;
                match fleet.temperatures(None) {
                    Ok(temps) => merged.extend(temps),
                    Err(e) => return Some(Err(e)),
                }
            }
        }
        if fleet_seen {
            Some(Ok(merged))
        } else {
            None
        }
    }
}
