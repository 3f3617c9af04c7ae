//! 1-Wire thermistor probe (DS18B20 family)
//!
//! Reads the kernel's sysfs `temperature` file, which reports millidegrees
//! Celsius as a plain integer. Readings are exposed in Fahrenheit, matching
//! what the phase programs expect in stats snapshots.

use super::Readable;
use caldera_core::{temp, ControlError};
use std::path::PathBuf;

pub struct Thermistor {
    name: String,
    probe_path: PathBuf,
}

impl Thermistor {
    /// `probe_path` points at e.g. /sys/bus/w1/devices/28-xxxx/temperature
    pub fn new(name: &str, probe_path: impl Into<PathBuf>) -> Self {
        Self { name: name.to_string(), probe_path: probe_path.into() }
    }

    fn read_millicelsius(&self) -> Result<i64, ControlError> {
        let raw = std::fs::read_to_string(&self.probe_path).map_err(|e| {
            ControlError::Device(format!("unable to read probe {}: {}", self.name, e))
        })?;
        raw.trim().parse::<i64>().map_err(|e| {
            ControlError::Device(format!("garbled probe reading for {}: {}", self.name, e))
        })
    }
}

impl Readable for Thermistor {
    fn read(&self) -> Result<f64, ControlError> {
        let millicelsius = self.read_millicelsius()?;
        Ok(temp::celsius_to_fahrenheit(millicelsius as f64 / 1000.0))
    }
}
