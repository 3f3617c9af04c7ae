//! Device capability contracts for Caldera nodes
//!
//! Every physical actuator or sensor on a node satisfies exactly one of
//! these capability traits. The registry only ever talks through them, so
//! tests can substitute memory-backed fakes for real hardware.

mod flow;
mod relay;
mod thermistor;

pub use flow::FlowSensor;
pub use relay::{DigitalPin, MemoryPin, RelaySwitch, SysfsPin};
pub use thermistor::Thermistor;

use caldera_core::ControlError;

/// Binary output device (relay, pump contactor)
pub trait Switchable: Send + Sync {
    fn set(&self, on: bool) -> Result<(), ControlError>;
    fn get_state(&self) -> Result<bool, ControlError>;
}

/// Scalar sensor device (thermistor, flow meter)
pub trait Readable: Send + Sync {
    fn read(&self) -> Result<f64, ControlError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FleetAction {
    Start,
    Stop,
}

impl FleetAction {
    pub fn parse(raw: &str) -> Result<Self, ControlError> {
        match raw {
            "start" | "start_mining" | "true" | "1" => Ok(Self::Start),
            "stop" | "stop_mining" | "false" | "0" => Ok(Self::Stop),
            other => Err(ControlError::InvalidProtocol(format!(
                "unknown fleet action \"{}\"",
                other
            ))),
        }
    }
}

/// Per-host outcome of a fleet command
#[derive(Debug, Clone, serde::Serialize)]
pub struct FleetResult {
    pub host: String,
    pub ok: bool,
    pub code: i32,
    pub message: String,
}

/// Remote fleet controllable as one logical device
pub trait FleetControllable: Send + Sync {
    fn command(
        &self,
        action: FleetAction,
        targets: Option<&[String]>,
    ) -> Result<Vec<FleetResult>, ControlError>;

    /// Thermal snapshot, hostname -> board slot -> {"board": °C, "chip": °C}
    fn temperatures(
        &self,
        targets: Option<&[String]>,
    ) -> Result<serde_json::Map<String, serde_json::Value>, ControlError>;
}

/// A named device handle, polymorphic over its capability set.
/// Owned exclusively by the registry; created once at process start.
pub enum Device {
    Switch(Box<dyn Switchable>),
    Sensor(Box<dyn Readable>),
    Fleet(Box<dyn FleetControllable>),
}

/// Accepted on/off vocabulary for change commands
pub fn parse_switch_value(raw: &str) -> Result<bool, ControlError> {
    match raw {
        "on" | "true" | "1" | "turn on" => Ok(true),
        "off" | "false" | "0" | "turn off" => Ok(false),
        other => Err(ControlError::InvalidProtocol(format!(
            "unknown switch value \"{}\"",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_switch_value_vocabulary() {
        assert_eq!(parse_switch_value("on").unwrap(), true);
        assert_eq!(parse_switch_value("1").unwrap(), true);
        assert_eq!(parse_switch_value("off").unwrap(), false);
        assert_eq!(parse_switch_value("false").unwrap(), false);
        assert!(parse_switch_value("maybe").is_err());
    }

    #[test]
    fn test_fleet_action_parse() {
        assert_eq!(FleetAction::parse("start").unwrap(), FleetAction::Start);
        assert_eq!(FleetAction::parse("stop_mining").unwrap(), FleetAction::Stop);
        assert!(FleetAction::parse("reboot").is_err());
    }
}
