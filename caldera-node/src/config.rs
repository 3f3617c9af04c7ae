//! Node configuration
//!
//! Loaded from a TOML file (CALDERA_NODE_CONFIG, default node.toml) with
//! environment overrides for the broker address. Devices are declared
//! statically; the registry is built once from this at process start.

use crate::devices::{Device, FlowSensor, MemoryPin, RelaySwitch, SysfsPin, Thermistor};
use crate::fleet::{BosClient, FleetHost, MinerFleet, DEFAULT_API_PORT};
use crate::registry::DeviceRegistry;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone, Deserialize)]
pub struct NodeConfig {
    /// Deployment identity; doubles as the chat channel name
    pub deployment_id: String,
    #[serde(default)]
    pub mqtt: MqttConf,
    pub influx: Option<InfluxConf>,
    pub error_sink: Option<ErrorSinkConf>,
    #[serde(default = "default_stat_interval")]
    pub stat_interval_secs: u64,
    #[serde(default)]
    pub devices: Vec<DeviceConf>,
}

fn default_stat_interval() -> u64 {
    6
}

#[derive(Debug, Clone, Deserialize)]
pub struct MqttConf {
    pub host: String,
    pub port: u16,
}

impl Default for MqttConf {
    fn default() -> Self {
        Self { host: "localhost".into(), port: 1883 }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct InfluxConf {
    pub url: String,
    pub org: String,
    pub bucket: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorSinkConf {
    pub url: String,
}

/// One device declaration; `kind` picks the backend
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind")]
pub enum DeviceConf {
    #[serde(rename = "relay")]
    Relay {
        name: String,
        #[serde(default)]
        starting_state: bool,
        /// sysfs value file; memory-backed pin when absent (simulation)
        gpio_value_path: Option<String>,
    },
    #[serde(rename = "thermistor")]
    Thermistor { name: String, probe_path: String },
    #[serde(rename = "flow")]
    Flow {
        name: String,
        #[serde(default = "default_flow_bucket")]
        bucket_interval_secs: u64,
        #[serde(default = "default_flow_lookback")]
        lookback_buckets: usize,
    },
    #[serde(rename = "miner_fleet")]
    MinerFleet {
        name: String,
        hosts: Vec<String>,
        port: Option<u16>,
    },
}

fn default_flow_bucket() -> u64 {
    10
}

fn default_flow_lookback() -> usize {
    3
}

pub fn load_config() -> Result<NodeConfig> {
    let path = std::env::var("CALDERA_NODE_CONFIG").unwrap_or_else(|_| "node.toml".into());
    let raw = std::fs::read_to_string(Path::new(&path))
        .with_context(|| format!("unable to read node config {}", path))?;
    let mut config: NodeConfig = toml::from_str(&raw).context("invalid node config")?;

    if let Ok(host) = std::env::var("CALDERA_MQTT_HOST") {
        config.mqtt.host = host;
    }
    if let Ok(port) = std::env::var("CALDERA_MQTT_PORT") {
        config.mqtt.port = port.parse().context("CALDERA_MQTT_PORT is not a port")?;
    }
    Ok(config)
}

/// Build the immutable registry from the declared devices
pub fn build_registry(config: &NodeConfig) -> DeviceRegistry {
    let mut devices: HashMap<String, Device> = HashMap::new();
    for conf in &config.devices {
        match conf {
            DeviceConf::Relay { name, starting_state, gpio_value_path } => {
                let pin: Box<dyn crate::devices::DigitalPin> = match gpio_value_path {
                    Some(path) => Box::new(SysfsPin::new(path)),
                    None => Box::new(MemoryPin::new(*starting_state)),
                };
                info!("registering relay \"{}\"", name);
                devices.insert(
                    name.clone(),
                    Device::Switch(Box::new(RelaySwitch::new(name, *starting_state, pin))),
                );
            }
            DeviceConf::Thermistor { name, probe_path } => {
                info!("registering thermistor \"{}\"", name);
                devices.insert(name.clone(), Device::Sensor(Box::new(Thermistor::new(name, probe_path))));
            }
            DeviceConf::Flow { name, bucket_interval_secs, lookback_buckets } => {
                info!("registering flow sensor \"{}\"", name);
                devices.insert(
                    name.clone(),
                    Device::Sensor(Box::new(FlowSensor::new(name, *bucket_interval_secs, *lookback_buckets))),
                );
            }
            DeviceConf::MinerFleet { name, hosts, port } => {
                let port = port.unwrap_or(DEFAULT_API_PORT);
                let fleet_hosts = hosts
                    .iter()
                    .map(|host| FleetHost {
                        hostname: host.clone(),
                        addr: format!("{}:{}", host, port),
                    })
                    .collect();
                info!("registering miner fleet \"{}\" ({} hosts)", name, hosts.len());
                devices.insert(
                    name.clone(),
                    Device::Fleet(Box::new(MinerFleet::new(Box::new(BosClient::new(fleet_hosts))))),
                );
            }
        }
    }
    DeviceRegistry::new(devices)
}
