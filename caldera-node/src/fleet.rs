//! Miner fleet client and fleet device
//!
//! Speaks the CGMiner-compatible TCP JSON API exposed by the ASIC firmware:
//! one JSON command per connection, bounded socket timeouts, and a response
//! whose STATUS block carries the outcome. Start/stop map to pool
//! enable/disable so a single code path covers every fleet command.

use crate::devices::{FleetAction, FleetControllable, FleetResult};
use caldera_core::ControlError;
use serde_json::{json, Value};
use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;
use tracing::{debug, info, warn};

pub const DEFAULT_API_PORT: u16 = 4028;
const DEFAULT_TIMEOUT_SECS: u64 = 3;
const RESPONSE_BUFFER: usize = 8192;

/// Contract consumed by the fleet device; production talks TCP, tests fake it
pub trait FleetClient: Send + Sync {
    fn start(&self, hosts: Option<&[String]>) -> Vec<FleetResult>;
    fn stop(&self, hosts: Option<&[String]>) -> Vec<FleetResult>;
    /// hostname -> board slot -> {"board": °C, "chip": °C}
    fn get_temperatures(
        &self,
        hosts: Option<&[String]>,
    ) -> Result<serde_json::Map<String, Value>, ControlError>;
}

#[derive(Debug, Clone)]
pub struct FleetHost {
    pub hostname: String,
    pub addr: String,
}

/// TCP client for the BraiinsOS / CGMiner JSON API
pub struct BosClient {
    hosts: Vec<FleetHost>,
    timeout: Duration,
}

impl BosClient {
    pub fn new(hosts: Vec<FleetHost>) -> Self {
        Self {
            hosts,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn hosts_to_contact(&self, filter: Option<&[String]>) -> Vec<&FleetHost> {
        self.hosts
            .iter()
            .filter(|host| match filter {
                Some(wanted) => wanted.iter().any(|w| *w == host.hostname),
                None => true,
            })
            .collect()
    }

    /// One JSON command over one connection; never blocks past the timeout
    fn send_command(&self, command: &Value, host: &FleetHost) -> Result<Value, ControlError> {
        let addr = host
            .addr
            .to_socket_addrs()
            .map_err(|e| ControlError::MinerFleet(format!("unresolvable host {}: {}", host.addr, e)))?
            .next()
            .ok_or_else(|| {
                ControlError::MinerFleet(format!("unresolvable host {}", host.addr))
            })?;

        let mut stream = TcpStream::connect_timeout(&addr, self.timeout)
            .map_err(|e| ControlError::MinerFleet(format!("unable to reach {}: {}", host.addr, e)))?;
        stream
            .set_read_timeout(Some(self.timeout))
            .map_err(|e| ControlError::MinerFleet(e.to_string()))?;
        stream
            .set_write_timeout(Some(self.timeout))
            .map_err(|e| ControlError::MinerFleet(e.to_string()))?;

        info!("sending {} to {}", command, host.addr);
        stream
            .write_all(command.to_string().as_bytes())
            .map_err(|e| ControlError::MinerFleet(format!("write to {}: {}", host.addr, e)))?;

        let mut buffer = vec![0u8; RESPONSE_BUFFER];
        let read = stream
            .read(&mut buffer)
            .map_err(|e| ControlError::MinerFleet(format!("no response from {}: {}", host.addr, e)))?;
        let raw = String::from_utf8_lossy(&buffer[..read]);
        // the firmware pads trailing bytes after the closing bracket
        let trimmed = match raw.rfind('}') {
            Some(pos) => &raw[..=pos],
            None => raw.trim_end_matches('\0').trim(),
        };
        debug!("{} produced response: {}", host.addr, trimmed);
        serde_json::from_str(trimmed)
            .map_err(|e| ControlError::MinerFleet(format!("garbled response from {}: {}", host.addr, e)))
    }

    fn pool_command(&self, enable: bool, hosts: Option<&[String]>) -> Vec<FleetResult> {
        let command = json!({
            "command": if enable { "enablepool" } else { "disablepool" },
            "parameter": 0
        });
        let mut results = Vec::new();
        for host in self.hosts_to_contact(hosts) {
            results.push(match self.send_command(&command, host) {
                Ok(response) => interpret_status(&host.hostname, &response),
                Err(e) => {
                    warn!("fleet command failed for {}: {}", host.hostname, e);
                    FleetResult {
                        host: host.hostname.clone(),
                        ok: false,
                        code: -1,
                        message: e.to_string(),
                    }
                }
            });
        }
        results
    }
}

/// Decode the STATUS block of a CGMiner API response
fn interpret_status(hostname: &str, response: &Value) -> FleetResult {
    let status = response
        .get("STATUS")
        .and_then(Value::as_array)
        .and_then(|rows| rows.first());
    match status {
        Some(row) => {
            let letter = row.get("STATUS").and_then(Value::as_str).unwrap_or("E");
            let code = row.get("Code").and_then(Value::as_i64).unwrap_or(-1) as i32;
            let message = row
                .get("Msg")
                .and_then(Value::as_str)
                .unwrap_or("unrecognized response")
                .to_string();
            FleetResult {
                host: hostname.to_string(),
                // 50 = pool already disabled, a no-op rather than a failure
                ok: letter == "S" || code == 50,
                code,
                message,
            }
        }
        None => FleetResult {
            host: hostname.to_string(),
            ok: false,
            code: -1,
            message: "unrecognized error response".to_string(),
        },
    }
}

impl FleetClient for BosClient {
    fn start(&self, hosts: Option<&[String]>) -> Vec<FleetResult> {
        self.pool_command(true, hosts)
    }

    fn stop(&self, hosts: Option<&[String]>) -> Vec<FleetResult> {
        self.pool_command(false, hosts)
    }

    fn get_temperatures(
        &self,
        hosts: Option<&[String]>,
    ) -> Result<serde_json::Map<String, Value>, ControlError> {
        let command = json!({"command": "temps"});
        let mut fleet = serde_json::Map::new();
        for host in self.hosts_to_contact(hosts) {
            let response = self.send_command(&command, host)?;
            let outcome = interpret_status(&host.hostname, &response);
            if !outcome.ok {
                return Err(ControlError::MinerFleet(format!(
                    "{}: {}",
                    host.hostname, outcome.message
                )));
            }
            let mut boards = serde_json::Map::new();
            if let Some(rows) = response.get("TEMPS").and_then(Value::as_array) {
                for row in rows {
                    let id = row.get("ID").and_then(Value::as_i64).unwrap_or(0);
                    boards.insert(
                        format!("board_{}", id),
                        json!({
                            "board": row.get("Board").cloned().unwrap_or(Value::Null),
                            "chip": row.get("Chip").cloned().unwrap_or(Value::Null),
                        }),
                    );
                }
            }
            fleet.insert(host.hostname.clone(), Value::Object(boards));
        }
        Ok(fleet)
    }
}

/// The fleet exposed as one logical registry device
pub struct MinerFleet {
    client: Box<dyn FleetClient>,
}

impl MinerFleet {
    pub fn new(client: Box<dyn FleetClient>) -> Self {
        Self { client }
    }
}

impl FleetControllable for MinerFleet {
    fn command(
        &self,
        action: FleetAction,
        targets: Option<&[String]>,
    ) -> Result<Vec<FleetResult>, ControlError> {
        let results = match action {
            FleetAction::Start => self.client.start(targets),
            FleetAction::Stop => self.client.stop(targets),
        };
        Ok(results)
    }

    fn temperatures(
        &self,
        targets: Option<&[String]>,
    ) -> Result<serde_json::Map<String, Value>, ControlError> {
        self.client.get_temperatures(targets)
    }
}
