use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ControllerConfig {
    /// Identifiants de déploiement (un canal chat par nœud)
    pub deployments: Vec<String>,
    /// Nick du contrôleur sur le canal chat
    pub nickname: String,
    pub mqtt: Option<MqttConf>,
    pub influx: Option<InfluxConf>,
    pub error_sink: Option<ErrorSinkConf>,
    /// Programme démarré d'office sur chaque déploiement, ex: "thermostathold,73"
    pub default_program: Option<String>,
    pub stat_interval_secs: Option<u64>,
    pub http_port: Option<u16>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MqttConf {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct InfluxConf {
    pub url: String,
    pub org: String,
    pub bucket: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ErrorSinkConf {
    pub url: String,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            deployments: Vec::new(),
            nickname: "control_bot".into(),
            mqtt: Some(MqttConf { host: "localhost".into(), port: 1883 }),
            influx: None,
            error_sink: None,
            default_program: None,
            stat_interval_secs: None,
            http_port: None,
        }
    }
}

impl ControllerConfig {
    /// Intervalle de la boucle de stats, surchargable par l'environnement
    pub fn stat_interval_secs(&self) -> u64 {
        std::env::var("STAT_WRITER_INTERVAL_SEC")
            .ok()
            .and_then(|v| v.parse().ok())
            .or(self.stat_interval_secs)
            .unwrap_or(2)
    }
}

pub async fn load_config() -> ControllerConfig {
    let path = std::env::var("CALDERA_CONTROLLER_CONFIG").unwrap_or_else(|_| "controller.yaml".into());
    if Path::new(&path).exists() {
        let txt = fs::read_to_string(&path).await.unwrap_or_default();
        if txt.trim().is_empty() {
            return ControllerConfig::default();
        }
        serde_yaml::from_str(&txt).unwrap_or_else(|e| {
            eprintln!("[controller] config invalide: {e}");
            ControllerConfig::default()
        })
    } else {
        eprintln!("[controller] pas de controller.yaml, usage config par défaut");
        ControllerConfig::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yaml_round_trip() {
        let yaml = r#"
deployments: ["node1", "node2"]
nickname: control_bot
mqtt:
  host: broker.local
  port: 1883
default_program: "thermostathold,73"
"#;
        let cfg: ControllerConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.deployments, vec!["node1", "node2"]);
        assert_eq!(cfg.mqtt.unwrap().host, "broker.local");
        assert_eq!(cfg.default_program.as_deref(), Some("thermostathold,73"));
    }

    #[test]
    fn test_defaults_when_fields_absent() {
        let cfg: ControllerConfig = serde_yaml::from_str("deployments: []\nnickname: c").unwrap();
        assert!(cfg.influx.is_none());
        assert_eq!(cfg.stat_interval_secs(), 2);
    }
}
