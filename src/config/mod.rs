use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_yml;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::metering_p1::dispatch::{GasMode, MeasurementNames};
use crate::registry::RegistryConfig;

/// Searched in this order when no path is given
pub const CONFIG_PATHS: [&str; 2] = ["config/metertrekker.yaml", "metertrekker.yaml"];

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("No configuration found, looked at {0:?}")]
    NotFound(Vec<String>),
    #[error("Unable to read {}: {source}", path.display())]
    Io { path: PathBuf, source: std::io::Error },
    #[error("Unable to parse configuration: {0}")]
    Parse(#[from] serde_yml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

fn mqtt_port_default() -> u16 { return 1883 }
fn mqtt_client_name_default() -> String { return "Metertrekker".to_string() }
fn mqtt_unique_client_id_default() -> bool { return true }
fn mqtt_topic_root_default() -> String { return "my_mqtt_root".to_string() }
fn mqtt_notify_topic_default() -> String { return "/debug/node_connect".to_string() }

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct MqttConfig {
    pub host: String,
    #[serde(default="mqtt_port_default")]
    pub port: u16,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub pass: String,
    #[serde(default="mqtt_client_name_default")]
    pub client_name: String,
    /// Appends a random suffix to the client name
    #[serde(default="mqtt_unique_client_id_default")]
    pub unique_client_id: bool,
    #[serde(default="mqtt_topic_root_default")]
    pub topic_root: String,
    /// Connection status messages go here, below the topic root
    #[serde(default="mqtt_notify_topic_default")]
    pub notify_topic: String,
}

fn influx_enabled_default() -> bool { return true }
fn influx_topic_default() -> String { return "/energy/influx".to_string() }
fn influx_electricity_default() -> String { return "electricity".to_string() }
fn influx_gas_default() -> String { return "gas".to_string() }
fn influx_gas_mode_default() -> GasMode { return GasMode::Tag }

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct InfluxConfig {
    #[serde(default="influx_enabled_default")]
    pub enabled: bool,
    /// MQTT topic below the topic root the line protocol records are sent to
    #[serde(default="influx_topic_default")]
    pub topic: String,
    #[serde(default="influx_electricity_default")]
    pub electricity_measurement: String,
    #[serde(default="influx_gas_default")]
    pub gas_measurement: String,
    #[serde(default="influx_gas_mode_default")]
    pub gas_mode: GasMode,
}

impl InfluxConfig {
    pub fn measurement_names(&self) -> MeasurementNames {
        MeasurementNames {
            electricity: self.electricity_measurement.clone(),
            gas: self.gas_measurement.clone(),
            gas_mode: self.gas_mode,
        }
    }
}

fn telegram_source_default() -> String { return "/dev/ttyUSB0".to_string() }
fn telegram_interval_default() -> u64 { return 15 }
fn telegram_verify_crc_default() -> bool { return true }

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct TelegramConfig {
    /// Device or file to read telegrams from, `-` for stdin
    #[serde(default="telegram_source_default")]
    pub source: String,
    /// Seconds between two telegram requests
    #[serde(default="telegram_interval_default")]
    pub interval: u64,
    /// Seconds to wait for a telegram, defaults to the interval
    #[serde(default)]
    pub timeout: Option<u64>,
    #[serde(default="telegram_verify_crc_default")]
    pub verify_crc: bool,
}

impl TelegramConfig {
    pub fn timeout(&self) -> u64 {
        self.timeout.unwrap_or(self.interval)
    }
}

fn influx_default() -> InfluxConfig {
    return InfluxConfig {
        enabled: influx_enabled_default(),
        topic: influx_topic_default(),
        electricity_measurement: influx_electricity_default(),
        gas_measurement: influx_gas_default(),
        gas_mode: influx_gas_mode_default(),
    }
}
fn telegram_default() -> TelegramConfig {
    return TelegramConfig {
        source: telegram_source_default(),
        interval: telegram_interval_default(),
        timeout: None,
        verify_crc: telegram_verify_crc_default(),
    }
}

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct Config {
    pub mqtt: MqttConfig,
    #[serde(default="influx_default")]
    pub influx: InfluxConfig,
    #[serde(default="telegram_default")]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub metrics: RegistryConfig,
}

impl Config {
    /// Loads the given file, or the first existing one of `CONFIG_PATHS`
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => CONFIG_PATHS.iter()
                .map(PathBuf::from)
                .find(|p| p.exists())
                .ok_or_else(|| ConfigError::NotFound(CONFIG_PATHS.iter().map(|p| p.to_string()).collect()))?,
        };

        debug!("Reading configuration from {}", path.display());
        let contents = fs::read_to_string(&path)
            .map_err(|source| ConfigError::Io { path: path.clone(), source })?;
        let config = Self::parse(&contents)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.telegram.interval == 0 {
            return Err(ConfigError::Invalid("telegram.interval must be at least one second".to_string()));
        }
        if self.telegram.timeout() == 0 {
            return Err(ConfigError::Invalid("telegram.timeout must be at least one second".to_string()));
        }
        for (name, topic) in [("mqtt.notify_topic", &self.mqtt.notify_topic), ("influx.topic", &self.influx.topic)] {
            if !topic.starts_with('/') {
                return Err(ConfigError::Invalid(format!("{} has to start with '/'", name)));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Capability, MetricKind};
    use std::io::Write;

    const MINIMAL: &str = "mqtt:\n  host: 192.168.1.10\n";

    #[test]
    fn test_defaults() {
        let config = Config::parse(MINIMAL).unwrap();
        assert_eq!(config.mqtt.host, "192.168.1.10");
        assert_eq!(config.mqtt.port, 1883);
        assert_eq!(config.mqtt.client_name, "Metertrekker");
        assert_eq!(config.mqtt.topic_root, "my_mqtt_root");
        assert_eq!(config.mqtt.notify_topic, "/debug/node_connect");
        assert!(config.influx.enabled);
        assert_eq!(config.influx.topic, "/energy/influx");
        assert_eq!(config.influx.gas_mode, GasMode::Tag);
        assert_eq!(config.telegram.interval, 15);
        assert_eq!(config.telegram.timeout(), 15);
        assert!(config.telegram.verify_crc);
        assert_eq!(config.metrics, RegistryConfig::default());
    }

    #[test]
    fn test_full_config() {
        let yaml = r#"
mqtt:
  host: broker
  port: 8883
  user: meter
  pass: secret
  topic_root: home
influx:
  electricity_measurement: power
  gas_mode: replace
telegram:
  source: "-"
  interval: 10
  timeout: 30
  verify_crc: false
metrics:
  capabilities: [three_phase, gas]
  disabled: ["1-0:99.97.0"]
  extra:
    - identifier: "1-0:14.7.0"
      kind: FLOAT
      storage_column: frequency
      publish_path: /energy/mains/frequency
      label: frequency
"#;
        let config = Config::parse(yaml).unwrap();
        assert_eq!(config.mqtt.port, 8883);
        assert_eq!(config.telegram.timeout(), 30);
        assert_eq!(config.telegram.source, "-");
        assert_eq!(config.influx.measurement_names().electricity, "power");
        assert_eq!(config.influx.measurement_names().gas, "gas");
        assert_eq!(config.influx.gas_mode, GasMode::Replace);
        assert_eq!(config.metrics.capabilities, vec![Capability::ThreePhase, Capability::Gas]);
        assert_eq!(config.metrics.disabled, vec!["1-0:99.97.0".to_string()]);
        assert_eq!(config.metrics.extra[0].kind, MetricKind::Float);
    }

    #[test]
    fn test_invalid_configs() {
        assert!(matches!(Config::parse("influx:\n  enabled: true\n"), Err(ConfigError::Parse(_))));
        assert!(matches!(Config::parse("mqtt:\n  host: a\nmetrics:\n  capabilities: [four_phase]\n"),
                         Err(ConfigError::Parse(_))));
        assert!(matches!(Config::parse("mqtt:\n  host: a\ntelegram:\n  interval: 0\n"),
                         Err(ConfigError::Invalid(_))));
        assert!(matches!(Config::parse("mqtt:\n  host: a\ninflux:\n  topic: energy\n"),
                         Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_load_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(MINIMAL.as_bytes()).unwrap();

        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.mqtt.host, "192.168.1.10");

        let missing = file.path().with_extension("missing");
        assert!(matches!(Config::load(Some(&missing)), Err(ConfigError::Io { .. })));
    }
}
