//! Configuration management for Helios
//!
//! This module handles loading, validation, and management of the controller
//! configuration from YAML files: meters, chargers, load points, the MQTT
//! broker and the control/observation cadence.

use crate::api::ChargeMode;
use crate::error::{HeliosError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

mod defaults;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Logging configuration
    pub logging: LoggingConfig,

    /// MQTT broker, required when any provider uses `type: mqtt`
    pub mqtt: Option<MqttConfig>,

    /// Configured meters, referenced by name from load points
    pub meters: Vec<MeterConfig>,

    /// Configured chargers, referenced by name from load points
    pub chargers: Vec<ChargerConfig>,

    /// Load points to control
    pub loadpoints: Vec<LoadPointConfig>,

    /// Control tick interval in milliseconds
    pub update_interval_ms: u64,

    /// Observation tick interval in milliseconds
    pub observe_interval_ms: u64,

    /// Deadline applied to every single provider/setter call in milliseconds
    pub call_timeout_ms: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    pub level: String,

    /// Directory or file path for the rolling log file; console only when unset
    pub file: Option<String>,

    /// Number of rotated files to keep
    pub backup_count: u32,

    /// Whether to log to console
    pub console_output: bool,

    /// Whether to use JSON format
    pub json_format: bool,
}

/// MQTT broker connection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttConfig {
    /// Broker host name or address
    pub broker: String,

    /// Broker TCP port
    #[serde(default = "default_mqtt_port")]
    pub port: u16,

    #[serde(default)]
    pub user: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    /// Client id; derived from the process id when unset
    #[serde(default)]
    pub client_id: Option<String>,
}

fn default_mqtt_port() -> u16 {
    1883
}

/// Source of a single typed value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProviderConfig {
    /// External command; setters substitute `${param}` placeholders
    #[serde(alias = "script")]
    Exec { cmd: String },

    /// Cached MQTT topic value
    Mqtt {
        topic: String,
        /// Staleness window in milliseconds
        #[serde(default)]
        timeout_ms: Option<u64>,
    },
}

impl ProviderConfig {
    /// Whether this provider needs the MQTT client
    pub fn uses_mqtt(&self) -> bool {
        matches!(self, ProviderConfig::Mqtt { .. })
    }
}

/// Meter definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeterConfig {
    pub name: String,

    /// Instantaneous power in W
    pub power: ProviderConfig,

    /// Optional cumulative energy in kWh
    #[serde(default)]
    pub energy: Option<ProviderConfig>,
}

/// Charger definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChargerConfig {
    pub name: String,

    #[serde(flatten)]
    pub kind: ChargerKind,
}

/// Charger implementation selector
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ChargerKind {
    /// Charger assembled from individual providers and setters
    Configurable {
        status: ProviderConfig,
        enabled: ProviderConfig,
        enable: ProviderConfig,
        actual_current: ProviderConfig,
        /// Optional current control; without it only `now`/`off` modes apply
        #[serde(default)]
        max_current: Option<ProviderConfig>,
    },

    /// Wallbe charger over Modbus TCP
    Wallbe { uri: String },
}

/// Load point definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadPointConfig {
    pub name: String,

    /// Charger name
    pub charger: String,

    #[serde(default)]
    pub grid_meter: Option<String>,

    #[serde(default)]
    pub pv_meter: Option<String>,

    #[serde(default)]
    pub charge_meter: Option<String>,

    #[serde(default)]
    pub mode: ChargeMode,

    /// PV mode: start current; MinPV mode: guaranteed current
    #[serde(default = "default_min_current")]
    pub min_current: i64,

    #[serde(default = "default_max_current")]
    pub max_current: i64,

    #[serde(default = "default_voltage")]
    pub voltage: f64,

    #[serde(default = "default_phases")]
    pub phases: f64,
}

fn default_min_current() -> i64 {
    5
}

fn default_max_current() -> i64 {
    16
}

fn default_voltage() -> f64 {
    230.0
}

fn default_phases() -> f64 {
    1.0
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from the first default location that exists
    pub fn load() -> Result<Self> {
        let default_paths = ["helios.yaml", "/data/helios.yaml", "/etc/helios/config.yaml"];

        for path in &default_paths {
            if Path::new(path).exists() {
                return Self::from_file(path);
            }
        }

        // Fall back to default configuration
        Ok(Config::default())
    }

    /// Save configuration to a YAML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Whether any meter or charger reads from MQTT
    pub fn uses_mqtt(&self) -> bool {
        let meters = self.meters.iter().any(|m| {
            m.power.uses_mqtt() || m.energy.as_ref().is_some_and(ProviderConfig::uses_mqtt)
        });
        let chargers = self.chargers.iter().any(|c| match &c.kind {
            ChargerKind::Configurable {
                status,
                enabled,
                enable,
                actual_current,
                max_current,
            } => {
                [status, enabled, enable, actual_current]
                    .iter()
                    .any(|p| p.uses_mqtt())
                    || max_current.as_ref().is_some_and(ProviderConfig::uses_mqtt)
            }
            ChargerKind::Wallbe { .. } => false,
        });
        meters || chargers
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.update_interval_ms == 0 {
            return Err(HeliosError::validation(
                "update_interval_ms",
                "Must be greater than 0",
            ));
        }
        if self.observe_interval_ms == 0 {
            return Err(HeliosError::validation(
                "observe_interval_ms",
                "Must be greater than 0",
            ));
        }
        if self.call_timeout_ms == 0 {
            return Err(HeliosError::validation(
                "call_timeout_ms",
                "Must be greater than 0",
            ));
        }

        let meter_names = unique_names("meters", self.meters.iter().map(|m| m.name.as_str()))?;
        let charger_names =
            unique_names("chargers", self.chargers.iter().map(|c| c.name.as_str()))?;
        unique_names("loadpoints", self.loadpoints.iter().map(|l| l.name.as_str()))?;

        for charger in &self.chargers {
            if let ChargerKind::Wallbe { uri } = &charger.kind
                && uri.trim().is_empty()
            {
                return Err(HeliosError::validation(
                    format!("chargers.{}.uri", charger.name),
                    "Wallbe charger requires a Modbus address".to_string(),
                ));
            }
        }

        for lp in &self.loadpoints {
            let field = |name: &str| format!("loadpoints.{}.{}", lp.name, name);

            if !charger_names.contains(lp.charger.as_str()) {
                return Err(HeliosError::validation(
                    field("charger"),
                    format!("Unknown charger '{}'", lp.charger),
                ));
            }
            for (key, meter) in [
                ("grid_meter", &lp.grid_meter),
                ("pv_meter", &lp.pv_meter),
                ("charge_meter", &lp.charge_meter),
            ] {
                if let Some(meter) = meter
                    && !meter_names.contains(meter.as_str())
                {
                    return Err(HeliosError::validation(
                        field(key),
                        format!("Unknown meter '{}'", meter),
                    ));
                }
            }
            if lp.min_current <= 0 {
                return Err(HeliosError::validation(
                    field("min_current"),
                    "Must be positive".to_string(),
                ));
            }
            if lp.max_current < lp.min_current {
                return Err(HeliosError::validation(
                    field("max_current"),
                    "Must not be below min_current".to_string(),
                ));
            }
            if lp.voltage <= 0.0 || !lp.voltage.is_finite() {
                return Err(HeliosError::validation(
                    field("voltage"),
                    "Must be positive".to_string(),
                ));
            }
            if ![1.0, 2.0, 3.0].contains(&lp.phases) {
                return Err(HeliosError::validation(
                    field("phases"),
                    "Must be 1, 2 or 3".to_string(),
                ));
            }
        }

        if self.mqtt.is_none() && self.uses_mqtt() {
            return Err(HeliosError::validation(
                "mqtt",
                "Broker configuration required by mqtt providers",
            ));
        }

        Ok(())
    }
}

fn unique_names<'a>(
    section: &str,
    names: impl Iterator<Item = &'a str>,
) -> Result<HashSet<&'a str>> {
    let mut seen = HashSet::new();
    for name in names {
        if name.trim().is_empty() {
            return Err(HeliosError::validation(
                section.to_string(),
                "Name cannot be empty".to_string(),
            ));
        }
        if !seen.insert(name) {
            return Err(HeliosError::validation(
                section.to_string(),
                format!("Duplicate name '{}'", name),
            ));
        }
    }
    Ok(seen)
}
