//! Assembly of meters, chargers and load points from configuration
//!
//! Devices are built once at startup. Every reference from a load point to a
//! meter or charger is resolved here; anything unresolvable is a
//! configuration error, so a running controller never meets a dangling name.

use crate::api::{CompositeCharger, CompositeMeter};
use crate::config::{ChargerConfig, ChargerKind, Config, LoadPointConfig, MeterConfig, ProviderConfig};
use crate::device::{ProviderChargeController, ProviderCharger, ProviderMeter, ProviderMeterEnergy};
use crate::error::{HeliosError, Result};
use crate::loadpoint::{LoadPoint, LoadPointSettings};
use crate::logging::{LogContext, StructuredLogger, get_logger, get_logger_with_context};
use crate::observer::Observer;
use crate::provider::exec::Exec;
use crate::provider::mqtt::MqttClient;
use crate::provider::{
    BoolProvider, BoolSetter, FloatProvider, IntProvider, IntSetter, StringProvider, map_provider,
    truish,
};
use crate::runtime::Runtime;
use crate::wallbe::Wallbe;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Placeholder the `enable` setter template substitutes
pub const ENABLE_PARAM: &str = "enable";
/// Placeholder the `max_current` setter template substitutes
pub const CURRENT_PARAM: &str = "current";

/// Builds devices from their configuration
pub struct Factory<'a> {
    mqtt: Option<&'a MqttClient>,
    call_timeout: Duration,
    logger: StructuredLogger,
}

impl<'a> Factory<'a> {
    pub fn new(mqtt: Option<&'a MqttClient>, call_timeout: Duration) -> Self {
        Self {
            mqtt,
            call_timeout,
            logger: get_logger("setup"),
        }
    }

    fn exec(&self, device: &str, cmd: &str) -> Result<Exec> {
        let logger =
            get_logger_with_context(LogContext::new("exec").with_field("device", device.to_string()));
        Exec::new(cmd, logger)
    }

    fn mqtt(&self, topic: &str) -> Result<&'a MqttClient> {
        self.mqtt.ok_or_else(|| {
            HeliosError::config(format!("mqtt provider for {}: no broker configured", topic))
        })
    }

    async fn float_provider(&self, device: &str, config: &ProviderConfig) -> Result<FloatProvider> {
        match config {
            ProviderConfig::Exec { cmd } => Ok(self.exec(device, cmd)?.float_provider()),
            ProviderConfig::Mqtt { topic, timeout_ms } => {
                self.mqtt(topic)?
                    .float_provider(topic, timeout_ms.map(Duration::from_millis))
                    .await
            }
        }
    }

    async fn int_provider(&self, device: &str, config: &ProviderConfig) -> Result<IntProvider> {
        match config {
            ProviderConfig::Exec { cmd } => Ok(self.exec(device, cmd)?.int_provider()),
            ProviderConfig::Mqtt { topic, timeout_ms } => {
                self.mqtt(topic)?
                    .int_provider(topic, timeout_ms.map(Duration::from_millis))
                    .await
            }
        }
    }

    async fn string_provider(&self, device: &str, config: &ProviderConfig) -> Result<StringProvider> {
        match config {
            ProviderConfig::Exec { cmd } => Ok(self.exec(device, cmd)?.string_provider()),
            ProviderConfig::Mqtt { topic, timeout_ms } => {
                let window = timeout_ms
                    .map(Duration::from_millis)
                    .unwrap_or(crate::provider::cache::DEFAULT_STALENESS);
                let cache = self.mqtt(topic)?.cache::<String>(topic, window).await?;
                Ok(cache.provider())
            }
        }
    }

    async fn bool_provider(&self, device: &str, config: &ProviderConfig) -> Result<BoolProvider> {
        match config {
            ProviderConfig::Exec { cmd } => Ok(self.exec(device, cmd)?.bool_provider()),
            ProviderConfig::Mqtt { .. } => Ok(map_provider(
                self.string_provider(device, config).await?,
                |s: String| Ok(truish(&s)),
            )),
        }
    }

    fn int_setter(&self, device: &str, config: &ProviderConfig, param: &str) -> Result<IntSetter> {
        match config {
            ProviderConfig::Exec { cmd } => Ok(self.exec(device, cmd)?.int_setter(param)),
            ProviderConfig::Mqtt { topic, .. } => Err(read_only(device, topic)),
        }
    }

    fn bool_setter(&self, device: &str, config: &ProviderConfig, param: &str) -> Result<BoolSetter> {
        match config {
            ProviderConfig::Exec { cmd } => Ok(self.exec(device, cmd)?.bool_setter(param)),
            ProviderConfig::Mqtt { topic, .. } => Err(read_only(device, topic)),
        }
    }

    /// Meter with its optional energy readout
    pub async fn meter(&self, config: &MeterConfig) -> Result<CompositeMeter> {
        let power = self.float_provider(&config.name, &config.power).await?;
        let mut meter = CompositeMeter::new(Arc::new(
            ProviderMeter::new(power).with_timeout(self.call_timeout),
        ));
        if let Some(energy) = &config.energy {
            let energy = self.float_provider(&config.name, energy).await?;
            meter = meter.with_energy(Arc::new(
                ProviderMeterEnergy::new(energy).with_timeout(self.call_timeout),
            ));
        }
        Ok(meter)
    }

    /// Charger, with current control when it has any
    pub async fn charger(&self, config: &ChargerConfig) -> Result<CompositeCharger> {
        let name = config.name.as_str();
        match &config.kind {
            ChargerKind::Configurable {
                status,
                enabled,
                enable,
                actual_current,
                max_current,
            } => {
                let charger = ProviderCharger::new(
                    self.string_provider(name, status).await?,
                    self.bool_provider(name, enabled).await?,
                    self.bool_setter(name, enable, ENABLE_PARAM)?,
                    self.int_provider(name, actual_current).await?,
                )
                .with_timeout(self.call_timeout);

                let mut composite = CompositeCharger::new(Arc::new(charger));
                if let Some(max_current) = max_current {
                    let controller =
                        ProviderChargeController::new(self.int_setter(name, max_current, CURRENT_PARAM)?)
                            .with_timeout(self.call_timeout);
                    composite = composite.with_controller(Arc::new(controller));
                }
                Ok(composite)
            }
            ChargerKind::Wallbe { uri } => {
                let logger = get_logger_with_context(
                    LogContext::new("wallbe").with_field("device", name.to_string()),
                );
                let wallbe = Wallbe::new(uri.clone(), logger)?;
                Ok(CompositeCharger::controllable(Arc::new(wallbe)))
            }
        }
    }

    /// Load point bound to already built devices
    pub fn loadpoint(
        &self,
        config: &LoadPointConfig,
        meters: &HashMap<String, CompositeMeter>,
        chargers: &HashMap<String, CompositeCharger>,
    ) -> Result<LoadPoint> {
        let name = config.name.as_str();
        let resolve = |key: &str, reference: &Option<String>| -> Result<Option<CompositeMeter>> {
            reference
                .as_ref()
                .map(|meter| {
                    meters.get(meter).cloned().ok_or_else(|| {
                        HeliosError::config(format!(
                            "loadpoint {}: {} '{}' not found",
                            name, key, meter
                        ))
                    })
                })
                .transpose()
        };

        let charger = chargers.get(&config.charger).cloned().ok_or_else(|| {
            HeliosError::config(format!(
                "loadpoint {}: charger '{}' not found",
                name, config.charger
            ))
        })?;

        let mut lp = LoadPoint::new(name, charger, &get_logger("loadpoint")).with_settings(
            LoadPointSettings {
                min_current: config.min_current,
                max_current: config.max_current,
                voltage: config.voltage,
                phases: config.phases,
            },
        );
        if let Some(meter) = resolve("grid meter", &config.grid_meter)? {
            lp = lp.with_grid_meter(meter);
        }
        if let Some(meter) = resolve("pv meter", &config.pv_meter)? {
            lp = lp.with_pv_meter(meter);
        }
        if let Some(meter) = resolve("charge meter", &config.charge_meter)? {
            lp = lp.with_charge_meter(meter);
        }

        lp.with_mode(config.mode)
            .map_err(|e| HeliosError::config(format!("loadpoint {}: {}", name, e)))
    }

    /// Build every configured load point
    pub async fn loadpoints(&self, config: &Config) -> Result<Vec<Arc<LoadPoint>>> {
        let mut meters = HashMap::new();
        for meter in &config.meters {
            meters.insert(meter.name.clone(), self.meter(meter).await?);
        }

        let mut chargers = HashMap::new();
        for charger in &config.chargers {
            chargers.insert(charger.name.clone(), self.charger(charger).await?);
        }

        let loadpoints = config
            .loadpoints
            .iter()
            .map(|lp| self.loadpoint(lp, &meters, &chargers).map(Arc::new))
            .collect::<Result<Vec<_>>>()?;

        self.logger.info(&format!(
            "Configured {} meter(s), {} charger(s), {} load point(s)",
            meters.len(),
            chargers.len(),
            loadpoints.len()
        ));
        Ok(loadpoints)
    }
}

fn read_only(device: &str, topic: &str) -> HeliosError {
    HeliosError::config(format!(
        "{}: mqtt topic {} cannot be used as a setter",
        device, topic
    ))
}

/// Build the runtime for `config`; `mqtt` must be connected when any provider uses it
pub async fn build_runtime(config: &Config, mqtt: Option<&MqttClient>) -> Result<Runtime> {
    let factory = Factory::new(mqtt, Duration::from_millis(config.call_timeout_ms));
    let loadpoints = factory.loadpoints(config).await?;
    Ok(Runtime::new(
        loadpoints,
        Arc::new(Observer::new(get_logger("observer"))),
        Duration::from_millis(config.update_interval_ms),
        Duration::from_millis(config.observe_interval_ms),
        get_logger("runtime"),
    ))
}
