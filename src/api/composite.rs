use super::{
    ChargeStatus, Charger, Meter, SharedChargeController, SharedCharger, SharedMeter,
    SharedMeterEnergy,
};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Charger assembled from a base implementation and an optional, independently
/// configured charge controller.
///
/// A device that natively does both (e.g. a Modbus wallbox) is attached twice
/// through [`CompositeCharger::controllable`].
#[derive(Clone)]
pub struct CompositeCharger {
    charger: SharedCharger,
    controller: Option<SharedChargeController>,
}

impl CompositeCharger {
    /// Charger without current control
    pub fn new(charger: SharedCharger) -> Self {
        Self {
            charger,
            controller: None,
        }
    }

    /// Single device implementing both capabilities
    pub fn controllable<T>(device: Arc<T>) -> Self
    where
        T: Charger + super::ChargeController + 'static,
    {
        Self {
            charger: device.clone(),
            controller: Some(device),
        }
    }

    /// Attach a charge controller
    pub fn with_controller(mut self, controller: SharedChargeController) -> Self {
        self.controller = Some(controller);
        self
    }

    /// Current-control capability, if the charger has one
    pub fn controller(&self) -> Option<&SharedChargeController> {
        self.controller.as_ref()
    }

    pub fn is_controllable(&self) -> bool {
        self.controller.is_some()
    }
}

#[async_trait]
impl Charger for CompositeCharger {
    async fn status(&self) -> Result<ChargeStatus> {
        self.charger.status().await
    }

    async fn enabled(&self) -> Result<bool> {
        self.charger.enabled().await
    }

    async fn enable(&self, enable: bool) -> Result<()> {
        self.charger.enable(enable).await
    }

    async fn actual_current(&self) -> Result<i64> {
        self.charger.actual_current().await
    }
}

/// Meter with an optional cumulative energy readout
#[derive(Clone)]
pub struct CompositeMeter {
    meter: SharedMeter,
    energy: Option<SharedMeterEnergy>,
}

impl CompositeMeter {
    pub fn new(meter: SharedMeter) -> Self {
        Self {
            meter,
            energy: None,
        }
    }

    pub fn with_energy(mut self, energy: SharedMeterEnergy) -> Self {
        self.energy = Some(energy);
        self
    }

    /// Cumulative energy capability, if the meter has one
    pub fn energy(&self) -> Option<&SharedMeterEnergy> {
        self.energy.as_ref()
    }
}

#[async_trait]
impl Meter for CompositeMeter {
    async fn current_power(&self) -> Result<f64> {
        self.meter.current_power().await
    }
}
