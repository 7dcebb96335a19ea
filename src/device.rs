//! Capability implementations over providers and setters
//!
//! Each wrapper derives a fresh [`CallContext`] per call and bounds the
//! provider future with it, so a hung backend surfaces as a timeout instead
//! of stalling the control loop.

use crate::api::{ChargeController, ChargeStatus, Charger, Meter, MeterEnergy};
use crate::error::Result;
use crate::provider::{
    BoolProvider, BoolSetter, CallContext, DEFAULT_CALL_TIMEOUT, FloatProvider, IntProvider,
    IntSetter, StringProvider,
};
use async_trait::async_trait;
use std::time::Duration;

/// Charger assembled from individual providers
pub struct ProviderCharger {
    status: StringProvider,
    enabled: BoolProvider,
    enable: BoolSetter,
    actual_current: IntProvider,
    timeout: Duration,
}

impl ProviderCharger {
    pub fn new(
        status: StringProvider,
        enabled: BoolProvider,
        enable: BoolSetter,
        actual_current: IntProvider,
    ) -> Self {
        Self {
            status,
            enabled,
            enable,
            actual_current,
            timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn ctx(&self) -> CallContext {
        CallContext::with_timeout(self.timeout)
    }
}

#[async_trait]
impl Charger for ProviderCharger {
    async fn status(&self) -> Result<ChargeStatus> {
        let ctx = self.ctx();
        let raw = ctx.run("charger status", (self.status)(ctx)).await?;
        Ok(ChargeStatus::parse(&raw))
    }

    async fn enabled(&self) -> Result<bool> {
        let ctx = self.ctx();
        ctx.run("charger enabled", (self.enabled)(ctx)).await
    }

    async fn enable(&self, enable: bool) -> Result<()> {
        let ctx = self.ctx();
        ctx.run("charger enable", (self.enable)(ctx, enable)).await
    }

    async fn actual_current(&self) -> Result<i64> {
        let ctx = self.ctx();
        ctx.run("charger actual current", (self.actual_current)(ctx)).await
    }
}

/// Charge controller writing the current limit through a setter
pub struct ProviderChargeController {
    max_current: IntSetter,
    timeout: Duration,
}

impl ProviderChargeController {
    pub fn new(max_current: IntSetter) -> Self {
        Self {
            max_current,
            timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl ChargeController for ProviderChargeController {
    async fn max_current(&self, current: i64) -> Result<()> {
        let ctx = CallContext::with_timeout(self.timeout);
        ctx.run("max current", (self.max_current)(ctx, current)).await
    }
}

/// Meter reading instantaneous power from a provider
pub struct ProviderMeter {
    power: FloatProvider,
    timeout: Duration,
}

impl ProviderMeter {
    pub fn new(power: FloatProvider) -> Self {
        Self {
            power,
            timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl Meter for ProviderMeter {
    async fn current_power(&self) -> Result<f64> {
        let ctx = CallContext::with_timeout(self.timeout);
        ctx.run("meter power", (self.power)(ctx)).await
    }
}

/// Cumulative energy readout from a provider
pub struct ProviderMeterEnergy {
    total_energy: FloatProvider,
    timeout: Duration,
}

impl ProviderMeterEnergy {
    pub fn new(total_energy: FloatProvider) -> Self {
        Self {
            total_energy,
            timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl MeterEnergy for ProviderMeterEnergy {
    async fn total_energy(&self) -> Result<f64> {
        let ctx = CallContext::with_timeout(self.timeout);
        ctx.run("meter energy", (self.total_energy)(ctx)).await
    }
}
