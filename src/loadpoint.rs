//! Load point control loop
//!
//! A [`LoadPoint`] binds one charger to its meters and decides, once per
//! control tick, which current the charger may draw. Ticks may overlap: the
//! runtime state sits behind a mutex that is only held for in-memory updates,
//! never across a device call.

use crate::api::{ChargeMode, Charger, CompositeCharger, CompositeMeter, Meter};
use crate::controls;
use crate::error::{HeliosError, Result};
use crate::logging::StructuredLogger;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

pub mod session;

pub use session::{ChargingSession, SessionStatus, SessionTracker};

#[cfg(test)]
mod tests;

/// Electrical limits of a load point
#[derive(Debug, Clone, PartialEq)]
pub struct LoadPointSettings {
    /// PV mode: start current; MinPV mode: guaranteed current (A)
    pub min_current: i64,
    /// Upper bound of any commanded current (A)
    pub max_current: i64,
    pub voltage: f64,
    pub phases: f64,
}

impl Default for LoadPointSettings {
    fn default() -> Self {
        Self {
            min_current: 5,
            max_current: 16,
            voltage: 230.0,
            phases: 1.0,
        }
    }
}

#[derive(Debug)]
struct State {
    mode: ChargeMode,
    session: SessionTracker,
}

/// One charging point and its control state
pub struct LoadPoint {
    name: String,
    charger: CompositeCharger,
    grid_meter: Option<CompositeMeter>,
    pv_meter: Option<CompositeMeter>,
    charge_meter: Option<CompositeMeter>,
    settings: LoadPointSettings,
    state: Mutex<State>,
    logger: StructuredLogger,
}

impl fmt::Debug for LoadPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadPoint")
            .field("name", &self.name)
            .field("settings", &self.settings)
            .field("mode", &self.current_mode())
            .field("controllable", &self.charger.is_controllable())
            .finish_non_exhaustive()
    }
}

impl LoadPoint {
    /// Load point in mode `now` with default limits and no meters
    pub fn new(
        name: impl Into<String>,
        charger: CompositeCharger,
        logger: &StructuredLogger,
    ) -> Self {
        let name = name.into();
        let logger = logger.for_loadpoint(&name);
        Self {
            state: Mutex::new(State {
                mode: ChargeMode::default(),
                session: SessionTracker::new(logger.clone()),
            }),
            name,
            charger,
            grid_meter: None,
            pv_meter: None,
            charge_meter: None,
            settings: LoadPointSettings::default(),
            logger,
        }
    }

    pub fn with_grid_meter(mut self, meter: CompositeMeter) -> Self {
        self.grid_meter = Some(meter);
        self
    }

    pub fn with_pv_meter(mut self, meter: CompositeMeter) -> Self {
        self.pv_meter = Some(meter);
        self
    }

    pub fn with_charge_meter(mut self, meter: CompositeMeter) -> Self {
        self.charge_meter = Some(meter);
        self
    }

    pub fn with_settings(mut self, settings: LoadPointSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Initial mode, checked against the bound devices but without touching the charger
    pub fn with_mode(self, mode: ChargeMode) -> Result<Self> {
        self.check_mode(mode)?;
        self.state().mode = mode;
        Ok(self)
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn settings(&self) -> &LoadPointSettings {
        &self.settings
    }

    pub fn charger(&self) -> &CompositeCharger {
        &self.charger
    }

    pub fn current_mode(&self) -> ChargeMode {
        self.state().mode
    }

    /// Whether a charging session is being tracked
    pub fn is_charging(&self) -> bool {
        self.state().session.is_active()
    }

    pub fn current_session(&self) -> Option<ChargingSession> {
        self.state().session.current().cloned()
    }

    pub fn last_session(&self) -> Option<ChargingSession> {
        self.state().session.last().cloned()
    }

    /// Reject modes the bound devices cannot serve
    pub fn check_mode(&self, mode: ChargeMode) -> Result<()> {
        if mode.is_pv() {
            if self.grid_meter.is_none() {
                return Err(HeliosError::validation(
                    "mode",
                    format!("invalid charge mode {}: no grid meter", mode),
                ));
            }
            if !self.charger.is_controllable() {
                return Err(HeliosError::validation(
                    "mode",
                    format!("invalid charge mode {}: charger has no current control", mode),
                ));
            }
        }
        Ok(())
    }

    /// Switch the charge mode.
    ///
    /// The charger is enabled or disabled first; the mode is only committed
    /// once that succeeded.
    pub async fn set_mode(&self, mode: ChargeMode) -> Result<()> {
        self.logger.info(&format!("set charge mode: {}", mode));
        self.check_mode(mode)?;

        let enable = mode != ChargeMode::Off;
        self.ensure_enabled(enable).await?;

        self.state().mode = mode;
        if !enable {
            self.end_session().await;
        }
        Ok(())
    }

    async fn ensure_enabled(&self, enable: bool) -> Result<()> {
        if self.charger.enabled().await? != enable {
            self.charger.enable(enable).await?;
            let action = if enable { "enabled" } else { "disabled" };
            self.logger.debug(&format!("charger {}", action));
        }
        Ok(())
    }

    /// One control tick; failures are logged and abort the tick
    pub async fn update(&self) {
        if let Err(e) = self.tick().await {
            self.logger.error(&format!("update failed: {}", e));
        }
    }

    async fn tick(&self) -> Result<()> {
        let mode = self.current_mode();
        self.logger.debug(&format!("charge mode: {}", mode));

        if !self.charger.enabled().await? {
            {
                let mut state = self.state();
                if state.mode != ChargeMode::Off {
                    self.logger.info("charger disabled, switching mode to off");
                    state.mode = ChargeMode::Off;
                }
            }
            self.end_session().await;
            return Ok(());
        }

        let status = self.charger.status().await?;
        self.logger.debug(&format!("charger status: {}", status));
        if !status.is_ready() {
            self.end_session().await;
            return Ok(());
        }

        self.start_session().await;

        if !self.charger.is_controllable() {
            self.logger.warn("no charge controller assigned");
            return Ok(());
        }

        // re-read: set_mode may have committed while the charger was queried
        match self.current_mode() {
            ChargeMode::Now => self.apply_mode_now().await,
            mode @ (ChargeMode::MinPV | ChargeMode::PV) => self.apply_mode_pv(mode).await,
            ChargeMode::Off => Ok(()),
        }
    }

    async fn start_session(&self) {
        let Some(id) = self.state().session.start() else {
            return;
        };
        let Some(energy) = self.charge_meter.as_ref().and_then(CompositeMeter::energy) else {
            return;
        };
        match energy.total_energy().await {
            Ok(total) => {
                self.state().session.set_baseline(&id, total);
            }
            Err(e) => {
                self.logger.warn(&format!("charge meter energy unavailable: {}", e));
            }
        }
    }

    /// End the active session after a final charge meter reading
    async fn end_session(&self) {
        let Some(id) = self.state().session.current().map(|s| s.id.clone()) else {
            return;
        };
        let total = match self.charge_meter.as_ref().and_then(CompositeMeter::energy) {
            Some(energy) => energy
                .total_energy()
                .await
                .inspect_err(|e| {
                    self.logger
                        .warn(&format!("final charge meter reading unavailable: {}", e))
                })
                .ok(),
            None => None,
        };

        let mut state = self.state();
        if state.session.current().is_none_or(|s| s.id != id) {
            return;
        }
        if let Some(total) = total {
            state.session.record_energy(total);
        }
        state.session.end();
    }

    /// Charge at full speed
    pub async fn apply_mode_now(&self) -> Result<()> {
        let actual = self.charger.actual_current().await?;
        self.logger.debug(&format!("charge current: {}A", actual));
        self.set_target_current(actual, self.settings.max_current).await
    }

    /// Follow PV surplus as measured at the grid meter
    pub async fn apply_mode_pv(&self, mode: ChargeMode) -> Result<()> {
        let grid = self
            .grid_meter
            .as_ref()
            .ok_or_else(|| HeliosError::validation("grid_meter", "PV modes need a grid meter"))?;
        let grid_power = grid.current_power().await?;
        self.logger.debug(&format!("grid meter power: {:.0}W", grid_power));

        let actual = self.charger.actual_current().await?;
        let balance = controls::pv_balance(mode, grid_power, actual, &self.settings);
        self.logger.debug(&format!(
            "charge current: {}A, charge power: {:.0}W, home power: {:.0}W, surplus: {}A",
            actual, balance.charge_power, balance.home_power, balance.surplus_current
        ));
        if balance.target_current != balance.surplus_current {
            self.logger.debug(&format!(
                "{} override charge current: {}A",
                mode, balance.target_current
            ));
        }

        self.set_target_current(actual, balance.target_current).await
    }

    /// Command `target` clamped to `[0, max_current]` unless the charger already draws it
    pub async fn set_target_current(&self, actual: i64, target: i64) -> Result<()> {
        let (target, clamped) = controls::clamp_current(target, self.settings.max_current);
        if clamped {
            self.logger.info(&format!("limit charge current: {}A", target));
        }
        if target == actual {
            return Ok(());
        }

        let controller = self
            .charger
            .controller()
            .ok_or_else(|| HeliosError::device("no charge controller assigned"))?;
        self.logger.debug(&format!("set charge current: {}A", target));
        controller
            .max_current(target)
            .await
            .map_err(|e| HeliosError::device(format!("charge controller error: {}", e)))
    }

    /// Energy delivered in the active session, or in the last one when idle.
    ///
    /// `None` when the charge meter does not report cumulative energy.
    pub async fn charged_energy(&self) -> Result<Option<f64>> {
        let Some(energy) = self.charge_meter.as_ref().and_then(CompositeMeter::energy) else {
            return Ok(None);
        };
        if self.is_charging() {
            let total = energy.total_energy().await?;
            let mut state = self.state();
            state.session.record_energy(total);
            return Ok(Some(state.session.charged_energy()));
        }
        Ok(Some(self.state().session.charged_energy()))
    }

    /// Elapsed time of the active session, or duration of the last one
    pub fn charge_duration(&self) -> Duration {
        self.state().session.charge_duration()
    }

    pub async fn grid_power(&self) -> Result<Option<f64>> {
        read_power(self.grid_meter.as_ref()).await
    }

    pub async fn pv_power(&self) -> Result<Option<f64>> {
        read_power(self.pv_meter.as_ref()).await
    }

    pub async fn charge_power(&self) -> Result<Option<f64>> {
        read_power(self.charge_meter.as_ref()).await
    }
}

async fn read_power(meter: Option<&CompositeMeter>) -> Result<Option<f64>> {
    match meter {
        Some(meter) => meter.current_power().await.map(Some),
        None => Ok(None),
    }
}
