//! Device capability interfaces
//!
//! Minimal contracts every backend must satisfy. Optional capabilities
//! (current control for chargers, cumulative energy for meters) are not
//! looked up at runtime: they are attached once to a [`CompositeCharger`] or
//! [`CompositeMeter`] when the device is assembled, and callers ask the
//! composite for them.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

mod composite;

pub use composite::{CompositeCharger, CompositeMeter};

/// Connection and readiness state of the vehicle as reported by the EVSE (IEC 61851 A-F)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ChargeStatus {
    /// Unknown or unreadable
    #[default]
    None,
    /// Vehicle not connected
    A,
    /// Vehicle connected, not ready
    B,
    /// Vehicle connected and ready to charge
    C,
    /// Vehicle connected, ready, ventilation required
    D,
    /// Error, no power
    E,
    /// EVSE fault
    F,
}

impl ChargeStatus {
    /// Parse the status letter reported by a backend.
    ///
    /// The first non-blank character decides; anything outside A-F maps to
    /// [`ChargeStatus::None`].
    pub fn parse(raw: &str) -> Self {
        match raw.trim().chars().next().map(|c| c.to_ascii_uppercase()) {
            Some('A') => ChargeStatus::A,
            Some('B') => ChargeStatus::B,
            Some('C') => ChargeStatus::C,
            Some('D') => ChargeStatus::D,
            Some('E') => ChargeStatus::E,
            Some('F') => ChargeStatus::F,
            _ => ChargeStatus::None,
        }
    }

    /// Only status C lets the control loop command current
    pub fn is_ready(self) -> bool {
        self == ChargeStatus::C
    }
}

impl fmt::Display for ChargeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChargeStatus::None => "-",
            ChargeStatus::A => "A",
            ChargeStatus::B => "B",
            ChargeStatus::C => "C",
            ChargeStatus::D => "D",
            ChargeStatus::E => "E",
            ChargeStatus::F => "F",
        };
        f.write_str(s)
    }
}

/// Operating strategy of a load point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChargeMode {
    /// Charger disabled
    Off,
    /// Full speed
    #[default]
    Now,
    /// PV surplus with a guaranteed minimum current
    #[serde(rename = "minpv")]
    MinPV,
    /// PV surplus only, may idle at 0 A
    #[serde(rename = "pv")]
    PV,
}

impl ChargeMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ChargeMode::Off => "off",
            ChargeMode::Now => "now",
            ChargeMode::MinPV => "minpv",
            ChargeMode::PV => "pv",
        }
    }

    /// Whether the mode follows PV surplus and needs a grid meter plus current control
    pub fn is_pv(self) -> bool {
        matches!(self, ChargeMode::MinPV | ChargeMode::PV)
    }
}

impl fmt::Display for ChargeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChargeMode {
    type Err = crate::error::HeliosError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "off" => Ok(ChargeMode::Off),
            "now" => Ok(ChargeMode::Now),
            "minpv" => Ok(ChargeMode::MinPV),
            "pv" => Ok(ChargeMode::PV),
            other => Err(crate::error::HeliosError::validation(
                "mode",
                format!("Unknown charge mode '{}'", other),
            )),
        }
    }
}

/// Instantaneous power at a metering point in W; positive means import
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Meter: Send + Sync {
    async fn current_power(&self) -> Result<f64>;
}

/// Cumulative energy at a metering point in kWh
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MeterEnergy: Send + Sync {
    async fn total_energy(&self) -> Result<f64>;
}

/// Charge status readout and enable/disable of an EVSE
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Charger: Send + Sync {
    async fn status(&self) -> Result<ChargeStatus>;
    async fn enabled(&self) -> Result<bool>;
    async fn enable(&self, enable: bool) -> Result<()>;
    /// Current the charger is delivering in A
    async fn actual_current(&self) -> Result<i64>;
}

/// Control of the charger's maximum allowed current
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChargeController: Send + Sync {
    async fn max_current(&self, current: i64) -> Result<()>;
}

pub type SharedMeter = Arc<dyn Meter>;
pub type SharedMeterEnergy = Arc<dyn MeterEnergy>;
pub type SharedCharger = Arc<dyn Charger>;
pub type SharedChargeController = Arc<dyn ChargeController>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_parsing() {
        assert_eq!(ChargeStatus::parse("C"), ChargeStatus::C);
        assert_eq!(ChargeStatus::parse(" c\n"), ChargeStatus::C);
        assert_eq!(ChargeStatus::parse("B1"), ChargeStatus::B);
        assert_eq!(ChargeStatus::parse(""), ChargeStatus::None);
        assert_eq!(ChargeStatus::parse("X"), ChargeStatus::None);
        assert!(ChargeStatus::C.is_ready());
        assert!(!ChargeStatus::D.is_ready());
    }

    #[test]
    fn mode_roundtrip_names() {
        for mode in [
            ChargeMode::Off,
            ChargeMode::Now,
            ChargeMode::MinPV,
            ChargeMode::PV,
        ] {
            assert_eq!(mode.as_str().parse::<ChargeMode>().unwrap(), mode);
        }
        assert!("fast".parse::<ChargeMode>().is_err());
        assert_eq!(serde_json::to_string(&ChargeMode::MinPV).unwrap(), "\"minpv\"");
        assert!(ChargeMode::PV.is_pv());
        assert!(!ChargeMode::Now.is_pv());
    }
}
