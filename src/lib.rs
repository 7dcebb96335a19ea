//! # Helios - PV-following EV charge controller
//!
//! Helios drives one or more EV charge points ("load points") so that
//! vehicles charge at full speed, from PV surplus only, or from PV surplus
//! with a guaranteed minimum current. Chargers and meters are assembled from
//! small typed providers backed by external commands or MQTT topics, or
//! talk Modbus TCP directly.
//!
//! ## Features
//!
//! - **Async control loop**: per-load-point ticks on the Tokio runtime
//! - **Pluggable backends**: command lines with `${param}` templates, cached MQTT topics
//! - **Modbus TCP**: native Wallbe charger support
//! - **Observation**: periodic snapshots on a broadcast channel
//! - **Configuration**: YAML-based configuration with validation
//!
//! ## Architecture
//!
//! - `api`: device capability traits and composites
//! - `provider`: typed providers/setters and their command and MQTT backends
//! - `device`: meters and chargers built from providers
//! - `wallbe`: Modbus TCP charger
//! - `controls`: current/power arithmetic of the PV algorithm
//! - `loadpoint`: per-charge-point control state and sessions
//! - `observer`: load point snapshots for display
//! - `runtime`: control and observation timers
//! - `setup`: assembly from configuration
//! - `config`, `logging`, `error`: ambient plumbing

pub mod api;
pub mod config;
pub mod controls;
pub mod device;
pub mod error;
pub mod loadpoint;
pub mod logging;
pub mod observer;
pub mod provider;
pub mod runtime;
pub mod setup;
pub mod wallbe;

// Re-export commonly used types
pub use api::{ChargeMode, ChargeStatus};
pub use config::Config;
pub use error::{HeliosError, Result};
pub use loadpoint::LoadPoint;
pub use runtime::Runtime;
