//! Periodic load point observation
//!
//! Snapshots of each load point's mode, meter powers and session progress
//! are published on a broadcast channel for display layers. Observation only
//! reads; a failing meter leaves its field empty.

use crate::api::ChargeMode;
use crate::loadpoint::LoadPoint;
use crate::logging::StructuredLogger;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Broadcast buffer; slow subscribers lag and skip older snapshots
const CHANNEL_CAPACITY: usize = 100;

/// Observed state of one load point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadPointSnapshot {
    pub timestamp: DateTime<Utc>,
    pub name: String,
    pub mode: ChargeMode,
    pub grid_power: Option<f64>,
    pub pv_power: Option<f64>,
    pub charge_power: Option<f64>,
    pub charged_energy_kwh: Option<f64>,
    pub charge_duration_sec: u64,
}

/// Builds and publishes load point snapshots
pub struct Observer {
    tx: broadcast::Sender<LoadPointSnapshot>,
    logger: StructuredLogger,
}

impl Observer {
    pub fn new(logger: StructuredLogger) -> Self {
        let (tx, _rx) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx, logger }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LoadPointSnapshot> {
        self.tx.subscribe()
    }

    /// Read the load point's accessors into a snapshot
    pub async fn snapshot(&self, lp: &LoadPoint) -> LoadPointSnapshot {
        let logger = self.logger.for_loadpoint(lp.name());
        let read = |what: &str, result: crate::error::Result<Option<f64>>| match result {
            Ok(value) => value,
            Err(e) => {
                logger.warn(&format!("update {} failed: {}", what, e));
                None
            }
        };

        let grid_power = read("grid meter", lp.grid_power().await);
        let pv_power = read("pv meter", lp.pv_power().await);
        let charge_power = read("charge meter", lp.charge_power().await);
        let charged_energy_kwh = read("charged energy", lp.charged_energy().await);

        LoadPointSnapshot {
            timestamp: Utc::now(),
            name: lp.name().to_string(),
            mode: lp.current_mode(),
            grid_power,
            pv_power,
            charge_power,
            charged_energy_kwh,
            charge_duration_sec: lp.charge_duration().as_secs(),
        }
    }

    /// Snapshot `lp` and publish the result
    pub async fn observe(&self, lp: &LoadPoint) -> LoadPointSnapshot {
        let snapshot = self.snapshot(lp).await;
        // no receivers is fine
        let _ = self.tx.send(snapshot.clone());
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{CompositeCharger, CompositeMeter, MockCharger, MockMeter};
    use crate::error::HeliosError;
    use crate::logging::get_logger;
    use std::sync::Arc;

    #[tokio::test]
    async fn publishes_snapshot_with_failed_meter_left_empty() {
        let mut grid = MockMeter::new();
        grid.expect_current_power().returning(|| Ok(-800.0));
        let mut pv = MockMeter::new();
        pv.expect_current_power()
            .returning(|| Err(HeliosError::stale("value outdated for pv/power")));

        let lp = LoadPoint::new(
            "carport",
            CompositeCharger::new(Arc::new(MockCharger::new())),
            &get_logger("loadpoint"),
        )
        .with_grid_meter(CompositeMeter::new(Arc::new(grid)))
        .with_pv_meter(CompositeMeter::new(Arc::new(pv)));

        let observer = Observer::new(get_logger("observer"));
        let mut rx = observer.subscribe();
        let sent = observer.observe(&lp).await;

        let received = rx.recv().await.unwrap();
        assert_eq!(received, sent);
        assert_eq!(received.name, "carport");
        assert_eq!(received.mode, ChargeMode::Now);
        assert_eq!(received.grid_power, Some(-800.0));
        assert_eq!(received.pv_power, None);
        assert_eq!(received.charge_power, None);
        assert_eq!(received.charged_energy_kwh, None);
        assert_eq!(received.charge_duration_sec, 0);

        let json = serde_json::to_value(&received).unwrap();
        assert_eq!(json["mode"], "now");
    }
}
