use super::*;
use crate::api::{ChargeStatus, MockChargeController, MockCharger, MockMeter, MockMeterEnergy};
use crate::logging::get_logger;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

fn settings() -> LoadPointSettings {
    LoadPointSettings {
        min_current: 5,
        max_current: 16,
        voltage: 230.0,
        phases: 1.0,
    }
}

fn charger(status: ChargeStatus, enabled: bool, actual: i64) -> MockCharger {
    let mut charger = MockCharger::new();
    charger.expect_enabled().returning(move || Ok(enabled));
    charger.expect_status().returning(move || Ok(status));
    charger.expect_actual_current().returning(move || Ok(actual));
    charger
}

fn meter(power: f64) -> CompositeMeter {
    let mut meter = MockMeter::new();
    meter.expect_current_power().returning(move || Ok(power));
    CompositeMeter::new(Arc::new(meter))
}

fn controller_expecting(current: i64, times: usize) -> MockChargeController {
    let mut controller = MockChargeController::new();
    controller
        .expect_max_current()
        .withf(move |c| *c == current)
        .times(times)
        .returning(|_| Ok(()));
    controller
}

fn loadpoint(
    charger: MockCharger,
    controller: Option<MockChargeController>,
    grid_power: Option<f64>,
) -> LoadPoint {
    let mut composite = CompositeCharger::new(Arc::new(charger));
    if let Some(controller) = controller {
        composite = composite.with_controller(Arc::new(controller));
    }
    let mut lp =
        LoadPoint::new("garage", composite, &get_logger("loadpoint")).with_settings(settings());
    if let Some(power) = grid_power {
        lp = lp.with_grid_meter(meter(power));
    }
    lp
}

#[tokio::test]
async fn pv_surplus_drives_current() {
    // exporting 1150 W while drawing 5 A leaves 2300 W for the vehicle
    let lp = loadpoint(
        charger(ChargeStatus::C, true, 5),
        Some(controller_expecting(10, 1)),
        Some(-1150.0),
    )
    .with_mode(ChargeMode::PV)
    .unwrap();

    lp.update().await;
    assert!(lp.is_charging());
    assert_eq!(lp.current_mode(), ChargeMode::PV);
}

#[tokio::test]
async fn minpv_holds_minimum_current() {
    let lp = loadpoint(
        charger(ChargeStatus::C, true, 0),
        Some(controller_expecting(5, 1)),
        Some(500.0),
    )
    .with_mode(ChargeMode::MinPV)
    .unwrap();

    lp.update().await;
}

#[tokio::test]
async fn pv_stops_below_minimum() {
    // 5 A draw with 500 W import leaves 650 W, below the 5 A start current
    let lp = loadpoint(
        charger(ChargeStatus::C, true, 5),
        Some(controller_expecting(0, 1)),
        Some(500.0),
    )
    .with_mode(ChargeMode::PV)
    .unwrap();

    lp.update().await;
}

#[tokio::test]
async fn now_mode_charges_at_max() {
    let lp = loadpoint(
        charger(ChargeStatus::C, true, 6),
        Some(controller_expecting(16, 1)),
        None,
    );
    lp.update().await;
}

#[tokio::test]
async fn unchanged_target_is_not_written() {
    let lp = loadpoint(
        charger(ChargeStatus::C, true, 16),
        Some(controller_expecting(16, 0)),
        None,
    );
    lp.update().await;
    lp.set_target_current(7, 7).await.unwrap();
}

#[tokio::test]
async fn target_is_clamped() {
    let mut controller = MockChargeController::new();
    controller
        .expect_max_current()
        .withf(|c| *c == 16 || *c == 0)
        .times(2)
        .returning(|_| Ok(()));
    let lp = loadpoint(MockCharger::new(), Some(controller), None);

    lp.set_target_current(5, 40).await.unwrap();
    lp.set_target_current(5, -3).await.unwrap();
    // clamped to the actual value: no write
    lp.set_target_current(16, 20).await.unwrap();
}

#[tokio::test]
async fn controller_errors_are_wrapped() {
    let mut controller = MockChargeController::new();
    controller
        .expect_max_current()
        .returning(|_| Err(HeliosError::command("exit status 1")));
    let lp = loadpoint(MockCharger::new(), Some(controller), None);

    let err = lp.set_target_current(5, 10).await.unwrap_err();
    assert!(matches!(err, HeliosError::Device { .. }));
    assert!(err.to_string().contains("charge controller error"));
}

#[tokio::test]
async fn pv_mode_requires_grid_meter() {
    let mut charger = MockCharger::new();
    charger.expect_enable().times(0);
    charger.expect_enabled().times(0);
    let lp = loadpoint(charger, Some(MockChargeController::new()), None);

    for mode in [ChargeMode::PV, ChargeMode::MinPV] {
        let err = lp.set_mode(mode).await.unwrap_err();
        assert!(matches!(err, HeliosError::Validation { .. }));
    }
    assert_eq!(lp.current_mode(), ChargeMode::Now);
}

#[tokio::test]
async fn pv_mode_requires_charge_controller() {
    let mut charger = MockCharger::new();
    charger.expect_enable().times(0);
    let lp = loadpoint(charger, None, Some(0.0));

    let err = lp.set_mode(ChargeMode::MinPV).await.unwrap_err();
    assert!(matches!(err, HeliosError::Validation { .. }));
    assert_eq!(lp.current_mode(), ChargeMode::Now);
    assert!(
        loadpoint(MockCharger::new(), None, Some(0.0))
            .with_mode(ChargeMode::PV)
            .is_err()
    );
}

#[tokio::test]
async fn set_mode_toggles_charger_idempotently() {
    let mut charger = MockCharger::new();
    charger.expect_enabled().returning(|| Ok(true));
    charger
        .expect_enable()
        .withf(|on| !*on)
        .times(1)
        .returning(|_| Ok(()));
    let lp = loadpoint(charger, Some(MockChargeController::new()), Some(0.0));

    // already enabled: no write
    lp.set_mode(ChargeMode::PV).await.unwrap();
    assert_eq!(lp.current_mode(), ChargeMode::PV);

    lp.set_mode(ChargeMode::Off).await.unwrap();
    assert_eq!(lp.current_mode(), ChargeMode::Off);
}

#[tokio::test]
async fn failed_enable_does_not_commit_mode() {
    let mut charger = MockCharger::new();
    charger.expect_enabled().returning(|| Ok(false));
    charger
        .expect_enable()
        .times(1)
        .returning(|_| Err(HeliosError::timeout("charger enable exceeded deadline")));
    let lp = loadpoint(charger, Some(MockChargeController::new()), Some(0.0))
        .with_mode(ChargeMode::Off)
        .unwrap();

    assert!(lp.set_mode(ChargeMode::Now).await.is_err());
    assert_eq!(lp.current_mode(), ChargeMode::Off);
}

#[tokio::test]
async fn disabled_charger_forces_off() {
    let mut charger = MockCharger::new();
    charger.expect_enabled().returning(|| Ok(false));
    charger.expect_status().times(0);
    let lp = loadpoint(charger, Some(controller_expecting(0, 0)), None);

    lp.update().await;
    assert_eq!(lp.current_mode(), ChargeMode::Off);
}

#[tokio::test]
async fn read_errors_abort_tick() {
    let mut charger = MockCharger::new();
    charger
        .expect_enabled()
        .returning(|| Err(HeliosError::command("exit status 2")));
    charger.expect_status().times(0);
    let lp = loadpoint(charger, Some(controller_expecting(0, 0)), None);

    lp.update().await;
    assert_eq!(lp.current_mode(), ChargeMode::Now);
    assert!(!lp.is_charging());
}

#[tokio::test]
async fn meter_error_skips_write() {
    let mut grid = MockMeter::new();
    grid.expect_current_power()
        .returning(|| Err(HeliosError::stale("value outdated for grid/power")));
    let mut charger = MockCharger::new();
    charger.expect_enabled().returning(|| Ok(true));
    charger.expect_status().returning(|| Ok(ChargeStatus::C));
    charger.expect_actual_current().times(0);

    let lp = LoadPoint::new(
        "garage",
        CompositeCharger::new(Arc::new(charger))
            .with_controller(Arc::new(controller_expecting(0, 0))),
        &get_logger("loadpoint"),
    )
    .with_grid_meter(CompositeMeter::new(Arc::new(grid)))
    .with_mode(ChargeMode::PV)
    .unwrap();

    lp.update().await;
    assert!(lp.is_charging());
}

#[tokio::test]
async fn no_controller_starts_session_only() {
    let mut charger = MockCharger::new();
    charger.expect_enabled().returning(|| Ok(true));
    charger.expect_status().returning(|| Ok(ChargeStatus::C));
    charger.expect_actual_current().times(0);
    let lp = loadpoint(charger, None, None);

    lp.update().await;
    assert!(lp.is_charging());
}

#[tokio::test]
async fn session_follows_connection() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let mut charger = MockCharger::new();
    charger.expect_enabled().returning(|| Ok(true));
    charger.expect_status().returning(move || {
        // C, C, A
        match counter.fetch_add(1, Ordering::SeqCst) {
            0 | 1 => Ok(ChargeStatus::C),
            _ => Ok(ChargeStatus::A),
        }
    });
    charger.expect_actual_current().returning(|| Ok(16));

    let mut energy = MockMeterEnergy::new();
    // baseline at start, one observation read, final reading at disconnect
    let readings = Arc::new(AtomicUsize::new(0));
    let reads = readings.clone();
    energy.expect_total_energy().times(3).returning(move || {
        let n = reads.fetch_add(1, Ordering::SeqCst);
        Ok(100.0 + n as f64 * 1.5)
    });
    let mut power = MockMeter::new();
    power.expect_current_power().returning(|| Ok(3680.0));
    let charge_meter = CompositeMeter::new(Arc::new(power)).with_energy(Arc::new(energy));

    let lp = loadpoint(charger, Some(controller_expecting(16, 0)), None)
        .with_charge_meter(charge_meter);

    lp.update().await;
    let first = lp.current_session().unwrap();
    assert_eq!(first.start_energy_kwh, Some(100.0));

    lp.update().await;
    assert_eq!(lp.current_session().unwrap().id, first.id);
    assert_eq!(lp.charged_energy().await.unwrap(), Some(1.5));
    assert_eq!(lp.charge_power().await.unwrap(), Some(3680.0));
    assert_eq!(lp.grid_power().await.unwrap(), None);

    lp.update().await;
    assert!(!lp.is_charging());
    let last = lp.last_session().unwrap();
    assert_eq!(last.id, first.id);
    assert_eq!(last.status, SessionStatus::Completed);
    assert_eq!(last.energy_delivered_kwh, 3.0);
    // idle: reports the completed session without reading the meter
    assert_eq!(lp.charged_energy().await.unwrap(), Some(3.0));
}

#[tokio::test]
async fn off_mode_ends_session() {
    let mut charger = MockCharger::new();
    let enabled = Arc::new(AtomicBool::new(true));
    let state = enabled.clone();
    charger
        .expect_enabled()
        .returning(move || Ok(state.load(Ordering::SeqCst)));
    let sink = enabled.clone();
    charger.expect_enable().returning(move |on| {
        sink.store(on, Ordering::SeqCst);
        Ok(())
    });
    charger.expect_status().returning(|| Ok(ChargeStatus::C));
    charger.expect_actual_current().returning(|| Ok(16));
    let lp = loadpoint(charger, Some(controller_expecting(16, 0)), None);

    lp.update().await;
    assert!(lp.is_charging());

    lp.set_mode(ChargeMode::Off).await.unwrap();
    assert!(!lp.is_charging());
    assert!(!enabled.load(Ordering::SeqCst));

    // disabled charger keeps the load point idle
    lp.update().await;
    assert_eq!(lp.current_mode(), ChargeMode::Off);
    assert!(lp.last_session().is_some());
}

/// Charger reporting C for `connected` status reads, then A
fn charger_connected_for(connected: usize) -> MockCharger {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut charger = MockCharger::new();
    charger.expect_enabled().returning(|| Ok(true));
    charger.expect_status().returning(move || {
        if calls.fetch_add(1, Ordering::SeqCst) < connected {
            Ok(ChargeStatus::C)
        } else {
            Ok(ChargeStatus::A)
        }
    });
    charger.expect_actual_current().returning(|| Ok(16));
    charger
}

fn charge_meter(readings: Vec<Result<f64>>) -> CompositeMeter {
    let mut energy = MockMeterEnergy::new();
    let mut readings = readings.into_iter();
    energy
        .expect_total_energy()
        .times(readings.len())
        .returning(move || {
            readings
                .next()
                .unwrap_or_else(|| Err(HeliosError::device("no more readings")))
        });
    CompositeMeter::new(Arc::new(MockMeter::new())).with_energy(Arc::new(energy))
}

#[tokio::test]
async fn session_end_records_final_meter_reading() {
    let lp = loadpoint(
        charger_connected_for(1),
        Some(controller_expecting(16, 0)),
        None,
    )
    .with_charge_meter(charge_meter(vec![Ok(100.0), Ok(107.0)]));

    lp.update().await;
    assert!(lp.is_charging());
    // unplugged before any observation ran
    lp.update().await;

    let last = lp.last_session().unwrap();
    assert_eq!(last.start_energy_kwh, Some(100.0));
    assert_eq!(last.energy_delivered_kwh, 7.0);
    assert_eq!(lp.charged_energy().await.unwrap(), Some(7.0));
}

#[tokio::test]
async fn off_mode_records_final_meter_reading() {
    let mut charger = charger_connected_for(usize::MAX);
    charger.expect_enable().times(1).returning(|_| Ok(()));
    let lp = loadpoint(charger, Some(controller_expecting(16, 0)), None)
        .with_charge_meter(charge_meter(vec![Ok(20.0), Ok(24.5)]));

    lp.update().await;
    lp.set_mode(ChargeMode::Off).await.unwrap();

    assert!(!lp.is_charging());
    assert_eq!(lp.last_session().unwrap().energy_delivered_kwh, 4.5);
}

#[tokio::test]
async fn missed_baseline_is_taken_from_next_reading() {
    let lp = loadpoint(
        charger_connected_for(2),
        Some(controller_expecting(16, 0)),
        None,
    )
    .with_charge_meter(charge_meter(vec![
        Err(HeliosError::timeout("meter energy exceeded deadline")),
        Ok(50.0),
        Ok(52.0),
    ]));

    lp.update().await;
    assert_eq!(lp.current_session().unwrap().start_energy_kwh, None);
    assert_eq!(lp.charged_energy().await.unwrap(), Some(0.0));

    lp.update().await;
    lp.update().await;
    assert!(!lp.is_charging());
    let last = lp.last_session().unwrap();
    assert_eq!(last.start_energy_kwh, Some(50.0));
    assert_eq!(last.energy_delivered_kwh, 2.0);
}
