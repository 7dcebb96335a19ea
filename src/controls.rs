//! Charging control algorithms for Helios
//!
//! Pure current/power arithmetic behind the charge modes. Sign convention:
//! positive grid power is import, negative is export.

use crate::api::ChargeMode;
use crate::loadpoint::LoadPointSettings;

/// Power drawn at `current` A over `phases` phases of `voltage` V
pub fn current_to_power(current: f64, voltage: f64, phases: f64) -> f64 {
    phases * current * voltage
}

/// Current that carries `power` W over `phases` phases of `voltage` V
pub fn power_to_current(power: f64, voltage: f64, phases: f64) -> f64 {
    power / (phases * voltage)
}

/// Intermediate values of one PV evaluation, kept for logging
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PvBalance {
    pub charge_power: f64,
    pub home_power: f64,
    pub available_power: f64,
    /// Surplus current before the MinCurrent rule, whole amperes
    pub surplus_current: i64,
    /// Current after the MinCurrent rule
    pub target_current: i64,
}

/// Target current for the PV modes.
///
/// The charger's own draw is removed from the grid reading to get the home
/// balance; whatever the home exports is available to the vehicle. Below
/// `min_current`, MinPV holds the minimum and PV stops charging.
pub fn pv_balance(
    mode: ChargeMode,
    grid_power: f64,
    actual_current: i64,
    settings: &LoadPointSettings,
) -> PvBalance {
    let charge_power = current_to_power(actual_current as f64, settings.voltage, settings.phases);
    let home_power = grid_power - charge_power;
    let available_power = -home_power;

    let surplus = power_to_current(available_power, settings.voltage, settings.phases);
    // truncation toward zero; NaN saturates to 0
    let surplus_current = surplus.max(0.0) as i64;

    let target_current = if surplus_current < settings.min_current {
        match mode {
            ChargeMode::MinPV => settings.min_current,
            _ => 0,
        }
    } else {
        surplus_current
    };

    PvBalance {
        charge_power,
        home_power,
        available_power,
        surplus_current,
        target_current,
    }
}

/// Bound `target` to `[0, max_current]`; the flag reports whether it moved
pub fn clamp_current(target: i64, max_current: i64) -> (i64, bool) {
    let clamped = target.clamp(0, max_current.max(0));
    (clamped, clamped != target)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> LoadPointSettings {
        LoadPointSettings {
            min_current: 6,
            max_current: 16,
            voltage: 230.0,
            phases: 1.0,
        }
    }

    #[test]
    fn conversions_are_inverse() {
        assert_eq!(current_to_power(10.0, 230.0, 3.0), 6900.0);
        assert_eq!(power_to_current(6900.0, 230.0, 3.0), 10.0);
    }

    #[test]
    fn surplus_is_truncated() {
        // exporting 1400 W while idle: 6.08 A
        let b = pv_balance(ChargeMode::PV, -1400.0, 0, &settings());
        assert_eq!(b.surplus_current, 6);
        assert_eq!(b.target_current, 6);
    }

    #[test]
    fn charger_draw_is_added_back() {
        // importing 100 W while charging at 8 A: home exports 1740 W
        let b = pv_balance(ChargeMode::PV, 100.0, 8, &settings());
        assert_eq!(b.charge_power, 1840.0);
        assert_eq!(b.home_power, -1740.0);
        assert_eq!(b.target_current, 7);
    }

    #[test]
    fn below_minimum_depends_on_mode() {
        let pv = pv_balance(ChargeMode::PV, 500.0, 0, &settings());
        assert_eq!(pv.surplus_current, 0);
        assert_eq!(pv.target_current, 0);

        let minpv = pv_balance(ChargeMode::MinPV, 500.0, 0, &settings());
        assert_eq!(minpv.target_current, 6);
    }

    #[test]
    fn clamp_bounds() {
        assert_eq!(clamp_current(20, 16), (16, true));
        assert_eq!(clamp_current(-3, 16), (0, true));
        assert_eq!(clamp_current(10, 16), (10, false));
    }
}
