//! Ion pump current to pressure conversion.
//!
//! ```text
//! P = (0.066 * I * (5600 / V) * U * F) / S
//! ```
//!
//! `I` is the emission current in A, `V` the high voltage in V, `U` the
//! units factor, `F` the calibration factor and `S` the pump size in L/s.

use spcelib_core::error::{Error, Result};

/// Empirical coefficient of the pump's current/pressure relation.
pub const PRESSURE_COEFFICIENT: f64 = 0.066;

/// Voltage the coefficient was characterised at, in V.
pub const REFERENCE_VOLTAGE_V: f64 = 5600.0;

/// Derive pressure from pump current.
///
/// Fails with [`Error::DivisionByZero`] when the pump size or the voltage is
/// zero.
pub fn pressure(
    current_a: f64,
    voltage_v: f64,
    units_factor: f64,
    cal_factor: f64,
    pump_size_lps: f64,
) -> Result<f64> {
    if pump_size_lps == 0.0 || voltage_v == 0.0 {
        return Err(Error::DivisionByZero);
    }
    Ok(
        (PRESSURE_COEFFICIENT * current_a * (REFERENCE_VOLTAGE_V / voltage_v) * units_factor * cal_factor)
            / pump_size_lps,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn rel_diff(a: f64, b: f64) -> f64 {
        ((a - b) / b).abs()
    }

    #[test]
    fn reference_point() {
        let expected = (0.066 * 0.0032 * (5600.0 / 4500.0)) / 550.0;
        let p = pressure(0.0032, 4500.0, 1.0, 1.0, 550.0).unwrap();
        assert!(rel_diff(p, expected) < 1e-12, "{p} vs {expected}");
    }

    #[test]
    fn zero_pump_size() {
        assert!(matches!(
            pressure(0.0032, 4500.0, 1.0, 1.0, 0.0),
            Err(Error::DivisionByZero)
        ));
    }

    #[test]
    fn zero_voltage() {
        assert!(matches!(
            pressure(0.0032, 0.0, 1.0, 1.0, 550.0),
            Err(Error::DivisionByZero)
        ));
    }

    #[test]
    fn units_factor_scales_linearly() {
        let torr = pressure(0.0032, 4500.0, 1.0, 1.0, 550.0).unwrap();
        let pa = pressure(0.0032, 4500.0, 133.322, 1.0, 550.0).unwrap();
        assert!(rel_diff(pa, torr * 133.322) < 1e-12);
    }

    proptest! {
        #[test]
        fn prop_pressure_is_inverse_in_pump_size(
            current in 1e-6f64..1e-2,
            voltage in 1000.0f64..7000.0,
            size in 1u16..9999,
        ) {
            let p1 = pressure(current, voltage, 1.0, 1.0, f64::from(size)).unwrap();
            let p2 = pressure(current, voltage, 1.0, 1.0, 2.0 * f64::from(size)).unwrap();
            prop_assert!(p1 > 0.0);
            prop_assert!(rel_diff(p1, 2.0 * p2) < 1e-12);
        }
    }
}
