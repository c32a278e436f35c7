//! Sensitivity correction and unit conversion.
//!
//! Raw samples arrive in the amplifier's input unit (V, mV, ...). A
//! transducer's sensitivity, written as `"<input>/<output>"` (e.g. `mV/g`),
//! maps them to a physical quantity. [`convert`] divides by the sensitivity
//! and bridges between the two supported acceleration units.
//!
//! Unit handling is lenient: a combination that cannot be bridged is logged
//! and the scale-only result is returned.

use ndarray::{Array1, ArrayView1};
use tracing::warn;

/// Standard gravity used for g <-> m/s^2 conversion.
pub const STANDARD_GRAVITY: f64 = 9.81;

/// Acceleration units the converter can bridge between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccelerationUnit {
    /// Multiples of standard gravity
    G,
    /// Meters per second squared
    MetersPerSecondSquared,
}

impl AccelerationUnit {
    /// Parse a unit symbol (`"g"` or `"m/s^2"`).
    pub fn parse(symbol: &str) -> Option<Self> {
        match symbol {
            "g" => Some(Self::G),
            "m/s^2" => Some(Self::MetersPerSecondSquared),
            _ => None,
        }
    }

    /// Factor that converts a value in `self` into `target`.
    pub fn factor_to(self, target: Self) -> f64 {
        match (self, target) {
            (Self::G, Self::MetersPerSecondSquared) => STANDARD_GRAVITY,
            (Self::MetersPerSecondSquared, Self::G) => 1.0 / STANDARD_GRAVITY,
            _ => 1.0,
        }
    }
}

/// Output-side unit of a sensitivity unit string.
///
/// The token after the first `/`, with enclosing parentheses removed:
/// `"mV/g"` gives `"g"`, `"mV/(m/s^2)"` gives `"m/s^2"`. A string without a
/// separator is returned unchanged.
pub fn sensitivity_output_unit(sensitivity_unit: &str) -> &str {
    let output = match sensitivity_unit.split_once('/') {
        Some((_, output)) => output.trim(),
        None => sensitivity_unit.trim(),
    };
    output
        .strip_prefix('(')
        .and_then(|s| s.strip_suffix(')'))
        .unwrap_or(output)
}

/// Convert a raw series to calibrated values in `output_unit`.
///
/// Every sample is divided by `sensitivity`; if `output_unit` is an
/// acceleration unit, the result is additionally bridged from the
/// sensitivity's output unit. Never fails.
pub fn convert(
    raw: ArrayView1<'_, f64>,
    sensitivity: f64,
    sensitivity_unit: &str,
    output_unit: &str,
) -> Array1<f64> {
    let scaled = raw.mapv(|v| v / sensitivity);

    let Some(target) = AccelerationUnit::parse(output_unit) else {
        // Voltage and arbitrary units: scale only
        return scaled;
    };

    let source_symbol = sensitivity_output_unit(sensitivity_unit);
    match AccelerationUnit::parse(source_symbol) {
        Some(source) if source == target => scaled,
        Some(source) => {
            let factor = source.factor_to(target);
            scaled.mapv_into(|v| v * factor)
        }
        None => {
            warn!(
                output_unit = output_unit,
                sensitivity_unit = sensitivity_unit,
                "Units were not handled, returning scale-only values"
            );
            scaled
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use tracing_test::traced_test;

    fn assert_close(actual: &Array1<f64>, expected: &Array1<f64>) {
        assert_eq!(actual.len(), expected.len());
        for (a, e) in actual.iter().zip(expected.iter()) {
            assert!((a - e).abs() < 1e-12, "{} != {}", a, e);
        }
    }

    #[test]
    fn test_sensitivity_output_unit() {
        assert_eq!(sensitivity_output_unit("mV/g"), "g");
        assert_eq!(sensitivity_output_unit("mV/(m/s^2)"), "m/s^2");
        assert_eq!(sensitivity_output_unit("V/V"), "V");
        assert_eq!(sensitivity_output_unit("pC/N"), "N");
        assert_eq!(sensitivity_output_unit("V"), "V");
    }

    #[test]
    fn test_same_unit_is_scale_only() {
        let raw = array![100.0, -50.0, 0.0, 12.5];
        let out = convert(raw.view(), 100.0, "mV/g", "g");
        assert_close(&out, &(&raw / 100.0));

        let out = convert(raw.view(), 4.0, "pC/g", "g");
        assert_close(&out, &(&raw / 4.0));
    }

    #[test]
    fn test_m_per_s2_to_g() {
        let raw = array![98.1, 9.81, -19.62];
        let out = convert(raw.view(), 10.0, "mV/(m/s^2)", "g");
        assert_close(&out, &(&raw / 10.0 / STANDARD_GRAVITY));
    }

    #[test]
    fn test_g_to_m_per_s2() {
        let raw = array![100.0, 200.0, -300.0];
        let out = convert(raw.view(), 100.0, "mV/g", "m/s^2");
        assert_close(&out, &(&raw / 100.0 * STANDARD_GRAVITY));
    }

    #[test]
    fn test_voltage_passthrough() {
        let raw = array![1.0, 2.0, 3.0];
        let out = convert(raw.view(), 1.0, "V/V", "V");
        assert_close(&out, &raw);

        let out = convert(raw.view(), 2.0, "V/V", "V");
        assert_close(&out, &(&raw / 2.0));
    }

    #[test]
    fn test_arbitrary_unit_is_scale_only() {
        let raw = array![10.0, 20.0];
        let out = convert(raw.view(), 5.0, "mV/Pa", "Pa");
        assert_close(&out, &array![2.0, 4.0]);
    }

    #[traced_test]
    #[test]
    fn test_unhandled_acceleration_warns() {
        let raw = array![10.0, 20.0];
        let out = convert(raw.view(), 10.0, "mV/N", "g");
        assert_close(&out, &array![1.0, 2.0]);
        assert!(logs_contain("Units were not handled"));
    }

    #[test]
    fn test_empty_series() {
        let raw: Array1<f64> = Array1::zeros(0);
        assert_eq!(convert(raw.view(), 100.0, "mV/g", "g").len(), 0);
    }
}
