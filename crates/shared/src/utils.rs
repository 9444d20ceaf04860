//! Fixed-point helpers for feeding real-valued fields to integer schemes

use crate::errors::{HeStatsError, HeStatsResult};

/// Largest distance from an integer still accepted as "integral" after scaling
const INTEGRAL_EPSILON: f64 = 1e-6;

/// Scale real values by `scale` and convert them to integers
///
/// Fails if a scaled value is not integral (the caller's scale is too small
/// for the data) or does not fit an i64.
pub fn scale_to_integers(values: &[f64], scale: i64) -> HeStatsResult<Vec<i64>> {
    values
        .iter()
        .map(|&v| {
            let scaled = v * scale as f64;
            let rounded = scaled.round();
            if !scaled.is_finite() || rounded.abs() >= i64::MAX as f64 {
                return Err(HeStatsError::encoding(format!(
                    "value {v} scaled by {scale} does not fit a 64-bit integer"
                )));
            }
            if (scaled - rounded).abs() > INTEGRAL_EPSILON * scaled.abs().max(1.0) {
                return Err(HeStatsError::encoding(format!(
                    "value {v} is not integral once scaled by {scale}"
                )));
            }
            Ok(rounded as i64)
        })
        .collect()
}

/// Check that every value is integral and convert without scaling
pub fn to_integers(values: &[f64]) -> HeStatsResult<Vec<i64>> {
    scale_to_integers(values, 1)
}

/// Largest absolute value of a slice (0 when empty)
pub fn max_abs(values: &[i64]) -> u64 {
    values.iter().map(|v| v.unsigned_abs()).max().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scale_to_cents() {
        let cents = scale_to_integers(&[1200.50, 2500.00, 150.25, -0.01], 100).unwrap();
        assert_eq!(cents, vec![120050, 250000, 15025, -1]);
    }

    #[test]
    fn test_rejects_fractional_after_scaling() {
        let err = scale_to_integers(&[10.005], 100).unwrap_err();
        assert!(matches!(err, HeStatsError::Encoding { .. }));
        assert!(to_integers(&[0.5]).is_err());
        assert!(to_integers(&[f64::INFINITY]).is_err());
    }

    #[test]
    fn test_max_abs() {
        assert_eq!(max_abs(&[3, -7, 5]), 7);
        assert_eq!(max_abs(&[]), 0);
        assert_eq!(max_abs(&[i64::MIN]), 1 << 63);
    }
}
