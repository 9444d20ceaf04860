use num_bigint::BigUint;
use num_traits::{ToPrimitive, Zero};

/// log2 of a worst-case accumulator bound, from its top 64 bits
///
/// Zero maps to negative infinity so an empty dataset reports no width.
pub fn worst_case_log2(bound: &BigUint) -> f64 {
    if bound.is_zero() {
        return f64::NEG_INFINITY;
    }
    let shift = bound.bits().saturating_sub(u64::BITS as u64);
    let top = (bound >> shift).to_u64().unwrap_or(u64::MAX);
    shift as f64 + (top as f64).log2()
}

/// Report line for `suggest-modulus`, e.g. "≈ 2^40.0 (41 bits)"
pub fn fmt_big_summary(bound: &BigUint) -> String {
    let log2 = worst_case_log2(bound);
    let bits = bound.bits().max(1);
    format!("≈ 2^{log2:.1} ({bits} bits)")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worst_case_log2() {
        assert!((worst_case_log2(&BigUint::from(1024u32)) - 10.0).abs() < 1e-9);
        let big = BigUint::from(1u8) << 100;
        assert!((worst_case_log2(&big) - 100.0).abs() < 1e-9);
        let sum = BigUint::from(47_250_000u64) * 3u32;
        assert!((worst_case_log2(&sum) - (141_750_000f64).log2()).abs() < 1e-9);
        assert_eq!(worst_case_log2(&BigUint::zero()), f64::NEG_INFINITY);
    }

    #[test]
    fn test_summary() {
        let x = BigUint::from(1u64 << 40);
        assert_eq!(fmt_big_summary(&x), "≈ 2^40.0 (41 bits)");
        assert_eq!(fmt_big_summary(&BigUint::from(1u32)), "≈ 2^0.0 (1 bits)");
    }
}
