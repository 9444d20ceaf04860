//! Canonical-embedding encoder for real slot vectors
//!
//! Slot `j` is the evaluation of the plaintext polynomial at the primitive
//! 2N-th root of unity ζ^(5^j). Only real slot values are supported, which
//! reduces both directions to cosine sums over a precomputed table.

use crate::errors::{CkksError, CkksResult};
use crate::params::CkksParameters;
use crate::ring::from_signed;
use fhe_math::rq::{Context, Poly};
use num_bigint::BigInt;
use num_traits::{FromPrimitive, ToPrimitive};
use rayon::prelude::*;
use std::f64::consts::PI;
use std::sync::Arc;

/// Encoder bound to one ring degree
#[derive(Debug, Clone)]
pub struct Encoder {
    degree: usize,
    max_value: f64,
    /// 5^j mod 2N for every slot j
    slot_exponents: Vec<usize>,
    /// cos(π k / N) for k in [0, 2N)
    cos_table: Vec<f64>,
}

impl Encoder {
    pub fn new(params: &CkksParameters) -> Self {
        let degree = params.degree;
        let two_n = 2 * degree;
        let mut slot_exponents = Vec::with_capacity(params.slots());
        let mut e = 1usize;
        for _ in 0..params.slots() {
            slot_exponents.push(e);
            e = e * 5 % two_n;
        }
        let cos_table = (0..two_n)
            .map(|k| (PI * k as f64 / degree as f64).cos())
            .collect();
        Self {
            degree,
            max_value: params.max_value(),
            slot_exponents,
            cos_table,
        }
    }

    pub fn slots(&self) -> usize {
        self.slot_exponents.len()
    }

    /// Encode `values` into the first slots, scaled by `scale`
    ///
    /// Slots past `values.len()` encode zero. Returns the signed
    /// coefficients of the plaintext polynomial.
    pub fn encode(&self, values: &[f64], scale: f64) -> CkksResult<Vec<BigInt>> {
        if values.len() > self.slots() {
            return Err(CkksError::TooManyValues {
                given: values.len(),
                capacity: self.slots(),
            });
        }
        if let Some(&bad) = values
            .iter()
            .find(|v| !v.is_finite() || v.abs() >= self.max_value)
        {
            return Err(CkksError::ValueOutOfRange {
                value: bad,
                bound: self.max_value,
            });
        }

        let n = self.degree;
        let two_n = 2 * n;
        let norm = 2.0 / n as f64;
        (0..n)
            .into_par_iter()
            .map(|i| {
                let m: f64 = values
                    .iter()
                    .zip(&self.slot_exponents)
                    .map(|(v, &e)| v * self.cos_table[(e * i) % two_n])
                    .sum();
                BigInt::from_f64((m * norm * scale).round()).ok_or_else(|| {
                    CkksError::InvalidParameters("encoded coefficient is not finite".to_string())
                })
            })
            .collect()
    }

    /// Encode straight into a ring element of `ctx`
    pub fn encode_poly(&self, values: &[f64], scale: f64, ctx: &Arc<Context>) -> CkksResult<Poly> {
        from_signed(&self.encode(values, scale)?, ctx)
    }

    /// Decode the first `count` slots from centred plaintext coefficients
    pub fn decode(&self, coeffs: &[BigInt], scale: f64, count: usize) -> Vec<f64> {
        let two_n = 2 * self.degree;
        let coeffs: Vec<f64> = coeffs
            .iter()
            .map(|c| c.to_f64().unwrap_or(f64::NAN) / scale)
            .collect();
        self.slot_exponents
            .iter()
            .take(count.min(self.slots()))
            .map(|&e| {
                coeffs
                    .iter()
                    .enumerate()
                    .map(|(i, m)| m * self.cos_table[(e * i) % two_n])
                    .sum()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::CkksParametersBuilder;

    fn params() -> CkksParameters {
        CkksParametersBuilder::new()
            .set_degree(32)
            .set_scale_bits(30)
            .set_levels(1)
            .build()
            .unwrap()
    }

    #[test]
    fn test_encode_decode_plain() {
        let params = params();
        let encoder = Encoder::new(&params);
        let values = [1200.50, 2500.00, -1800.75, 0.125];

        let coeffs = encoder.encode(&values, params.scale()).unwrap();
        let decoded = encoder.decode(&coeffs, params.scale(), 6);

        for (got, want) in decoded.iter().zip(values.iter().chain([0.0, 0.0].iter())) {
            assert!((got - want).abs() < 1e-6, "got {got}, want {want}");
        }
    }

    #[test]
    fn test_constant_polynomial_fills_every_slot() {
        let params = params();
        let encoder = Encoder::new(&params);
        let mut coeffs = vec![BigInt::from(0); params.degree];
        coeffs[0] = BigInt::from(3) << params.scale_bits;

        let decoded = encoder.decode(&coeffs, params.scale(), params.slots());
        assert!(decoded.iter().all(|v| (v - 3.0).abs() < 1e-9));
    }

    #[test]
    fn test_ring_round_trip() {
        let params = params();
        let encoder = Encoder::new(&params);
        let values = [-3.5, 1024.25, 7.0];
        let ctx = params.context(0).unwrap();

        let poly = encoder.encode_poly(&values, params.scale(), ctx).unwrap();
        let decoded = encoder.decode(&crate::ring::to_centred(&poly), params.scale(), 3);
        for (got, want) in decoded.iter().zip(values.iter()) {
            assert!((got - want).abs() < 1e-6, "got {got}, want {want}");
        }
    }

    #[test]
    fn test_capacity_and_range_checks() {
        let params = params();
        let encoder = Encoder::new(&params);

        let too_many = vec![1.0; params.slots() + 1];
        assert!(matches!(
            encoder.encode(&too_many, params.scale()),
            Err(CkksError::TooManyValues { given: 17, capacity: 16 })
        ));
        assert!(matches!(
            encoder.encode(&[f64::NAN], params.scale()),
            Err(CkksError::ValueOutOfRange { .. })
        ));
    }
}
