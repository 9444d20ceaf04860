//! Ring elements of Z_Q[X]/(X^N + 1) on `fhe_math` RNS contexts
//!
//! Every element handed between modules is an `fhe_math::rq::Poly` in NTT
//! representation, so products are pointwise. The helpers here move signed
//! coefficient vectors in and out of that form and expose the two RNS
//! manipulations rescaling and key switching need: dropping the top prime
//! with rounding, and re-reading single residue rows in another context.

use crate::errors::CkksResult;
use fhe_math::rq::{traits::TryConvertFrom, Context, Poly, Representation};
use ndarray::{Array2, Axis};
use num_bigint::{BigInt, BigUint, Sign};
use num_traits::Zero;
use std::sync::Arc;

/// Representative of `x` in [0, modulus)
pub fn signed_residue(x: &BigInt, modulus: &BigUint) -> BigUint {
    let r = x.magnitude() % modulus;
    if x.sign() == Sign::Minus && !r.is_zero() {
        modulus - r
    } else {
        r
    }
}

/// Ring element from signed big coefficients, reduced modulo the context
pub fn from_signed(coeffs: &[BigInt], ctx: &Arc<Context>) -> CkksResult<Poly> {
    let modulus = ctx.modulus();
    let residues: Vec<BigUint> = coeffs.iter().map(|c| signed_residue(c, modulus)).collect();
    let mut poly =
        Poly::try_convert_from(residues.as_slice(), ctx, false, Representation::PowerBasis)?;
    poly.change_representation(Representation::Ntt);
    Ok(poly)
}

/// Ring element from small signed coefficients such as secrets and errors
pub fn from_small(coeffs: &[i64], ctx: &Arc<Context>) -> CkksResult<Poly> {
    let mut poly = Poly::try_convert_from(coeffs, ctx, false, Representation::PowerBasis)?;
    poly.change_representation(Representation::Ntt);
    Ok(poly)
}

/// Coefficients of a ring element, centred in (-Q/2, Q/2]
pub fn to_centred(poly: &Poly) -> Vec<BigInt> {
    let mut p = poly.clone();
    p.change_representation(Representation::PowerBasis);
    let modulus = p.ctx().modulus();
    let half = modulus >> 1usize;
    Vec::<BigUint>::from(&p)
        .into_iter()
        .map(|c| {
            if c > half {
                BigInt::from_biguint(Sign::Minus, modulus - c)
            } else {
                BigInt::from_biguint(Sign::Plus, c)
            }
        })
        .collect()
}

/// Divide by the top prime of the context with rounding, then drop it
pub fn rescale(poly: &Poly) -> CkksResult<Poly> {
    let mut p = poly.clone();
    p.change_representation(Representation::PowerBasis);
    p.switch_down()?;
    p.change_representation(Representation::Ntt);
    Ok(p)
}

/// Keep the NTT rows `rows` of `poly` as an element of `ctx`
///
/// `ctx` must list the moduli of the selected rows in the same order.
pub fn select_rows(poly: &Poly, rows: &[usize], ctx: &Arc<Context>) -> CkksResult<Poly> {
    let coefficients: Array2<u64> = poly.coefficients().select(Axis(0), rows);
    Ok(Poly::try_convert_from(
        coefficients,
        ctx,
        false,
        Representation::Ntt,
    )?)
}

/// Coefficients of `poly` modulo each of its primes, one row per prime
pub fn residues(poly: &Poly) -> Array2<u64> {
    let mut p = poly.clone();
    p.change_representation(Representation::PowerBasis);
    p.coefficients().to_owned()
}

/// Read integers in [0, q) as a ring element of a context of two or more primes
pub fn lift_row(row: Vec<u64>, ctx: &Arc<Context>) -> CkksResult<Poly> {
    let mut poly = Poly::try_convert_from(row, ctx, false, Representation::PowerBasis)?;
    poly.change_representation(Representation::Ntt);
    Ok(poly)
}
