//! Plaintext modulus sizing for the exact scheme

use crate::errors::{ParamsError, ParamsResult};
use crate::prime::find_simd_modulus_above;
use num_bigint::BigUint;
use num_traits::ToPrimitive;

/// Bits a plaintext modulus needs so that `worst_case` stays inside its
/// signed half-range, i.e. (t - 1) / 2 > worst_case
pub fn required_modulus_bits(worst_case: &BigUint) -> u64 {
    let needed: BigUint = worst_case * 2u32 + 2u32;
    needed.bits()
}

/// SIMD-friendly prime modulus of the fewest bits whose signed half-range
/// holds `worst_case`
pub fn suggest_plaintext_modulus(degree: usize, worst_case: &BigUint) -> ParamsResult<u64> {
    let lower: BigUint = worst_case * 2u32 + 1u32;
    let lower = lower.to_u64().ok_or_else(|| ParamsError::InvalidBits {
        bits: required_modulus_bits(worst_case),
        reason: "worst case does not fit any 62-bit plaintext modulus".to_string(),
    })?;
    find_simd_modulus_above(degree, lower)
}
