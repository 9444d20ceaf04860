use crate::errors::{ParamsError, ParamsResult};
use fhe_math::zq::primes::generate_prime;
use num_bigint::BigUint;
use num_bigint_dig::RandPrime;
use rand::Rng;

pub use fhe_util::is_prime;

/// Bit sizes `generate_prime` can search
const MIN_MODULUS_BITS: u64 = 10;
const MAX_MODULUS_BITS: u64 = 62;

/// Smallest bit size holding a prime p > `lower` with p ≡ 1 mod 2·degree
///
/// Within one bit size the largest such prime is returned, which keeps the
/// plaintext modulus the same width as the bound it has to clear.
pub fn find_simd_modulus_above(degree: usize, lower: u64) -> ParamsResult<u64> {
    if degree == 0 || !degree.is_power_of_two() {
        return Err(ParamsError::InvalidDegree {
            degree,
            reason: "degree must be a power of two".to_string(),
        });
    }
    let modulo = 2 * degree as u64;
    let start = (u64::BITS - lower.leading_zeros()) as u64;
    for bits in start.max(MIN_MODULUS_BITS)..=MAX_MODULUS_BITS {
        if let Some(p) = generate_prime(bits as usize, modulo, 1u64 << bits) {
            if p > lower {
                return Ok(p);
            }
        }
    }
    Err(ParamsError::NoModulus {
        lower: lower as u128,
    })
}

/// SIMD-friendly prime strictly above 2^min_bits
pub fn find_simd_modulus(degree: usize, min_bits: u32) -> ParamsResult<u64> {
    if min_bits as u64 >= MAX_MODULUS_BITS {
        return Err(ParamsError::InvalidBits {
            bits: min_bits as u64,
            reason: format!("must be below {MAX_MODULUS_BITS}"),
        });
    }
    find_simd_modulus_above(degree, 1u64 << min_bits)
}

/// Random prime of exactly `bits` bits
pub fn random_prime<R: Rng + ?Sized>(bits: u64, rng: &mut R) -> ParamsResult<BigUint> {
    if bits < 8 {
        return Err(ParamsError::InvalidBits {
            bits,
            reason: "random primes need at least 8 bits".to_string(),
        });
    }
    let p = rng.gen_prime(bits as usize);
    Ok(BigUint::from_bytes_le(&p.to_bytes_le()))
}
