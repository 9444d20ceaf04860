//! Parameter helpers for the homomorphic statistics schemes
//!
//! Primality testing, SIMD-friendly plaintext modulus search, random primes
//! for the additive scheme and bit-size utilities shared by configuration
//! validation and the command line.

pub mod errors;
pub mod modulus;
pub mod prime;
pub mod utils;

pub use errors::{ParamsError, ParamsResult};
pub use modulus::{required_modulus_bits, suggest_plaintext_modulus};
pub use prime::{find_simd_modulus, find_simd_modulus_above, is_prime, random_prime};
