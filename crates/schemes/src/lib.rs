//! Homomorphic schemes behind one capability interface
//!
//! Three back ends implement [`HomomorphicScheme`] and [`KeyHolder`]:
//!
//! - **`approx`**: approximate real arithmetic (CKKS, in-house `ckks` crate)
//! - **`exact`**: exact modular-integer arithmetic (BFV, `fhe` crate)
//! - **`additive`**: additively homomorphic integers (Paillier)
//!
//! Vectors of different variants never mix: every operation checks the
//! [`SchemeTag`] of its operands.

pub mod additive;
pub mod approx;
pub mod exact;
pub mod traits;
pub mod vector;

pub use additive::{AdditiveKeyHolder, AdditiveScheme};
pub use approx::{ApproxKeyHolder, ApproxScheme};
pub use exact::{ExactKeyHolder, ExactScheme};
pub use traits::{HomomorphicScheme, KeyHolder};
pub use vector::{EncryptedVector, PlainVector, Scalar, VECTOR_HEADER_LEN};

use shared::{HeStatsResult, SchemeConfig, SchemeTag};

/// Generate a key holder for the configured scheme variant
///
/// A `seed` makes key generation and encryption reproducible.
pub fn generate(config: &SchemeConfig, seed: Option<u64>) -> HeStatsResult<Box<dyn KeyHolder>> {
    Ok(match config {
        SchemeConfig::Approx(c) => Box::new(ApproxKeyHolder::generate(c, seed)?),
        SchemeConfig::Exact(c) => Box::new(ExactKeyHolder::generate(c, seed)?),
        SchemeConfig::Additive(c) => Box::new(AdditiveKeyHolder::generate(c, seed)?),
    })
}

/// Whether a scheme variant offers ciphertext-ciphertext multiplication
pub fn supports_products(tag: SchemeTag) -> bool {
    !matches!(tag, SchemeTag::Additive)
}
