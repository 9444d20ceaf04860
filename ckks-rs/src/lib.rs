//! Approximate homomorphic encryption over the reals (CKKS)
//!
//! A compact implementation of the CKKS scheme over an RNS modulus chain
//! built on `fhe_math` contexts, with hybrid key switching and
//! rotate-and-add slot summation. It is meant for batch statistics over
//! small vectors: there is no bootstrapping and no noise estimation beyond
//! what the caller does.
//!
//! ## Modules
//! - `params`: Scheme parameters and the modulus chain layout
//! - `keys`: Secret, public and evaluation keys
//! - `encoding`: Canonical-embedding encoder for real slots
//! - `crypto`: Encryption, decryption and homomorphic evaluation
//! - `ring`: Moving coefficients in and out of `fhe_math` polynomials
//! - `sampling`: Centred binomial and uniform samplers

pub mod crypto;
pub mod encoding;
pub mod errors;
pub mod keys;
pub mod params;
pub mod ring;
pub mod sampling;

pub use crypto::{decrypt, encrypt, Ciphertext, Evaluator};
pub use encoding::Encoder;
pub use errors::{CkksError, CkksResult};
pub use fhe_traits::{DeserializeParametrized, Serialize};
pub use keys::{EvaluationKeys, PublicKey, SecretKey};
pub use params::{CkksParameters, CkksParametersBuilder};

pub mod prelude {
    pub use crate::crypto::{decrypt, encrypt, Ciphertext, Evaluator};
    pub use crate::errors::{CkksError, CkksResult};
    pub use crate::keys::{EvaluationKeys, PublicKey, SecretKey};
    pub use crate::params::{CkksParameters, CkksParametersBuilder};
    pub use fhe_traits::{DeserializeParametrized, Serialize};
}
