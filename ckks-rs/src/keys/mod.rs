//! Key generation for the CKKS library
//!
//! The secret key stays with the data holder. Public and evaluation keys
//! carry no secret material and may be handed to an evaluator.

pub mod evaluation_key;
pub mod public_key;
pub mod secret_key;

pub use evaluation_key::{EvaluationKeys, SwitchingKey};
pub use public_key::PublicKey;
pub use secret_key::SecretKey;
