//! Parameters for the CKKS library
//!
//! The modulus chain is a product of NTT-friendly primes held in RNS form by
//! `fhe_math` contexts, one context per level. Rescaling drops the top prime
//! of the chain. Key switching borrows one extra special prime.

pub mod parameters;

pub use crate::errors::{CkksError, CkksResult};
pub use parameters::{CkksParameters, CkksParametersBuilder};
