//! Sampling utilities for the CKKS library
//!
//! Every sampler takes the caller's RNG so that seeded generators give
//! reproducible keys and ciphertexts in tests.

pub mod cbd;
pub mod uniform;

pub use cbd::*;
pub use uniform::*;
