//! Encryption, decryption and homomorphic evaluation

pub mod ciphertext;
pub mod decryption;
pub mod encryption;
pub mod evaluation;

pub use ciphertext::Ciphertext;
pub use decryption::decrypt;
pub use encryption::encrypt;
pub use evaluation::Evaluator;
