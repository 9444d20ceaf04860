//! Shared types and utilities for the encrypted statistics pipeline
//!
//! This crate provides the error taxonomy, scheme configuration and
//! parameter validation used by every other crate of the workspace.
//!
//! - **`config`**: Per-scheme configuration structures and presets
//! - **`constants`**: Default moduli, scales and framing limits
//! - **`errors`**: Error types shared by all stages of a run
//! - **`tag`**: Scheme variant identifiers
//! - **`utils`**: Fixed-point conversion helpers
//! - **`validation`**: Parameter validation utilities

pub mod config;
pub mod constants;
pub mod errors;
pub mod tag;
pub mod utils;

pub use config::{AdditiveConfig, ApproxConfig, ExactConfig, Preset, SchemeConfig};
pub use constants::DEFAULT_PLAINTEXT_MODULUS;
pub use errors::{FramingError, HeStatsError, HeStatsResult, PrecisionWarning, ValidationError};
pub use tag::SchemeTag;

/// Validation utilities for scheme parameters
pub mod validation {
    use crate::errors::{HeStatsResult, ValidationError};

    /// Validate that a degree is a valid power of 2
    ///
    /// # Arguments
    ///
    /// * `degree` - The polynomial degree to validate
    pub fn validate_degree(degree: usize) -> HeStatsResult<()> {
        if !degree.is_power_of_two() {
            return Err(ValidationError::Degree {
                degree,
                reason: "must be a power of 2".to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Validate that a degree is a power of 2 within the supported range
    pub fn validate_degree_bounds(degree: usize) -> HeStatsResult<()> {
        validate_degree(degree)?;

        if !(8..=32768).contains(&degree) {
            return Err(ValidationError::Degree {
                degree,
                reason: "must be between 8 and 32768".to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Validate plaintext modulus
    ///
    /// The modulus must be a prime that fits the exact back end (62 bits).
    pub fn validate_plaintext_modulus(modulus: u64) -> HeStatsResult<()> {
        if modulus < 2 {
            return Err(ValidationError::PlaintextModulus {
                modulus,
                reason: "must be at least 2".to_string(),
            }
            .into());
        }
        if modulus >= 1 << 62 {
            return Err(ValidationError::PlaintextModulus {
                modulus,
                reason: "must fit in 62 bits".to_string(),
            }
            .into());
        }
        if !he_params::is_prime(modulus) {
            return Err(ValidationError::PlaintextModulus {
                modulus,
                reason: "must be prime".to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Validate that the plaintext modulus allows one value per slot
    pub fn validate_simd_modulus(modulus: u64, degree: usize) -> HeStatsResult<()> {
        if modulus % (2 * degree as u64) != 1 {
            return Err(ValidationError::PlaintextModulus {
                modulus,
                reason: format!("must be congruent to 1 modulo {} for SIMD packing", 2 * degree),
            }
            .into());
        }
        Ok(())
    }

    /// Validate ciphertext moduli bit sizes
    pub fn validate_moduli_sizes(sizes: &[usize]) -> HeStatsResult<()> {
        if sizes.is_empty() {
            return Err(ValidationError::CiphertextModuli {
                reason: "at least one ciphertext modulus must be provided".to_string(),
            }
            .into());
        }

        for (i, size) in sizes.iter().enumerate() {
            if !(10..=62).contains(size) {
                return Err(ValidationError::CiphertextModuli {
                    reason: format!("modulus size at index {i} must be between 10 and 62 bits"),
                }
                .into());
            }
        }
        Ok(())
    }

    /// Validate the approximate scheme's modulus chain layout
    pub fn validate_precision(scale_bits: u32, integer_bits: u32, levels: usize) -> HeStatsResult<()> {
        if !(20..=60).contains(&scale_bits) {
            return Err(ValidationError::Precision {
                reason: format!("scale bits must be between 20 and 60, got {scale_bits}"),
            }
            .into());
        }
        if !(2..=120).contains(&integer_bits) {
            return Err(ValidationError::Precision {
                reason: format!("integer bits must be between 2 and 120, got {integer_bits}"),
            }
            .into());
        }
        if levels == 0 || levels > 32 {
            return Err(ValidationError::Precision {
                reason: format!("levels must be between 1 and 32, got {levels}"),
            }
            .into());
        }
        Ok(())
    }

    /// Validate the additive scheme's key size
    pub fn validate_key_bits(bits: u64) -> HeStatsResult<()> {
        if bits < 128 || bits % 2 != 0 || bits > 8192 {
            return Err(ValidationError::General {
                message: format!("key bits must be even and between 128 and 8192, got {bits}"),
            }
            .into());
        }
        Ok(())
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use crate::constants::DEFAULT_PLAINTEXT_MODULUS;

        #[test]
        fn test_degree() {
            assert!(validate_degree_bounds(2048).is_ok());
            assert!(validate_degree_bounds(1000).is_err());
            assert!(validate_degree_bounds(4).is_err());
        }

        #[test]
        fn test_plaintext_modulus() {
            assert!(validate_plaintext_modulus(DEFAULT_PLAINTEXT_MODULUS).is_ok());
            assert!(validate_plaintext_modulus(1_099_511_922_689).is_ok());
            assert!(validate_plaintext_modulus(1_000_000).is_err());
            assert!(validate_plaintext_modulus(1).is_err());
        }

        #[test]
        fn test_simd_modulus() {
            assert!(validate_simd_modulus(DEFAULT_PLAINTEXT_MODULUS, 16384).is_ok());
            assert!(validate_simd_modulus(65537, 4096).is_ok());
            assert!(validate_simd_modulus(101, 2048).is_err());
        }

        #[test]
        fn test_moduli_sizes() {
            assert!(validate_moduli_sizes(&[62, 62, 62]).is_ok());
            assert!(validate_moduli_sizes(&[]).is_err());
            assert!(validate_moduli_sizes(&[62, 64]).is_err());
        }
    }
}
