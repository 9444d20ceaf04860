//! Error types for the encrypted statistics pipeline
//!
//! Every failure a pipeline run can hit maps onto one variant of
//! [`HeStatsError`]. The variants follow the stage at which the violated
//! precondition is detected: encode time (range/length), plan time
//! (overflow), operation time (depth/mismatch) and deserialize time
//! (framing). None of them is retried.

use num_bigint::BigUint;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Main error type shared by all crates of the workspace
#[derive(Error, Debug)]
pub enum HeStatsError {
    /// Value or length out of bounds at encode time
    #[error("Encoding error: {message}")]
    Encoding { message: String },

    /// Operands from different scheme variants, contexts or lengths
    #[error("Scheme mismatch: {message}")]
    SchemeMismatch { message: String },

    /// An operation chains more multiplications than the context allows
    #[error("Depth exceeded in {operation}: requires {required}, budget is {budget}")]
    DepthExceeded {
        operation: String,
        required: usize,
        budget: usize,
    },

    /// Worst-case magnitude of a scaling plan does not fit the plaintext modulus
    #[error("Overflow budget exceeded: worst-case magnitude {worst_case} exceeds the signed bound {limit}")]
    OverflowBudget { worst_case: BigUint, limit: BigUint },

    /// Malformed blob
    #[error("Framing error: {0}")]
    Framing(#[from] FramingError),

    /// Invalid configuration or parameters
    #[error("Validation error: {message}")]
    Validation { message: String },

    /// Operation not offered by the scheme variant
    #[error("Unsupported operation: {operation} is not available for the {scheme} scheme")]
    UnsupportedOperation { operation: String, scheme: String },

    /// Statistics protocol driven out of order
    #[error("Protocol error: {message}")]
    Protocol { message: String },

    /// Failure reported by a cryptographic back end
    #[error("Backend error: {message}")]
    Backend { message: String },

    /// I/O errors from blob transports and input loading
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML configuration parsing errors
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
}

/// Result type alias for pipeline operations
pub type HeStatsResult<T> = Result<T, HeStatsError>;

/// Validation error type
#[derive(Error, Debug)]
pub enum ValidationError {
    /// Ring degree validation error
    #[error("Invalid degree: {degree} - {reason}")]
    Degree { degree: usize, reason: String },

    /// Plaintext modulus validation error
    #[error("Invalid plaintext modulus: {modulus} - {reason}")]
    PlaintextModulus { modulus: u64, reason: String },

    /// Ciphertext moduli validation error
    #[error("Invalid ciphertext moduli: {reason}")]
    CiphertextModuli { reason: String },

    /// Approximate scheme precision parameters
    #[error("Invalid precision parameters: {reason}")]
    Precision { reason: String },

    /// General validation error
    #[error("Validation failed: {message}")]
    General { message: String },
}

/// Blob framing error type
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FramingError {
    /// A slot declares more bytes than the blob still holds
    #[error("slot {slot} declares {declared} bytes but only {available} remain")]
    Truncated {
        slot: usize,
        declared: usize,
        available: usize,
    },

    /// Bytes left after the expected slot count was consumed
    #[error("{count} trailing bytes after the last expected slot")]
    TrailingBytes { count: usize },

    /// Blob holds fewer slots than the stage schema expects
    #[error("expected {expected} slots, blob ended after {found}")]
    MissingSlots { expected: usize, found: usize },

    /// Counted layout header is missing or malformed
    #[error("invalid blob header: {reason}")]
    Header { reason: String },

    /// Slot count declared in a counted header differs from the schema
    #[error("blob declares {declared} slots, schema expects {expected}")]
    SlotCount { declared: usize, expected: usize },

    /// A slot is too large for a 4-byte length prefix
    #[error("slot {slot} is {len} bytes, larger than a 4-byte prefix can express")]
    Oversized { slot: usize, len: usize },

    /// A blob must carry at least one slot
    #[error("a blob must contain at least one slot")]
    Empty,

    /// Per-vector header inside a slot is malformed
    #[error("malformed vector header: {reason}")]
    VectorHeader { reason: String },
}

/// Non-fatal diagnostic emitted when an approximate result may be less
/// precise than the caller asked for
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PrecisionWarning {
    /// Name of the computation whose result is affected
    pub computation: String,
    /// Estimated absolute error bound of the decrypted result
    pub estimated_error: f64,
    /// Tolerance the caller supplied
    pub tolerance: f64,
}

impl fmt::Display for PrecisionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: estimated error {:.3e} exceeds tolerance {:.3e}",
            self.computation, self.estimated_error, self.tolerance
        )
    }
}

impl From<ValidationError> for HeStatsError {
    fn from(err: ValidationError) -> Self {
        HeStatsError::Validation {
            message: err.to_string(),
        }
    }
}

impl From<fhe::Error> for HeStatsError {
    fn from(err: fhe::Error) -> Self {
        HeStatsError::Backend {
            message: err.to_string(),
        }
    }
}

impl From<ckks::CkksError> for HeStatsError {
    fn from(err: ckks::CkksError) -> Self {
        match err {
            ckks::CkksError::LevelExhausted { operation, levels } => HeStatsError::DepthExceeded {
                operation,
                required: levels + 1,
                budget: levels,
            },
            ckks::CkksError::TooManyValues { given, capacity } => HeStatsError::Encoding {
                message: format!("{given} values exceed the capacity of {capacity} slots"),
            },
            ckks::CkksError::ValueOutOfRange { value, bound } => HeStatsError::Encoding {
                message: format!("value {value} is outside the representable range ±{bound}"),
            },
            other => HeStatsError::Backend {
                message: other.to_string(),
            },
        }
    }
}

// Helper functions for creating errors with context
impl HeStatsError {
    /// Create an encoding error with a message
    pub fn encoding(message: impl Into<String>) -> Self {
        HeStatsError::Encoding {
            message: message.into(),
        }
    }

    /// Create a scheme mismatch error with a message
    pub fn mismatch(message: impl Into<String>) -> Self {
        HeStatsError::SchemeMismatch {
            message: message.into(),
        }
    }

    /// Create a depth error for `operation`
    pub fn depth(operation: impl Into<String>, required: usize, budget: usize) -> Self {
        HeStatsError::DepthExceeded {
            operation: operation.into(),
            required,
            budget,
        }
    }

    /// Create a validation error with a message
    pub fn validation(message: impl Into<String>) -> Self {
        HeStatsError::Validation {
            message: message.into(),
        }
    }

    /// Create an unsupported-operation error
    pub fn unsupported(operation: impl Into<String>, scheme: impl Into<String>) -> Self {
        HeStatsError::UnsupportedOperation {
            operation: operation.into(),
            scheme: scheme.into(),
        }
    }

    /// Create a protocol error with a message
    pub fn protocol(message: impl Into<String>) -> Self {
        HeStatsError::Protocol {
            message: message.into(),
        }
    }

    /// Create a back-end error with a message
    pub fn backend(message: impl Into<String>) -> Self {
        HeStatsError::Backend {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_framing_error_converts() {
        let err: HeStatsError = FramingError::TrailingBytes { count: 3 }.into();
        assert!(matches!(
            err,
            HeStatsError::Framing(FramingError::TrailingBytes { count: 3 })
        ));
        assert!(err.to_string().contains("3 trailing bytes"));
    }

    #[test]
    fn test_level_exhaustion_maps_to_depth() {
        let err: HeStatsError = ckks::CkksError::LevelExhausted {
            operation: "rescale".to_string(),
            levels: 2,
        }
        .into();
        assert!(matches!(
            err,
            HeStatsError::DepthExceeded {
                required: 3,
                budget: 2,
                ..
            }
        ));
    }

    #[test]
    fn test_precision_warning_display() {
        let warning = PrecisionWarning {
            computation: "salary_mean".to_string(),
            estimated_error: 0.5,
            tolerance: 0.01,
        };
        assert!(warning.to_string().starts_with("salary_mean"));
    }
}
