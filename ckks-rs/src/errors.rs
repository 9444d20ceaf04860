//! Error handling for the CKKS library
//!
//! All fallible operations of the crate return [`CkksResult`]. Level
//! exhaustion and slot overflow carry structured fields so callers can
//! translate them into their own error taxonomy.
use thiserror::Error;

/// CKKS library error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CkksError {
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Sampling error: {0}")]
    SamplingError(String),

    #[error("Encoding error: {given} values exceed the {capacity} available slots")]
    TooManyValues { given: usize, capacity: usize },

    #[error("Encoding error: value {value} is outside the representable range ±{bound}")]
    ValueOutOfRange { value: f64, bound: f64 },

    #[error("Modulus chain exhausted: {operation} needs a level but all {levels} levels are consumed")]
    LevelExhausted { operation: String, levels: usize },

    #[error("Missing rotation key for step {step}")]
    MissingRotationKey { step: usize },

    #[error("Parameter mismatch: {0}")]
    ParameterMismatch(String),

    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    #[error("Insufficient data: expected {expected} bytes, got {actual}")]
    InsufficientData { expected: usize, actual: usize },

    #[error("Ring arithmetic error: {0}")]
    Ring(String),
}

impl From<fhe_math::Error> for CkksError {
    fn from(e: fhe_math::Error) -> Self {
        CkksError::Ring(e.to_string())
    }
}

/// Result type alias for CKKS operations
pub type CkksResult<T> = std::result::Result<T, CkksError>;
