use thiserror::Error;

/// Errors raised while searching for parameters
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParamsError {
    #[error("Invalid degree {degree}: {reason}")]
    InvalidDegree { degree: usize, reason: String },

    #[error("No SIMD-friendly prime modulus fits in 62 bits above {lower}")]
    NoModulus { lower: u128 },

    #[error("Invalid bit size {bits}: {reason}")]
    InvalidBits { bits: u64, reason: String },
}

pub type ParamsResult<T> = Result<T, ParamsError>;
