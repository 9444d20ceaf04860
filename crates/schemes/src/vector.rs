//! Plaintext and encrypted vector types

use shared::{FramingError, HeStatsError, HeStatsResult, SchemeTag};
use std::fmt;

/// Bytes of the per-vector header: tag, length and depth
pub const VECTOR_HEADER_LEN: usize = 9;

/// Ordered plaintext values of one field, all real or all integer
#[derive(Debug, Clone, PartialEq)]
pub enum PlainVector {
    Real(Vec<f64>),
    Integer(Vec<i64>),
}

impl PlainVector {
    pub fn len(&self) -> usize {
        match self {
            PlainVector::Real(v) => v.len(),
            PlainVector::Integer(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Values as floats
    pub fn to_f64(&self) -> Vec<f64> {
        match self {
            PlainVector::Real(v) => v.clone(),
            PlainVector::Integer(v) => v.iter().map(|&x| x as f64).collect(),
        }
    }

    /// First value as a float, if any
    pub fn first(&self) -> Option<f64> {
        match self {
            PlainVector::Real(v) => v.first().copied(),
            PlainVector::Integer(v) => v.first().map(|&x| x as f64),
        }
    }

    /// Values as integers; fails on a non-integral real value
    pub fn to_i64(&self) -> HeStatsResult<Vec<i64>> {
        match self {
            PlainVector::Integer(v) => Ok(v.clone()),
            PlainVector::Real(v) => shared::utils::to_integers(v),
        }
    }
}

impl From<Vec<f64>> for PlainVector {
    fn from(values: Vec<f64>) -> Self {
        PlainVector::Real(values)
    }
}

impl From<Vec<i64>> for PlainVector {
    fn from(values: Vec<i64>) -> Self {
        PlainVector::Integer(values)
    }
}

/// Plaintext constant for `scalar_mul` and `add_plain`
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scalar {
    Real(f64),
    Integer(i64),
}

impl Scalar {
    pub fn as_f64(self) -> f64 {
        match self {
            Scalar::Real(x) => x,
            Scalar::Integer(x) => x as f64,
        }
    }

    /// The constant as an integer, rejecting fractional reals
    pub fn as_integer(self, scheme: SchemeTag) -> HeStatsResult<i64> {
        match self {
            Scalar::Integer(k) => Ok(k),
            Scalar::Real(x) if x.is_finite() && x.fract() == 0.0 && x.abs() < 9.0e15 => {
                Ok(x as i64)
            }
            Scalar::Real(x) => Err(HeStatsError::encoding(format!(
                "the {scheme} scheme needs an integer constant, got {x}"
            ))),
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Real(x) => write!(f, "{x}"),
            Scalar::Integer(x) => write!(f, "{x}"),
        }
    }
}

/// Opaque ciphertext tagged with its scheme and plaintext length
///
/// `depth` counts the ciphertext-ciphertext multiplications already applied.
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptedVector {
    pub tag: SchemeTag,
    pub length: usize,
    pub depth: usize,
    pub ciphertext: Vec<u8>,
}

impl fmt::Debug for EncryptedVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptedVector")
            .field("tag", &self.tag)
            .field("length", &self.length)
            .field("depth", &self.depth)
            .field("ciphertext_bytes", &self.ciphertext.len())
            .finish()
    }
}

impl EncryptedVector {
    pub fn new(tag: SchemeTag, length: usize, depth: usize, ciphertext: Vec<u8>) -> Self {
        Self {
            tag,
            length,
            depth,
            ciphertext,
        }
    }

    /// Layout: tag (1 byte), length and depth (u32 big-endian), ciphertext
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(VECTOR_HEADER_LEN + self.ciphertext.len());
        out.push(self.tag.code());
        out.extend_from_slice(&(self.length as u32).to_be_bytes());
        out.extend_from_slice(&(self.depth as u32).to_be_bytes());
        out.extend_from_slice(&self.ciphertext);
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> HeStatsResult<Self> {
        if bytes.len() < VECTOR_HEADER_LEN {
            return Err(FramingError::VectorHeader {
                reason: format!(
                    "{} bytes is shorter than the {VECTOR_HEADER_LEN}-byte header",
                    bytes.len()
                ),
            }
            .into());
        }
        let tag = SchemeTag::from_code(bytes[0]).map_err(|_| FramingError::VectorHeader {
            reason: format!("unknown scheme code {}", bytes[0]),
        })?;
        let length = u32::from_be_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]) as usize;
        let depth = u32::from_be_bytes([bytes[5], bytes[6], bytes[7], bytes[8]]) as usize;
        if length == 0 {
            return Err(FramingError::VectorHeader {
                reason: "vector length is zero".to_string(),
            }
            .into());
        }
        Ok(Self {
            tag,
            length,
            depth,
            ciphertext: bytes[VECTOR_HEADER_LEN..].to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_layout() {
        let v = EncryptedVector::new(SchemeTag::Exact, 5, 1, vec![0xAA, 0xBB]);
        let bytes = v.to_bytes();
        assert_eq!(bytes, vec![2, 0, 0, 0, 5, 0, 0, 0, 1, 0xAA, 0xBB]);
        assert_eq!(EncryptedVector::from_bytes(&bytes).unwrap(), v);
    }

    #[test]
    fn test_rejects_short_or_unknown_header() {
        assert!(matches!(
            EncryptedVector::from_bytes(&[1, 0, 0]),
            Err(HeStatsError::Framing(FramingError::VectorHeader { .. }))
        ));
        assert!(matches!(
            EncryptedVector::from_bytes(&[9, 0, 0, 0, 1, 0, 0, 0, 0]),
            Err(HeStatsError::Framing(FramingError::VectorHeader { .. }))
        ));
    }

    #[test]
    fn test_scalar_integer_check() {
        assert_eq!(Scalar::Real(21.0).as_integer(SchemeTag::Exact).unwrap(), 21);
        assert!(matches!(
            Scalar::Real(1.05).as_integer(SchemeTag::Exact),
            Err(HeStatsError::Encoding { .. })
        ));
    }

    #[test]
    fn test_plain_vector_conversions() {
        let v = PlainVector::from(vec![1.0, 2.0]);
        assert_eq!(v.to_i64().unwrap(), vec![1, 2]);
        assert!(PlainVector::Real(vec![0.5]).to_i64().is_err());
        assert_eq!(PlainVector::Integer(vec![3, 4]).to_f64(), vec![3.0, 4.0]);
        assert_eq!(PlainVector::Integer(vec![]).first(), None);
    }
}
