//! The scheme capability contract
//!
//! [`HomomorphicScheme`] is the evaluation surface handed to the analyzer:
//! it carries public material only. [`KeyHolder`] is kept by the data holder
//! and adds decryption.

use crate::vector::{EncryptedVector, PlainVector, Scalar};
use shared::{HeStatsError, HeStatsResult, SchemeTag};
use std::sync::Arc;

/// Operations available to any party holding the public context
pub trait HomomorphicScheme: Send + Sync {
    /// Scheme variant of every vector this context produces
    fn tag(&self) -> SchemeTag;

    /// Maximum number of values per vector
    fn capacity(&self) -> usize;

    /// Maximum number of chained ciphertext-ciphertext multiplications
    fn depth_budget(&self) -> usize;

    /// Encrypt plaintext values under the public key
    fn encode(&self, values: &PlainVector) -> HeStatsResult<EncryptedVector>;

    /// Elementwise addition
    fn add(&self, a: &EncryptedVector, b: &EncryptedVector) -> HeStatsResult<EncryptedVector>;

    /// Add a plaintext constant to the first `a.length` slots
    fn add_plain(&self, a: &EncryptedVector, constant: Scalar) -> HeStatsResult<EncryptedVector>;

    /// Multiply every slot by a plaintext constant
    fn scalar_mul(&self, a: &EncryptedVector, k: Scalar) -> HeStatsResult<EncryptedVector>;

    /// Elementwise multiplication; consumes one unit of depth
    fn elementwise_mul(
        &self,
        a: &EncryptedVector,
        b: &EncryptedVector,
    ) -> HeStatsResult<EncryptedVector>;

    /// Length-1 vector holding the sum of all slots
    fn reduce_sum(&self, a: &EncryptedVector) -> HeStatsResult<EncryptedVector>;

    /// Parse a vector produced by this scheme
    fn deserialize(&self, tag: SchemeTag, bytes: &[u8]) -> HeStatsResult<EncryptedVector>;

    /// Elementwise subtraction
    fn sub(&self, a: &EncryptedVector, b: &EncryptedVector) -> HeStatsResult<EncryptedVector> {
        let negated = self.scalar_mul(b, Scalar::Integer(-1))?;
        self.add(a, &negated)
    }

    /// Inner product: elementwise multiplication then reduction
    fn dot(&self, a: &EncryptedVector, b: &EncryptedVector) -> HeStatsResult<EncryptedVector> {
        let product = self.elementwise_mul(a, b)?;
        self.reduce_sum(&product)
    }

    /// Plaintext modulus of integer schemes with a small modulus
    fn plaintext_modulus(&self) -> Option<u64> {
        None
    }

    fn serialize(&self, a: &EncryptedVector) -> Vec<u8> {
        a.to_bytes()
    }

    /// Heuristic absolute error bound of a decrypted result of the given
    /// magnitude; `None` for exact schemes
    fn estimated_error(&self, _a: &EncryptedVector, _magnitude: f64) -> Option<f64> {
        None
    }
}

/// Secret-key side of a scheme
pub trait KeyHolder: Send + Sync {
    fn tag(&self) -> SchemeTag;

    /// Public evaluation handle carrying no secret material
    fn public(&self) -> Arc<dyn HomomorphicScheme>;

    /// Decrypt the first `a.length` slots
    fn decrypt(&self, a: &EncryptedVector) -> HeStatsResult<PlainVector>;

    fn encrypt(&self, values: &PlainVector) -> HeStatsResult<EncryptedVector> {
        self.public().encode(values)
    }

    /// Decrypt a length-1 vector to a float
    fn decrypt_scalar(&self, a: &EncryptedVector) -> HeStatsResult<f64> {
        self.decrypt(a)?
            .first()
            .ok_or_else(|| HeStatsError::backend("decryption produced no values"))
    }
}

/// Checks shared by every back end
pub(crate) mod checks {
    use super::*;

    pub fn same_scheme(tag: SchemeTag, a: &EncryptedVector) -> HeStatsResult<()> {
        if a.tag != tag {
            return Err(HeStatsError::mismatch(format!(
                "{} vector given to the {tag} scheme",
                a.tag
            )));
        }
        Ok(())
    }

    /// The caller expects `requested` but is talking to a `tag` context
    pub fn expect_tag(tag: SchemeTag, requested: SchemeTag) -> HeStatsResult<()> {
        if tag != requested {
            return Err(HeStatsError::mismatch(format!(
                "cannot read {requested} vectors with the {tag} scheme"
            )));
        }
        Ok(())
    }

    pub fn same_shape(tag: SchemeTag, a: &EncryptedVector, b: &EncryptedVector) -> HeStatsResult<()> {
        same_scheme(tag, a)?;
        same_scheme(tag, b)?;
        if a.length != b.length {
            return Err(HeStatsError::mismatch(format!(
                "vector lengths differ: {} vs {}",
                a.length, b.length
            )));
        }
        Ok(())
    }

    pub fn capacity(values: &PlainVector, capacity: usize) -> HeStatsResult<()> {
        if values.is_empty() {
            return Err(HeStatsError::encoding("cannot encrypt an empty vector"));
        }
        if values.len() > capacity {
            return Err(HeStatsError::encoding(format!(
                "{} values exceed the vector capacity of {capacity}",
                values.len()
            )));
        }
        Ok(())
    }

    /// Depth of a product, or an error if it would exceed the budget
    pub fn product_depth(
        a: &EncryptedVector,
        b: &EncryptedVector,
        budget: usize,
    ) -> HeStatsResult<usize> {
        let required = a.depth.max(b.depth) + 1;
        if required > budget {
            return Err(HeStatsError::depth("elementwise_mul", required, budget));
        }
        Ok(required)
    }

    pub fn vector_header(tag: SchemeTag, bytes: &[u8]) -> HeStatsResult<EncryptedVector> {
        let vector = EncryptedVector::from_bytes(bytes)?;
        same_scheme(tag, &vector)?;
        Ok(vector)
    }
}
