//! Additively homomorphic Paillier scheme
//!
//! Values are fixed-point integers `v · 10^digits` modulo `n`; the
//! upper half of `[0, n)` decodes as negative. Each element is its own
//! ciphertext modulo `n²`, so addition multiplies ciphertexts and scaling by
//! `k` raises them to the power `k`. There is no ciphertext-ciphertext
//! multiplication.

use crate::traits::{checks, HomomorphicScheme, KeyHolder};
use crate::vector::{EncryptedVector, PlainVector, Scalar};
use num_bigint::{BigInt, BigUint, Sign};
use num_bigint_dig::RandBigInt;
use num_integer::Integer;
use num_traits::{One, ToPrimitive, Zero};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use shared::utils::scale_to_integers;
use shared::{AdditiveConfig, HeStatsError, HeStatsResult, SchemeTag};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Paillier public key with generator `g = n + 1`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaillierPublicKey {
    pub n: BigUint,
    pub n_squared: BigUint,
}

impl PaillierPublicKey {
    fn new(n: BigUint) -> Self {
        let n_squared = &n * &n;
        Self { n, n_squared }
    }

    /// Map a signed integer into `[0, n)`
    fn to_residue(&self, m: i64) -> BigUint {
        let magnitude = BigUint::from(m.unsigned_abs()) % &self.n;
        if m < 0 && !magnitude.is_zero() {
            &self.n - magnitude
        } else {
            magnitude
        }
    }

    /// `(1 + n·m) · r^n mod n²`
    fn encrypt<R: Rng + ?Sized>(&self, m: i64, rng: &mut R) -> BigUint {
        let bound = num_bigint_dig::BigUint::from_bytes_le(&self.n.to_bytes_le());
        let r = loop {
            let r = BigUint::from_bytes_le(&rng.gen_biguint_below(&bound).to_bytes_le());
            if !r.is_zero() && r.gcd(&self.n).is_one() {
                break r;
            }
        };
        let gm = (BigUint::one() + &self.n * self.to_residue(m)) % &self.n_squared;
        gm * r.modpow(&self.n, &self.n_squared) % &self.n_squared
    }

    fn add(&self, a: &BigUint, b: &BigUint) -> BigUint {
        a * b % &self.n_squared
    }

    fn mul_plain(&self, c: &BigUint, k: i64) -> BigUint {
        c.modpow(&self.to_residue(k), &self.n_squared)
    }
}

/// Paillier secret key
pub struct PaillierSecretKey {
    lambda: BigUint,
    mu: BigUint,
    public: PaillierPublicKey,
}

impl PaillierSecretKey {
    /// Draw two distinct primes of `key_bits / 2` bits each
    pub fn generate<R: Rng + ?Sized>(key_bits: u64, rng: &mut R) -> HeStatsResult<Self> {
        let half = key_bits / 2;
        let prime = |rng: &mut R| {
            he_params::random_prime(half, rng).map_err(|e| HeStatsError::backend(e.to_string()))
        };
        let p = prime(rng)?;
        let q = loop {
            let q = prime(rng)?;
            if q != p {
                break q;
            }
        };
        let public = PaillierPublicKey::new(&p * &q);
        let lambda = (&p - 1u32).lcm(&(&q - 1u32));
        let mu = mod_inverse(&lambda, &public.n)
            .ok_or_else(|| HeStatsError::backend("λ is not invertible modulo n"))?;
        Ok(Self { lambda, mu, public })
    }

    /// `L(c^λ mod n²) · μ mod n`, centred around zero
    fn decrypt(&self, c: &BigUint) -> BigInt {
        let n = &self.public.n;
        let x = c.modpow(&self.lambda, &self.public.n_squared);
        let l = (x - 1u32) / n;
        let m = l * &self.mu % n;
        if m > (n >> 1usize) {
            BigInt::from_biguint(Sign::Minus, n - m)
        } else {
            BigInt::from_biguint(Sign::Plus, m)
        }
    }
}

fn mod_inverse(a: &BigUint, modulus: &BigUint) -> Option<BigUint> {
    let a = BigInt::from(a.clone());
    let m = BigInt::from(modulus.clone());
    let egcd = a.extended_gcd(&m);
    if !egcd.gcd.is_one() {
        return None;
    }
    egcd.x.mod_floor(&m).to_biguint()
}

/// Public side of the additive scheme
pub struct AdditiveScheme {
    key: PaillierPublicKey,
    scale: i64,
    capacity: usize,
    rng: Mutex<ChaCha20Rng>,
}

impl AdditiveScheme {
    pub fn public_key(&self) -> &PaillierPublicKey {
        &self.key
    }

    /// Fixed-point factor `10^digits`
    pub fn scale(&self) -> i64 {
        self.scale
    }

    /// Values finer than `1 / scale` are rejected rather than rounded
    fn fixed_point(&self, values: &[f64]) -> HeStatsResult<Vec<i64>> {
        scale_to_integers(values, self.scale)
    }

    fn elements(&self, a: &EncryptedVector) -> HeStatsResult<Vec<BigUint>> {
        checks::same_scheme(SchemeTag::Additive, a)?;
        let elements = decode_payload(&a.ciphertext)?;
        if elements.len() != a.length {
            return Err(HeStatsError::from(shared::FramingError::VectorHeader {
                reason: format!(
                    "header declares {} elements, payload holds {}",
                    a.length,
                    elements.len()
                ),
            }));
        }
        if let Some(pos) = elements.iter().position(|c| c >= &self.key.n_squared) {
            return Err(HeStatsError::mismatch(format!(
                "element {pos} is not a ciphertext under this public key"
            )));
        }
        Ok(elements)
    }

    fn wrap(&self, elements: &[BigUint]) -> EncryptedVector {
        EncryptedVector::new(SchemeTag::Additive, elements.len(), 0, encode_payload(elements))
    }
}

/// `[count u32 BE]` then `[len u32 BE][big-endian bytes]` per element
fn encode_payload(elements: &[BigUint]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&(elements.len() as u32).to_be_bytes());
    for c in elements {
        let bytes = c.to_bytes_be();
        out.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
        out.extend_from_slice(&bytes);
    }
    out
}

fn decode_payload(bytes: &[u8]) -> HeStatsResult<Vec<BigUint>> {
    let malformed = |reason: String| HeStatsError::from(shared::FramingError::VectorHeader { reason });
    let read_u32 = |at: usize| -> HeStatsResult<usize> {
        bytes
            .get(at..at + 4)
            .and_then(|b| b.try_into().ok())
            .map(|b| u32::from_be_bytes(b) as usize)
            .ok_or_else(|| malformed(format!("payload truncated at byte {at}")))
    };

    let count = read_u32(0)?;
    let mut offset = 4;
    let mut elements = Vec::with_capacity(count.min(bytes.len() / 4));
    for _ in 0..count {
        let len = read_u32(offset)?;
        offset += 4;
        let body = bytes
            .get(offset..offset + len)
            .ok_or_else(|| malformed(format!("element of {len} bytes overruns the payload")))?;
        elements.push(BigUint::from_bytes_be(body));
        offset += len;
    }
    if offset != bytes.len() {
        return Err(malformed(format!(
            "{} bytes after the last element",
            bytes.len() - offset
        )));
    }
    Ok(elements)
}

impl HomomorphicScheme for AdditiveScheme {
    fn tag(&self) -> SchemeTag {
        SchemeTag::Additive
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn depth_budget(&self) -> usize {
        0
    }

    fn encode(&self, values: &PlainVector) -> HeStatsResult<EncryptedVector> {
        checks::capacity(values, self.capacity)?;
        let fixed = self.fixed_point(&values.to_f64())?;
        let mut rng = self
            .rng
            .lock()
            .map_err(|_| HeStatsError::backend("random generator lock poisoned"))?;
        let elements: Vec<BigUint> = fixed.iter().map(|&m| self.key.encrypt(m, &mut *rng)).collect();
        debug!(length = elements.len(), "additive encode");
        Ok(self.wrap(&elements))
    }

    fn add(&self, a: &EncryptedVector, b: &EncryptedVector) -> HeStatsResult<EncryptedVector> {
        checks::same_shape(SchemeTag::Additive, a, b)?;
        let sums: Vec<BigUint> = self
            .elements(a)?
            .iter()
            .zip(self.elements(b)?.iter())
            .map(|(x, y)| self.key.add(x, y))
            .collect();
        debug!("additive add");
        Ok(self.wrap(&sums))
    }

    fn add_plain(&self, a: &EncryptedVector, constant: Scalar) -> HeStatsResult<EncryptedVector> {
        let m = self.fixed_point(&[constant.as_f64()])?[0];
        // g^m = 1 + n·m mod n²
        let shift = (BigUint::one() + &self.key.n * self.key.to_residue(m)) % &self.key.n_squared;
        let shifted: Vec<BigUint> = self
            .elements(a)?
            .iter()
            .map(|c| self.key.add(c, &shift))
            .collect();
        debug!(%constant, "additive add_plain");
        Ok(self.wrap(&shifted))
    }

    fn scalar_mul(&self, a: &EncryptedVector, k: Scalar) -> HeStatsResult<EncryptedVector> {
        let k = k.as_integer(SchemeTag::Additive)?;
        let scaled: Vec<BigUint> = self
            .elements(a)?
            .iter()
            .map(|c| self.key.mul_plain(c, k))
            .collect();
        debug!(k, "additive scalar_mul");
        Ok(self.wrap(&scaled))
    }

    fn elementwise_mul(
        &self,
        _a: &EncryptedVector,
        _b: &EncryptedVector,
    ) -> HeStatsResult<EncryptedVector> {
        Err(HeStatsError::unsupported("elementwise_mul", SchemeTag::Additive.name()))
    }

    fn reduce_sum(&self, a: &EncryptedVector) -> HeStatsResult<EncryptedVector> {
        let total = self
            .elements(a)?
            .iter()
            .fold(BigUint::one(), |acc, c| self.key.add(&acc, c));
        debug!(length = a.length, "additive reduce_sum");
        Ok(self.wrap(&[total]))
    }

    fn deserialize(&self, tag: SchemeTag, bytes: &[u8]) -> HeStatsResult<EncryptedVector> {
        checks::expect_tag(SchemeTag::Additive, tag)?;
        let vector = checks::vector_header(tag, bytes)?;
        self.elements(&vector)?;
        Ok(vector)
    }
}

/// Secret side of the additive scheme
pub struct AdditiveKeyHolder {
    secret_key: PaillierSecretKey,
    public: Arc<AdditiveScheme>,
}

impl AdditiveKeyHolder {
    pub fn generate(config: &AdditiveConfig, seed: Option<u64>) -> HeStatsResult<Self> {
        config.validate()?;
        let mut rng = match seed {
            Some(seed) => ChaCha20Rng::seed_from_u64(seed),
            None => ChaCha20Rng::from_os_rng(),
        };
        let secret_key = PaillierSecretKey::generate(config.key_bits, &mut rng)?;
        debug!(key_bits = config.key_bits, "additive keys generated");

        let public = Arc::new(AdditiveScheme {
            key: secret_key.public.clone(),
            scale: 10i64.pow(config.fixed_point_digits),
            capacity: config.vector_capacity,
            rng: Mutex::new(ChaCha20Rng::from_rng(&mut rng)),
        });
        Ok(Self { secret_key, public })
    }

    pub fn scheme(&self) -> &Arc<AdditiveScheme> {
        &self.public
    }
}

impl KeyHolder for AdditiveKeyHolder {
    fn tag(&self) -> SchemeTag {
        SchemeTag::Additive
    }

    fn public(&self) -> Arc<dyn HomomorphicScheme> {
        self.public.clone()
    }

    fn decrypt(&self, a: &EncryptedVector) -> HeStatsResult<PlainVector> {
        let scale = self.public.scale as f64;
        let values = self
            .public
            .elements(a)?
            .iter()
            .map(|c| {
                self.secret_key
                    .decrypt(c)
                    .to_f64()
                    .map(|m| m / scale)
                    .ok_or_else(|| HeStatsError::backend("decrypted value does not fit a float"))
            })
            .collect::<HeStatsResult<Vec<_>>>()?;
        Ok(PlainVector::Real(values))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::Preset;

    fn holder() -> AdditiveKeyHolder {
        AdditiveKeyHolder::generate(&AdditiveConfig::preset(Preset::Test), Some(11)).unwrap()
    }

    #[test]
    fn test_key_generation() {
        let holder = holder();
        let n = &holder.scheme().public_key().n;
        assert!(n.bits() >= 511 && n.bits() <= 512);
        assert_eq!(holder.scheme().scale(), 100);
    }

    #[test]
    fn test_round_trip_fixed_point() {
        let holder = holder();
        let values = vec![1200.50, -2500.0, 0.0, 1800.75];
        let ct = holder.encrypt(&PlainVector::Real(values.clone())).unwrap();
        assert_eq!(holder.decrypt(&ct).unwrap(), PlainVector::Real(values));
    }

    #[test]
    fn test_average() {
        let holder = holder();
        let scheme = holder.public();
        let salaries = vec![1200.50, 2500.00, 1800.75, 3200.10, 4500.00];
        let ct = scheme.encode(&PlainVector::Real(salaries)).unwrap();
        let total = scheme.reduce_sum(&ct).unwrap();
        assert_eq!(total.length, 1);
        let sum = holder.decrypt_scalar(&total).unwrap();
        assert!((sum - 13201.35).abs() < 1e-9);
        assert!((sum / 5.0 - 2640.27).abs() < 1e-9);
    }

    #[test]
    fn test_rejects_values_below_fixed_point_resolution() {
        let holder = holder();
        let scheme = holder.public();
        assert!(matches!(
            scheme.encode(&PlainVector::Real(vec![0.004; 5])),
            Err(HeStatsError::Encoding { .. })
        ));
        assert!(matches!(
            scheme.encode(&PlainVector::Real(vec![2500.00, 1200.505])),
            Err(HeStatsError::Encoding { .. })
        ));

        let a = scheme.encode(&PlainVector::Real(vec![1.0])).unwrap();
        assert!(matches!(
            scheme.add_plain(&a, Scalar::Real(0.125)),
            Err(HeStatsError::Encoding { .. })
        ));
    }

    #[test]
    fn test_linear_operations() {
        let holder = holder();
        let scheme = holder.public();
        let a = scheme.encode(&PlainVector::Real(vec![1.25, 2.0])).unwrap();
        let b = scheme.encode(&PlainVector::Real(vec![0.75, 3.0])).unwrap();

        let sum = scheme.add(&a, &b).unwrap();
        assert_eq!(holder.decrypt(&sum).unwrap(), PlainVector::Real(vec![2.0, 5.0]));

        let diff = scheme.sub(&a, &b).unwrap();
        assert_eq!(holder.decrypt(&diff).unwrap(), PlainVector::Real(vec![0.5, -1.0]));

        let tripled = scheme.scalar_mul(&a, Scalar::Integer(3)).unwrap();
        assert_eq!(holder.decrypt(&tripled).unwrap(), PlainVector::Real(vec![3.75, 6.0]));

        let shifted = scheme.add_plain(&a, Scalar::Real(-1.25)).unwrap();
        assert_eq!(holder.decrypt(&shifted).unwrap(), PlainVector::Real(vec![0.0, 0.75]));
    }

    #[test]
    fn test_no_ciphertext_products() {
        let holder = holder();
        let scheme = holder.public();
        let a = scheme.encode(&PlainVector::Real(vec![1.0, 2.0])).unwrap();
        assert!(matches!(
            scheme.elementwise_mul(&a, &a),
            Err(HeStatsError::UnsupportedOperation { .. })
        ));
        assert!(matches!(
            scheme.dot(&a, &a),
            Err(HeStatsError::UnsupportedOperation { .. })
        ));
        assert!(matches!(
            scheme.scalar_mul(&a, Scalar::Real(0.5)),
            Err(HeStatsError::Encoding { .. })
        ));
    }

    #[test]
    fn test_serialize_round_trip_and_corruption() {
        let holder = holder();
        let scheme = holder.public();
        let a = scheme.encode(&PlainVector::Real(vec![9.99, -0.01])).unwrap();
        let bytes = scheme.serialize(&a);
        let restored = scheme.deserialize(SchemeTag::Additive, &bytes).unwrap();
        assert_eq!(
            holder.decrypt(&restored).unwrap(),
            PlainVector::Real(vec![9.99, -0.01])
        );

        let mut truncated = bytes.clone();
        truncated.pop();
        assert!(matches!(
            scheme.deserialize(SchemeTag::Additive, &truncated),
            Err(HeStatsError::Framing(_))
        ));
        assert!(matches!(
            scheme.deserialize(SchemeTag::Exact, &bytes),
            Err(HeStatsError::SchemeMismatch { .. })
        ));
    }

    #[test]
    fn test_mod_inverse() {
        let inv = mod_inverse(&BigUint::from(3u32), &BigUint::from(11u32)).unwrap();
        assert_eq!(inv, BigUint::from(4u32));
        assert!(mod_inverse(&BigUint::from(4u32), &BigUint::from(8u32)).is_none());
    }
}
