//! Exact modular-integer arithmetic on the fhe.rs BFV back end

use crate::traits::{checks, HomomorphicScheme, KeyHolder};
use crate::vector::{EncryptedVector, PlainVector, Scalar};
use fhe::bfv::{
    BfvParameters, BfvParametersBuilder, Ciphertext, Encoding, EvaluationKey,
    EvaluationKeyBuilder, Plaintext, PublicKey, RelinearizationKey, SecretKey,
};
use fhe_traits::{
    DeserializeParametrized, FheDecoder, FheDecrypter, FheEncoder, FheEncrypter, Serialize,
};
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use shared::{ExactConfig, HeStatsError, HeStatsResult, SchemeTag};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Public side of the exact scheme
pub struct ExactScheme {
    params: Arc<BfvParameters>,
    public_key: PublicKey,
    relin_key: RelinearizationKey,
    eval_key: EvaluationKey,
    depth_budget: usize,
    rng: Mutex<ChaCha20Rng>,
}

impl ExactScheme {
    /// Largest magnitude a slot can hold as a signed value
    pub fn signed_bound(&self) -> u64 {
        (self.params.plaintext() - 1) / 2
    }

    fn ciphertext(&self, a: &EncryptedVector) -> HeStatsResult<Ciphertext> {
        checks::same_scheme(SchemeTag::Exact, a)?;
        Ok(Ciphertext::from_bytes(&a.ciphertext, &self.params)?)
    }

    fn wrap(&self, ct: &Ciphertext, length: usize, depth: usize) -> EncryptedVector {
        EncryptedVector::new(SchemeTag::Exact, length, depth, ct.to_bytes())
    }

    fn check_range(&self, values: &[i64]) -> HeStatsResult<()> {
        let bound = self.signed_bound();
        if let Some(v) = values.iter().find(|v| v.unsigned_abs() > bound) {
            return Err(HeStatsError::encoding(format!(
                "value {v} is outside the signed range ±{bound} of plaintext modulus {}",
                self.params.plaintext()
            )));
        }
        Ok(())
    }

    fn plaintext(&self, values: &[i64]) -> HeStatsResult<Plaintext> {
        Ok(Plaintext::try_encode(values, Encoding::simd(), &self.params)?)
    }

    /// Plaintext holding `k` in every slot
    fn constant(&self, k: i64) -> HeStatsResult<Plaintext> {
        self.check_range(&[k])?;
        self.plaintext(&vec![k; self.params.degree()])
    }
}

impl HomomorphicScheme for ExactScheme {
    fn tag(&self) -> SchemeTag {
        SchemeTag::Exact
    }

    fn capacity(&self) -> usize {
        self.params.degree()
    }

    fn depth_budget(&self) -> usize {
        self.depth_budget
    }

    fn encode(&self, values: &PlainVector) -> HeStatsResult<EncryptedVector> {
        checks::capacity(values, self.capacity())?;
        let integers = values.to_i64()?;
        self.check_range(&integers)?;
        let pt = self.plaintext(&integers)?;
        let mut rng = self
            .rng
            .lock()
            .map_err(|_| HeStatsError::backend("random generator lock poisoned"))?;
        let ct: Ciphertext = self.public_key.try_encrypt(&pt, &mut *rng)?;
        debug!(length = integers.len(), "exact encode");
        Ok(self.wrap(&ct, integers.len(), 0))
    }

    fn add(&self, a: &EncryptedVector, b: &EncryptedVector) -> HeStatsResult<EncryptedVector> {
        checks::same_shape(SchemeTag::Exact, a, b)?;
        let ct = &self.ciphertext(a)? + &self.ciphertext(b)?;
        debug!("exact add");
        Ok(self.wrap(&ct, a.length, a.depth.max(b.depth)))
    }

    fn sub(&self, a: &EncryptedVector, b: &EncryptedVector) -> HeStatsResult<EncryptedVector> {
        checks::same_shape(SchemeTag::Exact, a, b)?;
        let ct = &self.ciphertext(a)? - &self.ciphertext(b)?;
        debug!("exact sub");
        Ok(self.wrap(&ct, a.length, a.depth.max(b.depth)))
    }

    fn add_plain(&self, a: &EncryptedVector, constant: Scalar) -> HeStatsResult<EncryptedVector> {
        let k = constant.as_integer(SchemeTag::Exact)?;
        self.check_range(&[k])?;
        let pt = self.plaintext(&vec![k; a.length])?;
        let ct = &self.ciphertext(a)? + &pt;
        debug!(k, "exact add_plain");
        Ok(self.wrap(&ct, a.length, a.depth))
    }

    fn scalar_mul(&self, a: &EncryptedVector, k: Scalar) -> HeStatsResult<EncryptedVector> {
        let k = k.as_integer(SchemeTag::Exact)?;
        let pt = self.constant(k)?;
        let ct = &self.ciphertext(a)? * &pt;
        debug!(k, "exact scalar_mul");
        Ok(self.wrap(&ct, a.length, a.depth))
    }

    fn elementwise_mul(
        &self,
        a: &EncryptedVector,
        b: &EncryptedVector,
    ) -> HeStatsResult<EncryptedVector> {
        checks::same_shape(SchemeTag::Exact, a, b)?;
        let depth = checks::product_depth(a, b, self.depth_budget)?;
        let mut ct = &self.ciphertext(a)? * &self.ciphertext(b)?;
        self.relin_key.relinearizes(&mut ct)?;
        debug!(depth, "exact elementwise_mul");
        Ok(self.wrap(&ct, a.length, depth))
    }

    fn reduce_sum(&self, a: &EncryptedVector) -> HeStatsResult<EncryptedVector> {
        let ct = self.eval_key.computes_inner_sum(&self.ciphertext(a)?)?;
        debug!(length = a.length, "exact reduce_sum");
        Ok(self.wrap(&ct, 1, a.depth))
    }

    fn plaintext_modulus(&self) -> Option<u64> {
        Some(self.params.plaintext())
    }

    fn deserialize(&self, tag: SchemeTag, bytes: &[u8]) -> HeStatsResult<EncryptedVector> {
        checks::expect_tag(SchemeTag::Exact, tag)?;
        let vector = checks::vector_header(tag, bytes)?;
        self.ciphertext(&vector)?;
        Ok(vector)
    }
}

/// Secret side of the exact scheme
pub struct ExactKeyHolder {
    secret_key: SecretKey,
    public: Arc<ExactScheme>,
}

impl ExactKeyHolder {
    /// Generate keys for `config`, seeding the generator when `seed` is given
    pub fn generate(config: &ExactConfig, seed: Option<u64>) -> HeStatsResult<Self> {
        config.validate()?;
        let params = BfvParametersBuilder::new()
            .set_degree(config.degree)
            .set_plaintext_modulus(config.plaintext_modulus)
            .set_moduli_sizes(&config.moduli_sizes)
            .build_arc()?;

        let mut rng = match seed {
            Some(seed) => ChaCha20Rng::seed_from_u64(seed),
            None => ChaCha20Rng::from_os_rng(),
        };
        let secret_key = SecretKey::random(&params, &mut rng);
        let public_key = PublicKey::new(&secret_key, &mut rng);
        let relin_key = RelinearizationKey::new(&secret_key, &mut rng)?;
        let mut builder = EvaluationKeyBuilder::new(&secret_key)?;
        builder.enable_inner_sum()?;
        let eval_key = builder.build(&mut rng)?;
        debug!(
            degree = config.degree,
            plaintext_modulus = config.plaintext_modulus,
            "exact keys generated"
        );

        let public = Arc::new(ExactScheme {
            params,
            public_key,
            relin_key,
            eval_key,
            depth_budget: config.depth_budget,
            rng: Mutex::new(ChaCha20Rng::from_rng(&mut rng)),
        });
        Ok(Self { secret_key, public })
    }

    pub fn scheme(&self) -> &Arc<ExactScheme> {
        &self.public
    }
}

impl KeyHolder for ExactKeyHolder {
    fn tag(&self) -> SchemeTag {
        SchemeTag::Exact
    }

    fn public(&self) -> Arc<dyn HomomorphicScheme> {
        self.public.clone()
    }

    fn decrypt(&self, a: &EncryptedVector) -> HeStatsResult<PlainVector> {
        let ct = self.public.ciphertext(a)?;
        let pt = self.secret_key.try_decrypt(&ct)?;
        let mut values = Vec::<i64>::try_decode(&pt, Encoding::simd())?;
        values.truncate(a.length);
        Ok(PlainVector::Integer(values))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::Preset;

    fn holder() -> ExactKeyHolder {
        ExactKeyHolder::generate(&ExactConfig::preset(Preset::Test), Some(7)).unwrap()
    }

    #[test]
    fn test_exact_round_trip() {
        let holder = holder();
        let quarter = (holder.scheme().plaintext_modulus().unwrap() / 4) as i64 - 1;
        let values = vec![0, 1, -1, 120050, -450000, quarter, -quarter];
        let ct = holder.encrypt(&PlainVector::Integer(values.clone())).unwrap();
        assert_eq!(holder.decrypt(&ct).unwrap(), PlainVector::Integer(values));
    }

    #[test]
    fn test_rejects_out_of_range_and_fractions() {
        let holder = holder();
        let scheme = holder.public();
        let too_big = holder.scheme().signed_bound() as i64 + 1;
        assert!(matches!(
            scheme.encode(&PlainVector::Integer(vec![too_big])),
            Err(HeStatsError::Encoding { .. })
        ));
        assert!(matches!(
            scheme.encode(&PlainVector::Real(vec![1.5])),
            Err(HeStatsError::Encoding { .. })
        ));

        let ct = scheme.encode(&PlainVector::Integer(vec![1, 2])).unwrap();
        assert!(matches!(
            scheme.scalar_mul(&ct, Scalar::Real(1.05)),
            Err(HeStatsError::Encoding { .. })
        ));
    }

    #[test]
    fn test_integer_formula() {
        // (10·S + B) × 21, summed
        let holder = holder();
        let scheme = holder.public();
        let s = scheme.encode(&PlainVector::Integer(vec![120050, 250000])).unwrap();
        let b = scheme.encode(&PlainVector::Integer(vec![10000, 0])).unwrap();

        let weighted = scheme.add(&scheme.scalar_mul(&s, Scalar::Integer(10)).unwrap(), &b).unwrap();
        let total = scheme
            .reduce_sum(&scheme.scalar_mul(&weighted, Scalar::Integer(21)).unwrap())
            .unwrap();
        let expected = (10 * 120050 + 10000 + 10 * 250000) * 21;
        assert_eq!(holder.decrypt_scalar(&total).unwrap(), expected as f64);
    }

    #[test]
    fn test_dot_product_exact() {
        let holder = holder();
        let scheme = holder.public();
        let shares = scheme.encode(&PlainVector::Integer(vec![10, 50, 20, 5, 100])).unwrap();
        let prices = scheme
            .encode(&PlainVector::Integer(vec![15050, 20000, 5025, 100000, 1010]))
            .unwrap();
        let dot = scheme.dot(&shares, &prices).unwrap();
        assert_eq!(dot.depth, 1);
        // 10·150.50 + 50·200.00 + 20·50.25 + 5·1000.00 + 100·10.10
        assert_eq!(holder.decrypt_scalar(&dot).unwrap() / 100.0, 18520.0);
    }

    #[test]
    fn test_negative_results_and_add_plain() {
        let holder = holder();
        let scheme = holder.public();
        let ct = scheme.encode(&PlainVector::Integer(vec![3, 5, 7])).unwrap();
        let shifted = scheme.add_plain(&ct, Scalar::Integer(-5)).unwrap();
        assert_eq!(
            holder.decrypt(&shifted).unwrap(),
            PlainVector::Integer(vec![-2, 0, 2])
        );
        let total = scheme.reduce_sum(&shifted).unwrap();
        assert_eq!(holder.decrypt_scalar(&total).unwrap(), 0.0);
    }

    #[test]
    fn test_depth_budget_enforced() {
        let holder = holder();
        let scheme = holder.public();
        let ct = scheme.encode(&PlainVector::Integer(vec![2, 3])).unwrap();
        let sq = scheme.elementwise_mul(&ct, &ct).unwrap();
        let quad = scheme.elementwise_mul(&sq, &sq).unwrap();
        assert_eq!(holder.decrypt(&quad).unwrap(), PlainVector::Integer(vec![16, 81]));
        assert!(matches!(
            scheme.elementwise_mul(&quad, &ct),
            Err(HeStatsError::DepthExceeded { required: 3, budget: 2, .. })
        ));
    }

    #[test]
    fn test_serialize_round_trip() {
        let holder = holder();
        let scheme = holder.public();
        let ct = scheme.encode(&PlainVector::Integer(vec![42, -42])).unwrap();
        let restored = scheme.deserialize(SchemeTag::Exact, &scheme.serialize(&ct)).unwrap();
        assert_eq!(
            holder.decrypt(&restored).unwrap(),
            PlainVector::Integer(vec![42, -42])
        );
    }
}
