//! Approximate real arithmetic on the in-house CKKS back end

use crate::traits::{checks, HomomorphicScheme, KeyHolder};
use crate::vector::{EncryptedVector, PlainVector, Scalar};
use ckks::{
    decrypt, encrypt, Ciphertext, CkksParameters, CkksParametersBuilder, DeserializeParametrized,
    EvaluationKeys, Evaluator, PublicKey, SecretKey, Serialize,
};
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use shared::{ApproxConfig, HeStatsError, HeStatsResult, SchemeTag};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Multiplier of the heuristic error estimate
const ERROR_ESTIMATE_FACTOR: f64 = 16.0;

/// Public side of the approximate scheme
pub struct ApproxScheme {
    params: Arc<CkksParameters>,
    public_key: PublicKey,
    evaluator: Evaluator,
    depth_budget: usize,
    rng: Mutex<ChaCha20Rng>,
}

impl ApproxScheme {
    fn ciphertext(&self, a: &EncryptedVector) -> HeStatsResult<Ciphertext> {
        checks::same_scheme(SchemeTag::Approx, a)?;
        let ct = Ciphertext::from_bytes(&a.ciphertext, &self.params)?;
        ct.check(&self.params)?;
        Ok(ct)
    }

    fn wrap(&self, ct: &Ciphertext, length: usize, depth: usize) -> EncryptedVector {
        EncryptedVector::new(SchemeTag::Approx, length, depth, ct.to_bytes())
    }

    pub fn params(&self) -> &Arc<CkksParameters> {
        &self.params
    }
}

impl HomomorphicScheme for ApproxScheme {
    fn tag(&self) -> SchemeTag {
        SchemeTag::Approx
    }

    fn capacity(&self) -> usize {
        self.params.slots()
    }

    fn depth_budget(&self) -> usize {
        self.depth_budget
    }

    fn encode(&self, values: &PlainVector) -> HeStatsResult<EncryptedVector> {
        checks::capacity(values, self.capacity())?;
        let reals = values.to_f64();
        let mut rng = self
            .rng
            .lock()
            .map_err(|_| HeStatsError::backend("random generator lock poisoned"))?;
        let ct = encrypt(&reals, &self.public_key, &mut *rng)?;
        debug!(length = reals.len(), level = ct.level, "approx encode");
        Ok(self.wrap(&ct, reals.len(), 0))
    }

    fn add(&self, a: &EncryptedVector, b: &EncryptedVector) -> HeStatsResult<EncryptedVector> {
        checks::same_shape(SchemeTag::Approx, a, b)?;
        let ct = self.evaluator.add(&self.ciphertext(a)?, &self.ciphertext(b)?)?;
        debug!(level = ct.level, "approx add");
        Ok(self.wrap(&ct, a.length, a.depth.max(b.depth)))
    }

    fn sub(&self, a: &EncryptedVector, b: &EncryptedVector) -> HeStatsResult<EncryptedVector> {
        checks::same_shape(SchemeTag::Approx, a, b)?;
        let ct = self.evaluator.sub(&self.ciphertext(a)?, &self.ciphertext(b)?)?;
        debug!(level = ct.level, "approx sub");
        Ok(self.wrap(&ct, a.length, a.depth.max(b.depth)))
    }

    fn add_plain(&self, a: &EncryptedVector, constant: Scalar) -> HeStatsResult<EncryptedVector> {
        let values = vec![constant.as_f64(); a.length];
        let ct = self.evaluator.add_plain(&self.ciphertext(a)?, &values)?;
        debug!(%constant, level = ct.level, "approx add_plain");
        Ok(self.wrap(&ct, a.length, a.depth))
    }

    fn scalar_mul(&self, a: &EncryptedVector, k: Scalar) -> HeStatsResult<EncryptedVector> {
        let ct = self.ciphertext(a)?;
        // Integral constants need no rescaling and keep the level
        let ct = match k.as_integer(SchemeTag::Approx) {
            Ok(integer) => self.evaluator.mul_integer(&ct, integer)?,
            Err(_) => self.evaluator.mul_constant(&ct, k.as_f64())?,
        };
        debug!(%k, level = ct.level, "approx scalar_mul");
        Ok(self.wrap(&ct, a.length, a.depth))
    }

    fn elementwise_mul(
        &self,
        a: &EncryptedVector,
        b: &EncryptedVector,
    ) -> HeStatsResult<EncryptedVector> {
        checks::same_shape(SchemeTag::Approx, a, b)?;
        let depth = checks::product_depth(a, b, self.depth_budget)?;
        let ct = self.evaluator.mul(&self.ciphertext(a)?, &self.ciphertext(b)?)?;
        debug!(depth, level = ct.level, "approx elementwise_mul");
        Ok(self.wrap(&ct, a.length, depth))
    }

    fn reduce_sum(&self, a: &EncryptedVector) -> HeStatsResult<EncryptedVector> {
        let ct = self.evaluator.inner_sum(&self.ciphertext(a)?)?;
        debug!(length = a.length, level = ct.level, "approx reduce_sum");
        Ok(self.wrap(&ct, 1, a.depth))
    }

    fn deserialize(&self, tag: SchemeTag, bytes: &[u8]) -> HeStatsResult<EncryptedVector> {
        checks::expect_tag(SchemeTag::Approx, tag)?;
        let vector = checks::vector_header(tag, bytes)?;
        self.ciphertext(&vector)?;
        Ok(vector)
    }

    /// Rounding and key-switching error grows with the levels consumed and
    /// with the magnitude of the result
    fn estimated_error(&self, a: &EncryptedVector, magnitude: f64) -> Option<f64> {
        let ct = self.ciphertext(a).ok()?;
        let consumed = (self.params.levels - ct.level) as f64;
        let bound = (1.0 + consumed)
            * (self.params.degree as f64).sqrt()
            * magnitude.abs().max(1.0)
            * ERROR_ESTIMATE_FACTOR
            / self.params.scale();
        Some(bound)
    }
}

/// Secret side of the approximate scheme
pub struct ApproxKeyHolder {
    secret_key: SecretKey,
    public: Arc<ApproxScheme>,
}

impl ApproxKeyHolder {
    /// Generate keys for `config`, seeding the generator when `seed` is given
    pub fn generate(config: &ApproxConfig, seed: Option<u64>) -> HeStatsResult<Self> {
        config.validate()?;
        let params = CkksParametersBuilder::new()
            .set_degree(config.degree)
            .set_scale_bits(config.scale_bits)
            .set_integer_bits(config.integer_bits)
            .set_levels(config.levels)
            .set_secret_variance(config.secret_variance)
            .set_error_variance(config.error_variance)
            .build_arc()?;

        let mut rng = match seed {
            Some(seed) => ChaCha20Rng::seed_from_u64(seed),
            None => ChaCha20Rng::from_os_rng(),
        };
        let secret_key = SecretKey::random(&params, &mut rng)?;
        let public_key = PublicKey::new(&secret_key, &mut rng)?;
        let keys = EvaluationKeys::new(&secret_key, &mut rng)?;
        let evaluator = Evaluator::new(Arc::new(keys));
        debug!(
            degree = params.degree,
            levels = params.levels,
            scale_bits = params.scale_bits,
            "approx keys generated"
        );

        let public = Arc::new(ApproxScheme {
            params,
            public_key,
            evaluator,
            depth_budget: config.depth_budget,
            rng: Mutex::new(ChaCha20Rng::from_rng(&mut rng)),
        });
        Ok(Self { secret_key, public })
    }
}

impl KeyHolder for ApproxKeyHolder {
    fn tag(&self) -> SchemeTag {
        SchemeTag::Approx
    }

    fn public(&self) -> Arc<dyn HomomorphicScheme> {
        self.public.clone()
    }

    fn decrypt(&self, a: &EncryptedVector) -> HeStatsResult<PlainVector> {
        let ct = self.public.ciphertext(a)?;
        let values = decrypt(&ct, &self.secret_key, a.length)?;
        Ok(PlainVector::Real(values))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::Preset;

    fn holder() -> ApproxKeyHolder {
        ApproxKeyHolder::generate(&ApproxConfig::preset(Preset::Test), Some(1)).unwrap()
    }

    fn assert_close(got: &PlainVector, want: &[f64], tol: f64) {
        let got = got.to_f64();
        assert_eq!(got.len(), want.len());
        for (g, w) in got.iter().zip(want) {
            assert!((g - w).abs() < tol, "got {g}, want {w}");
        }
    }

    #[test]
    fn test_round_trip_within_tolerance() {
        let holder = holder();
        let values = vec![1200.50, 2500.00, 1800.75, 3200.10, 4500.00];
        let ct = holder.encrypt(&PlainVector::Real(values.clone())).unwrap();
        assert_eq!(ct.length, 5);
        assert_close(&holder.decrypt(&ct).unwrap(), &values, 1e-2);
    }

    #[test]
    fn test_mean_through_public_handle() {
        let holder = holder();
        let scheme = holder.public();
        let values = vec![1200.50, 2500.00, 1800.75, 3200.10, 4500.00];
        let ct = scheme.encode(&PlainVector::Real(values)).unwrap();

        let sum = scheme.reduce_sum(&ct).unwrap();
        let mean = scheme.scalar_mul(&sum, Scalar::Real(1.0 / 5.0)).unwrap();
        assert_eq!(mean.length, 1);
        assert!((holder.decrypt_scalar(&mean).unwrap() - 2640.27).abs() < 1e-2);
    }

    #[test]
    fn test_depth_budget_enforced() {
        let holder = holder();
        let scheme = holder.public();
        let ct = scheme.encode(&PlainVector::Real(vec![1.5, 2.0])).unwrap();

        let sq = scheme.elementwise_mul(&ct, &ct).unwrap();
        let quad = scheme.elementwise_mul(&sq, &sq).unwrap();
        assert_eq!(quad.depth, 2);
        assert_close(&holder.decrypt(&quad).unwrap(), &[5.0625, 16.0], 1e-3);

        let err = scheme.elementwise_mul(&quad, &ct).unwrap_err();
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
    fn test_add_plain_leaves_padding_untouched() {
        let holder = holder();
        let scheme = holder.public();
        let ct = scheme.encode(&PlainVector::Real(vec![10.0, 20.0, 30.0])).unwrap();
        let shifted = scheme.add_plain(&ct, Scalar::Real(-20.0)).unwrap();
        let total = scheme.reduce_sum(&shifted).unwrap();
        assert!(holder.decrypt_scalar(&total).unwrap().abs() < 1e-3);
    }

    #[test]
    fn test_capacity_and_mismatch() {
        let holder = holder();
        let scheme = holder.public();
        let too_long = PlainVector::Real(vec![1.0; scheme.capacity() + 1]);
        assert!(matches!(
            scheme.encode(&too_long),
            Err(HeStatsError::Encoding { .. })
        ));

        let a = scheme.encode(&PlainVector::Real(vec![1.0, 2.0])).unwrap();
        let b = scheme.encode(&PlainVector::Real(vec![1.0, 2.0, 3.0])).unwrap();
        assert!(matches!(
            scheme.add(&a, &b),
            Err(HeStatsError::SchemeMismatch { .. })
        ));
    }

    #[test]
    fn test_serialize_round_trip() {
        let holder = holder();
        let scheme = holder.public();
        let ct = scheme.encode(&PlainVector::Real(vec![3.25, -4.5])).unwrap();
        let bytes = scheme.serialize(&ct);
        let restored = scheme.deserialize(SchemeTag::Approx, &bytes).unwrap();
        assert_eq!(restored, ct);
        assert!(matches!(
            scheme.deserialize(SchemeTag::Exact, &bytes),
            Err(HeStatsError::SchemeMismatch { .. })
        ));
    }

    #[test]
    fn test_error_estimate_grows_with_levels() {
        let holder = holder();
        let scheme = holder.public();
        let ct = scheme.encode(&PlainVector::Real(vec![2.0])).unwrap();
        let fresh = scheme.estimated_error(&ct, 2.0).unwrap();
        let scaled = scheme.scalar_mul(&ct, Scalar::Real(0.5)).unwrap();
        let after = scheme.estimated_error(&scaled, 2.0).unwrap();
        assert!(after > fresh);
        assert!(after < 1e-6);
    }
}
