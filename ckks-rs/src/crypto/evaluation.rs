use crate::crypto::Ciphertext;
use crate::encoding::Encoder;
use crate::errors::{CkksError, CkksResult};
use crate::keys::{EvaluationKeys, SwitchingKey};
use crate::params::CkksParameters;
use crate::ring::{lift_row, rescale, residues, select_rows, signed_residue};
use fhe_math::rq::{Poly, Representation, SubstitutionExponent};
use num_bigint::BigInt;
use num_traits::FromPrimitive;
use std::sync::Arc;

/// Homomorphic evaluator holding only public evaluation keys
#[derive(Debug, Clone)]
pub struct Evaluator {
    params: Arc<CkksParameters>,
    keys: Arc<EvaluationKeys>,
    encoder: Encoder,
}

impl Evaluator {
    pub fn new(keys: Arc<EvaluationKeys>) -> Self {
        let params = keys.params.clone();
        let encoder = Encoder::new(&params);
        Self {
            params,
            keys,
            encoder,
        }
    }

    pub fn params(&self) -> &Arc<CkksParameters> {
        &self.params
    }

    /// Bring a ciphertext down to `level`, keeping the values it encrypts
    ///
    /// Each step multiplies by the current scale and rescales, which lands
    /// on the scale of the level below.
    pub fn mod_down_to(&self, ct: &Ciphertext, level: usize) -> CkksResult<Ciphertext> {
        ct.check(&self.params)?;
        if level > ct.level {
            return Err(CkksError::ParameterMismatch(format!(
                "cannot raise a ciphertext from level {} to {level}",
                ct.level
            )));
        }
        let mut current = ct.clone();
        while current.level > level {
            let scale = self.params.scale_at(current.level);
            current = self.scale_and_rescale(&current, scale)?;
        }
        Ok(current)
    }

    fn align(&self, a: &Ciphertext, b: &Ciphertext) -> CkksResult<(Ciphertext, Ciphertext)> {
        let level = a.level.min(b.level);
        Ok((self.mod_down_to(a, level)?, self.mod_down_to(b, level)?))
    }

    pub fn add(&self, a: &Ciphertext, b: &Ciphertext) -> CkksResult<Ciphertext> {
        let (a, b) = self.align(a, b)?;
        Ok(Ciphertext {
            c0: &a.c0 + &b.c0,
            c1: &a.c1 + &b.c1,
            level: a.level,
        })
    }

    pub fn sub(&self, a: &Ciphertext, b: &Ciphertext) -> CkksResult<Ciphertext> {
        let (a, b) = self.align(a, b)?;
        Ok(Ciphertext {
            c0: &a.c0 - &b.c0,
            c1: &a.c1 - &b.c1,
            level: a.level,
        })
    }

    /// Add plaintext values to the first slots; other slots are unchanged
    pub fn add_plain(&self, ct: &Ciphertext, values: &[f64]) -> CkksResult<Ciphertext> {
        ct.check(&self.params)?;
        let scale = self.params.scale_at(ct.level);
        let m = self.encoder.encode_poly(values, scale, ct.c0.ctx())?;
        Ok(Ciphertext {
            c0: &ct.c0 + &m,
            ..ct.clone()
        })
    }

    /// Multiply by an integer constant; consumes no level
    pub fn mul_integer(&self, ct: &Ciphertext, k: i64) -> CkksResult<Ciphertext> {
        ct.check(&self.params)?;
        let k = signed_residue(&BigInt::from(k), ct.c0.ctx().modulus());
        Ok(Ciphertext {
            c0: &ct.c0 * &k,
            c1: &ct.c1 * &k,
            level: ct.level,
        })
    }

    /// Multiply by a real constant encoded at the current scale, then rescale
    pub fn mul_constant(&self, ct: &Ciphertext, k: f64) -> CkksResult<Ciphertext> {
        ct.check(&self.params)?;
        if !k.is_finite() || k.abs() >= self.params.max_value() {
            return Err(CkksError::ValueOutOfRange {
                value: k,
                bound: self.params.max_value(),
            });
        }
        self.require_level(ct, "constant multiplication")?;
        self.scale_and_rescale(ct, k * self.params.scale_at(ct.level))
    }

    fn scale_and_rescale(&self, ct: &Ciphertext, factor: f64) -> CkksResult<Ciphertext> {
        let scaled = BigInt::from_f64(factor.round()).ok_or(CkksError::ValueOutOfRange {
            value: factor,
            bound: self.params.max_value(),
        })?;
        let k = signed_residue(&scaled, ct.c0.ctx().modulus());
        let product = Ciphertext {
            c0: &ct.c0 * &k,
            c1: &ct.c1 * &k,
            level: ct.level,
        };
        self.rescale(&product)
    }

    /// Multiply two ciphertexts, relinearize and rescale
    pub fn mul(&self, a: &Ciphertext, b: &Ciphertext) -> CkksResult<Ciphertext> {
        let (a, b) = self.align(a, b)?;
        self.require_level(&a, "multiplication")?;

        let d0 = &a.c0 * &b.c0;
        let d1 = &(&a.c0 * &b.c1) + &(&a.c1 * &b.c0);
        let d2 = &a.c1 * &b.c1;

        let (k0, k1) = self.key_switch(&d2, &self.keys.relinearization, a.level)?;
        let product = Ciphertext {
            c0: &d0 + &k0,
            c1: &d1 + &k1,
            level: a.level,
        };
        self.rescale(&product)
    }

    /// Divide by the top prime of the level and move one level down the chain
    pub fn rescale(&self, ct: &Ciphertext) -> CkksResult<Ciphertext> {
        self.require_level(ct, "rescale")?;
        Ok(Ciphertext {
            c0: rescale(&ct.c0)?,
            c1: rescale(&ct.c1)?,
            level: ct.level - 1,
        })
    }

    /// Rotate the slots left by `step`
    pub fn rotate(&self, ct: &Ciphertext, step: usize) -> CkksResult<Ciphertext> {
        ct.check(&self.params)?;
        let step = step % self.params.slots();
        if step == 0 {
            return Ok(ct.clone());
        }
        let key = self.keys.rotation(step)?;
        let sigma = SubstitutionExponent::new(ct.c0.ctx(), self.params.galois_element(step))?;

        let c0 = ct.c0.substitute(&sigma)?;
        let c1 = ct.c1.substitute(&sigma)?;
        let (k0, k1) = self.key_switch(&c1, key, ct.level)?;
        Ok(Ciphertext {
            c0: &c0 + &k0,
            c1: k1,
            level: ct.level,
        })
    }

    /// Sum every slot with a rotate-and-add tree; each slot ends up holding the total
    pub fn inner_sum(&self, ct: &Ciphertext) -> CkksResult<Ciphertext> {
        let mut acc = ct.clone();
        for step in self.params.inner_sum_steps() {
            let rotated = self.rotate(&acc, step)?;
            acc = self.add(&acc, &rotated)?;
        }
        Ok(acc)
    }

    fn require_level(&self, ct: &Ciphertext, operation: &str) -> CkksResult<()> {
        if ct.level == 0 {
            return Err(CkksError::LevelExhausted {
                operation: operation.to_string(),
                levels: self.params.levels,
            });
        }
        Ok(())
    }

    /// Hybrid key switching over Q_level·P
    ///
    /// `d` is split into its residues modulo each prime of Q_level, each digit
    /// is multiplied by the matching key part restricted to Q_level·P, and the
    /// sum is divided by P.
    fn key_switch(
        &self,
        d: &Poly,
        key: &SwitchingKey,
        level: usize,
    ) -> CkksResult<(Poly, Poly)> {
        let ctx = self.params.switch_context(level)?;
        let digits = self.params.base_count() + level;
        let special_row = key.digits();
        let rows: Vec<usize> = (0..digits).chain(std::iter::once(special_row)).collect();

        let coefficients = residues(d);
        let mut acc0 = Poly::zero(ctx, Representation::Ntt);
        let mut acc1 = Poly::zero(ctx, Representation::Ntt);
        for (i, row) in coefficients.rows().into_iter().enumerate().take(digits) {
            let digit = lift_row(row.to_vec(), ctx)?;
            acc0 += &(&digit * &select_rows(&key.b[i], &rows, ctx)?);
            acc1 += &(&digit * &select_rows(&key.a[i], &rows, ctx)?);
        }
        Ok((rescale(&acc0)?, rescale(&acc1)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{decrypt, encrypt};
    use crate::keys::{PublicKey, SecretKey};
    use crate::params::CkksParametersBuilder;
    use fhe_traits::{DeserializeParametrized, Serialize};
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    struct Fixture {
        sk: SecretKey,
        pk: PublicKey,
        evaluator: Evaluator,
        rng: ChaCha20Rng,
    }

    fn fixture(levels: usize) -> Fixture {
        let params = CkksParametersBuilder::new()
            .set_degree(32)
            .set_scale_bits(40)
            .set_integer_bits(40)
            .set_levels(levels)
            .build_arc()
            .unwrap();
        let mut rng = ChaCha20Rng::seed_from_u64(42);
        let sk = SecretKey::random(&params, &mut rng).unwrap();
        let pk = PublicKey::new(&sk, &mut rng).unwrap();
        let keys = EvaluationKeys::new(&sk, &mut rng).unwrap();
        Fixture {
            sk,
            pk,
            evaluator: Evaluator::new(Arc::new(keys)),
            rng,
        }
    }

    fn assert_close(got: &[f64], want: &[f64], tol: f64) {
        assert_eq!(got.len(), want.len());
        for (g, w) in got.iter().zip(want) {
            assert!((g - w).abs() < tol, "got {g}, want {w}");
        }
    }

    #[test]
    fn test_encrypt_decrypt_round_trip() {
        let mut f = fixture(2);
        let values = [1200.50, 2500.00, 1800.75, 3200.10, 4500.00];
        let ct = encrypt(&values, &f.pk, &mut f.rng).unwrap();
        assert_eq!(ct.level, 2);
        assert_eq!(ct.c0.ctx().moduli().len(), f.evaluator.params().moduli.len());
        let out = decrypt(&ct, &f.sk, values.len()).unwrap();
        assert_close(&out, &values, 1e-6);
    }

    #[test]
    fn test_add_and_plain_add() {
        let mut f = fixture(2);
        let a = encrypt(&[1.5, 2.5, 3.5], &f.pk, &mut f.rng).unwrap();
        let b = encrypt(&[10.0, 20.0, 30.0], &f.pk, &mut f.rng).unwrap();

        let sum = f.evaluator.add(&a, &b).unwrap();
        assert_close(&decrypt(&sum, &f.sk, 3).unwrap(), &[11.5, 22.5, 33.5], 1e-6);

        let diff = f.evaluator.sub(&b, &a).unwrap();
        assert_close(&decrypt(&diff, &f.sk, 3).unwrap(), &[8.5, 17.5, 26.5], 1e-6);

        let shifted = f.evaluator.add_plain(&a, &[-2.0, -2.0, -2.0]).unwrap();
        // The fourth slot was zero and must stay zero
        assert_close(
            &decrypt(&shifted, &f.sk, 4).unwrap(),
            &[-0.5, 0.5, 1.5, 0.0],
            1e-6,
        );
    }

    #[test]
    fn test_multiplications_consume_levels() {
        let mut f = fixture(2);
        let a = encrypt(&[1.5, -2.0, 4.0], &f.pk, &mut f.rng).unwrap();
        let b = encrypt(&[2.0, 3.0, 0.5], &f.pk, &mut f.rng).unwrap();

        let product = f.evaluator.mul(&a, &b).unwrap();
        assert_eq!(product.level, 1);
        assert_close(&decrypt(&product, &f.sk, 3).unwrap(), &[3.0, -6.0, 2.0], 1e-4);

        let scaled = f.evaluator.mul_constant(&product, 1.05).unwrap();
        assert_eq!(scaled.level, 0);
        assert_close(&decrypt(&scaled, &f.sk, 3).unwrap(), &[3.15, -6.3, 2.1], 1e-4);

        let doubled = f.evaluator.mul_integer(&scaled, -2).unwrap();
        assert_eq!(doubled.level, 0);
        assert_close(&decrypt(&doubled, &f.sk, 3).unwrap(), &[-6.3, 12.6, -4.2], 1e-4);

        let exhausted = f.evaluator.mul_constant(&doubled, 0.5);
        assert!(matches!(
            exhausted,
            Err(CkksError::LevelExhausted { levels: 2, .. })
        ));
    }

    #[test]
    fn test_squares_of_large_values() {
        let mut f = fixture(1);
        let values = [4500.0, -3200.1, 0.25];
        let ct = encrypt(&values, &f.pk, &mut f.rng).unwrap();
        let squared = f.evaluator.mul(&ct, &ct).unwrap();
        let want: Vec<f64> = values.iter().map(|v| v * v).collect();
        assert_close(&decrypt(&squared, &f.sk, 3).unwrap(), &want, 1e-3);
    }

    #[test]
    fn test_rotation_and_inner_sum() {
        let mut f = fixture(1);
        let values = [1.0, 2.0, 3.0, 4.0];
        let ct = encrypt(&values, &f.pk, &mut f.rng).unwrap();

        let rotated = f.evaluator.rotate(&ct, 1).unwrap();
        assert_close(&decrypt(&rotated, &f.sk, 3).unwrap(), &[2.0, 3.0, 4.0], 1e-5);

        let total = f.evaluator.inner_sum(&ct).unwrap();
        let slots = f.evaluator.params().slots();
        assert_close(&decrypt(&total, &f.sk, slots).unwrap(), &vec![10.0; slots], 1e-5);

        assert!(matches!(
            f.evaluator.rotate(&ct, 3),
            Err(CkksError::MissingRotationKey { step: 3 })
        ));
    }

    #[test]
    fn test_rotation_after_rescale() {
        let mut f = fixture(2);
        let ct = encrypt(&[1.0, 2.0, 3.0, 4.0], &f.pk, &mut f.rng).unwrap();
        let halved = f.evaluator.mul_constant(&ct, 0.5).unwrap();
        let rotated = f.evaluator.rotate(&halved, 2).unwrap();
        assert_eq!(rotated.level, 1);
        assert_close(&decrypt(&rotated, &f.sk, 2).unwrap(), &[1.5, 2.0], 1e-5);
    }

    #[test]
    fn test_levels_align_on_add() {
        let mut f = fixture(2);
        let a = encrypt(&[2.0, 4.0], &f.pk, &mut f.rng).unwrap();
        let b = encrypt(&[1.0, 1.0], &f.pk, &mut f.rng).unwrap();
        let half = f.evaluator.mul_constant(&a, 0.5).unwrap();
        let sum = f.evaluator.add(&half, &b).unwrap();
        assert_eq!(sum.level, 1);
        assert_close(&decrypt(&sum, &f.sk, 2).unwrap(), &[2.0, 3.0], 1e-6);

        let bottom = f.evaluator.mod_down_to(&b, 0).unwrap();
        assert_eq!(bottom.level, 0);
        assert_close(&decrypt(&bottom, &f.sk, 2).unwrap(), &[1.0, 1.0], 1e-6);
        assert!(f.evaluator.mod_down_to(&bottom, 1).is_err());
    }

    #[test]
    fn test_serialization_round_trip() {
        let mut f = fixture(1);
        let params = f.evaluator.params().clone();
        let ct = encrypt(&[-7.25, 8.5], &f.pk, &mut f.rng).unwrap();
        let bytes = ct.to_bytes();
        assert_eq!(bytes.len(), 8 + 2 * 8 * params.moduli.len() * params.degree);
        let restored = Ciphertext::from_bytes(&bytes, &params).unwrap();
        assert_eq!(restored, ct);

        let truncated = Ciphertext::from_bytes(&bytes[..bytes.len() - 1], &params);
        assert!(matches!(
            truncated,
            Err(CkksError::InsufficientData { .. })
        ));

        let mut unreduced = bytes.clone();
        unreduced[8..16].copy_from_slice(&u64::MAX.to_le_bytes());
        assert!(matches!(
            Ciphertext::from_bytes(&unreduced, &params),
            Err(CkksError::DeserializationError(_))
        ));
    }
}
