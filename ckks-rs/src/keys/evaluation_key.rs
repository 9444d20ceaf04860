use crate::errors::{CkksError, CkksResult};
use crate::keys::SecretKey;
use crate::params::CkksParameters;
use crate::sampling::{sample_error, sample_uniform_poly};
use fhe_math::rq::{traits::TryConvertFrom, Context, Poly, Representation, SubstitutionExponent};
use ndarray::Array2;
use rand::{CryptoRng, RngCore};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Key switching key from `target` to `s` over the key context Q_L·P
///
/// One part per prime q_i of Q_L: b_i = -a_i·s + e_i + P·g_i, where g_i is
/// `target` on the residue row of q_i and zero elsewhere. A ciphertext
/// component split into its residues d_i then satisfies
/// Σ d_i·(b_i + a_i·s) ≈ P·d·target.
#[derive(Debug, Clone)]
pub struct SwitchingKey {
    pub b: Vec<Poly>,
    pub a: Vec<Poly>,
}

impl SwitchingKey {
    fn generate<R: RngCore + CryptoRng>(
        params: &CkksParameters,
        s: &Poly,
        target: &Poly,
        rng: &mut R,
    ) -> CkksResult<Self> {
        let ctx = params.key_context();
        let digits = params.moduli.len();
        let mut b = Vec::with_capacity(digits);
        let mut a = Vec::with_capacity(digits);
        for row in 0..digits {
            let a_i = sample_uniform_poly(ctx, rng);
            let e_i = sample_error(ctx, params.error_variance, rng)?;
            let gadget = gadget_term(target, row, params.special_modulus, ctx)?;
            b.push(&(&e_i - &(&a_i * s)) + &gadget);
            a.push(a_i);
        }
        Ok(Self { b, a })
    }

    /// Number of residue digits the key covers
    pub fn digits(&self) -> usize {
        self.b.len()
    }
}

/// P·target on residue row `row`, zero on every other row
fn gadget_term(target: &Poly, row: usize, special: u64, ctx: &Arc<Context>) -> CkksResult<Poly> {
    let q = &ctx.moduli_operators()[row];
    let factor = q.reduce(special);
    let source = target.coefficients();
    let mut coefficients = Array2::<u64>::zeros(source.dim());
    coefficients
        .row_mut(row)
        .iter_mut()
        .zip(source.row(row))
        .for_each(|(c, &t)| *c = q.mul(t, factor));
    Ok(Poly::try_convert_from(
        coefficients,
        ctx,
        false,
        Representation::Ntt,
    )?)
}

/// Relinearization and rotation keys
#[derive(Debug, Clone)]
pub struct EvaluationKeys {
    pub params: Arc<CkksParameters>,
    pub relinearization: SwitchingKey,
    /// Rotation keys indexed by rotation step
    pub rotations: BTreeMap<usize, SwitchingKey>,
}

impl EvaluationKeys {
    /// Generate the relinearization key and the rotation keys `inner_sum` needs
    pub fn new<R: RngCore + CryptoRng>(sk: &SecretKey, rng: &mut R) -> CkksResult<Self> {
        let steps = sk.params.inner_sum_steps();
        Self::with_rotations(sk, &steps, rng)
    }

    /// Generate the relinearization key and rotation keys for `steps`
    pub fn with_rotations<R: RngCore + CryptoRng>(
        sk: &SecretKey,
        steps: &[usize],
        rng: &mut R,
    ) -> CkksResult<Self> {
        let params = sk.params.clone();
        let ctx = params.key_context();
        let s = sk.to_poly(ctx)?;
        let s_squared = &s * &s;
        let relinearization = SwitchingKey::generate(&params, &s, &s_squared, rng)?;

        let mut rotations = BTreeMap::new();
        for &step in steps {
            let sigma = SubstitutionExponent::new(ctx, params.galois_element(step))?;
            let rotated = s.substitute(&sigma)?;
            rotations.insert(step, SwitchingKey::generate(&params, &s, &rotated, rng)?);
        }

        Ok(Self {
            params,
            relinearization,
            rotations,
        })
    }

    pub fn rotation(&self, step: usize) -> CkksResult<&SwitchingKey> {
        self.rotations
            .get(&step)
            .ok_or(CkksError::MissingRotationKey { step })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::CkksParametersBuilder;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    #[test]
    fn test_switching_key_layout() {
        let params = CkksParametersBuilder::new()
            .set_degree(16)
            .set_levels(2)
            .build_arc()
            .unwrap();
        let mut rng = ChaCha20Rng::seed_from_u64(9);
        let sk = SecretKey::random(&params, &mut rng).unwrap();
        let keys = EvaluationKeys::with_rotations(&sk, &[1, 3], &mut rng).unwrap();

        assert_eq!(keys.relinearization.digits(), params.moduli.len());
        assert_eq!(keys.rotations.keys().copied().collect::<Vec<_>>(), vec![1, 3]);
        assert!(matches!(
            keys.rotation(2),
            Err(CkksError::MissingRotationKey { step: 2 })
        ));

        // b_i + a_i·s leaves P·s² on row i and a small error on the P row
        let ctx = params.key_context();
        let s = sk.to_poly(ctx).unwrap();
        let key = &keys.relinearization;
        let last = ctx.moduli().len() - 1;
        let p = ctx.moduli()[last] as i128;
        let bound = 2 * params.error_variance as u128;
        for i in 0..key.digits() {
            let mut noisy = &key.b[i] + &(&key.a[i] * &s);
            noisy.change_representation(Representation::PowerBasis);
            for &c in noisy.coefficients().row(last) {
                let centred = if c as i128 > p / 2 { c as i128 - p } else { c as i128 };
                assert!(centred.unsigned_abs() <= bound);
            }
        }
    }
}
