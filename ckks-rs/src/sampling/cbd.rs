use crate::errors::{CkksError, CkksResult};
use fhe_math::rq::{Context, Poly, Representation};
use fhe_util::sample_vec_cbd;
use rand::{CryptoRng, RngCore};
use std::sync::Arc;

/// Centred binomial coefficients of the given variance, for secrets and
/// ephemerals that must be reused across contexts
pub fn sample_small_vec<R: RngCore + CryptoRng>(
    degree: usize,
    variance: usize,
    rng: &mut R,
) -> CkksResult<Vec<i64>> {
    sample_vec_cbd(degree, variance, rng).map_err(|e| CkksError::SamplingError(e.to_string()))
}

/// Centred binomial error polynomial of `ctx`, in NTT form
pub fn sample_error<R: RngCore + CryptoRng>(
    ctx: &Arc<Context>,
    variance: usize,
    rng: &mut R,
) -> CkksResult<Poly> {
    Ok(Poly::small(ctx, Representation::Ntt, variance, rng)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    #[test]
    fn test_cbd_is_small_and_centred() {
        let mut rng = ChaCha20Rng::seed_from_u64(7);
        let samples = sample_small_vec(4096, 10, &mut rng).unwrap();

        // Variance v sums 2v coin flips on each side
        assert!(samples.iter().all(|x| x.abs() <= 20));
        let mean = samples.iter().sum::<i64>() as f64 / samples.len() as f64;
        assert!(mean.abs() < 0.5);
        let variance = fhe_util::variance(&samples);
        assert!((variance - 10.0).abs() < 1.5, "variance {variance}");
    }

    #[test]
    fn test_variance_out_of_range() {
        let mut rng = ChaCha20Rng::seed_from_u64(7);
        assert!(matches!(
            sample_small_vec(16, 17, &mut rng),
            Err(CkksError::SamplingError(_))
        ));
    }
}
