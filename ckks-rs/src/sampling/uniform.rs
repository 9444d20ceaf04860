use fhe_math::rq::{Context, Poly, Representation};
use rand::{CryptoRng, RngCore};
use std::sync::Arc;

/// Polynomial with coefficients uniform modulo every prime of `ctx`, in NTT form
pub fn sample_uniform_poly<R: RngCore + CryptoRng>(ctx: &Arc<Context>, rng: &mut R) -> Poly {
    Poly::random(ctx, Representation::Ntt, rng)
}
