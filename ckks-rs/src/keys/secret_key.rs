use crate::errors::CkksResult;
use crate::params::CkksParameters;
use crate::ring::from_small;
use crate::sampling::sample_small_vec;
use fhe_math::rq::{Context, Poly};
use rand::{CryptoRng, RngCore};
use std::sync::Arc;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// CKKS secret key: a small centred binomial polynomial
///
/// Coefficients are kept as integers so the key can be read into any
/// context of the chain.
#[derive(Debug, Clone)]
pub struct SecretKey {
    pub params: Arc<CkksParameters>,
    pub coeffs: Vec<i64>,
}

impl Zeroize for SecretKey {
    fn zeroize(&mut self) {
        self.coeffs.zeroize();
        self.coeffs.clear();
    }
}

impl ZeroizeOnDrop for SecretKey {}

impl Drop for SecretKey {
    fn drop(&mut self) {
        self.zeroize();
    }
}

impl SecretKey {
    /// Generate a random secret key
    pub fn random<R: RngCore + CryptoRng>(
        params: &Arc<CkksParameters>,
        rng: &mut R,
    ) -> CkksResult<Self> {
        let coeffs = sample_small_vec(params.degree, params.secret_variance, rng)?;
        Ok(Self {
            params: params.clone(),
            coeffs,
        })
    }

    /// The key as a ring element of `ctx`
    pub fn to_poly(&self, ctx: &Arc<Context>) -> CkksResult<Poly> {
        from_small(&self.coeffs, ctx)
    }
}
