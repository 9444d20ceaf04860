use crate::errors::CkksResult;
use crate::keys::SecretKey;
use crate::params::CkksParameters;
use crate::sampling::{sample_error, sample_uniform_poly};
use fhe_math::rq::Poly;
use rand::{CryptoRng, RngCore};
use std::sync::Arc;

/// CKKS public key (b, a) with b = -a·s + e modulo Q_L
#[derive(Debug, Clone)]
pub struct PublicKey {
    pub params: Arc<CkksParameters>,
    pub b: Poly,
    pub a: Poly,
}

impl PublicKey {
    pub fn new<R: RngCore + CryptoRng>(sk: &SecretKey, rng: &mut R) -> CkksResult<Self> {
        let params = sk.params.clone();
        let ctx = params.context(params.levels)?;
        let s = sk.to_poly(ctx)?;
        let a = sample_uniform_poly(ctx, rng);
        let e = sample_error(ctx, params.error_variance, rng)?;
        let b = &e - &(&a * &s);
        Ok(Self { params, b, a })
    }
}
