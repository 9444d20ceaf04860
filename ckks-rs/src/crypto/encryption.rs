use crate::crypto::Ciphertext;
use crate::encoding::Encoder;
use crate::errors::CkksResult;
use crate::keys::PublicKey;
use crate::ring::from_small;
use crate::sampling::{sample_error, sample_small_vec};
use rand::{CryptoRng, RngCore};

/// Encrypt real values into the first slots of a fresh top-level ciphertext
///
/// c0 = v·b + e0 + m, c1 = v·a + e1 with a small ephemeral v.
pub fn encrypt<R: RngCore + CryptoRng>(
    values: &[f64],
    pk: &PublicKey,
    rng: &mut R,
) -> CkksResult<Ciphertext> {
    let params = &pk.params;
    let level = params.levels;
    let ctx = params.context(level)?;
    let m = Encoder::new(params).encode_poly(values, params.scale_at(level), ctx)?;

    let v = from_small(
        &sample_small_vec(params.degree, params.secret_variance, rng)?,
        ctx,
    )?;
    let e0 = sample_error(ctx, params.error_variance, rng)?;
    let e1 = sample_error(ctx, params.error_variance, rng)?;

    let c0 = &(&(&v * &pk.b) + &e0) + &m;
    let c1 = &(&v * &pk.a) + &e1;
    Ok(Ciphertext { c0, c1, level })
}
