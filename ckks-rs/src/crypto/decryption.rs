use crate::crypto::Ciphertext;
use crate::encoding::Encoder;
use crate::errors::CkksResult;
use crate::keys::SecretKey;
use crate::ring::to_centred;

/// Decrypt the first `count` slots of a ciphertext
pub fn decrypt(ct: &Ciphertext, sk: &SecretKey, count: usize) -> CkksResult<Vec<f64>> {
    let params = &sk.params;
    ct.check(params)?;
    let s = sk.to_poly(ct.c0.ctx())?;
    let m = &ct.c0 + &(&ct.c1 * &s);
    Ok(Encoder::new(params).decode(&to_centred(&m), params.scale_at(ct.level), count))
}
