use crate::errors::{CkksError, CkksResult};
use crate::params::CkksParameters;
use fhe_math::rq::{traits::TryConvertFrom, Poly, Representation};
use fhe_traits::{DeserializeParametrized, FheParametrized, Serialize};
use ndarray::Array2;
use std::sync::Arc;

const HEADER_LEN: usize = 8;

/// CKKS ciphertext (c0, c1) at a given level of the modulus chain
///
/// Both components live in the context of that level, in NTT form. The
/// scale is a function of the level alone, see [`CkksParameters::scale_at`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ciphertext {
    pub c0: Poly,
    pub c1: Poly,
    pub level: usize,
}

impl Ciphertext {
    /// Check the ciphertext belongs to the ring and chain of `params`
    pub fn check(&self, params: &CkksParameters) -> CkksResult<()> {
        let ctx = params.context(self.level)?;
        if self.c0.ctx() != ctx || self.c1.ctx() != ctx {
            return Err(CkksError::ParameterMismatch(format!(
                "ciphertext at level {} is not in the ring of that level",
                self.level
            )));
        }
        Ok(())
    }
}

impl FheParametrized for Ciphertext {
    type Parameters = CkksParameters;
}

impl Serialize for Ciphertext {
    /// Layout: degree and level as little-endian u32, then the NTT residue
    /// rows of c0 and c1 as little-endian u64, one row per prime
    fn to_bytes(&self) -> Vec<u8> {
        let c0 = self.c0.coefficients();
        let c1 = self.c1.coefficients();
        let (_, degree) = c0.dim();
        let mut out = Vec::with_capacity(HEADER_LEN + 8 * (c0.len() + c1.len()));
        out.extend_from_slice(&(degree as u32).to_le_bytes());
        out.extend_from_slice(&(self.level as u32).to_le_bytes());
        for value in c0.iter().chain(c1.iter()) {
            out.extend_from_slice(&value.to_le_bytes());
        }
        out
    }
}

impl DeserializeParametrized for Ciphertext {
    type Error = CkksError;

    fn from_bytes(bytes: &[u8], par: &Arc<CkksParameters>) -> CkksResult<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(CkksError::InsufficientData {
                expected: HEADER_LEN,
                actual: bytes.len(),
            });
        }
        let read_u32 = |at: usize| {
            u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
        };
        let degree = read_u32(0) as usize;
        let level = read_u32(4) as usize;
        if degree != par.degree || level > par.levels {
            return Err(CkksError::DeserializationError(format!(
                "ciphertext of degree {degree} at level {level} does not fit degree {} with {} levels",
                par.degree, par.levels
            )));
        }

        let ctx = par.context(level)?;
        let moduli = ctx.moduli();
        let expected = HEADER_LEN + 2 * 8 * moduli.len() * degree;
        if bytes.len() != expected {
            return Err(CkksError::InsufficientData {
                expected,
                actual: bytes.len(),
            });
        }

        let mut values = bytes[HEADER_LEN..].chunks_exact(8).map(|chunk| {
            let mut word = [0u8; 8];
            word.copy_from_slice(chunk);
            u64::from_le_bytes(word)
        });
        let mut component = || -> CkksResult<Poly> {
            let mut rows = Array2::<u64>::zeros((moduli.len(), degree));
            for (mut row, &q) in rows.rows_mut().into_iter().zip(moduli) {
                for (slot, value) in row.iter_mut().zip(values.by_ref()) {
                    if value >= q {
                        return Err(CkksError::DeserializationError(format!(
                            "residue {value} is not reduced modulo {q}"
                        )));
                    }
                    *slot = value;
                }
            }
            Ok(Poly::try_convert_from(
                rows,
                ctx,
                false,
                Representation::Ntt,
            )?)
        };
        let c0 = component()?;
        let c1 = component()?;
        Ok(Self { c0, c1, level })
    }
}
