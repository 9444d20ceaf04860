use crate::errors::{CkksError, CkksResult};
use fhe_math::rq::Context;
use fhe_math::zq::primes::generate_prime;
use fhe_traits::FheParameters;
use std::sync::Arc;

/// Smallest ring degree the NTT contexts accept
pub const MIN_DEGREE: usize = 8;

/// Largest ring degree accepted by the builder
pub const MAX_DEGREE: usize = 1 << 15;

/// Variance of the centred binomial secret when none is set
pub const DEFAULT_SECRET_VARIANCE: usize = 1;

/// Variance of the centred binomial error when none is set
pub const DEFAULT_ERROR_VARIANCE: usize = 10;

/// Widest prime the base modulus Q_0 is split into
const MAX_BASE_PRIME_BITS: u32 = 60;

/// Width of the special prime P; larger than every chain prime
const SPECIAL_PRIME_BITS: usize = 61;

/// CKKS parameters
///
/// The chain modulus at level `l` is `Q_l = q_0 ⋯ q_{b-1} · q_b ⋯ q_{b+l-1}`:
/// `b` base primes holding `scale_bits + integer_bits` bits, then one
/// rescaling prime of `scale_bits` bits per level.
#[derive(Debug, Clone, PartialEq)]
pub struct CkksParameters {
    /// Ring degree N (power of two); the ring has N/2 real slots
    pub degree: usize,
    /// Bits of the nominal scaling factor Δ = 2^scale_bits
    pub scale_bits: u32,
    /// Bits reserved above the scale for the integer part of a slot value
    pub integer_bits: u32,
    /// Number of rescalings the chain supports
    pub levels: usize,
    /// Variance of the centred binomial secret and ephemeral
    pub secret_variance: usize,
    /// Variance of the centred binomial error
    pub error_variance: usize,
    /// Base primes followed by the rescaling primes, bottom to top
    pub moduli: Vec<u64>,
    /// Special prime P, only present inside key switching
    pub special_modulus: u64,
    base_count: usize,
    key_context: Arc<Context>,
    level_contexts: Vec<Arc<Context>>,
    switch_contexts: Vec<Arc<Context>>,
    scales: Vec<f64>,
}

impl FheParameters for CkksParameters {}

impl CkksParameters {
    /// Number of real slots available to a plaintext
    pub fn slots(&self) -> usize {
        self.degree / 2
    }

    /// Bits requested for the bottom modulus Q_0
    pub fn base_bits(&self) -> u32 {
        self.scale_bits + self.integer_bits
    }

    /// Number of primes in Q_0
    pub fn base_count(&self) -> usize {
        self.base_count
    }

    /// Bits of Q_level
    pub fn modulus_bits(&self, level: usize) -> u64 {
        self.level_contexts
            .get(level)
            .map(|ctx| ctx.modulus().bits())
            .unwrap_or(0)
    }

    /// Nominal scaling factor 2^scale_bits; fresh ciphertexts carry it
    pub fn scale(&self) -> f64 {
        2f64.powi(self.scale_bits as i32)
    }

    /// Scale every ciphertext at `level` carries
    ///
    /// Rescaling divides by a prime close to Δ rather than Δ itself, so the
    /// scale drifts by `Δ_l² / q_l` from one level to the next.
    pub fn scale_at(&self, level: usize) -> f64 {
        self.scales
            .get(level)
            .copied()
            .unwrap_or_else(|| self.scale())
    }

    /// Largest slot magnitude that still decrypts correctly at level 0
    pub fn max_value(&self) -> f64 {
        2f64.powi(self.integer_bits as i32 - 1)
    }

    /// Ring context of the chain at `level`
    pub fn context(&self, level: usize) -> CkksResult<&Arc<Context>> {
        self.level_contexts.get(level).ok_or_else(|| {
            CkksError::ParameterMismatch(format!(
                "level {level} is above the top of the chain ({})",
                self.levels
            ))
        })
    }

    /// Context Q_level · P used while key switching at `level`
    pub fn switch_context(&self, level: usize) -> CkksResult<&Arc<Context>> {
        self.switch_contexts.get(level).ok_or_else(|| {
            CkksError::ParameterMismatch(format!("no key switching context at level {level}"))
        })
    }

    /// Context Q_L · P the switching keys live in
    pub fn key_context(&self) -> &Arc<Context> {
        &self.key_context
    }

    /// Prime dropped when rescaling from `level` to `level - 1`
    pub fn rescale_modulus(&self, level: usize) -> Option<u64> {
        level
            .checked_sub(1)
            .and_then(|l| self.moduli.get(self.base_count + l))
            .copied()
    }

    /// Galois element 5^step mod 2N used for a left rotation by `step`
    pub fn galois_element(&self, step: usize) -> usize {
        let two_n = 2 * self.degree as u64;
        let mut result = 1u64;
        let mut base = 5u64 % two_n;
        let mut exp = (step % self.slots()) as u64;
        while exp > 0 {
            if exp & 1 == 1 {
                result = result * base % two_n;
            }
            base = base * base % two_n;
            exp >>= 1;
        }
        result as usize
    }

    /// Rotation steps needed to sum every slot: 1, 2, 4, ..., slots/2
    pub fn inner_sum_steps(&self) -> Vec<usize> {
        let mut steps = Vec::new();
        let mut step = 1;
        while step < self.slots() {
            steps.push(step);
            step <<= 1;
        }
        steps
    }
}

/// Split `bits` into the fewest primes of at most 60 bits, as evenly as possible
fn base_prime_sizes(bits: u32) -> Vec<usize> {
    let count = bits.div_ceil(MAX_BASE_PRIME_BITS);
    let (each, extra) = (bits / count, bits % count);
    (0..count)
        .map(|i| (each + u32::from(i < extra)) as usize)
        .collect()
}

/// NTT-friendly primes of the requested sizes, all distinct
fn generate_moduli(sizes: &[usize], degree: usize) -> CkksResult<Vec<u64>> {
    let mut moduli: Vec<u64> = Vec::with_capacity(sizes.len());
    for &size in sizes {
        let mut upper_bound = 1u64 << size;
        loop {
            let prime = generate_prime(size, 2 * degree as u64, upper_bound).ok_or_else(|| {
                CkksError::InvalidParameters(format!(
                    "not enough {size}-bit primes congruent to 1 mod {}",
                    2 * degree
                ))
            })?;
            if !moduli.contains(&prime) {
                moduli.push(prime);
                break;
            }
            upper_bound = prime;
        }
    }
    Ok(moduli)
}

/// Builder for CKKS parameters following the fhe.rs builder pattern
#[derive(Debug, Default)]
pub struct CkksParametersBuilder {
    degree: Option<usize>,
    scale_bits: Option<u32>,
    integer_bits: Option<u32>,
    levels: Option<usize>,
    secret_variance: Option<usize>,
    error_variance: Option<usize>,
}

impl CkksParametersBuilder {
    /// Create a new parameter builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the ring degree
    pub fn set_degree(mut self, degree: usize) -> Self {
        self.degree = Some(degree);
        self
    }

    /// Set the scale bits (precision spent per multiplication)
    pub fn set_scale_bits(mut self, bits: u32) -> Self {
        self.scale_bits = Some(bits);
        self
    }

    /// Set the integer headroom bits
    pub fn set_integer_bits(mut self, bits: u32) -> Self {
        self.integer_bits = Some(bits);
        self
    }

    /// Set the number of levels of the modulus chain
    pub fn set_levels(mut self, levels: usize) -> Self {
        self.levels = Some(levels);
        self
    }

    /// Set the variance of the secret distribution
    pub fn set_secret_variance(mut self, variance: usize) -> Self {
        self.secret_variance = Some(variance);
        self
    }

    /// Set the variance of the error distribution
    pub fn set_error_variance(mut self, variance: usize) -> Self {
        self.error_variance = Some(variance);
        self
    }

    /// Build the parameters and their ring contexts
    pub fn build(self) -> CkksResult<CkksParameters> {
        let degree = self
            .degree
            .ok_or_else(|| CkksError::InvalidParameters("degree not set".to_string()))?;
        if degree < MIN_DEGREE || !degree.is_power_of_two() || degree > MAX_DEGREE {
            return Err(CkksError::InvalidParameters(format!(
                "degree must be a power of two in [{MIN_DEGREE}, {MAX_DEGREE}], got {degree}"
            )));
        }

        let scale_bits = self.scale_bits.unwrap_or(40);
        if !(20..=60).contains(&scale_bits) {
            return Err(CkksError::InvalidParameters(format!(
                "scale bits must be in [20, 60], got {scale_bits}"
            )));
        }

        let integer_bits = self.integer_bits.unwrap_or(30);
        if !(2..=120).contains(&integer_bits) {
            return Err(CkksError::InvalidParameters(format!(
                "integer bits must be in [2, 120], got {integer_bits}"
            )));
        }

        let levels = self.levels.unwrap_or(3);
        if levels == 0 || levels > 32 {
            return Err(CkksError::InvalidParameters(format!(
                "levels must be in [1, 32], got {levels}"
            )));
        }

        let secret_variance = self.secret_variance.unwrap_or(DEFAULT_SECRET_VARIANCE);
        let error_variance = self.error_variance.unwrap_or(DEFAULT_ERROR_VARIANCE);
        for (name, variance) in [("secret", secret_variance), ("error", error_variance)] {
            if !(1..=16).contains(&variance) {
                return Err(CkksError::InvalidParameters(format!(
                    "{name} variance must be in [1, 16], got {variance}"
                )));
            }
        }

        let base_sizes = base_prime_sizes(scale_bits + integer_bits);
        let base_count = base_sizes.len();
        let mut sizes = base_sizes;
        sizes.extend(std::iter::repeat_n(scale_bits as usize, levels));
        sizes.push(SPECIAL_PRIME_BITS);
        let mut moduli = generate_moduli(&sizes, degree)?;
        let special_modulus = moduli.pop().ok_or_else(|| {
            CkksError::InvalidParameters("no special prime generated".to_string())
        })?;

        let top = Context::new_arc(&moduli, degree)?;
        let level_contexts = (0..=levels)
            .map(|level| top.context_at_level(levels - level))
            .collect::<Result<Vec<_>, _>>()?;
        let switch_contexts = (0..=levels)
            .map(|level| {
                let mut switch_moduli = moduli[..base_count + level].to_vec();
                switch_moduli.push(special_modulus);
                Context::new_arc(&switch_moduli, degree)
            })
            .collect::<Result<Vec<_>, _>>()?;
        let key_context = switch_contexts[levels].clone();

        let mut scales = vec![2f64.powi(scale_bits as i32); levels + 1];
        for level in (1..=levels).rev() {
            let q = moduli[base_count + level - 1] as f64;
            scales[level - 1] = scales[level] * scales[level] / q;
        }

        Ok(CkksParameters {
            degree,
            scale_bits,
            integer_bits,
            levels,
            secret_variance,
            error_variance,
            moduli,
            special_modulus,
            base_count,
            key_context,
            level_contexts,
            switch_contexts,
            scales,
        })
    }

    /// Build with Arc wrapper
    pub fn build_arc(self) -> CkksResult<Arc<CkksParameters>> {
        Ok(Arc::new(self.build()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> CkksParameters {
        CkksParametersBuilder::new()
            .set_degree(32)
            .set_scale_bits(40)
            .set_integer_bits(40)
            .set_levels(3)
            .build()
            .unwrap()
    }

    #[test]
    fn test_modulus_chain_layout() {
        let params = params();
        assert_eq!(params.slots(), 16);
        assert_eq!(params.base_count(), 2);
        assert_eq!(params.moduli.len(), 5);

        let mut all = params.moduli.clone();
        all.push(params.special_modulus);
        for &q in &all {
            assert!(fhe_util::is_prime(q));
            assert_eq!(q % 64, 1);
        }
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), 6);

        assert!(params.moduli.iter().all(|q| 64 - q.leading_zeros() == 40));
        assert_eq!(64 - params.special_modulus.leading_zeros(), 61);
        assert_eq!(params.modulus_bits(0), 80);
        assert_eq!(params.modulus_bits(3), 200);
        assert_eq!(params.context(2).unwrap().moduli(), &params.moduli[..4]);
        assert_eq!(params.key_context().moduli().len(), 6);
        assert!(params.context(4).is_err());
    }

    #[test]
    fn test_base_split() {
        assert_eq!(base_prime_sizes(60), vec![60]);
        assert_eq!(base_prime_sizes(80), vec![40, 40]);
        assert_eq!(base_prime_sizes(61), vec![31, 30]);
        assert_eq!(base_prime_sizes(130), vec![44, 43, 43]);
    }

    #[test]
    fn test_scale_chain() {
        let params = params();
        assert_eq!(params.scale_at(3), params.scale());
        for level in 1..=3 {
            let q = params.rescale_modulus(level).unwrap() as f64;
            let expected = params.scale_at(level).powi(2) / q;
            assert!((params.scale_at(level - 1) - expected).abs() < 1e-6 * expected);
            // Every scale stays within a part in a million of Δ
            assert!((params.scale_at(level - 1) / params.scale() - 1.0).abs() < 1e-6);
        }
        assert_eq!(params.rescale_modulus(0), None);
    }

    #[test]
    fn test_rejects_bad_parameters() {
        let result = CkksParametersBuilder::new().set_degree(48).build();
        assert!(matches!(result, Err(CkksError::InvalidParameters(_))));
        let result = CkksParametersBuilder::new().set_degree(4).build();
        assert!(matches!(result, Err(CkksError::InvalidParameters(_))));
        let result = CkksParametersBuilder::new()
            .set_degree(16)
            .set_error_variance(17)
            .build();
        assert!(matches!(result, Err(CkksError::InvalidParameters(_))));

        assert!(CkksParametersBuilder::new().build().is_err());
    }

    #[test]
    fn test_galois_elements() {
        let params = CkksParametersBuilder::new().set_degree(16).build().unwrap();
        assert_eq!(params.galois_element(0), 1);
        assert_eq!(params.galois_element(1), 5);
        assert_eq!(params.galois_element(2), 25);
        // The powers of 5 cycle with period slots
        assert_eq!(params.galois_element(8), 1);
        assert_eq!(params.inner_sum_steps(), vec![1, 2, 4]);
    }
}
