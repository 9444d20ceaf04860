//! Statistics state machine
//!
//! `Raw → SumComputed → MeanDisclosed → VarianceComputed → Finalized`
//!
//! The analyzer drives the engine over an encrypted field. Between
//! `SumComputed` and `MeanDisclosed` the key holder decrypts the encrypted
//! mean (or sum) and hands it back as a plaintext [`Disclosure`]. In
//! [`VarianceMode::FullyEncrypted`] the disclosure step is skipped and the
//! variance is `E[x²] − E[x]²` under encryption.

use crate::bundle::StatisticsBundle;
use num_bigint::BigUint;
use schemes::{EncryptedVector, HomomorphicScheme, Scalar};
use serde::Serialize;
use shared::{HeStatsError, HeStatsResult, SchemeTag};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VarianceMode {
    /// The analyzer learns the mean and centres the data with it
    #[default]
    DisclosedMean,
    /// Nothing but the final results is ever decrypted
    FullyEncrypted,
}

impl std::str::FromStr for VarianceMode {
    type Err = HeStatsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "disclosed" | "disclosed-mean" | "disclosed_mean" => Ok(VarianceMode::DisclosedMean),
            "encrypted" | "fully-encrypted" | "fully_encrypted" => Ok(VarianceMode::FullyEncrypted),
            _ => Err(HeStatsError::validation(format!("unknown variance mode: {s}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatsState {
    Raw,
    SumComputed,
    MeanDisclosed,
    VarianceComputed,
    Finalized,
}

impl fmt::Display for StatsState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StatsState::Raw => "raw",
            StatsState::SumComputed => "sum computed",
            StatsState::MeanDisclosed => "mean disclosed",
            StatsState::VarianceComputed => "variance computed",
            StatsState::Finalized => "finalized",
        };
        f.write_str(name)
    }
}

/// Plaintext the key holder returns after decrypting the first-stage result
///
/// `value` is the decrypted slot as it sits in the ciphertext: the mean for
/// the approximate scheme, the integer sum for the others, in the field's
/// pre-scaled units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Disclosure {
    pub value: f64,
}

/// Options of one statistics run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsOptions {
    pub mode: VarianceMode,
    /// Integer scale the field was pre-scaled by
    pub scale: i64,
    /// `max|x|` of the field in pre-scaled units; required by the exact
    /// scheme's overflow guard
    pub value_bound: Option<u64>,
}

impl Default for StatsOptions {
    fn default() -> Self {
        Self {
            mode: VarianceMode::DisclosedMean,
            scale: 1,
            value_bound: None,
        }
    }
}

/// Worst-case magnitude of the exact variance computation
///
/// Disclosed mean: `Σ (N·x − S)² ≤ 4·N³·max²`. Fully encrypted:
/// `N·Σx² − S²` with both terms below `N²·max²`, bounded by `2·N²·max²`.
pub fn variance_worst_case(mode: VarianceMode, count: usize, max: u64) -> BigUint {
    let n = BigUint::from(count as u64);
    let max_sq = BigUint::from(max) * BigUint::from(max);
    match mode {
        VarianceMode::DisclosedMean => BigUint::from(4u32) * &n * &n * &n * max_sq,
        VarianceMode::FullyEncrypted => BigUint::from(2u32) * &n * &n * max_sq,
    }
}

/// Analyzer-side statistics of one encrypted field
pub struct StatisticsEngine {
    scheme: Arc<dyn HomomorphicScheme>,
    field: String,
    values: EncryptedVector,
    options: StatsOptions,
    state: StatsState,
    first_stage: Option<EncryptedVector>,
    disclosed: Option<Disclosure>,
    variance: Option<EncryptedVector>,
}

impl StatisticsEngine {
    pub fn new(
        scheme: Arc<dyn HomomorphicScheme>,
        field: impl Into<String>,
        values: EncryptedVector,
        options: StatsOptions,
    ) -> HeStatsResult<Self> {
        if values.tag != scheme.tag() {
            return Err(HeStatsError::mismatch(format!(
                "{} field given to the {} scheme",
                values.tag,
                scheme.tag()
            )));
        }
        if options.scale <= 0 {
            return Err(HeStatsError::validation("field scale must be positive"));
        }
        Ok(Self {
            scheme,
            field: field.into(),
            values,
            options,
            state: StatsState::Raw,
            first_stage: None,
            disclosed: None,
            variance: None,
        })
    }

    pub fn state(&self) -> StatsState {
        self.state
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn count(&self) -> usize {
        self.values.length
    }

    fn tag(&self) -> SchemeTag {
        self.scheme.tag()
    }

    fn expect(&self, state: StatsState, action: &str) -> HeStatsResult<()> {
        if self.state != state {
            return Err(HeStatsError::protocol(format!(
                "cannot {action} for {} in state '{}'",
                self.field, self.state
            )));
        }
        Ok(())
    }

    fn inv_count(&self) -> Scalar {
        Scalar::Real(1.0 / self.count() as f64)
    }

    /// `Raw → SumComputed`
    ///
    /// Returns the ciphertext the key holder decrypts: the encrypted mean
    /// for the approximate scheme, the encrypted sum otherwise.
    pub fn compute_sum(&mut self) -> HeStatsResult<EncryptedVector> {
        self.expect(StatsState::Raw, "compute the sum")?;
        let sum = self.scheme.reduce_sum(&self.values)?;
        let result = match self.tag() {
            SchemeTag::Approx => self.scheme.scalar_mul(&sum, self.inv_count())?,
            SchemeTag::Exact | SchemeTag::Additive => sum,
        };
        self.first_stage = Some(result.clone());
        self.state = StatsState::SumComputed;
        info!(field = %self.field, tag = %self.tag(), "sum computed");
        Ok(result)
    }

    /// `SumComputed → MeanDisclosed`
    pub fn disclose_mean(&mut self, disclosure: Disclosure) -> HeStatsResult<()> {
        self.expect(StatsState::SumComputed, "disclose the mean")?;
        if !disclosure.value.is_finite() {
            return Err(HeStatsError::protocol("disclosed value is not finite"));
        }
        warn!(
            field = %self.field,
            "mean disclosed to the analyzer; use the fully encrypted variance mode to avoid this"
        );
        self.disclosed = Some(disclosure);
        self.state = StatsState::MeanDisclosed;
        Ok(())
    }

    fn check_exact_budget(&self) -> HeStatsResult<()> {
        let Some(t) = self.scheme.plaintext_modulus() else {
            return Ok(());
        };
        let max = self.options.value_bound.ok_or_else(|| {
            HeStatsError::validation(format!(
                "exact variance of {} needs a bound on |x|",
                self.field
            ))
        })?;
        let worst_case = variance_worst_case(self.options.mode, self.count(), max);
        let limit = BigUint::from((t - 1) / 2);
        if worst_case > limit {
            return Err(HeStatsError::OverflowBudget { worst_case, limit });
        }
        Ok(())
    }

    /// `MeanDisclosed → VarianceComputed`, or `SumComputed →
    /// VarianceComputed` in fully encrypted mode
    ///
    /// Returns the ciphertext holding the scaled variance.
    pub fn compute_variance(&mut self) -> HeStatsResult<EncryptedVector> {
        let from = match self.options.mode {
            VarianceMode::DisclosedMean => StatsState::MeanDisclosed,
            VarianceMode::FullyEncrypted => StatsState::SumComputed,
        };
        self.expect(from, "compute the variance")?;
        if self.tag() == SchemeTag::Additive {
            return Err(HeStatsError::unsupported("variance", SchemeTag::Additive.name()));
        }
        self.check_exact_budget()?;

        let variance = match self.options.mode {
            VarianceMode::DisclosedMean => self.disclosed_variance()?,
            VarianceMode::FullyEncrypted => self.encrypted_variance()?,
        };
        debug!(field = %self.field, depth = variance.depth, "variance computed");
        self.variance = Some(variance.clone());
        self.state = StatsState::VarianceComputed;
        Ok(variance)
    }

    fn disclosed_variance(&self) -> HeStatsResult<EncryptedVector> {
        let disclosed = self
            .disclosed
            .ok_or_else(|| HeStatsError::protocol("no disclosed mean"))?;
        let scheme = &self.scheme;
        let centred = match self.tag() {
            SchemeTag::Approx => scheme.add_plain(&self.values, Scalar::Real(-disclosed.value))?,
            // N·x − S keeps every slot integral
            _ => {
                let n = Scalar::Integer(self.count() as i64);
                let nx = scheme.scalar_mul(&self.values, n)?;
                scheme.add_plain(&nx, Scalar::Integer(-(disclosed.value.round() as i64)))?
            }
        };
        let squares = scheme.elementwise_mul(&centred, &centred)?;
        let total = scheme.reduce_sum(&squares)?;
        match self.tag() {
            SchemeTag::Approx => scheme.scalar_mul(&total, self.inv_count()),
            _ => Ok(total),
        }
    }

    fn encrypted_variance(&self) -> HeStatsResult<EncryptedVector> {
        let first = self
            .first_stage
            .as_ref()
            .ok_or_else(|| HeStatsError::protocol("sum not computed"))?;
        let scheme = &self.scheme;
        let squares = scheme.elementwise_mul(&self.values, &self.values)?;
        let sum_squares = scheme.reduce_sum(&squares)?;
        match self.tag() {
            // E[x²] − E[x]²
            SchemeTag::Approx => {
                let mean_squares = scheme.scalar_mul(&sum_squares, self.inv_count())?;
                let mean_sq = scheme.elementwise_mul(first, first)?;
                scheme.sub(&mean_squares, &mean_sq)
            }
            // N·Σx² − S²
            _ => {
                let n = Scalar::Integer(self.count() as i64);
                let scaled = scheme.scalar_mul(&sum_squares, n)?;
                let sum_sq = scheme.elementwise_mul(first, first)?;
                scheme.sub(&scaled, &sum_sq)
            }
        }
    }

    /// Divisor turning the decrypted variance slot into the variance in
    /// field units
    fn variance_divisor(&self) -> f64 {
        let n = self.count() as f64;
        let scale = self.options.scale as f64;
        let integer_factor = match (self.tag(), self.options.mode) {
            (SchemeTag::Approx, _) => 1.0,
            (_, VarianceMode::DisclosedMean) => n * n * n,
            (_, VarianceMode::FullyEncrypted) => n * n,
        };
        integer_factor * scale * scale
    }

    fn mean_from(&self, first_stage: f64) -> f64 {
        let scale = self.options.scale as f64;
        match self.tag() {
            SchemeTag::Approx => first_stage / scale,
            _ => first_stage / (self.count() as f64 * scale),
        }
    }

    /// `VarianceComputed → Finalized` from the decrypted variance slot and
    /// the decrypted first-stage slot
    pub fn finalize(
        &mut self,
        first_stage: f64,
        decrypted_variance: f64,
    ) -> HeStatsResult<StatisticsBundle> {
        self.expect(StatsState::VarianceComputed, "finalize")?;
        // small negative values come from approximation noise
        let variance = (decrypted_variance / self.variance_divisor()).max(0.0);
        let bundle = self.bundle(first_stage, Some(variance));
        self.state = StatsState::Finalized;
        info!(field = %self.field, mean = bundle.mean, variance, "statistics finalized");
        Ok(bundle)
    }

    /// `SumComputed | MeanDisclosed → Finalized` without a variance, for
    /// schemes that cannot multiply ciphertexts
    pub fn finalize_without_variance(&mut self, first_stage: f64) -> HeStatsResult<StatisticsBundle> {
        if !matches!(self.state, StatsState::SumComputed | StatsState::MeanDisclosed) {
            self.expect(StatsState::SumComputed, "finalize")?;
        }
        let bundle = self.bundle(first_stage, None);
        self.state = StatsState::Finalized;
        info!(field = %self.field, mean = bundle.mean, "statistics finalized without variance");
        Ok(bundle)
    }

    fn bundle(&self, first_stage: f64, variance: Option<f64>) -> StatisticsBundle {
        let mean = self.mean_from(first_stage);
        StatisticsBundle {
            field: self.field.clone(),
            scheme: self.tag(),
            count: self.count(),
            sum: mean * self.count() as f64,
            mean,
            variance,
            std_dev: variance.map(f64::sqrt),
            disclosed_mean: self.disclosed.map(|d| self.mean_from(d.value)),
            mode: self.options.mode,
        }
    }
}
