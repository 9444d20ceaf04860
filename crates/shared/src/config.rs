//! Scheme configuration
//!
//! Each scheme variant has its own configuration struct with serde support,
//! defaults and named presets. [`SchemeConfig`] wraps them in a tagged enum
//! so a TOML file can select the variant with `scheme = "approx"` and
//! override individual fields.

use crate::constants::{
    DEFAULT_FIXED_POINT_DIGITS, DEFAULT_PLAINTEXT_MODULUS, DEFAULT_SCALE_BITS, DEFAULT_TOLERANCE,
};
use crate::errors::{HeStatsError, HeStatsResult};
use crate::tag::SchemeTag;
use crate::validation;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Named parameter presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Preset {
    /// Small rings, fast enough for unit and integration tests
    Test,
    /// Interactive development
    Dev,
    /// Larger rings and keys; not a vetted secure parameter set
    Large,
}

impl Preset {
    pub const ALL: [Preset; 3] = [Preset::Dev, Preset::Test, Preset::Large];

    pub fn name(self) -> &'static str {
        match self {
            Preset::Test => "test",
            Preset::Dev => "dev",
            Preset::Large => "large",
        }
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Preset {
    type Err = HeStatsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "test" => Ok(Preset::Test),
            "dev" => Ok(Preset::Dev),
            "large" => Ok(Preset::Large),
            other => Err(HeStatsError::validation(format!("Unknown preset: {other}"))),
        }
    }
}

/// Approximate (CKKS) scheme configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApproxConfig {
    /// Ring degree; the vector capacity is half of it
    pub degree: usize,
    /// Precision budget: bits of scale consumed by each multiplication
    pub scale_bits: u32,
    /// Headroom bits for the integer part of slot values
    pub integer_bits: u32,
    /// Length of the modulus chain (rescalings available)
    pub levels: usize,
    /// Maximum number of ciphertext-ciphertext multiplications
    pub depth_budget: usize,
    /// Variance of the centred binomial secret, in [1, 16]
    pub secret_variance: usize,
    /// Variance of the centred binomial encryption error, in [1, 16]
    pub error_variance: usize,
    /// Absolute error above which a precision warning is emitted
    pub tolerance: f64,
}

impl Default for ApproxConfig {
    fn default() -> Self {
        Self::preset(Preset::Dev)
    }
}

impl ApproxConfig {
    pub fn preset(preset: Preset) -> Self {
        let (degree, levels, depth_budget) = match preset {
            Preset::Test => (32, 3, 2),
            Preset::Dev => (256, 4, 2),
            Preset::Large => (1024, 4, 3),
        };
        Self {
            degree,
            scale_bits: DEFAULT_SCALE_BITS,
            integer_bits: 40,
            levels,
            depth_budget,
            secret_variance: 1,
            error_variance: 10,
            tolerance: DEFAULT_TOLERANCE,
        }
    }

    pub fn vector_capacity(&self) -> usize {
        self.degree / 2
    }

    pub fn validate(&self) -> HeStatsResult<()> {
        validation::validate_degree_bounds(self.degree)?;
        validation::validate_precision(self.scale_bits, self.integer_bits, self.levels)?;
        if self.depth_budget > self.levels {
            return Err(HeStatsError::validation(format!(
                "depth budget {} exceeds the {} levels of the modulus chain",
                self.depth_budget, self.levels
            )));
        }
        for (name, variance) in [
            ("secret", self.secret_variance),
            ("error", self.error_variance),
        ] {
            if !(1..=16).contains(&variance) {
                return Err(HeStatsError::validation(format!(
                    "{name} variance must be in [1, 16], got {variance}"
                )));
            }
        }
        if self.tolerance.is_nan() || self.tolerance <= 0.0 {
            return Err(HeStatsError::validation("tolerance must be positive"));
        }
        Ok(())
    }
}

/// Exact (BFV) scheme configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExactConfig {
    /// Ring degree; also the vector capacity
    pub degree: usize,
    /// Plaintext modulus t
    pub plaintext_modulus: u64,
    /// Bit sizes of the ciphertext moduli
    pub moduli_sizes: Vec<usize>,
    /// Maximum number of ciphertext-ciphertext multiplications
    pub depth_budget: usize,
}

impl Default for ExactConfig {
    fn default() -> Self {
        Self::preset(Preset::Dev)
    }
}

impl ExactConfig {
    pub fn preset(preset: Preset) -> Self {
        let (degree, moduli_sizes, depth_budget) = match preset {
            Preset::Test => (2048, vec![62; 4], 2),
            Preset::Dev => (4096, vec![62; 4], 2),
            Preset::Large => (8192, vec![62; 5], 3),
        };
        Self {
            degree,
            plaintext_modulus: DEFAULT_PLAINTEXT_MODULUS,
            moduli_sizes,
            depth_budget,
        }
    }

    pub fn vector_capacity(&self) -> usize {
        self.degree
    }

    pub fn validate(&self) -> HeStatsResult<()> {
        validation::validate_degree_bounds(self.degree)?;
        validation::validate_plaintext_modulus(self.plaintext_modulus)?;
        validation::validate_simd_modulus(self.plaintext_modulus, self.degree)?;
        validation::validate_moduli_sizes(&self.moduli_sizes)?;
        Ok(())
    }
}

/// Additive (Paillier) scheme configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdditiveConfig {
    /// Bit size of the public modulus n = p·q
    pub key_bits: u64,
    /// Decimal digits kept when encrypting real values
    pub fixed_point_digits: u32,
    /// Maximum number of elements per encrypted vector
    pub vector_capacity: usize,
}

impl Default for AdditiveConfig {
    fn default() -> Self {
        Self::preset(Preset::Dev)
    }
}

impl AdditiveConfig {
    pub fn preset(preset: Preset) -> Self {
        let key_bits = match preset {
            Preset::Test => 512,
            Preset::Dev => 1024,
            Preset::Large => 2048,
        };
        Self {
            key_bits,
            fixed_point_digits: DEFAULT_FIXED_POINT_DIGITS,
            vector_capacity: 4096,
        }
    }

    pub fn validate(&self) -> HeStatsResult<()> {
        validation::validate_key_bits(self.key_bits)?;
        if self.fixed_point_digits > 9 {
            return Err(HeStatsError::validation(
                "fixed point digits must be at most 9",
            ));
        }
        if self.vector_capacity == 0 {
            return Err(HeStatsError::validation("vector capacity must be positive"));
        }
        Ok(())
    }
}

/// Configuration of one scheme variant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "scheme", rename_all = "snake_case")]
pub enum SchemeConfig {
    Approx(ApproxConfig),
    Exact(ExactConfig),
    Additive(AdditiveConfig),
}

impl SchemeConfig {
    pub fn preset(tag: SchemeTag, preset: Preset) -> Self {
        match tag {
            SchemeTag::Approx => SchemeConfig::Approx(ApproxConfig::preset(preset)),
            SchemeTag::Exact => SchemeConfig::Exact(ExactConfig::preset(preset)),
            SchemeTag::Additive => SchemeConfig::Additive(AdditiveConfig::preset(preset)),
        }
    }

    pub fn tag(&self) -> SchemeTag {
        match self {
            SchemeConfig::Approx(_) => SchemeTag::Approx,
            SchemeConfig::Exact(_) => SchemeTag::Exact,
            SchemeConfig::Additive(_) => SchemeTag::Additive,
        }
    }

    pub fn vector_capacity(&self) -> usize {
        match self {
            SchemeConfig::Approx(c) => c.vector_capacity(),
            SchemeConfig::Exact(c) => c.vector_capacity(),
            SchemeConfig::Additive(c) => c.vector_capacity,
        }
    }

    pub fn validate(&self) -> HeStatsResult<()> {
        match self {
            SchemeConfig::Approx(c) => c.validate(),
            SchemeConfig::Exact(c) => c.validate(),
            SchemeConfig::Additive(c) => c.validate(),
        }
    }

    /// Parse a configuration from TOML
    pub fn from_toml(text: &str) -> HeStatsResult<Self> {
        let config: SchemeConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }
}
