//! Pipeline options and the TOML pipeline file

use framing::Layout;
use serde::Deserialize;
use shared::{constants::DEFAULT_TOLERANCE, HeStatsError, HeStatsResult, SchemeConfig, SchemeTag};
use stats::VarianceMode;
use std::collections::BTreeMap;
use std::path::Path;

/// Options shared by every run of a pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOptions {
    pub layout: Layout,
    pub variance_mode: VarianceMode,
    /// Absolute error above which approximate results raise a warning;
    /// falls back to the approximate scheme configuration
    pub tolerance: Option<f64>,
    /// Seed for key generation and encryption randomness
    pub seed: Option<u64>,
    /// Integer pre-scale of each field for the exact scheme
    pub field_scales: BTreeMap<String, i64>,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        let field_scales = ["salary", "bonus", "prices"]
            .into_iter()
            .map(|name| (name.to_string(), 100))
            .collect();
        Self {
            layout: Layout::default(),
            variance_mode: VarianceMode::default(),
            tolerance: None,
            seed: None,
            field_scales,
        }
    }
}

impl PipelineOptions {
    /// Scale of `field` under the scheme variant; only the exact scheme
    /// consumes pre-scaled integers
    pub fn field_scale(&self, tag: SchemeTag, field: &str) -> i64 {
        match tag {
            SchemeTag::Exact => self.field_scales.get(field).copied().unwrap_or(1),
            SchemeTag::Approx | SchemeTag::Additive => 1,
        }
    }

    /// Tolerance of precision warnings under `config`
    pub fn tolerance_for(&self, config: &SchemeConfig) -> f64 {
        match (self.tolerance, config) {
            (Some(tolerance), _) => tolerance,
            (None, SchemeConfig::Approx(approx)) => approx.tolerance,
            (None, _) => DEFAULT_TOLERANCE,
        }
    }

    pub fn validate(&self) -> HeStatsResult<()> {
        if self.tolerance.is_some_and(|t| t.is_nan() || t <= 0.0) {
            return Err(HeStatsError::validation("tolerance must be positive"));
        }
        if let Some((name, scale)) = self.field_scales.iter().find(|(_, &s)| s <= 0) {
            return Err(HeStatsError::validation(format!(
                "field {name} has non-positive scale {scale}"
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineSection {
    pub layout: Option<String>,
    pub variance_mode: Option<String>,
    pub tolerance: Option<f64>,
    pub seed: Option<u64>,
}

/// Contents of a `--config` file
///
/// ```toml
/// [scheme]
/// scheme = "exact"
/// degree = 4096
/// plaintext_modulus = 18014398510661633
/// moduli_sizes = [62, 62, 62, 62]
/// depth_budget = 2
///
/// [pipeline]
/// layout = "open-tail"
/// variance_mode = "fully-encrypted"
///
/// [field_scales]
/// salary = 100
/// ```
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineFile {
    pub scheme: Option<SchemeConfig>,
    pub pipeline: PipelineSection,
    pub field_scales: BTreeMap<String, i64>,
}

impl PipelineFile {
    pub fn from_toml(text: &str) -> HeStatsResult<Self> {
        let file: PipelineFile = toml::from_str(text)?;
        if let Some(scheme) = &file.scheme {
            scheme.validate()?;
        }
        Ok(file)
    }

    pub fn load(path: impl AsRef<Path>) -> HeStatsResult<Self> {
        Self::from_toml(&std::fs::read_to_string(path)?)
    }

    /// Override `options` with the values set in the file
    pub fn apply(&self, options: &mut PipelineOptions) -> HeStatsResult<()> {
        let section = &self.pipeline;
        if let Some(layout) = &section.layout {
            options.layout = layout.parse()?;
        }
        if let Some(mode) = &section.variance_mode {
            options.variance_mode = mode.parse()?;
        }
        if section.tolerance.is_some() {
            options.tolerance = section.tolerance;
        }
        if section.seed.is_some() {
            options.seed = section.seed;
        }
        options
            .field_scales
            .extend(self.field_scales.iter().map(|(k, v)| (k.clone(), *v)));
        options.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_scales() {
        let options = PipelineOptions::default();
        assert_eq!(options.field_scale(SchemeTag::Exact, "salary"), 100);
        assert_eq!(options.field_scale(SchemeTag::Exact, "shares"), 1);
        assert_eq!(options.field_scale(SchemeTag::Approx, "salary"), 1);
    }

    #[test]
    fn test_tolerance_fallback() {
        let mut options = PipelineOptions::default();
        let approx = SchemeConfig::preset(SchemeTag::Approx, shared::Preset::Test);
        let exact = SchemeConfig::preset(SchemeTag::Exact, shared::Preset::Test);
        assert_eq!(options.tolerance_for(&approx), DEFAULT_TOLERANCE);
        assert_eq!(options.tolerance_for(&exact), DEFAULT_TOLERANCE);
        options.tolerance = Some(0.5);
        assert_eq!(options.tolerance_for(&approx), 0.5);
        options.tolerance = Some(-1.0);
        assert!(options.validate().is_err());
    }

    #[test]
    fn test_pipeline_file() {
        let file = PipelineFile::from_toml(
            r#"
            [scheme]
            scheme = "additive"
            key_bits = 512

            [pipeline]
            layout = "counted"
            variance_mode = "fully-encrypted"
            seed = 7

            [field_scales]
            hours = 1
            "#,
        )
        .unwrap();
        assert_eq!(file.scheme.as_ref().map(SchemeConfig::tag), Some(SchemeTag::Additive));

        let mut options = PipelineOptions::default();
        file.apply(&mut options).unwrap();
        assert_eq!(options.layout, Layout::Counted);
        assert_eq!(options.variance_mode, VarianceMode::FullyEncrypted);
        assert_eq!(options.seed, Some(7));
        assert_eq!(options.field_scales.get("hours"), Some(&1));
        assert_eq!(options.field_scales.get("salary"), Some(&100));
    }

    #[test]
    fn test_bad_pipeline_file() {
        assert!(PipelineFile::from_toml("[pipeline]\nlayout = 3").is_err());
        assert!(PipelineFile::from_toml("[pipeline]\nspeed = \"fast\"").is_err());

        let file = PipelineFile::from_toml("[field_scales]\nsalary = 0").unwrap();
        assert!(file.apply(&mut PipelineOptions::default()).is_err());
    }
}
