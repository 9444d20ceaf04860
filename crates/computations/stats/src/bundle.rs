//! Plaintext statistics results

use crate::engine::VarianceMode;
use serde::Serialize;
use shared::SchemeTag;

/// Decrypted statistics of one field
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatisticsBundle {
    pub field: String,
    pub scheme: SchemeTag,
    pub count: usize,
    pub sum: f64,
    pub mean: f64,
    /// Population variance; absent for schemes without ciphertext products
    pub variance: Option<f64>,
    pub std_dev: Option<f64>,
    /// Mean revealed to the analyzer, if the protocol disclosed it
    pub disclosed_mean: Option<f64>,
    pub mode: VarianceMode,
}

impl StatisticsBundle {
    /// Z-score of `value` against this field
    pub fn z_score(&self, value: f64) -> Option<f64> {
        z_score(value, self.mean, self.std_dev?)
    }
}

/// `(value − mean) / std_dev`; `None` for a zero or non-finite deviation
pub fn z_score(value: f64, mean: f64, std_dev: f64) -> Option<f64> {
    (std_dev.is_finite() && std_dev > 0.0).then(|| (value - mean) / std_dev)
}
