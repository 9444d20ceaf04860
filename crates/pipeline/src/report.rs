//! Verification report of a pipeline run

use crate::truth::PopulationStats;
use chrono::{DateTime, Utc};
use serde::Serialize;
use shared::{PrecisionWarning, SchemeTag};
use stats::{StatisticsBundle, VarianceMode};
use std::time::Duration;

/// One decrypted formula result and its plaintext ground truth
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComputationResult {
    pub name: String,
    /// Formula in readable form
    pub formula: String,
    /// Operation sequence run by the analyzer
    pub ops: String,
    pub values: Vec<f64>,
    pub ground_truth: Vec<f64>,
    /// Largest absolute difference between `values` and `ground_truth`
    pub abs_error: f64,
    /// Heuristic error bound of the approximate scheme
    pub estimated_error: Option<f64>,
}

impl ComputationResult {
    pub fn value(&self) -> Option<f64> {
        self.values.first().copied()
    }
}

/// Largest elementwise absolute difference
pub fn max_abs_error(values: &[f64], truth: &[f64]) -> f64 {
    values
        .iter()
        .zip(truth)
        .map(|(v, t)| (v - t).abs())
        .fold(0.0, f64::max)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatisticsResult {
    pub bundle: StatisticsBundle,
    pub ground_truth: PopulationStats,
    pub mean_error: f64,
    pub variance_error: Option<f64>,
}

impl StatisticsResult {
    pub fn new(bundle: StatisticsBundle, ground_truth: PopulationStats) -> Self {
        let mean_error = (bundle.mean - ground_truth.mean).abs();
        let variance_error = bundle.variance.map(|v| (v - ground_truth.variance).abs());
        Self {
            bundle,
            ground_truth,
            mean_error,
            variance_error,
        }
    }
}

/// Z-score of the first record of a field
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ZScore {
    pub field: String,
    pub value: f64,
    pub z: Option<f64>,
}

/// Stage latencies in seconds
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct StageTimings {
    pub setup: f64,
    pub encrypt: f64,
    pub process: f64,
    pub decrypt: f64,
    pub total: f64,
}

impl StageTimings {
    pub fn record(&mut self, stage: Stage, elapsed: Duration) {
        let secs = elapsed.as_secs_f64();
        match stage {
            Stage::Setup => self.setup += secs,
            Stage::Encrypt => self.encrypt += secs,
            Stage::Process => self.process += secs,
            Stage::Decrypt => self.decrypt += secs,
        }
        self.total += secs;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Setup,
    Encrypt,
    Process,
    Decrypt,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub scheme: SchemeTag,
    pub workload: String,
    pub records: usize,
    pub layout: String,
    pub variance_mode: VarianceMode,
    pub results: Vec<ComputationResult>,
    pub statistics: Vec<StatisticsResult>,
    pub z_scores: Vec<ZScore>,
    pub warnings: Vec<PrecisionWarning>,
    pub timings: StageTimings,
    pub bytes_transferred: usize,
    pub created_at: DateTime<Utc>,
}

impl RunReport {
    pub fn result(&self, name: &str) -> Option<&ComputationResult> {
        self.results.iter().find(|r| r.name == name)
    }

    pub fn statistics_for(&self, field: &str) -> Option<&StatisticsResult> {
        self.statistics.iter().find(|s| s.bundle.field == field)
    }
}

/// Approximate and exact runs of the same workload
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Comparison {
    pub approx: RunReport,
    pub exact: RunReport,
    /// Exact total time over approximate total time
    pub speedup: f64,
}

impl Comparison {
    pub fn new(approx: RunReport, exact: RunReport) -> Self {
        let speedup = if approx.timings.total > 0.0 {
            exact.timings.total / approx.timings.total
        } else {
            f64::NAN
        };
        Self {
            approx,
            exact,
            speedup,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_abs_error() {
        assert_eq!(max_abs_error(&[1.0, 2.5], &[1.0, 2.0]), 0.5);
        assert_eq!(max_abs_error(&[], &[]), 0.0);
    }

    #[test]
    fn test_timings_accumulate() {
        let mut timings = StageTimings::default();
        timings.record(Stage::Encrypt, Duration::from_millis(250));
        timings.record(Stage::Decrypt, Duration::from_millis(500));
        timings.record(Stage::Decrypt, Duration::from_millis(250));
        assert_eq!(timings.encrypt, 0.25);
        assert_eq!(timings.decrypt, 0.75);
        assert_eq!(timings.total, 1.0);
    }
}
