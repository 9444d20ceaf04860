//! Plaintext ground truth for the verification report

use crate::data::Dataset;
use encoder::{Aggregate, Coefficient, Formula};
use serde::Serialize;
use shared::{HeStatsError, HeStatsResult};

fn as_f64(c: &Coefficient) -> f64 {
    *c.numer() as f64 / *c.denom() as f64
}

/// Evaluate `formula` on the raw (unscaled) columns of `data`
pub fn formula_truth(formula: &Formula, data: &Dataset) -> HeStatsResult<Vec<f64>> {
    let count = data.len();
    if count == 0 {
        return Err(HeStatsError::validation("dataset is empty"));
    }
    match formula {
        Formula::Linear {
            terms,
            post,
            aggregate,
        } => {
            let mut per_record = vec![0.0; count];
            for term in terms {
                let c = as_f64(&term.coefficient);
                for (acc, x) in per_record.iter_mut().zip(data.column(&term.field.name)?) {
                    *acc += c * x;
                }
            }
            let post = as_f64(post);
            let total: f64 = per_record.iter().sum::<f64>() * post;
            Ok(match aggregate {
                Aggregate::None => per_record.into_iter().map(|v| v * post).collect(),
                Aggregate::Sum => vec![total],
                Aggregate::Mean => vec![total / count as f64],
            })
        }
        Formula::Dot { left, right, post } => {
            let a = data.column(&left.name)?;
            let b = data.column(&right.name)?;
            let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
            Ok(vec![dot * as_f64(post)])
        }
    }
}

/// Population statistics of one column
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PopulationStats {
    pub mean: f64,
    pub variance: f64,
    pub std_dev: f64,
}

impl PopulationStats {
    pub fn of(values: &[f64]) -> HeStatsResult<Self> {
        if values.is_empty() {
            return Err(HeStatsError::validation("no values"));
        }
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let variance = values.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
        Ok(Self {
            mean,
            variance,
            std_dev: variance.sqrt(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use encoder::FieldRef;

    #[test]
    fn test_demo_truths() {
        let data = Dataset::demo();
        let mean = formula_truth(&Formula::mean(FieldRef::raw("salary")), &data).unwrap();
        assert!((mean[0] - 2640.27).abs() < 1e-9);

        let dot = formula_truth(
            &Formula::dot(FieldRef::raw("shares"), FieldRef::raw("prices")),
            &data,
        )
        .unwrap();
        assert!((dot[0] - 18520.0).abs() < 1e-6);

        let total = formula_truth(
            &Formula::payroll_total(FieldRef::raw("salary"), FieldRef::raw("bonus")),
            &data,
        )
        .unwrap();
        let want = (13201.35 + 120.075) * 1.05;
        assert!((total[0] - want).abs() < 1e-6);
    }

    #[test]
    fn test_population_stats() {
        let stats = PopulationStats::of(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]).unwrap();
        assert_eq!(stats.mean, 5.0);
        assert_eq!(stats.variance, 4.0);
        assert_eq!(stats.std_dev, 2.0);
        assert!(PopulationStats::of(&[]).is_err());
    }

    #[test]
    fn test_unknown_column() {
        let formula = Formula::sum(FieldRef::raw("hours"));
        assert!(formula_truth(&formula, &Dataset::demo()).is_err());
    }
}
