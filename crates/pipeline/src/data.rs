//! Input records
//!
//! A dataset is a set of equally long numeric columns, one per field.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use serde_json::Value;
use shared::{HeStatsError, HeStatsResult};
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    columns: Vec<(String, Vec<f64>)>,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a column; every column must have the same length
    pub fn with_column(mut self, name: impl Into<String>, values: Vec<f64>) -> HeStatsResult<Self> {
        let name = name.into();
        if let Some((first, existing)) = self.columns.first() {
            if existing.len() != values.len() {
                return Err(HeStatsError::validation(format!(
                    "column {name} has {} values, {first} has {}",
                    values.len(),
                    existing.len()
                )));
            }
        }
        if self.columns.iter().any(|(n, _)| *n == name) {
            return Err(HeStatsError::validation(format!("duplicate column {name}")));
        }
        if let Some(v) = values.iter().find(|v| !v.is_finite()) {
            return Err(HeStatsError::validation(format!(
                "column {name} holds a non-finite value {v}"
            )));
        }
        self.columns.push((name, values));
        Ok(self)
    }

    /// Built-in demo records
    pub fn demo() -> Self {
        Self {
            columns: vec![
                (
                    "salary".to_string(),
                    vec![1200.50, 2500.00, 1800.75, 3200.10, 4500.00],
                ),
                ("bonus".to_string(), vec![0.00, 250.00, 180.25, 320.00, 450.50]),
                ("shares".to_string(), vec![10.0, 50.0, 20.0, 5.0, 100.0]),
                ("prices".to_string(), vec![150.50, 200.00, 50.25, 1000.00, 10.10]),
            ],
        }
    }

    /// Random payroll and portfolio records
    ///
    /// Salaries 500.00..5000.00, bonuses 0.00..1000.00, hours 20..60,
    /// ages 18..70, shares 1..100, prices 1.00..1000.00; money in whole
    /// cents.
    pub fn synthetic(records: usize, seed: u64) -> Self {
        let mut rng = ChaCha20Rng::seed_from_u64(seed);
        let mut column = |low: i64, high: i64, divisor: f64| -> Vec<f64> {
            (0..records)
                .map(|_| rng.random_range(low..high) as f64 / divisor)
                .collect()
        };
        let salary = column(50_000, 500_000, 100.0);
        let bonus = column(0, 100_000, 100.0);
        let hours = column(20, 60, 1.0);
        let age = column(18, 70, 1.0);
        let shares = column(1, 100, 1.0);
        let prices = column(100, 100_000, 100.0);
        Self {
            columns: vec![
                ("salary".to_string(), salary),
                ("bonus".to_string(), bonus),
                ("hours".to_string(), hours),
                ("age".to_string(), age),
                ("shares".to_string(), shares),
                ("prices".to_string(), prices),
            ],
        }
    }

    /// Parse either an array of records or an object of columns
    ///
    /// ```json
    /// [{"salary": 1200.50, "bonus": 0}, {"salary": 2500, "bonus": 250}]
    /// {"salary": [1200.50, 2500], "bonus": [0, 250]}
    /// ```
    pub fn from_json(text: &str) -> HeStatsResult<Self> {
        let number = |field: &str, v: &Value| {
            v.as_f64().ok_or_else(|| {
                HeStatsError::validation(format!("field {field} holds a non-numeric value {v}"))
            })
        };

        let mut dataset = Self::new();
        match serde_json::from_str::<Value>(text)? {
            Value::Array(records) => {
                let first = records
                    .first()
                    .and_then(Value::as_object)
                    .ok_or_else(|| HeStatsError::validation("expected an array of records"))?;
                for name in first.keys() {
                    let values = records
                        .iter()
                        .enumerate()
                        .map(|(i, record)| {
                            let v = record.get(name).ok_or_else(|| {
                                HeStatsError::validation(format!("record {i} has no field {name}"))
                            })?;
                            number(name.as_str(), v)
                        })
                        .collect::<HeStatsResult<Vec<_>>>()?;
                    dataset = dataset.with_column(name.clone(), values)?;
                }
            }
            Value::Object(columns) => {
                for (name, column) in &columns {
                    let values = column
                        .as_array()
                        .ok_or_else(|| {
                            HeStatsError::validation(format!("column {name} is not an array"))
                        })?
                        .iter()
                        .map(|v| number(name.as_str(), v))
                        .collect::<HeStatsResult<Vec<_>>>()?;
                    dataset = dataset.with_column(name.clone(), values)?;
                }
            }
            _ => {
                return Err(HeStatsError::validation(
                    "expected an array of records or an object of columns",
                ))
            }
        }
        if dataset.is_empty() {
            return Err(HeStatsError::validation("dataset has no records"));
        }
        Ok(dataset)
    }

    pub fn load(path: impl AsRef<Path>) -> HeStatsResult<Self> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.columns.first().map(|(_, v)| v.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(n, _)| n.as_str())
    }

    pub fn column(&self, name: &str) -> HeStatsResult<&[f64]> {
        self.columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_slice())
            .ok_or_else(|| HeStatsError::validation(format!("dataset has no field {name}")))
    }
}
