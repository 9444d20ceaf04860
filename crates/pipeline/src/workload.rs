//! Named computation sets

use encoder::{FieldRef, Formula};
use shared::{HeStatsError, SchemeTag};
use std::fmt;
use std::str::FromStr;

/// One computation of a workload
#[derive(Debug, Clone, PartialEq)]
pub enum Computation {
    Formula { name: String, formula: Formula },
    /// Mean, variance and standard deviation of a field
    Statistics { field: String },
}

impl Computation {
    fn formula(name: &str, formula: Formula) -> Self {
        Computation::Formula {
            name: name.to_string(),
            formula,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Workload {
    /// Mean salary
    Average,
    /// Salary and bonus statistics plus the payroll total
    Statistics,
    /// Sum of salaries
    Addition,
    /// Sum of doubled salaries
    Multiplication,
    /// Portfolio value `shares · prices`
    Dot,
}

impl Workload {
    pub const ALL: [Workload; 5] = [
        Workload::Average,
        Workload::Statistics,
        Workload::Addition,
        Workload::Multiplication,
        Workload::Dot,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Workload::Average => "average",
            Workload::Statistics => "statistics",
            Workload::Addition => "addition",
            Workload::Multiplication => "multiplication",
            Workload::Dot => "dot",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Workload::Average => "mean of salaries",
            Workload::Statistics => {
                "salary/bonus mean, variance, std-dev and Σ (salary + 0.1·bonus) × 1.05"
            }
            Workload::Addition => "sum of salaries",
            Workload::Multiplication => "sum of 2·salary",
            Workload::Dot => "portfolio value shares · prices",
        }
    }

    /// Input fields in encryption order
    pub fn fields(self) -> &'static [&'static str] {
        match self {
            Workload::Average | Workload::Addition | Workload::Multiplication => &["salary"],
            Workload::Statistics => &["salary", "bonus"],
            Workload::Dot => &["shares", "prices"],
        }
    }

    /// Whether every computation runs on the scheme variant
    pub fn supports(self, tag: SchemeTag) -> bool {
        !(self == Workload::Dot && !schemes::supports_products(tag))
    }

    /// Computations with field references from `field`
    pub fn computations(self, field: &dyn Fn(&str) -> FieldRef) -> Vec<Computation> {
        match self {
            Workload::Average => vec![Computation::formula(
                "salary_mean",
                Formula::mean(field("salary")),
            )],
            Workload::Statistics => vec![
                Computation::Statistics {
                    field: "salary".to_string(),
                },
                Computation::Statistics {
                    field: "bonus".to_string(),
                },
                Computation::formula(
                    "payroll_total",
                    Formula::payroll_total(field("salary"), field("bonus")),
                ),
            ],
            Workload::Addition => vec![Computation::formula(
                "salary_sum",
                Formula::sum(field("salary")),
            )],
            Workload::Multiplication => vec![Computation::formula(
                "salary_doubled_sum",
                Formula::scaled_sum(field("salary"), 2),
            )],
            Workload::Dot => vec![Computation::formula(
                "portfolio_value",
                Formula::dot(field("shares"), field("prices")),
            )],
        }
    }
}

impl fmt::Display for Workload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Workload {
    type Err = HeStatsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Workload::ALL
            .into_iter()
            .find(|w| w.name() == s.to_lowercase())
            .ok_or_else(|| HeStatsError::validation(format!("unknown workload: {s}")))
    }
}
