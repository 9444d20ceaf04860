//! Rational formulas over named fields

use num_rational::Ratio;
use num_traits::{One, Zero};
use shared::{HeStatsError, HeStatsResult};
use std::collections::HashSet;
use std::fmt;

/// Exact rational coefficient
pub type Coefficient = Ratio<i64>;

/// A named input field and the integer scale its values were pre-scaled by
/// (1 for raw values, 100 for cents)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldRef {
    pub name: String,
    pub scale: i64,
}

impl FieldRef {
    pub fn new(name: impl Into<String>, scale: i64) -> Self {
        Self {
            name: name.into(),
            scale,
        }
    }

    pub fn raw(name: impl Into<String>) -> Self {
        Self::new(name, 1)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Term {
    pub field: FieldRef,
    pub coefficient: Coefficient,
}

impl Term {
    pub fn new(field: FieldRef, coefficient: Coefficient) -> Self {
        Self { field, coefficient }
    }
}

/// What happens to the per-record values once the formula is applied
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Aggregate {
    /// Keep one result per record
    #[default]
    None,
    Sum,
    Mean,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Formula {
    /// `(Σ coefficient·field) × post`, optionally aggregated
    Linear {
        terms: Vec<Term>,
        post: Coefficient,
        aggregate: Aggregate,
    },
    /// `Σ left·right × post`
    Dot {
        left: FieldRef,
        right: FieldRef,
        post: Coefficient,
    },
}

impl Formula {
    pub fn linear(terms: Vec<Term>, post: Coefficient, aggregate: Aggregate) -> Self {
        Formula::Linear {
            terms,
            post,
            aggregate,
        }
    }

    pub fn sum(field: FieldRef) -> Self {
        Self::linear(vec![Term::new(field, Ratio::one())], Ratio::one(), Aggregate::Sum)
    }

    pub fn mean(field: FieldRef) -> Self {
        Self::linear(vec![Term::new(field, Ratio::one())], Ratio::one(), Aggregate::Mean)
    }

    /// `Σ k·field` for an integer `k`
    pub fn scaled_sum(field: FieldRef, k: i64) -> Self {
        Self::linear(vec![Term::new(field, Ratio::one())], Ratio::from_integer(k), Aggregate::Sum)
    }

    pub fn dot(left: FieldRef, right: FieldRef) -> Self {
        Formula::Dot {
            left,
            right,
            post: Ratio::one(),
        }
    }

    /// Company total `Σ (salary + 0.1·bonus) × 1.05`
    pub fn payroll_total(salary: FieldRef, bonus: FieldRef) -> Self {
        Self::linear(
            vec![
                Term::new(salary, Ratio::one()),
                Term::new(bonus, Ratio::new(1, 10)),
            ],
            Ratio::new(105, 100),
            Aggregate::Sum,
        )
    }

    /// Input fields in the order the operation sequence loads them
    pub fn fields(&self) -> Vec<&FieldRef> {
        match self {
            Formula::Linear { terms, .. } => terms.iter().map(|t| &t.field).collect(),
            Formula::Dot { left, right, .. } => vec![left, right],
        }
    }

    pub fn post(&self) -> Coefficient {
        match self {
            Formula::Linear { post, .. } | Formula::Dot { post, .. } => *post,
        }
    }

    /// Whether the result is a single value rather than one per record
    pub fn is_aggregate(&self) -> bool {
        match self {
            Formula::Linear { aggregate, .. } => *aggregate != Aggregate::None,
            Formula::Dot { .. } => true,
        }
    }

    pub fn validate(&self) -> HeStatsResult<()> {
        if let Formula::Linear { terms, .. } = self {
            if terms.is_empty() {
                return Err(HeStatsError::validation("a linear formula needs at least one term"));
            }
            if terms.iter().any(|t| t.coefficient.is_zero()) {
                return Err(HeStatsError::validation("term coefficients must be non-zero"));
            }
        }
        if self.post().is_zero() {
            return Err(HeStatsError::validation("post-multiplier must be non-zero"));
        }
        let mut seen = HashSet::new();
        for field in self.fields() {
            if field.scale <= 0 {
                return Err(HeStatsError::validation(format!(
                    "field {} has non-positive scale {}",
                    field.name, field.scale
                )));
            }
            if matches!(self, Formula::Linear { .. }) && !seen.insert(&field.name) {
                return Err(HeStatsError::validation(format!(
                    "field {} appears in more than one term",
                    field.name
                )));
            }
        }
        Ok(())
    }
}

fn fmt_coefficient(c: &Coefficient) -> String {
    if c.is_integer() {
        c.numer().to_string()
    } else {
        format!("{}/{}", c.numer(), c.denom())
    }
}

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Formula::Linear {
                terms,
                post,
                aggregate,
            } => {
                let body = terms
                    .iter()
                    .map(|t| {
                        if t.coefficient.is_one() {
                            t.field.name.clone()
                        } else {
                            format!("{}·{}", fmt_coefficient(&t.coefficient), t.field.name)
                        }
                    })
                    .collect::<Vec<_>>()
                    .join(" + ");
                let body = if post.is_one() {
                    body
                } else {
                    format!("({body}) × {}", fmt_coefficient(post))
                };
                match aggregate {
                    Aggregate::None => write!(f, "{body}"),
                    Aggregate::Sum => write!(f, "Σ {body}"),
                    Aggregate::Mean => write!(f, "mean {body}"),
                }
            }
            Formula::Dot { left, right, post } => {
                write!(f, "{} · {}", left.name, right.name)?;
                if !post.is_one() {
                    write!(f, " × {}", fmt_coefficient(post))?;
                }
                Ok(())
            }
        }
    }
}

/// Parse a decimal literal such as `1.05` or `-0.1` into an exact ratio
pub fn decimal(text: &str) -> HeStatsResult<Coefficient> {
    let invalid = || HeStatsError::validation(format!("invalid decimal coefficient: {text}"));
    let trimmed = text.trim();
    let (negative, digits) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed),
    };
    let (whole, frac) = digits.split_once('.').unwrap_or((digits, ""));
    if whole.is_empty() && frac.is_empty() {
        return Err(invalid());
    }
    if !whole.chars().chain(frac.chars()).all(|c| c.is_ascii_digit()) || frac.len() > 18 {
        return Err(invalid());
    }
    let denom = 10i64.pow(frac.len() as u32);
    let whole: i64 = if whole.is_empty() { 0 } else { whole.parse().map_err(|_| invalid())? };
    let frac: i64 = if frac.is_empty() { 0 } else { frac.parse().map_err(|_| invalid())? };
    let numer = whole
        .checked_mul(denom)
        .and_then(|w| w.checked_add(frac))
        .ok_or_else(invalid)?;
    let value = Ratio::new(numer, denom);
    Ok(if negative { -value } else { value })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decimal() {
        assert_eq!(decimal("1.05").unwrap(), Ratio::new(21, 20));
        assert_eq!(decimal("0.1").unwrap(), Ratio::new(1, 10));
        assert_eq!(decimal("-2.50").unwrap(), Ratio::new(-5, 2));
        assert_eq!(decimal("7").unwrap(), Ratio::from_integer(7));
        assert_eq!(decimal(".5").unwrap(), Ratio::new(1, 2));
        for bad in ["", "-", "1.2.3", "1e5", "abc", "."] {
            assert!(decimal(bad).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn test_payroll_display() {
        let formula = Formula::payroll_total(FieldRef::raw("salary"), FieldRef::raw("bonus"));
        assert_eq!(formula.to_string(), "Σ (salary + 1/10·bonus) × 21/20");
        assert!(formula.is_aggregate());
        assert_eq!(
            Formula::dot(FieldRef::raw("shares"), FieldRef::new("prices", 100)).to_string(),
            "shares · prices"
        );
    }

    #[test]
    fn test_validate() {
        assert!(Formula::mean(FieldRef::raw("salary")).validate().is_ok());
        assert!(Formula::mean(FieldRef::new("salary", 0)).validate().is_err());
        assert!(Formula::linear(vec![], Ratio::one(), Aggregate::Sum).validate().is_err());

        let dup = Formula::linear(
            vec![
                Term::new(FieldRef::raw("salary"), Ratio::one()),
                Term::new(FieldRef::raw("salary"), Ratio::new(1, 2)),
            ],
            Ratio::one(),
            Aggregate::Sum,
        );
        assert!(dup.validate().is_err());

        // a field may be dotted with itself
        assert!(Formula::dot(FieldRef::raw("x"), FieldRef::raw("x")).validate().is_ok());
    }
}
