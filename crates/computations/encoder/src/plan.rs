//! Operation sequences and scaling plans
//!
//! The approximate scheme evaluates a formula with native real constants.
//! The exact and additive schemes only take integer constants, so their
//! plan clears every denominator with the least common multiple of the
//! effective coefficients and divides after decryption.

use crate::formula::{Aggregate, Coefficient, FieldRef, Formula};
use num_bigint::BigUint;
use num_integer::Integer;
use num_rational::Ratio;
use num_traits::{CheckedDiv, One, Zero};
use schemes::Scalar;
use serde::Serialize;
use shared::{HeStatsError, HeStatsResult, SchemeTag};
use std::fmt;
use tracing::{debug, info};

/// Integer scaling that turns a rational formula into integer operations
///
/// Applying the multipliers, the scheme's integer operations, then dividing
/// the decrypted value by `final_divisor` (and by the record count when
/// `divide_by_count` is set) gives the rational result exactly, as long as
/// every intermediate value stays inside the signed plaintext range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScalingPlan {
    pub integer_multipliers: Vec<i64>,
    pub post_ops_multiplier: i64,
    pub final_divisor: i64,
    pub divide_by_count: bool,
}

impl ScalingPlan {
    /// Reverse the scaling of a decrypted value
    pub fn decode(&self, value: f64, count: usize) -> f64 {
        let mut divisor = self.final_divisor as f64;
        if self.divide_by_count {
            divisor *= count as f64;
        }
        value / divisor
    }
}

/// One homomorphic step applied to the accumulator
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// Start the accumulator from a field, optionally scaled
    Load { field: String, factor: Option<Scalar> },
    /// Add a field, optionally scaled
    AddScaled { field: String, factor: Option<Scalar> },
    /// Multiply elementwise by a field
    MulField { field: String },
    Scale(Scalar),
    ReduceSum,
    /// Divide a reduced sum by the record count
    Average,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Load { field, factor: None } => write!(f, "load {field}"),
            Step::Load {
                field,
                factor: Some(k),
            } => write!(f, "load {k}·{field}"),
            Step::AddScaled { field, factor: None } => write!(f, "add {field}"),
            Step::AddScaled {
                field,
                factor: Some(k),
            } => write!(f, "add {k}·{field}"),
            Step::MulField { field } => write!(f, "multiply by {field}"),
            Step::Scale(k) => write!(f, "scale by {k}"),
            Step::ReduceSum => write!(f, "reduce-sum"),
            Step::Average => write!(f, "divide by count"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OpSequence {
    steps: Vec<Step>,
}

impl OpSequence {
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Ciphertext-ciphertext multiplications in the sequence
    pub fn multiplicative_depth(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| matches!(s, Step::MulField { .. }))
            .count()
    }

    /// Steps multiplying by a plaintext constant
    pub fn constant_multiplications(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| {
                matches!(
                    s,
                    Step::Load { factor: Some(_), .. }
                        | Step::AddScaled { factor: Some(_), .. }
                        | Step::Scale(_)
                        | Step::Average
                )
            })
            .count()
    }

    fn push(&mut self, step: Step) {
        self.steps.push(step);
    }
}

impl fmt::Display for OpSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let steps: Vec<String> = self.steps.iter().map(Step::to_string).collect();
        write!(f, "{}", steps.join(" → "))
    }
}

/// Operation sequence for one scheme, with its scaling plan when the scheme
/// is integer-only
#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    pub tag: SchemeTag,
    pub formula: Formula,
    pub ops: OpSequence,
    pub scaling: Option<ScalingPlan>,
}

impl Plan {
    pub fn fields(&self) -> Vec<&FieldRef> {
        self.formula.fields()
    }

    pub fn decode(&self, value: f64, count: usize) -> f64 {
        match &self.scaling {
            Some(scaling) => scaling.decode(value, count),
            None => value,
        }
    }

    pub fn decode_all(&self, values: &[f64], count: usize) -> Vec<f64> {
        values.iter().map(|&v| self.decode(v, count)).collect()
    }
}

fn too_large(what: &str) -> HeStatsError {
    HeStatsError::validation(format!("{what} does not fit a 64-bit integer"))
}

/// `coefficient / scale` of a term
fn effective(coefficient: &Coefficient, scale: i64) -> HeStatsResult<Coefficient> {
    coefficient
        .checked_div(&Ratio::from_integer(scale))
        .ok_or_else(|| too_large("effective coefficient"))
}

fn real_factor(c: &Coefficient) -> Option<Scalar> {
    if c.is_one() {
        None
    } else if c.is_integer() {
        Some(Scalar::Integer(*c.numer()))
    } else {
        Some(Scalar::Real(*c.numer() as f64 / *c.denom() as f64))
    }
}

fn integer_factor(m: i64) -> Option<Scalar> {
    (m != 1).then_some(Scalar::Integer(m))
}

fn push_aggregate(ops: &mut OpSequence, aggregate: Aggregate) {
    match aggregate {
        Aggregate::None => {}
        Aggregate::Sum => ops.push(Step::ReduceSum),
        Aggregate::Mean => {
            ops.push(Step::ReduceSum);
            ops.push(Step::Average);
        }
    }
}

/// Builds plans for one scheme variant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormulaEncoder {
    tag: SchemeTag,
    plaintext_modulus: Option<u64>,
}

impl FormulaEncoder {
    pub fn approx() -> Self {
        Self {
            tag: SchemeTag::Approx,
            plaintext_modulus: None,
        }
    }

    pub fn exact(plaintext_modulus: u64) -> Self {
        Self {
            tag: SchemeTag::Exact,
            plaintext_modulus: Some(plaintext_modulus),
        }
    }

    pub fn additive() -> Self {
        Self {
            tag: SchemeTag::Additive,
            plaintext_modulus: None,
        }
    }

    pub fn tag(&self) -> SchemeTag {
        self.tag
    }

    /// Operation sequence and, for integer schemes, the scaling plan
    pub fn plan(&self, formula: &Formula) -> HeStatsResult<Plan> {
        formula.validate()?;
        let (ops, scaling) = match self.tag {
            SchemeTag::Approx => (Self::real_ops(formula)?, None),
            SchemeTag::Additive if matches!(formula, Formula::Dot { .. }) => {
                return Err(HeStatsError::unsupported("dot", SchemeTag::Additive.name()));
            }
            SchemeTag::Exact | SchemeTag::Additive => {
                let (ops, scaling) = Self::integer_ops(formula)?;
                (ops, Some(scaling))
            }
        };
        debug!(tag = %self.tag, %formula, ops = %ops, "formula planned");
        Ok(Plan {
            tag: self.tag,
            formula: formula.clone(),
            ops,
            scaling,
        })
    }

    fn real_ops(formula: &Formula) -> HeStatsResult<OpSequence> {
        let mut ops = OpSequence::default();
        match formula {
            Formula::Linear {
                terms,
                post,
                aggregate,
            } => {
                for (i, term) in terms.iter().enumerate() {
                    let field = term.field.name.clone();
                    let factor = real_factor(&effective(&term.coefficient, term.field.scale)?);
                    ops.push(if i == 0 {
                        Step::Load { field, factor }
                    } else {
                        Step::AddScaled { field, factor }
                    });
                }
                if let Some(k) = real_factor(post) {
                    ops.push(Step::Scale(k));
                }
                push_aggregate(&mut ops, *aggregate);
            }
            Formula::Dot { left, right, post } => {
                ops.push(Step::Load {
                    field: left.name.clone(),
                    factor: None,
                });
                ops.push(Step::MulField {
                    field: right.name.clone(),
                });
                let scale = left
                    .scale
                    .checked_mul(right.scale)
                    .ok_or_else(|| too_large("product of field scales"))?;
                if let Some(k) = real_factor(&effective(post, scale)?) {
                    ops.push(Step::Scale(k));
                }
                ops.push(Step::ReduceSum);
            }
        }
        Ok(ops)
    }

    fn integer_ops(formula: &Formula) -> HeStatsResult<(OpSequence, ScalingPlan)> {
        let mut ops = OpSequence::default();
        let post = formula.post();
        let (post_ops_multiplier, post_divisor) = (*post.numer(), *post.denom());

        let (integer_multipliers, divisor, divide_by_count) = match formula {
            Formula::Linear {
                terms, aggregate, ..
            } => {
                let effective = terms
                    .iter()
                    .map(|t| effective(&t.coefficient, t.field.scale))
                    .collect::<HeStatsResult<Vec<_>>>()?;
                let lcm = effective
                    .iter()
                    .try_fold(1i128, |acc, c| {
                        let lcm = acc.lcm(&(*c.denom() as i128));
                        (lcm <= i64::MAX as i128).then_some(lcm)
                    })
                    .ok_or_else(|| too_large("common denominator"))? as i64;
                let multipliers = effective
                    .iter()
                    .map(|c| {
                        c.numer()
                            .checked_mul(lcm / c.denom())
                            .ok_or_else(|| too_large("integer multiplier"))
                    })
                    .collect::<HeStatsResult<Vec<_>>>()?;

                for (i, (term, &m)) in terms.iter().zip(&multipliers).enumerate() {
                    let field = term.field.name.clone();
                    let factor = integer_factor(m);
                    ops.push(if i == 0 {
                        Step::Load { field, factor }
                    } else {
                        Step::AddScaled { field, factor }
                    });
                }
                if let Some(k) = integer_factor(post_ops_multiplier) {
                    ops.push(Step::Scale(k));
                }
                if *aggregate != Aggregate::None {
                    ops.push(Step::ReduceSum);
                }
                (multipliers, lcm, *aggregate == Aggregate::Mean)
            }
            Formula::Dot { left, right, .. } => {
                ops.push(Step::Load {
                    field: left.name.clone(),
                    factor: None,
                });
                ops.push(Step::MulField {
                    field: right.name.clone(),
                });
                if let Some(k) = integer_factor(post_ops_multiplier) {
                    ops.push(Step::Scale(k));
                }
                ops.push(Step::ReduceSum);
                let scale = left
                    .scale
                    .checked_mul(right.scale)
                    .ok_or_else(|| too_large("product of field scales"))?;
                (vec![1, 1], scale, false)
            }
        };

        let final_divisor = divisor
            .checked_mul(post_divisor)
            .ok_or_else(|| too_large("final divisor"))?;
        Ok((
            ops,
            ScalingPlan {
                integer_multipliers,
                post_ops_multiplier,
                final_divisor,
                divide_by_count,
            },
        ))
    }

    /// Check the plan's worst-case magnitude against the plaintext modulus
    ///
    /// `bounds` holds `max|x|` of each field in [`Plan::fields`] order, in
    /// the field's pre-scaled integer units. Returns the worst case.
    pub fn check_overflow(
        &self,
        plan: &Plan,
        bounds: &[u64],
        count: usize,
    ) -> HeStatsResult<BigUint> {
        let worst_case = worst_case_magnitude(plan, bounds, count)?;
        if let Some(t) = self.plaintext_modulus {
            let limit = BigUint::from(t.saturating_sub(1) / 2);
            if worst_case > limit {
                return Err(HeStatsError::OverflowBudget { worst_case, limit });
            }
            info!(%worst_case, %limit, "overflow budget respected");
        }
        Ok(worst_case)
    }
}

/// Largest magnitude the integer evaluation of `plan` can reach
///
/// Linear: `max|field| × Σ|multipliers| × |post| × count` (count only when
/// aggregated). Dot: `max|a| × max|b| × count × |post|`. Zero for plans
/// without integer scaling.
pub fn worst_case_magnitude(plan: &Plan, bounds: &[u64], count: usize) -> HeStatsResult<BigUint> {
    let Some(scaling) = &plan.scaling else {
        return Ok(BigUint::zero());
    };
    if bounds.len() != plan.fields().len() {
        return Err(HeStatsError::validation(format!(
            "{} field bounds given for {} fields",
            bounds.len(),
            plan.fields().len()
        )));
    }
    let post = BigUint::from(scaling.post_ops_multiplier.unsigned_abs());
    let records = BigUint::from(count as u64);
    Ok(match &plan.formula {
        Formula::Linear { aggregate, .. } => {
            let max = BigUint::from(bounds.iter().copied().max().unwrap_or(0));
            let multipliers: BigUint = scaling
                .integer_multipliers
                .iter()
                .map(|m| BigUint::from(m.unsigned_abs()))
                .sum();
            let worst = max * multipliers * post;
            if *aggregate == Aggregate::None {
                worst
            } else {
                worst * records
            }
        }
        Formula::Dot { .. } => {
            BigUint::from(bounds[0]) * BigUint::from(bounds[1]) * records * post
        }
    })
}
