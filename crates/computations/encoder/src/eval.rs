//! Evaluation of an operation sequence on the analyzer side

use crate::plan::{Plan, Step};
use framing::Blob;
use schemes::{EncryptedVector, HomomorphicScheme, Scalar};
use shared::{HeStatsError, HeStatsResult};
use tracing::{debug, info};

fn scaled(
    scheme: &dyn HomomorphicScheme,
    v: &EncryptedVector,
    factor: Option<Scalar>,
) -> HeStatsResult<EncryptedVector> {
    match factor {
        Some(k) => scheme.scalar_mul(v, k),
        None => Ok(v.clone()),
    }
}

/// Run `plan` over the input vectors of `inputs`
pub fn evaluate(
    plan: &Plan,
    scheme: &dyn HomomorphicScheme,
    inputs: &Blob,
) -> HeStatsResult<EncryptedVector> {
    if plan.tag != scheme.tag() {
        return Err(HeStatsError::mismatch(format!(
            "plan for the {} scheme evaluated with the {} scheme",
            plan.tag,
            scheme.tag()
        )));
    }
    let required = plan.ops.multiplicative_depth();
    if required > scheme.depth_budget() {
        return Err(HeStatsError::depth("formula", required, scheme.depth_budget()));
    }

    let mut acc: Option<EncryptedVector> = None;
    let mut count = 0;
    for step in plan.ops.steps() {
        debug!(%step, "applying step");
        let next = match (step, acc.as_ref()) {
            (Step::Load { field, factor }, None) => {
                let v = inputs.require(field)?;
                count = v.length;
                scaled(scheme, v, *factor)?
            }
            (Step::AddScaled { field, factor }, Some(a)) => {
                let term = scaled(scheme, inputs.require(field)?, *factor)?;
                scheme.add(a, &term)?
            }
            (Step::MulField { field }, Some(a)) => scheme.elementwise_mul(a, inputs.require(field)?)?,
            (Step::Scale(k), Some(a)) => scheme.scalar_mul(a, *k)?,
            (Step::ReduceSum, Some(a)) => scheme.reduce_sum(a)?,
            (Step::Average, Some(a)) => scheme.scalar_mul(a, Scalar::Real(1.0 / count as f64))?,
            (step, _) => {
                return Err(HeStatsError::protocol(format!(
                    "step '{step}' is out of place in the operation sequence"
                )))
            }
        };
        acc = Some(next);
    }
    let result = acc.ok_or_else(|| HeStatsError::protocol("empty operation sequence"))?;
    info!(
        formula = %plan.formula,
        tag = %plan.tag,
        steps = plan.ops.len(),
        depth = result.depth,
        "formula evaluated"
    );
    Ok(result)
}
