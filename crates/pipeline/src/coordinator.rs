//! Holder → analyzer → holder pipeline
//!
//! Stages of a run, in order:
//!
//! 1. plan every computation and check the overflow budget (exact scheme);
//! 2. generate keys (setup);
//! 3. holder encrypts the workload fields into the `inputs` blob;
//! 4. analyzer evaluates the plans and the first statistics stage into the
//!    `results` blob;
//! 5. holder decrypts and reverses the scaling;
//! 6. for schemes with ciphertext products, the variance round trip
//!    (`variances` blob) and finalization of the statistics.
//!
//! Only blobs and the disclosed mean cross between the roles; the analyzer
//! works on [`KeyHolder::public`].

use crate::data::Dataset;
use crate::report::{
    max_abs_error, Comparison, ComputationResult, RunReport, Stage, StageTimings,
    StatisticsResult, ZScore,
};
use crate::settings::PipelineOptions;
use crate::truth::{formula_truth, PopulationStats};
use crate::workload::{Computation, Workload};
use encoder::{evaluate, FieldRef, FormulaEncoder, Plan};
use framing::{deserialize_blob, serialize_blob, Blob, BlobSchema, BlobTransport};
use num_bigint::BigUint;
use schemes::{KeyHolder, PlainVector};
use shared::utils::{max_abs, scale_to_integers};
use shared::{HeStatsError, HeStatsResult, PrecisionWarning, SchemeConfig, SchemeTag};
use stats::{
    variance_worst_case, Disclosure, StatisticsBundle, StatisticsEngine, StatsOptions,
    VarianceMode,
};
use std::collections::HashMap;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Plaintext of one field as the holder encrypts it
struct FieldInput {
    plain: PlainVector,
    /// `max|x|` in pre-scaled integer units (exact scheme only)
    bound: u64,
}

enum Planned {
    Formula { name: String, plan: Plan },
    Statistics { field: String, options: StatsOptions },
}

impl Planned {
    fn slot(&self) -> String {
        match self {
            Planned::Formula { name, .. } => name.clone(),
            Planned::Statistics { field, .. } => format!("{field}.first"),
        }
    }
}

/// A parametrized run over one scheme variant
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: SchemeConfig,
    options: PipelineOptions,
}

impl Pipeline {
    pub fn new(config: SchemeConfig, options: PipelineOptions) -> HeStatsResult<Self> {
        config.validate()?;
        options.validate()?;
        Ok(Self { config, options })
    }

    pub fn tag(&self) -> SchemeTag {
        self.config.tag()
    }

    pub fn config(&self) -> &SchemeConfig {
        &self.config
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    fn encoder(&self) -> FormulaEncoder {
        match &self.config {
            SchemeConfig::Approx(_) => FormulaEncoder::approx(),
            SchemeConfig::Exact(c) => FormulaEncoder::exact(c.plaintext_modulus),
            SchemeConfig::Additive(_) => FormulaEncoder::additive(),
        }
    }

    /// Blob name of `stage`, distinct per scheme so runs can share a transport
    fn stage(&self, stage: &str) -> String {
        format!("{}-{stage}", self.tag())
    }

    fn prepare_inputs(
        &self,
        workload: Workload,
        data: &Dataset,
    ) -> HeStatsResult<HashMap<String, FieldInput>> {
        let tag = self.tag();
        let mut inputs = HashMap::new();
        for &name in workload.fields() {
            let column = data.column(name)?;
            let input = match tag {
                SchemeTag::Exact => {
                    let ints = scale_to_integers(column, self.options.field_scale(tag, name))?;
                    FieldInput {
                        bound: max_abs(&ints),
                        plain: PlainVector::Integer(ints),
                    }
                }
                SchemeTag::Approx | SchemeTag::Additive => FieldInput {
                    plain: PlainVector::Real(column.to_vec()),
                    bound: 0,
                },
            };
            inputs.insert(name.to_string(), input);
        }
        Ok(inputs)
    }

    fn plan(
        &self,
        workload: Workload,
        inputs: &HashMap<String, FieldInput>,
        count: usize,
    ) -> HeStatsResult<Vec<Planned>> {
        let tag = self.tag();
        let encoder = self.encoder();
        let field = |name: &str| FieldRef::new(name, self.options.field_scale(tag, name));
        let bound = |name: &str| inputs.get(name).map(|i| i.bound).unwrap_or(0);

        let mut planned = Vec::new();
        for computation in workload.computations(&field) {
            match computation {
                Computation::Formula { name, formula } => {
                    let plan = encoder.plan(&formula)?;
                    if tag == SchemeTag::Exact {
                        let bounds: Vec<u64> = plan.fields().iter().map(|f| bound(&f.name)).collect();
                        encoder.check_overflow(&plan, &bounds, count)?;
                    }
                    debug!(%name, ops = %plan.ops, "planned");
                    planned.push(Planned::Formula { name, plan });
                }
                Computation::Statistics { field } => {
                    let options = StatsOptions {
                        mode: self.options.variance_mode,
                        scale: self.options.field_scale(tag, &field),
                        value_bound: (tag == SchemeTag::Exact).then(|| bound(&field)),
                    };
                    self.check_variance_budget(&options, count)?;
                    planned.push(Planned::Statistics { field, options });
                }
            }
        }
        Ok(planned)
    }

    fn check_variance_budget(&self, options: &StatsOptions, count: usize) -> HeStatsResult<()> {
        let (SchemeConfig::Exact(exact), Some(max)) = (&self.config, options.value_bound) else {
            return Ok(());
        };
        let worst_case = variance_worst_case(options.mode, count, max);
        let limit = BigUint::from((exact.plaintext_modulus - 1) / 2);
        if worst_case > limit {
            return Err(HeStatsError::OverflowBudget { worst_case, limit });
        }
        Ok(())
    }

    /// Run `workload` over `data`, moving blobs through `transport`
    pub fn run(
        &self,
        workload: Workload,
        data: &Dataset,
        transport: &mut dyn BlobTransport,
    ) -> HeStatsResult<RunReport> {
        let tag = self.tag();
        let layout = self.options.layout;
        let count = data.len();
        if !workload.supports(tag) {
            return Err(HeStatsError::unsupported(workload.name(), tag.name()));
        }
        if count == 0 {
            return Err(HeStatsError::validation("dataset has no records"));
        }
        if count > self.config.vector_capacity() {
            return Err(HeStatsError::encoding(format!(
                "{count} records exceed the vector capacity of {}",
                self.config.vector_capacity()
            )));
        }
        info!(scheme = %tag, %workload, records = count, %layout, transport = transport.name(), "pipeline run");
        let bytes_before = transport.bytes_sent();
        let mut timings = StageTimings::default();

        let inputs = self.prepare_inputs(workload, data)?;
        let planned = self.plan(workload, &inputs, count)?;

        // setup
        let start = Instant::now();
        let holder = schemes::generate(&self.config, self.options.seed)?;
        let scheme = holder.public();
        timings.record(Stage::Setup, start.elapsed());
        info!(scheme = %tag, "keys generated");

        // holder: encrypt
        let start = Instant::now();
        let mut blob = Blob::new();
        for &name in workload.fields() {
            let input = inputs
                .get(name)
                .ok_or_else(|| HeStatsError::protocol(format!("no input prepared for {name}")))?;
            blob.push(name, holder.encrypt(&input.plain)?);
        }
        transport.send(&self.stage("inputs"), serialize_blob(&blob, layout)?)?;
        timings.record(Stage::Encrypt, start.elapsed());
        info!(fields = blob.len(), "inputs encrypted");

        // analyzer: evaluate
        let start = Instant::now();
        let bytes = transport.receive(&self.stage("inputs"))?;
        let schema = BlobSchema::uniform(workload.fields().iter().copied(), tag);
        let received = deserialize_blob(&bytes, &schema, layout)?;
        let mut results = Blob::new();
        let mut engines = Vec::new();
        for p in &planned {
            match p {
                Planned::Formula { name, plan } => {
                    results.push(name.clone(), evaluate(plan, scheme.as_ref(), &received)?);
                }
                Planned::Statistics { field, options } => {
                    let values = received.require(field)?.clone();
                    let mut engine = StatisticsEngine::new(scheme.clone(), field, values, *options)?;
                    results.push(p.slot(), engine.compute_sum()?);
                    engines.push(engine);
                }
            }
        }
        transport.send(&self.stage("results"), serialize_blob(&results, layout)?)?;
        timings.record(Stage::Process, start.elapsed());
        info!(results = results.len(), "analysis complete");

        // holder: decrypt
        let start = Instant::now();
        let bytes = transport.receive(&self.stage("results"))?;
        let schema = BlobSchema::uniform(planned.iter().map(Planned::slot), tag);
        let decrypted_blob = deserialize_blob(&bytes, &schema, layout)?;
        let tolerance = self.options.tolerance_for(&self.config);
        let mut warnings = Vec::new();
        let mut computations = Vec::new();
        let mut first_stages = Vec::new();
        for p in &planned {
            let ct = decrypted_blob.require(&p.slot())?;
            let raw = holder.decrypt(ct)?.to_f64();
            match p {
                Planned::Formula { name, plan } => {
                    let values = plan.decode_all(&raw, count);
                    let ground_truth = formula_truth(&plan.formula, data)?;
                    let magnitude = values.iter().fold(0.0_f64, |m, v| m.max(v.abs()));
                    let estimated_error = scheme.estimated_error(ct, magnitude);
                    check_precision(name, estimated_error, tolerance, &mut warnings);
                    computations.push(ComputationResult {
                        name: name.clone(),
                        formula: plan.formula.to_string(),
                        ops: plan.ops.to_string(),
                        abs_error: max_abs_error(&values, &ground_truth),
                        values,
                        ground_truth,
                        estimated_error,
                    });
                }
                Planned::Statistics { field, .. } => {
                    let first = raw
                        .first()
                        .copied()
                        .ok_or_else(|| HeStatsError::backend("decryption produced no values"))?;
                    let estimated_error = scheme.estimated_error(ct, first);
                    check_precision(&format!("{field}_mean"), estimated_error, tolerance, &mut warnings);
                    first_stages.push(first);
                }
            }
        }
        timings.record(Stage::Decrypt, start.elapsed());

        let bundles = self.finish_statistics(
            holder.as_ref(),
            &mut engines,
            &first_stages,
            transport,
            &mut timings,
        )?;

        let mut statistics = Vec::new();
        let mut z_scores = Vec::new();
        for bundle in bundles {
            let column = data.column(&bundle.field)?;
            let value = column[0];
            z_scores.push(ZScore {
                field: bundle.field.clone(),
                value,
                z: bundle.z_score(value),
            });
            statistics.push(StatisticsResult::new(bundle, PopulationStats::of(column)?));
        }

        let report = RunReport {
            scheme: tag,
            workload: workload.name().to_string(),
            records: count,
            layout: layout.name().to_string(),
            variance_mode: self.options.variance_mode,
            results: computations,
            statistics,
            z_scores,
            warnings,
            timings,
            bytes_transferred: transport.bytes_sent() - bytes_before,
            created_at: chrono::Utc::now(),
        };
        info!(
            scheme = %tag,
            total = report.timings.total,
            bytes = report.bytes_transferred,
            "pipeline run complete"
        );
        Ok(report)
    }

    /// Disclosure, variance round trip and finalization
    fn finish_statistics(
        &self,
        holder: &dyn KeyHolder,
        engines: &mut [StatisticsEngine],
        first_stages: &[f64],
        transport: &mut dyn BlobTransport,
        timings: &mut StageTimings,
    ) -> HeStatsResult<Vec<StatisticsBundle>> {
        if engines.is_empty() {
            return Ok(Vec::new());
        }
        if !schemes::supports_products(self.tag()) {
            return engines
                .iter_mut()
                .zip(first_stages)
                .map(|(engine, &first)| engine.finalize_without_variance(first))
                .collect();
        }
        let layout = self.options.layout;

        // analyzer: disclosed means and variances
        let start = Instant::now();
        let mut variances = Blob::new();
        for (engine, &first) in engines.iter_mut().zip(first_stages) {
            if self.options.variance_mode == VarianceMode::DisclosedMean {
                engine.disclose_mean(Disclosure { value: first })?;
            }
            variances.push(format!("{}.variance", engine.field()), engine.compute_variance()?);
        }
        transport.send(&self.stage("variances"), serialize_blob(&variances, layout)?)?;
        timings.record(Stage::Process, start.elapsed());

        // holder: decrypt and finalize
        let start = Instant::now();
        let bytes = transport.receive(&self.stage("variances"))?;
        let received = deserialize_blob(&bytes, &variances.schema(), layout)?;
        let mut bundles = Vec::with_capacity(engines.len());
        for (engine, &first) in engines.iter_mut().zip(first_stages) {
            let ct = received.require(&format!("{}.variance", engine.field()))?;
            let variance = holder.decrypt_scalar(ct)?;
            bundles.push(engine.finalize(first, variance)?);
        }
        timings.record(Stage::Decrypt, start.elapsed());
        Ok(bundles)
    }
}

fn check_precision(
    computation: &str,
    estimated_error: Option<f64>,
    tolerance: f64,
    warnings: &mut Vec<PrecisionWarning>,
) {
    let Some(estimated_error) = estimated_error else {
        return;
    };
    if estimated_error > tolerance {
        let warning = PrecisionWarning {
            computation: computation.to_string(),
            estimated_error,
            tolerance,
        };
        warn!(%warning, "precision warning");
        warnings.push(warning);
    }
}

/// Run `workload` under the approximate and the exact scheme
pub fn compare(
    approx: SchemeConfig,
    exact: SchemeConfig,
    options: &PipelineOptions,
    workload: Workload,
    data: &Dataset,
    transport: &mut dyn BlobTransport,
) -> HeStatsResult<Comparison> {
    if approx.tag() != SchemeTag::Approx || exact.tag() != SchemeTag::Exact {
        return Err(HeStatsError::validation(
            "compare takes an approximate and an exact configuration",
        ));
    }
    let approx = Pipeline::new(approx, options.clone())?.run(workload, data, transport)?;
    let exact = Pipeline::new(exact, options.clone())?.run(workload, data, transport)?;
    let comparison = Comparison::new(approx, exact);
    info!(speedup = comparison.speedup, "comparison complete");
    Ok(comparison)
}

#[cfg(test)]
mod tests {
    use super::*;
    use framing::MemoryTransport;
    use shared::{ExactConfig, Preset};

    fn exact_with_modulus(plaintext_modulus: u64) -> SchemeConfig {
        SchemeConfig::Exact(ExactConfig {
            plaintext_modulus,
            ..ExactConfig::preset(Preset::Test)
        })
    }

    #[test]
    fn test_overflow_rejected_before_encryption() {
        let pipeline = Pipeline::new(exact_with_modulus(12_289), PipelineOptions::default()).unwrap();
        let mut transport = MemoryTransport::new();
        let err = pipeline
            .run(Workload::Addition, &Dataset::demo(), &mut transport)
            .unwrap_err();
        assert!(matches!(err, HeStatsError::OverflowBudget { .. }));
        assert_eq!(transport.bytes_sent(), 0);
    }

    #[test]
    fn test_variance_budget_rejected_before_encryption() {
        // 4·N³·max² for five salaries in cents fits the default modulus only
        let options = StatsOptions {
            mode: VarianceMode::DisclosedMean,
            scale: 100,
            value_bound: Some(450_000),
        };
        let pipeline = Pipeline::new(exact_with_modulus(12_289), PipelineOptions::default()).unwrap();
        assert!(pipeline.check_variance_budget(&options, 5).is_err());

        let pipeline = Pipeline::new(
            SchemeConfig::preset(SchemeTag::Exact, Preset::Test),
            PipelineOptions::default(),
        )
        .unwrap();
        assert!(pipeline.check_variance_budget(&options, 5).is_ok());
    }

    #[test]
    fn test_unsupported_and_oversized() {
        let additive = Pipeline::new(
            SchemeConfig::preset(SchemeTag::Additive, Preset::Test),
            PipelineOptions::default(),
        )
        .unwrap();
        let err = additive
            .run(Workload::Dot, &Dataset::demo(), &mut MemoryTransport::new())
            .unwrap_err();
        assert!(matches!(err, HeStatsError::UnsupportedOperation { .. }));

        let approx = Pipeline::new(
            SchemeConfig::preset(SchemeTag::Approx, Preset::Test),
            PipelineOptions::default(),
        )
        .unwrap();
        let err = approx
            .run(Workload::Average, &Dataset::synthetic(17, 1), &mut MemoryTransport::new())
            .unwrap_err();
        assert!(matches!(err, HeStatsError::Encoding { .. }));
    }

    #[test]
    fn test_compare_requires_both_variants() {
        let approx = SchemeConfig::preset(SchemeTag::Approx, Preset::Test);
        let err = compare(
            approx.clone(),
            approx,
            &PipelineOptions::default(),
            Workload::Average,
            &Dataset::demo(),
            &mut MemoryTransport::new(),
        )
        .unwrap_err();
        assert!(matches!(err, HeStatsError::Validation { .. }));
    }
}
