//! Statistics engine
//!
//! Mean, variance, standard deviation and z-scores of an encrypted field.
//! [`StatisticsEngine`] is the analyzer-side state machine; [`run_statistics`]
//! drives it end to end with an in-process key holder.

pub mod bundle;
pub mod engine;

pub use bundle::{z_score, StatisticsBundle};
pub use engine::{
    variance_worst_case, Disclosure, StatisticsEngine, StatsOptions, StatsState, VarianceMode,
};

use schemes::{EncryptedVector, KeyHolder};
use shared::HeStatsResult;

/// Run the whole protocol over one encrypted field
///
/// Schemes without ciphertext products stop after the mean and report no
/// variance.
pub fn run_statistics(
    holder: &dyn KeyHolder,
    field: &str,
    values: &EncryptedVector,
    options: StatsOptions,
) -> HeStatsResult<StatisticsBundle> {
    let scheme = holder.public();
    let products = schemes::supports_products(scheme.tag());
    let mut engine = StatisticsEngine::new(scheme, field, values.clone(), options)?;

    let first = engine.compute_sum()?;
    let first_value = holder.decrypt_scalar(&first)?;
    if !products {
        return engine.finalize_without_variance(first_value);
    }
    if options.mode == VarianceMode::DisclosedMean {
        engine.disclose_mean(Disclosure { value: first_value })?;
    }
    let variance = engine.compute_variance()?;
    let decrypted = holder.decrypt_scalar(&variance)?;
    engine.finalize(first_value, decrypted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use schemes::{
        AdditiveKeyHolder, ApproxKeyHolder, ExactKeyHolder, HomomorphicScheme, PlainVector,
    };
    use shared::{AdditiveConfig, ApproxConfig, ExactConfig, HeStatsError, Preset, SchemeTag};
    use std::sync::Arc;

    const SALARIES: [f64; 5] = [1200.50, 2500.00, 1800.75, 3200.10, 4500.00];
    const SALARY_CENTS: [i64; 5] = [120_050, 250_000, 180_075, 320_010, 450_000];

    fn plain_variance(values: &[f64]) -> f64 {
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        values.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n
    }

    fn approx() -> ApproxKeyHolder {
        ApproxKeyHolder::generate(&ApproxConfig::preset(Preset::Test), Some(21)).unwrap()
    }

    fn exact() -> ExactKeyHolder {
        ExactKeyHolder::generate(&ExactConfig::preset(Preset::Test), Some(21)).unwrap()
    }

    fn cents_options(mode: VarianceMode) -> StatsOptions {
        StatsOptions {
            mode,
            scale: 100,
            value_bound: Some(450_000),
        }
    }

    fn assert_relative(got: f64, want: f64, tol: f64) {
        assert!(
            ((got - want) / want).abs() < tol,
            "got {got}, want {want}"
        );
    }

    #[test]
    fn test_approx_disclosed_mean() {
        let holder = approx();
        let values = holder.encrypt(&PlainVector::Real(SALARIES.to_vec())).unwrap();
        let bundle = run_statistics(&holder, "salary", &values, StatsOptions::default()).unwrap();
        assert_eq!(bundle.count, 5);
        assert!((bundle.mean - 2640.27).abs() < 1e-2);
        assert!((bundle.disclosed_mean.unwrap() - bundle.mean).abs() < 1e-9);
        assert_relative(bundle.variance.unwrap(), plain_variance(&SALARIES), 1e-4);
        assert_relative(bundle.std_dev.unwrap(), plain_variance(&SALARIES).sqrt(), 1e-4);
    }

    #[test]
    fn test_approx_fully_encrypted() {
        let holder = approx();
        let values = holder.encrypt(&PlainVector::Real(SALARIES.to_vec())).unwrap();
        let options = StatsOptions {
            mode: VarianceMode::FullyEncrypted,
            ..StatsOptions::default()
        };
        let bundle = run_statistics(&holder, "salary", &values, options).unwrap();
        assert!(bundle.disclosed_mean.is_none());
        assert_relative(bundle.variance.unwrap(), plain_variance(&SALARIES), 1e-3);
    }

    #[test]
    fn test_exact_variance_both_modes() {
        let holder = exact();
        let values = holder.encrypt(&PlainVector::Integer(SALARY_CENTS.to_vec())).unwrap();
        for mode in [VarianceMode::DisclosedMean, VarianceMode::FullyEncrypted] {
            let bundle = run_statistics(&holder, "salary", &values, cents_options(mode)).unwrap();
            assert_eq!(bundle.mean, 2640.27);
            assert_relative(bundle.variance.unwrap(), plain_variance(&SALARIES), 1e-9);
        }
    }

    #[test]
    fn test_disclosed_mean_matches_independent_sum() {
        let holder = exact();
        let scheme = holder.public();
        let values = holder.encrypt(&PlainVector::Integer(SALARY_CENTS.to_vec())).unwrap();

        let mut engine = StatisticsEngine::new(
            scheme.clone(),
            "salary",
            values.clone(),
            cents_options(VarianceMode::DisclosedMean),
        )
        .unwrap();
        let first = engine.compute_sum().unwrap();
        let disclosed = holder.decrypt_scalar(&first).unwrap();
        engine.disclose_mean(Disclosure { value: disclosed }).unwrap();
        assert_eq!(engine.state(), StatsState::MeanDisclosed);

        let independent = holder.decrypt_scalar(&scheme.reduce_sum(&values).unwrap()).unwrap();
        assert_eq!(disclosed, independent);

        let variance = engine.compute_variance().unwrap();
        let bundle = engine
            .finalize(disclosed, holder.decrypt_scalar(&variance).unwrap())
            .unwrap();
        assert_eq!(bundle.disclosed_mean, Some(independent / 500.0));
        assert_eq!(engine.state(), StatsState::Finalized);
    }

    #[test]
    fn test_additive_has_no_variance() {
        let holder =
            AdditiveKeyHolder::generate(&AdditiveConfig::preset(Preset::Test), Some(21)).unwrap();
        let values = holder.encrypt(&PlainVector::Real(SALARIES.to_vec())).unwrap();
        let bundle = run_statistics(&holder, "salary", &values, StatsOptions::default()).unwrap();
        assert_eq!(bundle.scheme, SchemeTag::Additive);
        assert!((bundle.mean - 2640.27).abs() < 1e-9);
        assert!(bundle.variance.is_none());
        assert!(bundle.disclosed_mean.is_none());

        let mut engine =
            StatisticsEngine::new(holder.public(), "salary", values, StatsOptions::default())
                .unwrap();
        engine.compute_sum().unwrap();
        engine.disclose_mean(Disclosure { value: 13_201.35 }).unwrap();
        assert!(matches!(
            engine.compute_variance(),
            Err(HeStatsError::UnsupportedOperation { .. })
        ));
    }

    #[test]
    fn test_protocol_order_enforced() {
        let holder = exact();
        let values = holder.encrypt(&PlainVector::Integer(vec![1, 2, 3])).unwrap();
        let mut engine = StatisticsEngine::new(
            holder.public(),
            "x",
            values,
            StatsOptions {
                value_bound: Some(3),
                ..StatsOptions::default()
            },
        )
        .unwrap();
        assert!(matches!(
            engine.compute_variance(),
            Err(HeStatsError::Protocol { .. })
        ));
        assert!(matches!(
            engine.disclose_mean(Disclosure { value: 6.0 }),
            Err(HeStatsError::Protocol { .. })
        ));
        engine.compute_sum().unwrap();
        assert!(matches!(engine.compute_sum(), Err(HeStatsError::Protocol { .. })));
        assert!(matches!(
            engine.finalize(6.0, 0.0),
            Err(HeStatsError::Protocol { .. })
        ));
    }

    #[test]
    fn test_exact_variance_overflow_guard() {
        let holder = exact();
        let scheme: Arc<dyn HomomorphicScheme> = holder.public();
        let values = holder.encrypt(&PlainVector::Integer(vec![1, 2, 3])).unwrap();

        let mut unbounded = StatisticsEngine::new(
            scheme.clone(),
            "x",
            values.clone(),
            StatsOptions::default(),
        )
        .unwrap();
        unbounded.compute_sum().unwrap();
        unbounded.disclose_mean(Disclosure { value: 6.0 }).unwrap();
        assert!(matches!(
            unbounded.compute_variance(),
            Err(HeStatsError::Validation { .. })
        ));

        let mut huge = StatisticsEngine::new(
            scheme,
            "x",
            values,
            StatsOptions {
                value_bound: Some(1 << 40),
                ..StatsOptions::default()
            },
        )
        .unwrap();
        huge.compute_sum().unwrap();
        huge.disclose_mean(Disclosure { value: 6.0 }).unwrap();
        assert!(matches!(
            huge.compute_variance(),
            Err(HeStatsError::OverflowBudget { .. })
        ));
    }

    #[test]
    fn test_variance_worst_case() {
        assert_eq!(
            variance_worst_case(VarianceMode::DisclosedMean, 5, 10),
            num_bigint::BigUint::from(50_000u32)
        );
        assert_eq!(
            variance_worst_case(VarianceMode::FullyEncrypted, 5, 10),
            num_bigint::BigUint::from(5_000u32)
        );
    }

    #[test]
    fn test_mode_from_str() {
        assert_eq!(
            "disclosed".parse::<VarianceMode>().unwrap(),
            VarianceMode::DisclosedMean
        );
        assert_eq!(
            "fully-encrypted".parse::<VarianceMode>().unwrap(),
            VarianceMode::FullyEncrypted
        );
        assert!("sometimes".parse::<VarianceMode>().is_err());
    }
}
