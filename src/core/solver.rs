use tracing::warn;

use super::tariff::{DerivedTariff, TariffParameters};
use super::types::SyntheticPoint;

/// Search schedule for the per-bracket deduction offset.
///
/// The expansion stage starts at `initial_upper` and multiplies by `growth`
/// until the bracket's tax drops to the target or `max_expansions` is reached.
/// With the defaults the largest reachable offset is about 500 000 × 1.5^40.
/// Bisection then runs a fixed number of steps, with no tolerance exit.
#[derive(Debug, Clone, Copy)]
pub struct CalibrationConfig {
    pub initial_upper: f64,
    pub growth: f64,
    pub max_expansions: u32,
    pub bisection_iterations: u32,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            initial_upper: 500_000.0,
            growth: 1.5,
            max_expansions: 40,
            bisection_iterations: 60,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationOutcome {
    pub offset: f64,
    pub target_tax: f64,
    pub fitted_tax: f64,
    pub expansions: u32,
    /// False when even a zero offset yields less tax than the target.
    pub reachable: bool,
    /// False when the expansion stage ran out before `f(upper) <= target`.
    pub bracketed: bool,
}

/// Weighted tax of a bracket's points after subtracting `offset` from each
/// income. Non-increasing in `offset`.
pub fn bracket_tax_given_offset(
    points: &[SyntheticPoint],
    offset: f64,
    tariff: &DerivedTariff,
) -> f64 {
    points
        .iter()
        .map(|p| tariff.tax((p.income - offset).max(0.0)).max(0.0) * p.weight)
        .sum()
}

/// Offset `k` such that the bracket's points, taxed at `income - k` under
/// `reference`, add up to `target_tax`.
pub fn solve_offset(
    points: &[SyntheticPoint],
    target_tax: f64,
    reference: &TariffParameters,
) -> f64 {
    solve_offset_with(
        points,
        target_tax,
        &reference.derive(),
        &CalibrationConfig::default(),
    )
    .offset
}

pub fn solve_offset_with(
    points: &[SyntheticPoint],
    target_tax: f64,
    tariff: &DerivedTariff,
    config: &CalibrationConfig,
) -> CalibrationOutcome {
    let objective = |k: f64| bracket_tax_given_offset(points, k, tariff);

    let mut lo = 0.0;
    let mut hi = config.initial_upper;
    let mut expansions = 0;
    let mut bracketed = false;
    while expansions < config.max_expansions {
        if objective(hi) <= target_tax {
            bracketed = true;
            break;
        }
        hi *= config.growth;
        expansions += 1;
    }

    let search_upper = hi;

    for _ in 0..config.bisection_iterations {
        let mid = 0.5 * (lo + hi);
        if objective(mid) > target_tax {
            lo = mid;
        } else {
            hi = mid;
        }
    }

    let offset = 0.5 * (lo + hi);
    let tax_at_zero_offset = objective(0.0);
    let reachable = tax_at_zero_offset >= target_tax;
    let outcome = CalibrationOutcome {
        offset,
        target_tax,
        fitted_tax: objective(offset),
        expansions,
        reachable,
        bracketed,
    };

    if !reachable {
        warn!(
            target_tax,
            tax_at_zero_offset,
            "calibration target exceeds tax at zero offset; offset collapses to 0"
        );
    }
    if !bracketed {
        warn!(
            target_tax,
            search_upper,
            "calibration search range exhausted; offset is approximate"
        );
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::brackets::reference_brackets;
    use crate::core::population::{PopulationConfig, SyntheticPopulation};
    use proptest::prelude::{prop_assert, proptest};

    fn assert_rel_close(actual: f64, expected: f64, rel: f64) {
        assert!(
            ((actual - expected) / expected).abs() <= rel,
            "expected {expected}, got {actual}, relative tolerance {rel}"
        );
    }

    fn uniform_points(lower: f64, upper: f64, n: usize, weight: f64) -> Vec<SyntheticPoint> {
        (0..n)
            .map(|i| SyntheticPoint {
                income: lower + (upper - lower) * (i as f64 + 0.5) / n as f64,
                weight,
                bracket_index: 0,
            })
            .collect()
    }

    #[test]
    fn solved_offset_reproduces_bracket_tax() {
        let brackets = reference_brackets();
        let population = SyntheticPopulation::generate(&brackets, &PopulationConfig::default());
        let tariff = TariffParameters::reference().derive();

        for index in [6, 12, 16] {
            let outcome = solve_offset_with(
                population.bracket(index),
                brackets[index].total_tax,
                &tariff,
                &CalibrationConfig::default(),
            );
            assert!(outcome.reachable);
            assert!(outcome.bracketed);
            assert!(outcome.offset > 0.0);
            assert_rel_close(outcome.fitted_tax, brackets[index].total_tax, 1e-4);
        }
    }

    #[test]
    fn single_point_offset_matches_closed_form() {
        // One taxpayer at 100 000 in the flat 42 % zone owing 30 000.
        let points = uniform_points(100_000.0, 100_000.0, 1, 1.0);
        let reference = TariffParameters::reference();
        let k = solve_offset(&points, 30_000.0, &reference);
        let base = 100_000.0 - k;
        let d = reference.derive();
        assert!((d.tax(base) - 30_000.0).abs() <= 1.0);
        assert!((base - (30_000.0 + d.zone4_sub) / 0.42).abs() < 3.0);
    }

    #[test]
    fn unreachable_target_collapses_to_zero_offset() {
        // Everyone below the zero-rate threshold can never pay the target.
        let points = uniform_points(0.0, 5_000.0, 50, 10.0);
        let outcome = solve_offset_with(
            &points,
            1_000.0,
            &TariffParameters::reference().derive(),
            &CalibrationConfig::default(),
        );
        assert!(!outcome.reachable);
        assert!(outcome.offset.abs() < 1e-9);
        assert_eq!(outcome.fitted_tax, 0.0);
    }

    #[test]
    fn exhausted_expansion_is_reported_not_raised() {
        let points = uniform_points(1_000_000.0, 2_000_000.0, 20, 1.0);
        let config = CalibrationConfig {
            initial_upper: 1_000.0,
            max_expansions: 2,
            ..CalibrationConfig::default()
        };
        let outcome = solve_offset_with(
            &points,
            0.0,
            &TariffParameters::reference().derive(),
            &config,
        );
        assert!(!outcome.bracketed);
        assert_eq!(outcome.expansions, 2);
        assert!(outcome.offset.is_finite());
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(32))]

        #[test]
        fn prop_bracket_tax_is_non_increasing_in_offset(
            lower in 0u32..200_000,
            width in 1_000u32..100_000,
            k in 0u32..300_000,
            dk in 1u32..50_000
        ) {
            let points = uniform_points(lower as f64, (lower + width) as f64, 40, 3.0);
            let tariff = TariffParameters::reference().derive();
            let at_k = bracket_tax_given_offset(&points, k as f64, &tariff);
            let further = bracket_tax_given_offset(&points, (k + dk) as f64, &tariff);
            prop_assert!(further <= at_k);
            prop_assert!(further >= 0.0);
        }
    }
}
