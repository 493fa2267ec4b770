use tracing::{debug, info};

use super::brackets::{BracketError, reference_brackets, validate_brackets};
use super::groups::{display_groups, summary_groups};
use super::histogram::{DISPLAY_MAX, HISTOGRAM_BINS, build_histogram};
use super::population::{PopulationConfig, SyntheticPopulation};
use super::solver::{CalibrationConfig, CalibrationOutcome, solve_offset_with};
use super::tariff::{DerivedTariff, TariffParameters};
use super::types::{
    BracketCalibration, BracketStat, Comparison, GroupResult, HistogramBin, IncomeGroup,
    PopulationSummary, RepresentativeDelta, SimulationResult,
};

/// Weighted tax owed by every synthetic point under one tariff, in the
/// population's point order.
#[derive(Debug, Clone, PartialEq)]
pub struct PointTaxes {
    taxes: Vec<f64>,
    total: f64,
}

impl PointTaxes {
    pub fn total(&self) -> f64 {
        self.total
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.taxes
    }
}

/// Everything that depends only on the bracket table and the reference
/// tariff: the synthetic population, its calibrated offsets, the grouping
/// schemes and the baseline run. Immutable once built.
#[derive(Debug, Clone)]
pub struct SimulationContext {
    brackets: Vec<BracketStat>,
    population: SyntheticPopulation,
    reference: DerivedTariff,
    calibration: Vec<CalibrationOutcome>,
    display_groups: Vec<IncomeGroup>,
    summary_groups: Vec<IncomeGroup>,
    baseline: SimulationResult,
    histogram: Vec<HistogramBin>,
}

impl SimulationContext {
    pub fn new(
        brackets: Vec<BracketStat>,
        reference: TariffParameters,
    ) -> Result<Self, BracketError> {
        validate_brackets(&brackets)?;

        let population = SyntheticPopulation::generate(&brackets, &PopulationConfig::default());
        info!(
            brackets = brackets.len(),
            points = population.len(),
            "generated synthetic population"
        );

        let reference = reference.derive();
        let config = CalibrationConfig::default();
        let calibration: Vec<CalibrationOutcome> = brackets
            .iter()
            .zip(population.by_bracket())
            .enumerate()
            .map(|(index, (bracket, points))| {
                let outcome = solve_offset_with(points, bracket.total_tax, &reference, &config);
                debug!(
                    bracket = index,
                    offset = outcome.offset,
                    reported_tax = bracket.total_tax,
                    fitted_tax = outcome.fitted_tax,
                    "calibrated bracket"
                );
                outcome
            })
            .collect();

        let histogram = build_histogram(population.points(), DISPLAY_MAX, HISTOGRAM_BINS);

        let mut context = Self {
            brackets,
            population,
            reference,
            calibration,
            display_groups: display_groups(),
            summary_groups: summary_groups(),
            baseline: SimulationResult {
                total_tax: 0.0,
                display_groups: Vec::new(),
                summary_groups: Vec::new(),
            },
            histogram,
        };
        context.baseline = context.simulate(context.reference.params());

        let reported: f64 = context.brackets.iter().map(|b| b.total_tax).sum();
        info!(
            reported_total_tax = reported,
            baseline_total_tax = context.baseline.total_tax,
            "calibration complete"
        );
        Ok(context)
    }

    /// Built-in 2021 bracket table with the 2021 tariff as reference.
    pub fn reference() -> Result<Self, BracketError> {
        Self::new(reference_brackets(), TariffParameters::reference())
    }

    /// Swaps both grouping schemes and recomputes the baseline for them.
    pub fn with_groupings(mut self, display: Vec<IncomeGroup>, summary: Vec<IncomeGroup>) -> Self {
        self.display_groups = display;
        self.summary_groups = summary;
        self.baseline = self.simulate(self.reference.params());
        self
    }

    pub fn brackets(&self) -> &[BracketStat] {
        &self.brackets
    }

    pub fn population(&self) -> &SyntheticPopulation {
        &self.population
    }

    pub fn reference_params(&self) -> &TariffParameters {
        self.reference.params()
    }

    pub fn reference_tariff(&self) -> &DerivedTariff {
        &self.reference
    }

    pub fn offsets(&self) -> Vec<f64> {
        self.calibration.iter().map(|c| c.offset).collect()
    }

    pub fn baseline(&self) -> &SimulationResult {
        &self.baseline
    }

    pub fn histogram(&self) -> &[HistogramBin] {
        &self.histogram
    }

    pub fn display_groups(&self) -> &[IncomeGroup] {
        &self.display_groups
    }

    pub fn summary_groups(&self) -> &[IncomeGroup] {
        &self.summary_groups
    }

    fn offset_for_bracket(&self, index: usize) -> f64 {
        self.calibration.get(index).map_or(0.0, |c| c.offset)
    }

    /// Taxes every point at `income - offset` of its bracket. The offsets
    /// stay fixed at their reference calibration for any tariff.
    pub fn evaluate(&self, params: &TariffParameters) -> PointTaxes {
        let tariff = params.derive();
        let taxes: Vec<f64> = self
            .population
            .points()
            .iter()
            .map(|p| {
                let base = (p.income - self.offset_for_bracket(p.bracket_index)).max(0.0);
                tariff.tax(base).max(0.0) * p.weight
            })
            .collect();
        let total = taxes.iter().sum();
        PointTaxes { taxes, total }
    }

    /// Sums point taxes into half-open ranges over gross income. Each group is
    /// filled independently, so overlapping groups share points. Points that
    /// fall in no group only count towards the total.
    pub fn aggregate(&self, taxes: &PointTaxes, groups: &[IncomeGroup]) -> Vec<GroupResult> {
        let mut taxpayers = vec![0.0; groups.len()];
        let mut incomes = vec![0.0; groups.len()];
        let mut group_taxes = vec![0.0; groups.len()];

        for (point, &tax) in self.population.points().iter().zip(taxes.as_slice()) {
            for (g, group) in groups.iter().enumerate() {
                if group.contains(point.income) {
                    taxpayers[g] += point.weight;
                    incomes[g] += point.income * point.weight;
                    group_taxes[g] += tax;
                }
            }
        }

        let total = taxes.total();
        groups
            .iter()
            .enumerate()
            .map(|(g, group)| GroupResult {
                name: group.name.clone(),
                lower_bound: group.lower_bound,
                upper_bound: group.upper_bound,
                taxpayer_count: taxpayers[g].round() as u64,
                total_income: incomes[g],
                total_tax: group_taxes[g],
                share_of_total_tax_percent: if total > 0.0 {
                    group_taxes[g] / total * 100.0
                } else {
                    0.0
                },
                average_effective_rate_percent: if incomes[g] > 0.0 {
                    group_taxes[g] / incomes[g] * 100.0
                } else {
                    0.0
                },
            })
            .collect()
    }

    pub fn simulate(&self, params: &TariffParameters) -> SimulationResult {
        let taxes = self.evaluate(params);
        SimulationResult {
            total_tax: taxes.total(),
            display_groups: self.aggregate(&taxes, &self.display_groups),
            summary_groups: self.aggregate(&taxes, &self.summary_groups),
        }
    }

    pub fn compare(&self, params: &TariffParameters) -> Comparison {
        let scenario = self.simulate(params);
        let baseline = self.baseline.clone();
        let delta_tax = scenario.total_tax - baseline.total_tax;
        let delta_percent = if baseline.total_tax != 0.0 {
            delta_tax / baseline.total_tax * 100.0
        } else {
            0.0
        };
        Comparison {
            baseline,
            scenario,
            delta_tax,
            delta_percent,
        }
    }

    /// Change in tax for one taxpayer at each display group's representative
    /// income. The bracket offset cancels out of the delta, so only the
    /// bracket containing the representative income matters.
    pub fn representative_deltas(&self, params: &TariffParameters) -> Vec<RepresentativeDelta> {
        let scenario = params.derive();
        self.display_groups
            .iter()
            .filter_map(|group| {
                let income = group.representative_income?;
                let offset = self
                    .brackets
                    .iter()
                    .position(|b| b.contains(income))
                    .map_or(0.0, |index| self.offset_for_bracket(index));
                let taxable_base = (income - offset).max(0.0);
                let baseline_tax = self.reference.tax(taxable_base);
                let scenario_tax = scenario.tax(taxable_base);
                let delta_annual = scenario_tax - baseline_tax;
                Some(RepresentativeDelta {
                    name: group.name.clone(),
                    representative_income: income,
                    taxable_base,
                    baseline_tax,
                    scenario_tax,
                    delta_annual,
                    delta_monthly: (delta_annual / 12.0).round(),
                })
            })
            .collect()
    }

    pub fn calibration_report(&self) -> Vec<BracketCalibration> {
        self.brackets
            .iter()
            .zip(&self.calibration)
            .enumerate()
            .map(|(index, (bracket, outcome))| BracketCalibration {
                bracket_index: index,
                lower_bound: bracket.lower_bound,
                upper_bound: bracket.upper_bound,
                point_count: self.population.bracket(index).len(),
                offset: outcome.offset,
                reported_tax: bracket.total_tax,
                fitted_tax: outcome.fitted_tax,
                reachable: outcome.reachable,
            })
            .collect()
    }

    pub fn population_summary(&self) -> PopulationSummary {
        PopulationSummary {
            synthetic_points: self.population.len(),
            taxpayers: self.brackets.iter().map(|b| b.taxpayer_count).sum(),
            reported_total_tax: self.brackets.iter().map(|b| b.total_tax).sum(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::LazyLock;

    static CONTEXT: LazyLock<SimulationContext> =
        LazyLock::new(|| SimulationContext::reference().expect("reference context builds"));

    const REPORTED_TOTAL_TAX: f64 = 356_590_443_000.0;
    const TAXPAYERS: u64 = 43_047_968;

    fn assert_rel_close(actual: f64, expected: f64, rel: f64) {
        assert!(
            ((actual - expected) / expected).abs() <= rel,
            "expected {expected}, got {actual}, relative tolerance {rel}"
        );
    }

    #[test]
    fn baseline_reproduces_reported_total_tax() {
        assert_rel_close(CONTEXT.baseline().total_tax, REPORTED_TOTAL_TAX, 0.005);
    }

    #[test]
    fn simulate_is_deterministic() {
        let params = TariffParameters::reference();
        assert_eq!(CONTEXT.simulate(&params), CONTEXT.simulate(&params));
    }

    #[test]
    fn display_groups_sum_to_total() {
        let result = CONTEXT.baseline();
        let tax: f64 = result.display_groups.iter().map(|g| g.total_tax).sum();
        let share: f64 = result
            .display_groups
            .iter()
            .map(|g| g.share_of_total_tax_percent)
            .sum();
        assert_rel_close(tax, result.total_tax, 1e-9);
        assert!((share - 100.0).abs() < 1e-6);

        for (group, bracket) in result.display_groups.iter().zip(CONTEXT.brackets()) {
            assert_eq!(group.taxpayer_count, bracket.taxpayer_count);
        }
    }

    #[test]
    fn summary_groups_cover_every_taxpayer() {
        let result = CONTEXT.baseline();
        assert_eq!(result.summary_groups.len(), 4);
        let taxpayers: u64 = result.summary_groups.iter().map(|g| g.taxpayer_count).sum();
        assert!(taxpayers.abs_diff(TAXPAYERS) <= 4);
        let tax: f64 = result.summary_groups.iter().map(|g| g.total_tax).sum();
        assert_rel_close(tax, result.total_tax, 1e-9);
    }

    #[test]
    fn effective_rates_rise_across_summary_groups() {
        let groups = &CONTEXT.baseline().summary_groups;
        for pair in groups.windows(2) {
            let (lower, upper) = (&pair[0], &pair[1]);
            assert!(lower.average_effective_rate_percent < upper.average_effective_rate_percent);
        }
    }

    #[test]
    fn reachable_brackets_are_fitted_to_reported_tax() {
        let report = CONTEXT.calibration_report();
        assert_eq!(report.len(), 17);
        assert!(report.iter().filter(|c| !c.reachable).count() <= 2);
        for entry in report.iter().filter(|c| c.reachable) {
            assert_rel_close(entry.fitted_tax, entry.reported_tax, 1e-4);
            assert!(entry.offset >= 0.0);
        }
        assert_eq!(report[15].point_count, 30_000);
    }

    #[test]
    fn higher_top_rate_raises_total_tax() {
        let mut params = TariffParameters::reference();
        params.zone4_rate = 0.45;
        let comparison = CONTEXT.compare(&params.normalized());
        assert!(comparison.scenario.total_tax > comparison.baseline.total_tax);
        assert!(comparison.delta_tax > 0.0);
        assert!(comparison.delta_percent > 0.0);
    }

    #[test]
    fn reference_tariff_compares_equal_to_baseline() {
        let comparison = CONTEXT.compare(&TariffParameters::reference());
        assert_eq!(comparison.delta_tax, 0.0);
        assert_eq!(comparison.delta_percent, 0.0);
        assert_eq!(comparison.scenario, comparison.baseline);
    }

    #[test]
    fn representative_deltas_vanish_at_reference_tariff() {
        let deltas = CONTEXT.representative_deltas(&TariffParameters::reference());
        assert_eq!(deltas.len(), 17);
        assert!(deltas.iter().all(|d| d.delta_annual == 0.0));
        assert!(deltas.iter().all(|d| d.taxable_base <= d.representative_income));
    }

    #[test]
    fn representative_deltas_follow_top_rate_increase() {
        let mut params = TariffParameters::reference();
        params.zone4_rate = 0.45;
        let deltas = CONTEXT.representative_deltas(&params.normalized());
        assert!(deltas.iter().all(|d| d.delta_annual >= 0.0));
        let top = deltas.last().expect("top group");
        assert!(top.delta_annual > 0.0);
        assert_eq!(top.delta_monthly, (top.delta_annual / 12.0).round());
        // Below the zero threshold nothing changes.
        assert_eq!(deltas[0].delta_annual, 0.0);
    }

    #[test]
    fn histogram_is_built_once_with_default_layout() {
        let histogram = CONTEXT.histogram();
        assert_eq!(histogram.len(), HISTOGRAM_BINS);
        let width = DISPLAY_MAX / HISTOGRAM_BINS as f64;
        let shown: f64 = histogram.iter().map(|b| b.density * width).sum();
        let below: f64 = CONTEXT
            .population()
            .points()
            .iter()
            .filter(|p| p.income < DISPLAY_MAX)
            .map(|p| p.weight)
            .sum();
        assert_rel_close(shown, below, 1e-9);
    }

    #[test]
    fn population_summary_reports_points_and_taxpayers() {
        let summary = CONTEXT.population_summary();
        assert_eq!(summary.synthetic_points, 60_300);
        assert_eq!(summary.taxpayers, TAXPAYERS);
        assert_rel_close(summary.reported_total_tax, REPORTED_TOTAL_TAX, 1e-12);
    }

    #[test]
    fn custom_groupings_replace_the_defaults() {
        let context = CONTEXT.clone().with_groupings(
            vec![IncomeGroup::new("all", 0.0, f64::INFINITY)],
            vec![
                IncomeGroup::new("under 50k", 0.0, 50_000.0),
                IncomeGroup::new("50k+", 50_000.0, f64::INFINITY),
            ],
        );
        let baseline = context.baseline();
        assert_eq!(baseline.display_groups.len(), 1);
        assert_eq!(baseline.display_groups[0].taxpayer_count, TAXPAYERS);
        assert!((baseline.display_groups[0].share_of_total_tax_percent - 100.0).abs() < 1e-9);
        assert_eq!(baseline.summary_groups.len(), 2);
        assert_eq!(baseline.total_tax, CONTEXT.baseline().total_tax);
        // No representative incomes, so no per-taxpayer deltas.
        assert!(context.representative_deltas(&TariffParameters::reference()).is_empty());
    }

    #[test]
    fn offsets_are_fixed_at_reference_calibration() {
        let offsets = CONTEXT.offsets();
        assert_eq!(offsets.len(), CONTEXT.brackets().len());
        assert!(offsets.iter().all(|k| k.is_finite() && *k >= 0.0));
        assert_eq!(
            CONTEXT.reference_tariff().params(),
            &TariffParameters::reference()
        );
        assert_eq!(CONTEXT.reference_params(), &TariffParameters::reference());
        assert_eq!(CONTEXT.display_groups().len(), 17);
        assert_eq!(CONTEXT.summary_groups().len(), 4);
    }

    #[test]
    fn overlapping_groups_each_count_their_points() {
        let taxes = CONTEXT.evaluate(&TariffParameters::reference());
        let groups = CONTEXT.aggregate(
            &taxes,
            &[
                IncomeGroup::new("all", 0.0, f64::INFINITY),
                IncomeGroup::new("50k+", 50_000.0, f64::INFINITY),
            ],
        );
        assert_eq!(groups[0].taxpayer_count, TAXPAYERS);
        assert_rel_close(groups[0].total_tax, taxes.total(), 1e-12);

        let above: u64 = CONTEXT.brackets()[10..].iter().map(|b| b.taxpayer_count).sum();
        assert!(groups[1].taxpayer_count.abs_diff(above) <= 1);
        assert!(groups[1].total_tax > 0.0);
        assert!(groups[1].total_tax < groups[0].total_tax);
    }

    #[test]
    fn invalid_brackets_are_rejected() {
        let err = SimulationContext::new(Vec::new(), TariffParameters::reference())
            .expect_err("empty table");
        assert!(matches!(err, BracketError::Empty));
    }

    #[test]
    fn empty_group_reports_zero_rate() {
        let taxes = CONTEXT.evaluate(&TariffParameters::reference());
        let groups = CONTEXT.aggregate(&taxes, &[IncomeGroup::new("none", -10.0, -1.0)]);
        assert_eq!(groups[0].taxpayer_count, 0);
        assert_eq!(groups[0].total_tax, 0.0);
        assert_eq!(groups[0].average_effective_rate_percent, 0.0);
        assert_eq!(groups[0].share_of_total_tax_percent, 0.0);
    }
}
