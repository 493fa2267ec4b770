use serde::{Deserialize, Serialize};

/// One row of the published income statistics: all taxpayers whose income
/// falls in `[lower_bound, upper_bound)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BracketStat {
    pub lower_bound: f64,
    /// `f64::INFINITY` for the open top bracket (serialized as `null`).
    pub upper_bound: f64,
    pub taxpayer_count: u64,
    pub total_income: f64,
    pub total_tax: f64,
}

impl BracketStat {
    pub const fn new(
        lower_bound: f64,
        upper_bound: f64,
        taxpayer_count: u64,
        total_income: f64,
        total_tax: f64,
    ) -> Self {
        Self {
            lower_bound,
            upper_bound,
            taxpayer_count,
            total_income,
            total_tax,
        }
    }

    pub fn is_bounded(&self) -> bool {
        self.upper_bound.is_finite()
    }

    pub fn average_income(&self) -> f64 {
        self.total_income / self.taxpayer_count as f64
    }

    pub fn contains(&self, income: f64) -> bool {
        income >= self.lower_bound && income < self.upper_bound
    }
}

/// `weight` taxpayers sharing the same gross income.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyntheticPoint {
    pub income: f64,
    pub weight: f64,
    pub bracket_index: usize,
}

/// A named half-open income range `[lower_bound, upper_bound)` used to regroup
/// simulation output.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomeGroup {
    pub name: String,
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub representative_income: Option<f64>,
}

impl IncomeGroup {
    pub fn new(name: impl Into<String>, lower_bound: f64, upper_bound: f64) -> Self {
        Self {
            name: name.into(),
            lower_bound,
            upper_bound,
            representative_income: None,
        }
    }

    pub fn with_representative_income(mut self, income: f64) -> Self {
        self.representative_income = Some(income);
        self
    }

    pub fn contains(&self, income: f64) -> bool {
        income >= self.lower_bound && income < self.upper_bound
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupResult {
    pub name: String,
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub taxpayer_count: u64,
    pub total_income: f64,
    pub total_tax: f64,
    pub share_of_total_tax_percent: f64,
    pub average_effective_rate_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationResult {
    pub total_tax: f64,
    pub display_groups: Vec<GroupResult>,
    pub summary_groups: Vec<GroupResult>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Comparison {
    pub baseline: SimulationResult,
    pub scenario: SimulationResult,
    pub delta_tax: f64,
    pub delta_percent: f64,
}

/// Change in annual tax for a taxpayer at a display group's representative
/// gross income, using the calibrated offset of the bracket that income falls in.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RepresentativeDelta {
    pub name: String,
    pub representative_income: f64,
    pub taxable_base: f64,
    pub baseline_tax: f64,
    pub scenario_tax: f64,
    pub delta_annual: f64,
    pub delta_monthly: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BracketCalibration {
    pub bracket_index: usize,
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub point_count: usize,
    pub offset: f64,
    pub reported_tax: f64,
    pub fitted_tax: f64,
    pub reachable: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PopulationSummary {
    pub synthetic_points: usize,
    pub taxpayers: u64,
    pub reported_total_tax: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistogramBin {
    pub income: f64,
    pub density: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RatePoint {
    pub income: f64,
    pub rate_percent: f64,
}
