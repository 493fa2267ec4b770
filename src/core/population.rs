use std::ops::Range;

use super::types::{BracketStat, SyntheticPoint};

pub const BASE_POINTS: usize = 300;
pub const BASE_WIDTH: f64 = 5_000.0;
/// Upper clip for incomes sampled from the open top bracket.
pub const INCOME_CAP: f64 = 50_000_000.0;

const RELATIVE_AVERAGE_MIN: f64 = 0.05;
const RELATIVE_AVERAGE_MAX: f64 = 0.95;

/// How the power-law exponent of a bounded bracket is derived from the
/// average's relative position `r` inside the bracket.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum ShapeRule {
    /// `s = (1 - r) / r`, so that `E[u^s] = r` and the weighted mean of the
    /// bracket's points lands on its reported average.
    #[default]
    MeanMatched,
    /// `s = ln(0.5) / ln(r)`. Puts the bracket median, not the mean, at the
    /// reported average, so sampled bracket means can miss the reported ones
    /// by a wide margin (about double for the lowest reference bracket).
    LogHalf,
}

impl ShapeRule {
    fn exponent(self, relative_average: f64) -> f64 {
        let r = relative_average.clamp(RELATIVE_AVERAGE_MIN, RELATIVE_AVERAGE_MAX);
        match self {
            ShapeRule::MeanMatched => (1.0 - r) / r,
            ShapeRule::LogHalf => 0.5f64.ln() / r.ln(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PopulationConfig {
    pub base_points: usize,
    pub base_width: f64,
    pub income_cap: f64,
    pub shape_rule: ShapeRule,
}

impl Default for PopulationConfig {
    fn default() -> Self {
        Self {
            base_points: BASE_POINTS,
            base_width: BASE_WIDTH,
            income_cap: INCOME_CAP,
            shape_rule: ShapeRule::default(),
        }
    }
}

/// Representative income points for every bracket, stored contiguously in
/// bracket order.
#[derive(Debug, Clone)]
pub struct SyntheticPopulation {
    points: Vec<SyntheticPoint>,
    bracket_ranges: Vec<Range<usize>>,
}

impl SyntheticPopulation {
    /// Expects a validated bracket table (`taxpayer_count > 0`).
    pub fn generate(brackets: &[BracketStat], config: &PopulationConfig) -> Self {
        let total_points: usize = brackets.iter().map(|b| point_count(b, config)).sum();
        let mut points = Vec::with_capacity(total_points);
        let mut bracket_ranges = Vec::with_capacity(brackets.len());

        for (bracket_index, bracket) in brackets.iter().enumerate() {
            let start = points.len();
            let n = point_count(bracket, config);
            let weight = bracket.taxpayer_count as f64 / n as f64;
            points.extend(
                bracket_incomes(bracket, n, config)
                    .into_iter()
                    .map(|income| SyntheticPoint {
                        income,
                        weight,
                        bracket_index,
                    }),
            );
            bracket_ranges.push(start..points.len());
        }

        Self {
            points,
            bracket_ranges,
        }
    }

    pub fn points(&self) -> &[SyntheticPoint] {
        &self.points
    }

    pub fn bracket(&self, index: usize) -> &[SyntheticPoint] {
        self.bracket_ranges
            .get(index)
            .map(|range| &self.points[range.clone()])
            .unwrap_or(&[])
    }

    pub fn by_bracket(&self) -> impl Iterator<Item = &[SyntheticPoint]> + '_ {
        self.bracket_ranges
            .iter()
            .map(|range| &self.points[range.clone()])
    }

    pub fn bracket_count(&self) -> usize {
        self.bracket_ranges.len()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn total_weight(&self) -> f64 {
        self.points.iter().map(|p| p.weight).sum()
    }
}

fn point_count(bracket: &BracketStat, config: &PopulationConfig) -> usize {
    let width = if bracket.is_bounded() {
        bracket.upper_bound - bracket.lower_bound
    } else {
        config.base_width
    };
    let scaled = (config.base_points as f64 * width / config.base_width).round() as usize;
    scaled.max(config.base_points).max(1)
}

fn bracket_incomes(bracket: &BracketStat, n: usize, config: &PopulationConfig) -> Vec<f64> {
    let lower = bracket.lower_bound;
    let upper = bracket.upper_bound;
    let average = bracket.average_income();
    let midpoints = (0..n).map(|i| (i as f64 + 0.5) / n as f64);

    if bracket.is_bounded() {
        let width = upper - lower;
        let exponent = config.shape_rule.exponent((average - lower) / width);
        midpoints
            .map(|u| (lower + u.powf(exponent) * width).min(upper - 1.0).max(lower))
            .collect()
    } else {
        // Pareto tail anchored at the lower bound with mean `average`.
        let alpha = average / (average - lower);
        midpoints
            .map(|u| (lower / (1.0 - u).powf(1.0 / alpha)).min(config.income_cap))
            .collect()
    }
}
