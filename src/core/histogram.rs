use super::types::{HistogramBin, SyntheticPoint};

pub const DISPLAY_MAX: f64 = 200_000.0;
pub const HISTOGRAM_BINS: usize = 200;

/// Taxpayer density per unit of income over `[0, max_display_income)`.
///
/// Points at or above `max_display_income` are left out. Each bin reports its
/// rounded centre and `weight / bin_width`.
pub fn build_histogram(
    points: &[SyntheticPoint],
    max_display_income: f64,
    bin_count: usize,
) -> Vec<HistogramBin> {
    if bin_count == 0 || !max_display_income.is_finite() || max_display_income <= 0.0 {
        return Vec::new();
    }

    let width = max_display_income / bin_count as f64;
    let mut weights = vec![0.0; bin_count];
    for point in points.iter().filter(|p| p.income < max_display_income) {
        let index = ((point.income.max(0.0) / width).floor() as usize).min(bin_count - 1);
        weights[index] += point.weight;
    }

    weights
        .into_iter()
        .enumerate()
        .map(|(i, weight)| HistogramBin {
            income: ((i as f64 + 0.5) * width).round(),
            density: weight / width,
        })
        .collect()
}
