mod brackets;
mod engine;
mod groups;
mod histogram;
mod population;
mod solver;
mod tariff;
mod types;

pub use brackets::{
    BracketError, BracketRecord, load_brackets_csv, load_brackets_file, reference_brackets,
    validate_brackets,
};
pub use engine::{PointTaxes, SimulationContext};
pub use groups::{display_groups, summary_groups};
pub use histogram::{DISPLAY_MAX, HISTOGRAM_BINS, build_histogram};
pub use population::{PopulationConfig, ShapeRule, SyntheticPopulation};
pub use solver::{
    CalibrationConfig, CalibrationOutcome, bracket_tax_given_offset, solve_offset,
    solve_offset_with,
};
pub use tariff::{
    AVERAGE_RATE_INCOMES, DerivedTariff, MARGINAL_CURVE_MAX, MARGINAL_CURVE_STEP,
    MID_RATE_FRACTION, MIN_ZONE_GAP, TariffControl, TariffError, TariffParameters, compute_tax,
};
pub use types::{
    BracketCalibration, BracketStat, Comparison, GroupResult, HistogramBin, IncomeGroup,
    PopulationSummary, RatePoint, RepresentativeDelta, SimulationResult, SyntheticPoint,
};
