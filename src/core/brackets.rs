use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use super::types::BracketStat;

/// Errors raised while loading or validating a bracket table.
#[derive(Debug, Error)]
pub enum BracketError {
    #[error("bracket table is empty")]
    Empty,

    #[error("bracket {index}: bounds [{lower}, {upper}) are invalid")]
    InvalidBounds { index: usize, lower: f64, upper: f64 },

    #[error("bracket {index}: lower bound {found} does not match previous upper bound {expected}")]
    NonContiguous {
        index: usize,
        expected: f64,
        found: f64,
    },

    #[error("bracket {index}: only the last bracket may be unbounded")]
    UnboundedInterior { index: usize },

    #[error("last bracket must be unbounded, found upper bound {upper}")]
    BoundedTop { upper: f64 },

    #[error("bracket {index}: taxpayer count must be > 0")]
    ZeroTaxpayers { index: usize },

    #[error("bracket {index}: total income and total tax must be finite and >= 0")]
    InvalidAggregate { index: usize },

    #[error("top bracket average income {average} must exceed its lower bound {lower}")]
    TopAverageBelowBound { average: f64, lower: f64 },

    #[error("CSV parse error: {0}")]
    Csv(#[from] csv::Error),

    #[error("cannot read bracket file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Income tax statistics 2021 (Destatis), 17 brackets of gross income.
const REFERENCE_BRACKETS: [BracketStat; 17] = [
    BracketStat::new(0.0, 5_000.0, 4_820_115, 7_480_434_000.0, 388_099_000.0),
    BracketStat::new(5_000.0, 10_000.0, 2_353_352, 17_851_525_000.0, 483_628_000.0),
    BracketStat::new(10_000.0, 15_000.0, 3_155_869, 39_902_164_000.0, 1_021_645_000.0),
    BracketStat::new(15_000.0, 20_000.0, 3_594_246, 62_692_463_000.0, 2_920_989_000.0),
    BracketStat::new(20_000.0, 25_000.0, 3_333_587, 75_016_710_000.0, 4_993_263_000.0),
    BracketStat::new(25_000.0, 30_000.0, 3_329_026, 91_472_829_000.0, 7_430_891_000.0),
    BracketStat::new(30_000.0, 35_000.0, 3_094_180, 100_440_834_000.0, 9_963_954_000.0),
    BracketStat::new(35_000.0, 40_000.0, 2_794_992, 104_647_140_000.0, 12_127_197_000.0),
    BracketStat::new(40_000.0, 45_000.0, 2_395_727, 101_619_120_000.0, 12_996_609_000.0),
    BracketStat::new(45_000.0, 50_000.0, 1_985_854, 94_193_859_000.0, 12_881_294_000.0),
    BracketStat::new(50_000.0, 60_000.0, 3_044_466, 166_523_902_000.0, 24_697_749_000.0),
    BracketStat::new(60_000.0, 70_000.0, 2_147_178, 139_003_998_000.0, 22_473_103_000.0),
    BracketStat::new(70_000.0, 125_000.0, 4_951_807, 448_444_143_000.0, 85_981_831_000.0),
    BracketStat::new(125_000.0, 250_000.0, 1_607_958, 262_642_612_000.0, 68_248_810_000.0),
    BracketStat::new(250_000.0, 500_000.0, 321_834, 107_367_770_000.0, 34_853_749_000.0),
    BracketStat::new(500_000.0, 1_000_000.0, 83_268, 55_537_482_000.0, 19_665_687_000.0),
    BracketStat::new(1_000_000.0, f64::INFINITY, 34_509, 98_259_228_000.0, 35_461_945_000.0),
];

pub fn reference_brackets() -> Vec<BracketStat> {
    REFERENCE_BRACKETS.to_vec()
}

/// Rejects tables the population generator cannot handle: gaps or overlaps
/// between brackets, empty brackets, or an open top bracket whose average does
/// not exceed its lower bound.
pub fn validate_brackets(brackets: &[BracketStat]) -> Result<(), BracketError> {
    let Some(last_index) = brackets.len().checked_sub(1) else {
        return Err(BracketError::Empty);
    };

    for (index, bracket) in brackets.iter().enumerate() {
        let lower = bracket.lower_bound;
        let upper = bracket.upper_bound;
        if !lower.is_finite() || lower < 0.0 || upper.is_nan() || upper <= lower {
            return Err(BracketError::InvalidBounds {
                index,
                lower,
                upper,
            });
        }
        if index < last_index && !bracket.is_bounded() {
            return Err(BracketError::UnboundedInterior { index });
        }
        if index > 0 {
            let expected = brackets[index - 1].upper_bound;
            if lower != expected {
                return Err(BracketError::NonContiguous {
                    index,
                    expected,
                    found: lower,
                });
            }
        }
        if bracket.taxpayer_count == 0 {
            return Err(BracketError::ZeroTaxpayers { index });
        }
        let aggregates_ok = bracket.total_income.is_finite()
            && bracket.total_income >= 0.0
            && bracket.total_tax.is_finite()
            && bracket.total_tax >= 0.0;
        if !aggregates_ok {
            return Err(BracketError::InvalidAggregate { index });
        }
    }

    let top = &brackets[last_index];
    if top.is_bounded() {
        return Err(BracketError::BoundedTop {
            upper: top.upper_bound,
        });
    }
    let average = top.average_income();
    if average <= top.lower_bound {
        return Err(BracketError::TopAverageBelowBound {
            average,
            lower: top.lower_bound,
        });
    }

    Ok(())
}

/// One CSV row: `lower_bound,upper_bound,taxpayers,total_income,total_tax`.
/// An empty `upper_bound` marks the open top bracket.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct BracketRecord {
    pub lower_bound: f64,
    #[serde(deserialize_with = "deserialize_optional_bound")]
    pub upper_bound: Option<f64>,
    pub taxpayers: u64,
    pub total_income: f64,
    pub total_tax: f64,
}

impl From<BracketRecord> for BracketStat {
    fn from(record: BracketRecord) -> Self {
        BracketStat::new(
            record.lower_bound,
            record.upper_bound.unwrap_or(f64::INFINITY),
            record.taxpayers,
            record.total_income,
            record.total_tax,
        )
    }
}

fn deserialize_optional_bound<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) if s.eq_ignore_ascii_case("inf") || s.eq_ignore_ascii_case("infinity") => {
            Ok(None)
        }
        Some(s) => s.parse::<f64>().map(Some).map_err(serde::de::Error::custom),
    }
}

/// Parses and validates a bracket table from any CSV source.
pub fn load_brackets_csv<R: Read>(reader: R) -> Result<Vec<BracketStat>, BracketError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut brackets = Vec::new();
    for result in csv_reader.deserialize() {
        let record: BracketRecord = result?;
        brackets.push(BracketStat::from(record));
    }

    validate_brackets(&brackets)?;
    Ok(brackets)
}

pub fn load_brackets_file(path: &Path) -> Result<Vec<BracketStat>, BracketError> {
    let file = File::open(path).map_err(|source| BracketError::Io {
        path: path.display().to_string(),
        source,
    })?;
    load_brackets_csv(file)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SMALL_TABLE: &str = "\
lower_bound,upper_bound,taxpayers,total_income,total_tax
0,10000,100,500000,1000
10000,50000,50,1250000,90000
50000,,5,1000000,300000
";

    #[test]
    fn reference_table_is_valid() {
        let brackets = reference_brackets();
        assert_eq!(brackets.len(), 17);
        validate_brackets(&brackets).expect("reference table must validate");
    }

    #[test]
    fn reference_table_totals_match_published_sums() {
        let brackets = reference_brackets();
        let taxpayers: u64 = brackets.iter().map(|b| b.taxpayer_count).sum();
        let total_tax: f64 = brackets.iter().map(|b| b.total_tax).sum();
        assert_eq!(taxpayers, 43_047_968);
        assert!((total_tax - 356_590_443_000.0).abs() < 1.0);
    }

    #[test]
    fn empty_table_is_rejected() {
        assert!(matches!(validate_brackets(&[]), Err(BracketError::Empty)));
    }

    #[test]
    fn gap_between_brackets_is_rejected() {
        let mut brackets = reference_brackets();
        brackets[3].lower_bound = 15_500.0;
        let err = validate_brackets(&brackets).expect_err("gap must be rejected");
        assert!(matches!(err, BracketError::NonContiguous { index: 3, .. }));
    }

    #[test]
    fn zero_taxpayers_is_rejected() {
        let mut brackets = reference_brackets();
        brackets[5].taxpayer_count = 0;
        let err = validate_brackets(&brackets).expect_err("empty bracket must be rejected");
        assert!(matches!(err, BracketError::ZeroTaxpayers { index: 5 }));
    }

    #[test]
    fn bounded_top_bracket_is_rejected() {
        let mut brackets = reference_brackets();
        brackets.pop();
        let err = validate_brackets(&brackets).expect_err("top must be open");
        assert!(matches!(err, BracketError::BoundedTop { .. }));
    }

    #[test]
    fn top_average_at_lower_bound_is_rejected() {
        let mut brackets = reference_brackets();
        let top = brackets.last_mut().expect("non-empty");
        top.total_income = top.lower_bound * top.taxpayer_count as f64;
        let err = validate_brackets(&brackets).expect_err("alpha would be infinite");
        assert!(matches!(err, BracketError::TopAverageBelowBound { .. }));
    }

    #[test]
    fn csv_table_parses_open_upper_bound() {
        let brackets = load_brackets_csv(SMALL_TABLE.as_bytes()).expect("valid csv");
        assert_eq!(brackets.len(), 3);
        assert_eq!(brackets[1].lower_bound, 10_000.0);
        assert_eq!(brackets[1].taxpayer_count, 50);
        assert!(brackets[2].upper_bound.is_infinite());
    }

    #[test]
    fn csv_table_is_validated_after_parsing() {
        let table = "\
lower_bound,upper_bound,taxpayers,total_income,total_tax
0,10000,100,500000,1000
12000,,5,1000000,300000
";
        let err = load_brackets_csv(table.as_bytes()).expect_err("gap must be rejected");
        assert!(matches!(err, BracketError::NonContiguous { index: 1, .. }));
    }

    #[test]
    fn csv_with_bad_number_reports_parse_error() {
        let table = "\
lower_bound,upper_bound,taxpayers,total_income,total_tax
0,abc,100,500000,1000
";
        let err = load_brackets_csv(table.as_bytes()).expect_err("bad number");
        assert!(matches!(err, BracketError::Csv(_)));
    }
}
