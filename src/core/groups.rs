use super::types::IncomeGroup;

/// `(name, lower, upper, representative income)` for the bracket-aligned view.
const DISPLAY_GROUPS: [(&str, f64, f64, f64); 17] = [
    ("0 – 5k", 0.0, 5_000.0, 2_500.0),
    ("5 – 10k", 5_000.0, 10_000.0, 7_500.0),
    ("10 – 15k", 10_000.0, 15_000.0, 12_500.0),
    ("15 – 20k", 15_000.0, 20_000.0, 17_500.0),
    ("20 – 25k", 20_000.0, 25_000.0, 22_500.0),
    ("25 – 30k", 25_000.0, 30_000.0, 27_500.0),
    ("30 – 35k", 30_000.0, 35_000.0, 32_500.0),
    ("35 – 40k", 35_000.0, 40_000.0, 37_500.0),
    ("40 – 45k", 40_000.0, 45_000.0, 42_500.0),
    ("45 – 50k", 45_000.0, 50_000.0, 47_500.0),
    ("50 – 60k", 50_000.0, 60_000.0, 55_000.0),
    ("60 – 70k", 60_000.0, 70_000.0, 65_000.0),
    ("70 – 125k", 70_000.0, 125_000.0, 90_000.0),
    ("125 – 250k", 125_000.0, 250_000.0, 165_000.0),
    ("250 – 500k", 250_000.0, 500_000.0, 335_000.0),
    ("500k – 1M", 500_000.0, 1_000_000.0, 670_000.0),
    ("1M+", 1_000_000.0, f64::INFINITY, 2_850_000.0),
];

const SUMMARY_GROUPS: [(&str, f64, f64); 4] = [
    ("Lower 50% (under €32k)", 0.0, 32_000.0),
    ("Middle (€32k–90k)", 32_000.0, 90_000.0),
    ("Upper (€90k–250k)", 90_000.0, 250_000.0),
    ("Top 5% (€250k+)", 250_000.0, f64::INFINITY),
];

/// One group per reference bracket, each with the gross income used for the
/// per-taxpayer delta table.
pub fn display_groups() -> Vec<IncomeGroup> {
    DISPLAY_GROUPS
        .iter()
        .map(|&(name, lower, upper, representative)| {
            IncomeGroup::new(name, lower, upper).with_representative_income(representative)
        })
        .collect()
}

pub fn summary_groups() -> Vec<IncomeGroup> {
    SUMMARY_GROUPS
        .iter()
        .map(|&(name, lower, upper)| IncomeGroup::new(name, lower, upper))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::brackets::reference_brackets;

    fn assert_partition(groups: &[IncomeGroup]) {
        assert_eq!(groups[0].lower_bound, 0.0);
        for pair in groups.windows(2) {
            assert_eq!(pair[0].upper_bound, pair[1].lower_bound);
        }
        assert!(groups.last().is_some_and(|g| g.upper_bound.is_infinite()));
    }

    #[test]
    fn display_groups_align_with_reference_brackets() {
        let groups = display_groups();
        let brackets = reference_brackets();
        assert_eq!(groups.len(), brackets.len());
        for (group, bracket) in groups.iter().zip(&brackets) {
            assert_eq!(group.lower_bound, bracket.lower_bound);
            assert_eq!(group.upper_bound, bracket.upper_bound);
        }
        assert_partition(&groups);
    }

    #[test]
    fn representative_incomes_fall_inside_their_group() {
        for group in display_groups() {
            let income = group
                .representative_income
                .expect("display groups carry a representative income");
            assert!(group.contains(income), "{} does not contain {income}", group.name);
        }
    }

    #[test]
    fn summary_groups_cover_all_incomes() {
        let groups = summary_groups();
        assert_eq!(groups.len(), 4);
        assert_partition(&groups);
        assert!(groups.iter().all(|g| g.representative_income.is_none()));
        assert!(groups[3].contains(10_000_000.0));
    }
}
