use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::types::RatePoint;

/// Smallest distance kept between consecutive zone boundaries.
pub const MIN_ZONE_GAP: f64 = 500.0;

/// Zone 2/3 polynomials are evaluated on income scaled by this divisor.
const ZONE_SCALE: f64 = 10_000.0;

// Coefficients of the 2021 reference tariff the mid-rate interpolation is
// anchored on. Re-derive MID_RATE_FRACTION if the reference tariff changes.
const REFERENCE_ZONE2_A: f64 = 995.21;
const REFERENCE_ZONE3_A: f64 = 208.85;
const REFERENCE_ENTRY_BASIS: f64 = 1_400.0;
const REFERENCE_ZERO_THRESHOLD: f64 = 9_744.0;
const REFERENCE_ZONE2_END: f64 = 14_753.0;
const REFERENCE_ENTRY_RATE: f64 = 0.14;
const REFERENCE_TOP_RATE: f64 = 0.42;

const REFERENCE_MID_RATE: f64 = (2.0
    * REFERENCE_ZONE2_A
    * ((REFERENCE_ZONE2_END - REFERENCE_ZERO_THRESHOLD) / ZONE_SCALE)
    + REFERENCE_ENTRY_BASIS)
    / ZONE_SCALE;

/// Position of the zone 2/3 marginal rate between the entry rate and the top
/// rate in the reference tariff (about 0.356).
pub const MID_RATE_FRACTION: f64 =
    (REFERENCE_MID_RATE - REFERENCE_ENTRY_RATE) / (REFERENCE_TOP_RATE - REFERENCE_ENTRY_RATE);

/// Fixed incomes at which the average-rate curve is sampled.
pub const AVERAGE_RATE_INCOMES: [f64; 31] = [
    0.0, 5_000.0, 10_000.0, 15_000.0, 20_000.0, 25_000.0, 30_000.0, 35_000.0, 40_000.0, 45_000.0,
    50_000.0, 55_000.0, 60_000.0, 65_000.0, 70_000.0, 80_000.0, 90_000.0, 100_000.0, 120_000.0,
    150_000.0, 175_000.0, 200_000.0, 250_000.0, 275_000.0, 300_000.0, 350_000.0, 400_000.0,
    500_000.0, 600_000.0, 750_000.0, 1_000_000.0,
];

pub const MARGINAL_CURVE_MAX: f64 = 400_000.0;
pub const MARGINAL_CURVE_STEP: f64 = 1_000.0;

/// User-facing tariff controls. Rates are fractions (0.42), the entry rate
/// basis is in hundredths of a percent (1400 = 14 %).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TariffParameters {
    pub zero_threshold: f64,
    pub zone2_end: f64,
    pub zone2_entry_rate_basis: f64,
    pub zone3_end: f64,
    pub zone4_end: f64,
    pub zone4_rate: f64,
    pub zone5_rate: f64,
    pub mid_rate_override: Option<f64>,
}

impl Default for TariffParameters {
    fn default() -> Self {
        Self::reference()
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TariffControl {
    ZeroThreshold,
    Zone2End,
    Zone3End,
    Zone4End,
    Zone4Rate,
    Zone5Rate,
    EntryRateBasis,
    MidRate,
}

impl TariffControl {
    pub const ALL: [TariffControl; 8] = [
        TariffControl::ZeroThreshold,
        TariffControl::Zone2End,
        TariffControl::Zone3End,
        TariffControl::Zone4End,
        TariffControl::Zone4Rate,
        TariffControl::Zone5Rate,
        TariffControl::EntryRateBasis,
        TariffControl::MidRate,
    ];

    /// Admissible `(min, max)` in the units stored on `TariffParameters`.
    pub fn range(self) -> (f64, f64) {
        match self {
            TariffControl::ZeroThreshold => (0.0, 30_000.0),
            TariffControl::Zone2End => (5_000.0, 60_000.0),
            TariffControl::Zone3End => (15_000.0, 150_000.0),
            TariffControl::Zone4End => (60_000.0, 1_000_000.0),
            TariffControl::Zone4Rate => (0.25, 0.55),
            TariffControl::Zone5Rate => (0.25, 0.65),
            TariffControl::EntryRateBasis => (500.0, 2_500.0),
            TariffControl::MidRate => (0.15, 0.30),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            TariffControl::ZeroThreshold => "zeroThreshold",
            TariffControl::Zone2End => "zone2End",
            TariffControl::Zone3End => "zone3End",
            TariffControl::Zone4End => "zone4End",
            TariffControl::Zone4Rate => "zone4Rate",
            TariffControl::Zone5Rate => "zone5Rate",
            TariffControl::EntryRateBasis => "entryRateBasis",
            TariffControl::MidRate => "midRate",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TariffError {
    #[error("{control} must be a finite number, got {value}")]
    NotFinite { control: &'static str, value: f64 },

    #[error("{control} must be between {min} and {max}, got {value}")]
    OutOfRange {
        control: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
}

impl TariffParameters {
    /// §32a EStG as of 2021.
    pub const fn reference() -> Self {
        Self {
            zero_threshold: REFERENCE_ZERO_THRESHOLD,
            zone2_end: REFERENCE_ZONE2_END,
            zone2_entry_rate_basis: REFERENCE_ENTRY_BASIS,
            zone3_end: 57_918.0,
            zone4_end: 274_612.0,
            zone4_rate: REFERENCE_TOP_RATE,
            zone5_rate: 0.45,
            mid_rate_override: None,
        }
    }

    pub fn get(&self, control: TariffControl) -> Option<f64> {
        match control {
            TariffControl::ZeroThreshold => Some(self.zero_threshold),
            TariffControl::Zone2End => Some(self.zone2_end),
            TariffControl::Zone3End => Some(self.zone3_end),
            TariffControl::Zone4End => Some(self.zone4_end),
            TariffControl::Zone4Rate => Some(self.zone4_rate),
            TariffControl::Zone5Rate => Some(self.zone5_rate),
            TariffControl::EntryRateBasis => Some(self.zone2_entry_rate_basis),
            TariffControl::MidRate => self.mid_rate_override,
        }
    }

    /// Sets one control as is, without clamping or reordering.
    pub fn set(&mut self, control: TariffControl, value: f64) {
        match control {
            TariffControl::ZeroThreshold => self.zero_threshold = value,
            TariffControl::Zone2End => self.zone2_end = value,
            TariffControl::Zone3End => self.zone3_end = value,
            TariffControl::Zone4End => self.zone4_end = value,
            TariffControl::Zone4Rate => self.zone4_rate = value,
            TariffControl::Zone5Rate => self.zone5_rate = value,
            TariffControl::EntryRateBasis => self.zone2_entry_rate_basis = value,
            TariffControl::MidRate => self.mid_rate_override = Some(value),
        }
    }

    /// Sets one control, clamped into its range, then repairs zone ordering.
    /// Moving a boundary pushes the boundaries above it up and pulls the ones
    /// below it down, so the moved boundary keeps its new value. Non-finite
    /// values leave the tariff untouched.
    pub fn update(&mut self, control: TariffControl, value: f64) {
        if !value.is_finite() {
            return;
        }
        let (min, max) = control.range();
        self.set(control, value.clamp(min, max));

        let moved = match control {
            TariffControl::ZeroThreshold => Some(0),
            TariffControl::Zone2End => Some(1),
            TariffControl::Zone3End => Some(2),
            TariffControl::Zone4End => Some(3),
            _ => None,
        };
        if let Some(moved) = moved {
            let mut bounds = self.boundaries();
            for i in moved + 1..bounds.len() {
                bounds[i] = bounds[i].max(bounds[i - 1] + MIN_ZONE_GAP);
            }
            for i in (0..moved).rev() {
                bounds[i] = bounds[i].min(bounds[i + 1] - MIN_ZONE_GAP);
            }
            self.set_boundaries(bounds);
        }
        self.enforce_ordering();
    }

    fn boundaries(&self) -> [f64; 4] {
        [
            self.zero_threshold,
            self.zone2_end,
            self.zone3_end,
            self.zone4_end,
        ]
    }

    fn set_boundaries(&mut self, bounds: [f64; 4]) {
        [
            self.zero_threshold,
            self.zone2_end,
            self.zone3_end,
            self.zone4_end,
        ] = bounds;
    }

    pub fn clear_mid_rate_override(&mut self) {
        self.mid_rate_override = None;
    }

    /// Pushes later boundaries up first, then pulls earlier ones down, and
    /// keeps the rich rate at or above the top rate.
    pub fn enforce_ordering(&mut self) {
        if self.zero_threshold + MIN_ZONE_GAP > self.zone2_end {
            self.zone2_end = self.zero_threshold + MIN_ZONE_GAP;
        }
        if self.zone2_end + MIN_ZONE_GAP > self.zone3_end {
            self.zone3_end = self.zone2_end + MIN_ZONE_GAP;
        }
        if self.zone3_end + MIN_ZONE_GAP > self.zone4_end {
            self.zone4_end = self.zone3_end + MIN_ZONE_GAP;
        }
        if self.zone4_end - MIN_ZONE_GAP < self.zone3_end {
            self.zone3_end = self.zone4_end - MIN_ZONE_GAP;
        }
        if self.zone3_end - MIN_ZONE_GAP < self.zone2_end {
            self.zone2_end = self.zone3_end - MIN_ZONE_GAP;
        }
        if self.zone2_end - MIN_ZONE_GAP < self.zero_threshold {
            self.zero_threshold = self.zone2_end - MIN_ZONE_GAP;
        }
        if self.zone5_rate < self.zone4_rate {
            self.zone5_rate = self.zone4_rate;
        }
    }

    pub fn normalized(mut self) -> Self {
        self.enforce_ordering();
        self
    }

    pub fn is_ordered(&self) -> bool {
        self.zero_threshold + MIN_ZONE_GAP <= self.zone2_end
            && self.zone2_end + MIN_ZONE_GAP <= self.zone3_end
            && self.zone3_end + MIN_ZONE_GAP <= self.zone4_end
            && self.zone5_rate >= self.zone4_rate
    }

    /// Checks every value is finite and inside its control range.
    pub fn validate(&self) -> Result<(), TariffError> {
        for control in TariffControl::ALL {
            let Some(value) = self.get(control) else {
                continue;
            };
            if !value.is_finite() {
                return Err(TariffError::NotFinite {
                    control: control.name(),
                    value,
                });
            }
            let (min, max) = control.range();
            if !(min..=max).contains(&value) {
                return Err(TariffError::OutOfRange {
                    control: control.name(),
                    value,
                    min,
                    max,
                });
            }
        }
        Ok(())
    }

    pub fn derive(&self) -> DerivedTariff {
        DerivedTariff::new(self)
    }
}

/// Coefficients of the five-zone tariff, derived once per parameter set.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DerivedTariff {
    #[serde(skip)]
    params: TariffParameters,
    pub entry_rate: f64,
    pub mid_rate: f64,
    pub zone2_a: f64,
    pub zone2_b: f64,
    pub zone3_a: f64,
    pub zone3_b: f64,
    pub zone3_c: f64,
    pub zone4_sub: f64,
    pub zone5_sub: f64,
}

impl DerivedTariff {
    pub fn new(params: &TariffParameters) -> Self {
        Self::from_ordered(params.normalized())
    }

    fn from_ordered(p: TariffParameters) -> Self {
        let entry_rate = p.zone2_entry_rate_basis / ZONE_SCALE;
        let y_top = (p.zone2_end - p.zero_threshold) / ZONE_SCALE;
        let z_top = (p.zone3_end - p.zone2_end) / ZONE_SCALE;
        let mid_rate = p
            .mid_rate_override
            .unwrap_or(entry_rate + MID_RATE_FRACTION * (p.zone4_rate - entry_rate));

        // Marginal rate of (a*y + b)*y per currency unit is (2*a*y + b) / ZONE_SCALE.
        let zone2_b = p.zone2_entry_rate_basis;
        let zone2_a = if y_top > 0.0 {
            (mid_rate * ZONE_SCALE - zone2_b) / (2.0 * y_top)
        } else {
            REFERENCE_ZONE2_A
        };
        let zone3_b = mid_rate * ZONE_SCALE;
        let zone3_a = if z_top > 0.0 {
            (p.zone4_rate * ZONE_SCALE - zone3_b) / (2.0 * z_top)
        } else {
            REFERENCE_ZONE3_A
        };

        let tax_at_zone2_end = (zone2_a * y_top + zone2_b) * y_top;
        let zone3_c = tax_at_zone2_end;
        let tax_at_zone3_end = (zone3_a * z_top + zone3_b) * z_top + zone3_c;
        let zone4_sub = p.zone4_rate * p.zone3_end - tax_at_zone3_end;
        let tax_at_zone4_end = p.zone4_rate * p.zone4_end - zone4_sub;
        let zone5_sub = p.zone5_rate * p.zone4_end - tax_at_zone4_end;

        Self {
            params: p,
            entry_rate,
            mid_rate,
            zone2_a,
            zone2_b,
            zone3_a,
            zone3_b,
            zone3_c,
            zone4_sub,
            zone5_sub,
        }
    }

    pub fn params(&self) -> &TariffParameters {
        &self.params
    }

    /// Tax before rounding to whole currency units. Income is floored first.
    pub fn raw_tax(&self, income: f64) -> f64 {
        let p = &self.params;
        let x = income.max(0.0).floor();
        if x <= p.zero_threshold {
            0.0
        } else if x <= p.zone2_end {
            let y = (x - p.zero_threshold) / ZONE_SCALE;
            (self.zone2_a * y + self.zone2_b) * y
        } else if x <= p.zone3_end {
            let z = (x - p.zone2_end) / ZONE_SCALE;
            (self.zone3_a * z + self.zone3_b) * z + self.zone3_c
        } else if x <= p.zone4_end {
            p.zone4_rate * x - self.zone4_sub
        } else {
            p.zone5_rate * x - self.zone5_sub
        }
    }

    pub fn tax(&self, income: f64) -> f64 {
        self.raw_tax(income).floor()
    }

    pub fn average_rate_percent(&self, income: f64) -> f64 {
        if income > 0.0 {
            self.tax(income) / income * 100.0
        } else {
            0.0
        }
    }

    pub fn marginal_rate_percent(&self, income: f64, step: f64) -> f64 {
        if step <= 0.0 {
            return 0.0;
        }
        (self.tax(income + step) - self.tax(income)) / step * 100.0
    }

    pub fn average_rate_curve(&self, incomes: &[f64]) -> Vec<RatePoint> {
        incomes
            .iter()
            .map(|&income| RatePoint {
                income,
                rate_percent: self.average_rate_percent(income),
            })
            .collect()
    }

    pub fn marginal_rate_curve(&self, max_income: f64, step: f64) -> Vec<RatePoint> {
        if step <= 0.0 || max_income < 0.0 {
            return Vec::new();
        }
        let steps = (max_income / step).floor() as usize;
        (0..=steps)
            .map(|i| {
                let income = i as f64 * step;
                RatePoint {
                    income,
                    rate_percent: self.marginal_rate_percent(income, step),
                }
            })
            .collect()
    }
}

/// Tax owed on `income` under `params`, in whole currency units.
pub fn compute_tax(income: f64, params: &TariffParameters) -> f64 {
    params.derive().tax(income)
}
