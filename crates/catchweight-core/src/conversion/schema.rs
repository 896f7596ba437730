use crate::units::{length_ratio, LengthUnit};
use chrono::NaiveDate;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

fn first_month() -> u32 {
    1
}

fn last_month() -> u32 {
    12
}

fn default_unsexed_sex_id() -> i32 {
    188
}

/// A set of conversion records, as stored in a tables file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionTables {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Sex id standing for "unsexed" in the records and queries.
    #[serde(default = "default_unsexed_sex_id")]
    pub unsexed_sex_id: i32,
    #[serde(default)]
    pub weight_length: Vec<WeightLengthConversion>,
    #[serde(default)]
    pub round_weight: Vec<RoundWeightConversion>,
}

/// Coefficients of `W = a · L^b` for one species, length parameter, sex,
/// area and period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightLengthConversion {
    #[serde(default)]
    pub id: Option<i32>,
    pub reference_taxon_id: i32,
    pub length_pmfm_id: i32,
    /// Unset means unsexed.
    #[serde(default)]
    pub sex_id: Option<i32>,
    /// Statistical rectangles covered; empty covers every rectangle.
    #[serde(default)]
    pub rectangle_labels: Vec<String>,
    #[serde(default = "first_month")]
    pub start_month: u32,
    /// May be lower than `start_month` for periods spanning new year.
    #[serde(default = "last_month")]
    pub end_month: u32,
    /// Unset applies to every year.
    #[serde(default)]
    pub year: Option<i32>,
    pub length_unit: LengthUnit,
    pub coefficient_a: Decimal,
    pub coefficient_b: Decimal,
}

/// How the measured length is turned into the length the coefficients expect.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LengthOptions {
    pub unit: LengthUnit,
    /// Measurement step, in `unit`. Half of it is added to centre the value.
    pub precision: Decimal,
    pub individual_count: i32,
}

impl WeightLengthConversion {
    pub fn covers_month(&self, month: u32) -> bool {
        if self.start_month <= self.end_month {
            (self.start_month..=self.end_month).contains(&month)
        } else {
            month >= self.start_month || month <= self.end_month
        }
    }

    pub fn covers_rectangle(&self, rectangle_label: &str) -> bool {
        self.rectangle_labels.is_empty()
            || self
                .rectangle_labels
                .iter()
                .any(|r| r.trim().eq_ignore_ascii_case(rectangle_label.trim()))
    }

    pub fn matches(&self, query: &WeightLengthQuery, unsexed_sex_id: i32) -> bool {
        self.reference_taxon_id == query.reference_taxon_id
            && self.length_pmfm_id == query.length_pmfm_id
            && self.sex_id.unwrap_or(unsexed_sex_id) == query.sex_id
            && self.covers_rectangle(&query.rectangle_label)
            && query.month.map_or(true, |m| self.covers_month(m))
            && match (query.year, self.year) {
                (Some(wanted), Some(year)) => wanted == year,
                _ => true,
            }
    }

    /// Live weight, in kilograms.
    ///
    /// Returns `None` when the power law does not give a finite number, or
    /// when the length is out of range.
    pub fn compute_weight(&self, length: Decimal, options: &LengthOptions) -> Option<Decimal> {
        let ratio = length_ratio(options.unit, self.length_unit);
        let half_step = Decimal::new(5, 1)
            .checked_mul(options.precision)?
            .checked_mul(ratio)?;
        let centred = length.checked_mul(ratio)?.checked_add(half_step)?;

        let a = self.coefficient_a.to_f64()?;
        let b = self.coefficient_b.to_f64()?;
        let l = centred.to_f64()?;
        let weight = a * l.powf(b) * f64::from(options.individual_count);
        if !weight.is_finite() {
            return None;
        }
        Decimal::from_f64(weight)
    }
}

/// Ratio between live weight and the weight of a dressed / preserved product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundWeightConversion {
    #[serde(default)]
    pub id: Option<i32>,
    pub taxon_group_id: i32,
    pub dressing_id: i32,
    pub preserving_id: i32,
    /// Country the coefficient applies to; unset applies everywhere.
    #[serde(default)]
    pub location_id: Option<i32>,
    pub start_date: NaiveDate,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    pub conversion_coefficient: Decimal,
}

impl RoundWeightConversion {
    pub fn covers_date(&self, date: NaiveDate) -> bool {
        date >= self.start_date && self.end_date.map_or(true, |end| date <= end)
    }

    pub fn matches(&self, query: &RoundWeightQuery) -> bool {
        self.taxon_group_id == query.taxon_group_id
            && self.dressing_id == query.dressing_id
            && self.preserving_id == query.preserving_id
            && self.covers_date(query.date)
    }

    /// Weight of the dressed product for a given live weight.
    pub fn inverse_alive_weight(&self, live_weight: Decimal) -> Option<Decimal> {
        if self.conversion_coefficient <= Decimal::ZERO {
            return None;
        }
        live_weight.checked_div(self.conversion_coefficient)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WeightLengthQuery {
    pub reference_taxon_id: i32,
    pub length_pmfm_id: i32,
    pub sex_id: i32,
    pub rectangle_label: String,
    /// Unset when widening the search to any month.
    pub month: Option<u32>,
    /// Unset when widening the search to any year.
    pub year: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoundWeightQuery {
    pub date: NaiveDate,
    pub taxon_group_id: i32,
    pub dressing_id: i32,
    pub preserving_id: i32,
    pub country_id: Option<i32>,
}
