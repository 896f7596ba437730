use crate::error::CatchWeightError;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Highest number of decimals a `Decimal` can hold.
pub const MAX_DECIMALS: u32 = 28;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LengthUnit {
    #[serde(rename = "km")]
    Km,
    #[serde(rename = "m")]
    M,
    #[serde(rename = "dm")]
    Dm,
    #[serde(rename = "cm")]
    Cm,
    #[serde(rename = "mm")]
    Mm,
}

impl LengthUnit {
    /// Size of one unit, in meters.
    pub fn meters(self) -> Decimal {
        match self {
            LengthUnit::Km => Decimal::new(1000, 0),
            LengthUnit::M => Decimal::ONE,
            LengthUnit::Dm => Decimal::new(1, 1),
            LengthUnit::Cm => Decimal::new(1, 2),
            LengthUnit::Mm => Decimal::new(1, 3),
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            LengthUnit::Km => "km",
            LengthUnit::M => "m",
            LengthUnit::Dm => "dm",
            LengthUnit::Cm => "cm",
            LengthUnit::Mm => "mm",
        }
    }
}

impl fmt::Display for LengthUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for LengthUnit {
    type Err = CatchWeightError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "km" => Ok(LengthUnit::Km),
            "m" => Ok(LengthUnit::M),
            "dm" => Ok(LengthUnit::Dm),
            "cm" => Ok(LengthUnit::Cm),
            "mm" => Ok(LengthUnit::Mm),
            _ => Err(CatchWeightError::UnsupportedUnit(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WeightUnit {
    #[serde(rename = "t")]
    T,
    #[serde(rename = "kg")]
    #[default]
    Kg,
    #[serde(rename = "g")]
    G,
    #[serde(rename = "mg")]
    Mg,
}

impl WeightUnit {
    /// Size of one unit, in kilograms.
    pub fn kilograms(self) -> Decimal {
        match self {
            WeightUnit::T => Decimal::new(1000, 0),
            WeightUnit::Kg => Decimal::ONE,
            WeightUnit::G => Decimal::new(1, 3),
            WeightUnit::Mg => Decimal::new(1, 6),
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            WeightUnit::T => "t",
            WeightUnit::Kg => "kg",
            WeightUnit::G => "g",
            WeightUnit::Mg => "mg",
        }
    }
}

impl fmt::Display for WeightUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for WeightUnit {
    type Err = CatchWeightError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "t" => Ok(WeightUnit::T),
            "kg" => Ok(WeightUnit::Kg),
            "g" => Ok(WeightUnit::G),
            "mg" => Ok(WeightUnit::Mg),
            _ => Err(CatchWeightError::UnsupportedUnit(s.to_string())),
        }
    }
}

pub fn is_length_unit_symbol(s: &str) -> bool {
    s.parse::<LengthUnit>().is_ok()
}

pub fn is_weight_unit_symbol(s: &str) -> bool {
    s.parse::<WeightUnit>().is_ok()
}

/// Multiplier turning a length expressed in `from` into `to`.
pub fn length_ratio(from: LengthUnit, to: LengthUnit) -> Decimal {
    if from == to {
        return Decimal::ONE;
    }
    from.meters() / to.meters()
}

/// Convert a length, then round it half-up to the given precision
/// (smallest representable increment, e.g. `0.1`).
///
/// A non-positive precision disables rounding.
pub fn convert_length(
    value: Decimal,
    from: LengthUnit,
    to: LengthUnit,
    precision: Decimal,
) -> Result<Decimal, CatchWeightError> {
    let overflow = || CatchWeightError::Overflow(format!("{value} {from} in {to} at precision {precision}"));
    let converted = value.checked_mul(length_ratio(from, to)).ok_or_else(overflow)?;
    if precision <= Decimal::ZERO {
        return Ok(converted);
    }
    let steps = converted
        .checked_div(precision)
        .and_then(|s| s.checked_add(Decimal::new(5, 1)))
        .ok_or_else(overflow)?
        .floor();
    steps.checked_mul(precision).ok_or_else(overflow)
}

/// Same as [`convert_length`], with unit symbols.
pub fn convert_length_str(
    value: Decimal,
    from: &str,
    to: &str,
    precision: Decimal,
) -> Result<Decimal, CatchWeightError> {
    convert_length(value, from.parse()?, to.parse()?, precision)
}

/// Convert a weight. No rounding is applied.
pub fn convert_weight(value: Decimal, from: WeightUnit, to: WeightUnit) -> Result<Decimal, CatchWeightError> {
    if from == to {
        return Ok(value);
    }
    value
        .checked_mul(from.kilograms())
        .and_then(|v| v.checked_div(to.kilograms()))
        .ok_or_else(|| CatchWeightError::Overflow(format!("{value} {from} in {to}")))
}

pub fn convert_weight_str(value: Decimal, from: &str, to: &str) -> Result<Decimal, CatchWeightError> {
    convert_weight(value, from.parse()?, to.parse()?)
}

/// Half-up rounding: `floor(value * 10^d + 0.5) / 10^d`.
///
/// The result always carries exactly `d` decimals, so two rounded weights
/// compare (and print) the same way.
pub fn round_half_up(value: Decimal, max_decimals: u32) -> Decimal {
    let decimals = max_decimals.min(MAX_DECIMALS);
    let scale = Decimal::from_i128_with_scale(10i128.pow(decimals), 0);

    let mut rounded = match value.checked_mul(scale) {
        Some(scaled) => match scaled.checked_add(Decimal::new(5, 1)) {
            Some(shifted) => shifted.floor() / scale,
            None => value.round_dp_with_strategy(decimals, RoundingStrategy::MidpointAwayFromZero),
        },
        None => value.round_dp_with_strategy(decimals, RoundingStrategy::MidpointAwayFromZero),
    };
    rounded.rescale(decimals);
    rounded
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_units() {
        assert_eq!("cm".parse::<LengthUnit>().unwrap(), LengthUnit::Cm);
        assert_eq!(" KG ".parse::<WeightUnit>().unwrap(), WeightUnit::Kg);
        assert!("inch".parse::<LengthUnit>().is_err());
        assert!("lb".parse::<WeightUnit>().is_err());
    }

    #[test]
    fn test_unsupported_unit_error() {
        let err = convert_length_str(dec!(10), "cm", "ft", dec!(0.1)).unwrap_err();
        assert!(matches!(err, CatchWeightError::UnsupportedUnit(ref u) if u == "ft"));
    }

    #[test]
    fn test_convert_length_cm_to_mm() {
        assert_eq!(
            convert_length(dec!(25.3), LengthUnit::Cm, LengthUnit::Mm, dec!(1)).unwrap(),
            dec!(253)
        );
    }

    #[test]
    fn test_convert_length_rounds_half_up() {
        // 12.35 mm -> 1.235 cm -> 1.24 at 0.01 precision
        assert_eq!(
            convert_length(dec!(12.35), LengthUnit::Mm, LengthUnit::Cm, dec!(0.01)).unwrap(),
            dec!(1.24)
        );
    }

    #[test]
    fn test_convert_length_round_trip() {
        let units = [
            LengthUnit::Km,
            LengthUnit::M,
            LengthUnit::Dm,
            LengthUnit::Cm,
            LengthUnit::Mm,
        ];
        let precision = dec!(0.000001);
        let x = dec!(0.253417);
        for from in units {
            for to in units {
                let there = convert_length(x, from, to, precision).unwrap();
                let back = convert_length(there, to, from, precision).unwrap();
                let drift = (back - x).abs();
                // one precision unit, expressed in the source unit
                let tolerance = precision * length_ratio(to, from).max(Decimal::ONE);
                assert!(
                    drift <= tolerance,
                    "{from} -> {to}: {x} came back as {back}"
                );
            }
        }
    }

    #[test]
    fn test_convert_weight() {
        assert_eq!(convert_weight(dec!(0.15625), WeightUnit::Kg, WeightUnit::G).unwrap(), dec!(156.25));
        assert_eq!(convert_weight(dec!(2500), WeightUnit::Kg, WeightUnit::T).unwrap(), dec!(2.5));
        assert_eq!(convert_weight(dec!(1), WeightUnit::Mg, WeightUnit::Kg).unwrap(), dec!(0.000001));
    }

    #[test]
    fn test_overflow_is_an_error() {
        let err = convert_length(dec!(1000000000), LengthUnit::M, LengthUnit::M, dec!(0.00000000000000000001))
            .unwrap_err();
        assert_eq!(err.code(), "ARITHMETIC_OVERFLOW");
        assert!(convert_length(Decimal::MAX, LengthUnit::Km, LengthUnit::Mm, Decimal::ZERO).is_err());
        assert!(convert_weight(Decimal::MAX, WeightUnit::T, WeightUnit::Mg).is_err());
        assert_eq!(round_half_up(Decimal::MAX, 0), Decimal::MAX);
    }

    #[test]
    fn test_round_half_up() {
        assert_eq!(round_half_up(dec!(0.1562500094), 6), dec!(0.156250));
        assert_eq!(round_half_up(dec!(0.0000005), 6), dec!(0.000001));
        assert_eq!(round_half_up(dec!(2.5), 0), dec!(3));
        assert_eq!(round_half_up(dec!(1.23449), 3), dec!(1.234));
    }

    #[test]
    fn test_round_half_up_fixed_decimals() {
        assert_eq!(round_half_up(dec!(0.15625), 6).to_string(), "0.156250");
        assert_eq!(round_half_up(dec!(3), 2).to_string(), "3.00");
    }

    #[test]
    fn test_round_half_up_idempotent() {
        let values = [
            dec!(0.15625),
            dec!(1.0000005),
            dec!(-2.5),
            dec!(-0.0000015),
            dec!(123456.789),
            dec!(0),
        ];
        for v in values {
            for d in [0u32, 1, 3, 6, 10] {
                let once = round_half_up(v, d);
                assert_eq!(round_half_up(once, d), once, "value {v}, decimals {d}");
            }
        }
    }
}
