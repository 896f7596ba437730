use catchweight_core::error::CatchWeightError;
use catchweight_core::units::{convert_length_str, convert_weight_str};
use rust_decimal::Decimal;

pub fn length(value: Decimal, from: &str, to: &str, precision: Decimal) -> Result<(), CatchWeightError> {
    let converted = convert_length_str(value, from, to, precision)?;
    println!("{value} {from} = {} {to}", converted.normalize());
    Ok(())
}

pub fn weight(value: Decimal, from: &str, to: &str) -> Result<(), CatchWeightError> {
    let converted = convert_weight_str(value, from, to)?;
    println!("{value} {from} = {} {to}", converted.normalize());
    Ok(())
}
