use super::parse_tables_str;
use super::schema::ConversionTables;
use crate::error::CatchWeightError;

const SAMPLE_JSON: &str = include_str!("../../../../tables/sample-conversions.json");

/// Embedded table sets.
pub const PRESETS: &[&str] = &["sample"];

/// Load an embedded table set by name.
pub fn load_preset(name: &str) -> Result<ConversionTables, CatchWeightError> {
    match name {
        "sample" => parse_tables_str(SAMPLE_JSON),
        _ => Err(CatchWeightError::TableInvalid(format!(
            "unknown preset '{}'. Available: {}",
            name,
            PRESETS.join(", ")
        ))),
    }
}
