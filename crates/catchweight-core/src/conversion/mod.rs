pub mod builtin;
pub mod cache;
pub mod schema;
pub mod table;

use crate::error::CatchWeightError;
use async_trait::async_trait;
use rust_decimal::Decimal;
use schema::{
    ConversionTables, RoundWeightConversion, RoundWeightQuery, WeightLengthConversion,
    WeightLengthQuery,
};
use std::path::Path;
use std::sync::Arc;

/// Source of conversion coefficients.
///
/// `Ok(None)` means no record applies. `Err` is reserved for failures of the
/// source itself (storage, transport) and is surfaced to the host.
#[async_trait]
pub trait ConversionLookup: Send + Sync {
    async fn find_weight_length_conversion(
        &self,
        query: &WeightLengthQuery,
    ) -> Result<Option<WeightLengthConversion>, CatchWeightError>;

    async fn find_round_weight_conversion(
        &self,
        query: &RoundWeightQuery,
    ) -> Result<Option<RoundWeightConversion>, CatchWeightError>;
}

#[async_trait]
impl<L: ConversionLookup + ?Sized> ConversionLookup for Arc<L> {
    async fn find_weight_length_conversion(
        &self,
        query: &WeightLengthQuery,
    ) -> Result<Option<WeightLengthConversion>, CatchWeightError> {
        (**self).find_weight_length_conversion(query).await
    }

    async fn find_round_weight_conversion(
        &self,
        query: &RoundWeightQuery,
    ) -> Result<Option<RoundWeightConversion>, CatchWeightError> {
        (**self).find_round_weight_conversion(query).await
    }
}

/// Load conversion tables from a JSON file.
pub fn load_tables(path: &Path) -> Result<ConversionTables, CatchWeightError> {
    let content = std::fs::read_to_string(path).map_err(|e| CatchWeightError::TableLoad {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    parse_tables(&content, path)
}

/// Parse conversion tables from a JSON string read from `source`.
pub fn parse_tables(json: &str, source: &Path) -> Result<ConversionTables, CatchWeightError> {
    let tables: ConversionTables =
        serde_json::from_str(json).map_err(|e| CatchWeightError::TableLoad {
            path: source.to_path_buf(),
            reason: e.to_string(),
        })?;
    validate_tables(&tables)?;
    Ok(tables)
}

pub fn parse_tables_str(json: &str) -> Result<ConversionTables, CatchWeightError> {
    let tables: ConversionTables = serde_json::from_str(json).map_err(CatchWeightError::Json)?;
    validate_tables(&tables)?;
    Ok(tables)
}

/// Merge several table files into one, first file first.
pub fn merge_tables(mut tables: Vec<ConversionTables>) -> Option<ConversionTables> {
    if tables.is_empty() {
        return None;
    }
    let mut merged = tables.remove(0);
    for t in tables {
        if t.unsexed_sex_id != merged.unsexed_sex_id {
            tracing::warn!(
                "tables '{}' use unsexed id {}, '{}' uses {}; keeping {}",
                merged.name,
                merged.unsexed_sex_id,
                t.name,
                t.unsexed_sex_id,
                merged.unsexed_sex_id
            );
        }
        merged.name = format!("{} + {}", merged.name, t.name);
        merged.weight_length.extend(t.weight_length);
        merged.round_weight.extend(t.round_weight);
    }
    Some(merged)
}

/// Validate that a table set is well-formed.
pub fn validate_tables(tables: &ConversionTables) -> Result<(), CatchWeightError> {
    if tables.weight_length.is_empty() && tables.round_weight.is_empty() {
        return Err(CatchWeightError::TableInvalid(format!(
            "'{}' has no weight-length nor round-weight record",
            tables.name
        )));
    }

    for (i, c) in tables.weight_length.iter().enumerate() {
        let what = c
            .id
            .map(|id| format!("weight-length #{id}"))
            .unwrap_or_else(|| format!("weight-length record {}", i + 1));
        if c.coefficient_a <= Decimal::ZERO {
            return Err(CatchWeightError::TableInvalid(format!(
                "{what}: coefficient_a must be positive"
            )));
        }
        if c.coefficient_b <= Decimal::ZERO {
            return Err(CatchWeightError::TableInvalid(format!(
                "{what}: coefficient_b must be positive"
            )));
        }
        for month in [c.start_month, c.end_month] {
            if !(1..=12).contains(&month) {
                return Err(CatchWeightError::TableInvalid(format!(
                    "{what}: month {month} out of range 1-12"
                )));
            }
        }
        if c.rectangle_labels.iter().any(|r| r.trim().is_empty()) {
            return Err(CatchWeightError::TableInvalid(format!(
                "{what}: blank rectangle label"
            )));
        }
    }

    for (i, c) in tables.round_weight.iter().enumerate() {
        let what = c
            .id
            .map(|id| format!("round-weight #{id}"))
            .unwrap_or_else(|| format!("round-weight record {}", i + 1));
        if c.conversion_coefficient <= Decimal::ZERO {
            return Err(CatchWeightError::TableInvalid(format!(
                "{what}: conversion_coefficient must be positive"
            )));
        }
        if c.end_date.is_some_and(|end| end < c.start_date) {
            return Err(CatchWeightError::TableInvalid(format!(
                "{what}: end_date before start_date"
            )));
        }
    }

    Ok(())
}
