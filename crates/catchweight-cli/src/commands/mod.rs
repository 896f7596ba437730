pub mod convert;
pub mod estimate;
pub mod reconcile;
pub mod tables;

use catchweight_core::conversion::builtin;
use catchweight_core::conversion::cache::CachedLookup;
use catchweight_core::conversion::schema::ConversionTables;
use catchweight_core::error::CatchWeightError;
use catchweight_core::estimate::WeightEstimationEngine;
use catchweight_core::settings::{load_settings, EngineSettings};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

pub type Engine = WeightEstimationEngine<CachedLookup<ConversionTables>>;

/// Build an engine over the given table files and presets, with a
/// per-run cache in front of the tables.
pub fn build_engine(
    table_files: Vec<PathBuf>,
    presets: Vec<String>,
    settings_file: Option<PathBuf>,
) -> Result<Engine, CatchWeightError> {
    // Default to the embedded sample if nothing is given.
    let effective_presets = if presets.is_empty() && table_files.is_empty() {
        builtin::PRESETS.iter().map(|s| s.to_string()).collect()
    } else {
        presets
    };

    let mut tables = Vec::new();
    for preset in &effective_presets {
        tables.push(builtin::load_preset(preset)?);
    }
    for path in &table_files {
        tables.push(catchweight_core::conversion::load_tables(path)?);
    }
    let tables = catchweight_core::conversion::merge_tables(tables)
        .ok_or_else(|| CatchWeightError::TableInvalid("no conversion tables specified".into()))?;
    info!(
        "using tables '{}': {} weight-length, {} round-weight records",
        tables.name,
        tables.weight_length.len(),
        tables.round_weight.len()
    );

    let settings = match settings_file {
        Some(path) => load_settings(&path)?,
        None => EngineSettings::default(),
    };

    Ok(WeightEstimationEngine::new(
        Arc::new(CachedLookup::new(tables)),
        settings,
    ))
}
