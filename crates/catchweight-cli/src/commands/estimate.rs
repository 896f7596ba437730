use catchweight_core::error::CatchWeightError;
use catchweight_core::estimate::{Estimate, EstimateInput};
use std::path::PathBuf;

use crate::output;

pub async fn run(
    input_file: PathBuf,
    table_files: Vec<PathBuf>,
    presets: Vec<String>,
    settings_file: Option<PathBuf>,
    output_format: &str,
    verbose: bool,
) -> Result<(), CatchWeightError> {
    let engine = super::build_engine(table_files, presets, settings_file)?;

    // One input or an array of them
    let json_bytes = std::fs::read(&input_file)?;
    let value: serde_json::Value = serde_json::from_slice(&json_bytes)?;
    let inputs: Vec<EstimateInput> = if value.is_array() {
        serde_json::from_value(value)?
    } else {
        vec![serde_json::from_value(value)?]
    };

    let mut estimates: Vec<Estimate> = Vec::with_capacity(inputs.len());
    for input in &inputs {
        estimates.push(engine.estimate(input).await?);
    }

    match output_format {
        "json" => output::json::print_estimates(&estimates)?,
        _ => output::table::print_estimates(&inputs, &estimates, verbose),
    }

    Ok(())
}
