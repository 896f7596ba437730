use catchweight_core::context::ContextOverrides;
use catchweight_core::error::CatchWeightError;
use catchweight_core::ReconcileRequest;
use chrono::NaiveDate;
use std::path::PathBuf;

use crate::output;

/// Command-line overrides of the request.
pub struct ReconcileOptions {
    pub rectangle: Option<String>,
    pub date: Option<NaiveDate>,
    pub qv_pmfm_id: Option<i32>,
}

pub async fn run(
    input_file: PathBuf,
    table_files: Vec<PathBuf>,
    presets: Vec<String>,
    settings_file: Option<PathBuf>,
    options: ReconcileOptions,
    output_format: &str,
) -> Result<(), CatchWeightError> {
    let engine = super::build_engine(table_files, presets, settings_file)?;

    let json_bytes = std::fs::read(&input_file)?;
    let mut request: ReconcileRequest = serde_json::from_slice(&json_bytes)?;
    if options.qv_pmfm_id.is_some() {
        request.qv_pmfm_id = options.qv_pmfm_id;
    }

    let overrides = ContextOverrides {
        date: options.date,
        rectangle_label: options.rectangle,
        ..ContextOverrides::default()
    };
    let result = catchweight_core::reconcile_catch(&request, &engine, &overrides).await?;

    match output_format {
        "json" => output::json::print_reconcile(&result)?,
        _ => output::table::print_reconcile(&result),
    }

    Ok(())
}
