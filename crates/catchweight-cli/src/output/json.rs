use catchweight_core::error::CatchWeightError;
use catchweight_core::estimate::Estimate;
use catchweight_core::ReconcileResult;

pub fn print_estimates(estimates: &[Estimate]) -> Result<(), CatchWeightError> {
    let json = serde_json::to_string_pretty(estimates)?;
    println!("{json}");
    Ok(())
}

pub fn print_reconcile(result: &ReconcileResult) -> Result<(), CatchWeightError> {
    let json = serde_json::to_string_pretty(result)?;
    println!("{json}");
    Ok(())
}
