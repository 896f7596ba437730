use catchweight_core::conversion::builtin;
use catchweight_core::conversion::schema::ConversionTables;
use catchweight_core::error::CatchWeightError;
use std::collections::HashSet;
use std::path::Path;

pub fn list() -> Result<(), CatchWeightError> {
    println!("Available embedded table sets:\n");
    for name in builtin::PRESETS {
        let tables = builtin::load_preset(name)?;
        println!("  {:<8} {} (v{})", name, tables.name, tables.version);
        if let Some(ref desc) = tables.description {
            println!("           {}", desc);
        }
        println!(
            "           {} weight-length, {} round-weight records",
            tables.weight_length.len(),
            tables.round_weight.len()
        );
        println!();
    }
    Ok(())
}

pub fn validate(file: &Path) -> Result<(), CatchWeightError> {
    let tables = catchweight_core::conversion::load_tables(file)?;

    println!("Tables '{}' (v{}) are valid.", tables.name, tables.version);
    println!("  Weight-length records: {}", tables.weight_length.len());
    println!("  Round-weight records: {}", tables.round_weight.len());
    println!("  Unsexed sex id: {}", tables.unsexed_sex_id);

    let warnings = lint(&tables);
    if !warnings.is_empty() {
        println!("\nWarnings:");
        for w in &warnings {
            println!("  - {}", w);
        }
    }

    Ok(())
}

/// Suspicious but valid content.
fn lint(tables: &ConversionTables) -> Vec<String> {
    let mut warnings = Vec::new();

    let mut seen = HashSet::new();
    for id in tables.weight_length.iter().filter_map(|r| r.id) {
        if !seen.insert(id) {
            warnings.push(format!("weight-length id {id} is used more than once"));
        }
    }
    let mut seen = HashSet::new();
    for id in tables.round_weight.iter().filter_map(|r| r.id) {
        if !seen.insert(id) {
            warnings.push(format!("round-weight id {id} is used more than once"));
        }
    }

    // Overlapping periods: only the latest start date is ever used.
    for (i, a) in tables.round_weight.iter().enumerate() {
        for b in &tables.round_weight[i + 1..] {
            let same_key = a.taxon_group_id == b.taxon_group_id
                && a.dressing_id == b.dressing_id
                && a.preserving_id == b.preserving_id
                && a.location_id == b.location_id;
            let from = a.start_date.max(b.start_date);
            if same_key && a.covers_date(from) && b.covers_date(from) {
                warnings.push(format!(
                    "round-weight records for taxon group {}, dressing {} overlap from {}",
                    a.taxon_group_id, a.dressing_id, from
                ));
            }
        }
    }

    warnings
}
