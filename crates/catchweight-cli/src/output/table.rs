use catchweight_core::estimate::{Estimate, EstimateInput};
use catchweight_core::model::{Batch, MeasurementValue, WeightResult};
use catchweight_core::ReconcileResult;

pub fn print_estimates(inputs: &[EstimateInput], estimates: &[Estimate], verbose: bool) {
    for (i, (input, estimate)) in inputs.iter().zip(estimates).enumerate() {
        let length = match input.length.value {
            Some(v) => format!("{} {}", v.normalize(), input.length.unit),
            None => "-".to_string(),
        };
        let taxon = input
            .reference_taxon_id
            .map(|t| t.to_string())
            .unwrap_or_else(|| "-".into());
        let rectangle = if input.context.rectangle_label.is_empty() {
            "-"
        } else {
            input.context.rectangle_label.as_str()
        };
        let result = match (&estimate.weight, &estimate.trace.skipped) {
            (Some(w), _) => format_weight(w),
            (None, Some(reason)) => format!("no estimate ({reason})"),
            (None, None) => "no estimate".to_string(),
        };
        println!(
            "  #{:<3} taxon {:<6} {:<10} {} {}  -> {}",
            i + 1,
            taxon,
            length,
            rectangle,
            input.context.date,
            result
        );

        if verbose {
            for step in &estimate.trace.steps {
                println!("        {:?}: {}", step.step_type, step.message);
            }
            println!();
        }
    }
}

pub fn print_reconcile(result: &ReconcileResult) {
    let ctx = &result.context;
    println!(
        "Context: {} rectangle {}{}\n",
        ctx.date,
        if ctx.rectangle_label.is_empty() {
            "-"
        } else {
            ctx.rectangle_label.as_str()
        },
        ctx.country_id
            .map(|c| format!(" country {c}"))
            .unwrap_or_default()
    );

    print_batch(&result.catch_batch, 1);
    println!();

    let report = &result.report;
    println!(
        "  Sub-batches: {}  estimated: {}  skipped: {}  manual kept: {}  unmatched: {}",
        report.sub_batches, report.estimated, report.skipped, report.kept_manual, report.unmatched
    );
    if !report.warnings.is_empty() {
        println!("\nWarnings:");
        for w in &report.warnings {
            println!("  - {}", w);
        }
    }
}

fn print_batch(batch: &Batch, depth: usize) {
    let indent = "  ".repeat(depth);
    let mut line = format!("{indent}{}", batch.label);
    if let Some(count) = batch.individual_count {
        line.push_str(&format!("  n={count}"));
    }
    if !batch.measurement_values.is_empty() {
        let values: Vec<String> = batch
            .measurement_values
            .iter()
            .map(|(id, v)| format!("{id}={}", format_value(v)))
            .collect();
        line.push_str(&format!("  [{}]", values.join(", ")));
    }
    if let Some(w) = batch.weight.as_ref().filter(|w| w.value.is_some()) {
        line.push_str(&format!("  weight {}", format_weight(w)));
    }
    if let Some(w) = &batch.children_weight {
        line.push_str(&format!("  sum {}", format_weight(w)));
    }
    println!("{line}");

    for child in &batch.children {
        print_batch(child, depth + 1);
    }
}

fn format_weight(weight: &WeightResult) -> String {
    let value = weight
        .value
        .map(|v| v.to_string())
        .unwrap_or_else(|| "-".into());
    let origin = if weight.computed { " (computed)" } else { "" };
    format!("{value} {}{origin}", weight.unit)
}

fn format_value(value: &MeasurementValue) -> String {
    match value {
        MeasurementValue::Numeric { value } => value.normalize().to_string(),
        MeasurementValue::Model { id } => format!("#{id}"),
        MeasurementValue::Form { reference } => reference.label.clone(),
        MeasurementValue::Text { value } => value.clone(),
    }
}
