//! Walks and normalisation of a catch batch tree.

use crate::model::{Batch, QualityFlag, WeightResult, SORTING_BATCH, SORTING_BATCH_INDIVIDUAL};
use crate::settings::EngineSettings;
use crate::units::{round_half_up, WeightUnit};
use rust_decimal::Decimal;
use tracing::warn;

/// Descendants with the given acquisition level. The walk does not descend
/// below a matching node.
pub fn children_by_level<'a>(batch: &'a Batch, acquisition_level: &str) -> Vec<&'a Batch> {
    let mut found = Vec::new();
    collect_by_level(batch, acquisition_level, &mut found);
    found
}

fn collect_by_level<'a>(batch: &'a Batch, acquisition_level: &str, found: &mut Vec<&'a Batch>) {
    for child in &batch.children {
        if child.has_level(acquisition_level) {
            found.push(child);
        } else {
            collect_by_level(child, acquisition_level, found);
        }
    }
}

pub fn has_children_with_level(batch: &Batch, acquisition_level: &str) -> bool {
    batch
        .children
        .iter()
        .any(|c| c.has_level(acquisition_level) || has_children_with_level(c, acquisition_level))
}

pub fn sampling_child(batch: &Batch) -> Option<&Batch> {
    let label = batch.sampling_label();
    batch.children.iter().find(|c| c.label == label)
}

/// Sampling child of `batch`, created first when missing.
pub fn get_or_create_sampling_child(batch: &mut Batch) -> &mut Batch {
    let label = batch.sampling_label();
    let index = match batch.children.iter().position(|c| c.label == label) {
        Some(i) => i,
        None => {
            batch.children.push(Batch {
                label,
                rank_order: 1,
                parent_id: batch.id,
                ..Batch::default()
            });
            batch.children.len() - 1
        }
    };
    &mut batch.children[index]
}

/// Sort children (saved ones by id, new ones last), renumber them from 1
/// and regenerate group, individual and sampling labels, recursively.
///
/// A renumbered `SORTING_BATCH#n` group carries its qualitative children
/// (`SORTING_BATCH#n.LAN`) along to the new prefix.
pub fn compute_rank_order(batch: &mut Batch) {
    if batch.label.is_empty() || batch.children.is_empty() {
        return;
    }
    batch
        .children
        .sort_by_key(|c| (c.id.is_none(), c.id.unwrap_or(0), c.rank_order));

    let sampling_label = batch.sampling_label();
    for (i, child) in batch.children.iter_mut().enumerate() {
        child.rank_order = i as i32 + 1;
        if child.is_sampling() {
            child.label = sampling_label.clone();
        } else if child.is_individual() {
            child.label = format!("{SORTING_BATCH_INDIVIDUAL}#{}", child.rank_order);
        } else if is_group_label(&child.label) {
            let old = std::mem::replace(
                &mut child.label,
                format!("{SORTING_BATCH}#{}", child.rank_order),
            );
            if old != child.label {
                relabel_descendants(child, &old);
            }
        }
        compute_rank_order(child);
    }
}

fn is_group_label(label: &str) -> bool {
    label
        .strip_prefix(SORTING_BATCH)
        .and_then(|rest| rest.strip_prefix('#'))
        .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
}

fn relabel_descendants(batch: &mut Batch, old_prefix: &str) {
    for child in batch.children.iter_mut() {
        let Some(rest) = child.label.strip_prefix(old_prefix) else {
            continue;
        };
        if !rest.starts_with('.') {
            continue;
        }
        let label = format!("{}{rest}", batch.label);
        let old = std::mem::replace(&mut child.label, label);
        relabel_descendants(child, &old);
    }
}

/// Individuals measured below a batch, counting each record's individual
/// count (one when unset). `None` when there are none.
pub fn observed_individual_count(batch: &Batch) -> Option<i32> {
    let individuals = children_by_level(batch, SORTING_BATCH_INDIVIDUAL);
    if individuals.is_empty() {
        return None;
    }
    Some(individuals.iter().map(|b| b.individual_count.unwrap_or(1)).sum())
}

/// Reconcile declared and observed individual counts, bottom-up.
///
/// A sampling batch takes the sum of its individuals. A sorting batch
/// declaring fewer individuals than measured is flagged bad; one declaring
/// none, or more, gets a sampling batch holding the measured individuals.
pub fn compute_individual_count(batch: &mut Batch) {
    if batch.label.is_empty() || batch.children.is_empty() {
        return;
    }

    let mut sum: Option<i32> = None;
    for child in batch.children.iter_mut() {
        compute_individual_count(child);
        if child.is_individual() {
            sum = Some(sum.unwrap_or(0) + child.individual_count.unwrap_or(1));
        }
    }

    if batch.is_sampling() {
        batch.individual_count = sum.filter(|s| *s != 0);
        return;
    }
    let Some(sum) = sum else {
        return;
    };
    if !batch.label.starts_with(SORTING_BATCH) {
        return;
    }

    match batch.individual_count {
        Some(declared) if declared < sum => {
            warn!(
                "batch {} declares {declared} individuals but {sum} were measured",
                batch.label
            );
            batch.quality_flag = QualityFlag::Bad;
        }
        Some(declared) if declared == sum => {}
        _ => {
            let sampling = Batch {
                label: batch.sampling_label(),
                rank_order: 1,
                parent_id: batch.id,
                individual_count: Some(sum),
                children: std::mem::take(&mut batch.children),
                ..Batch::default()
            };
            batch.children = vec![sampling];
        }
    }
}

/// Roll individual weights up into `children_weight` of every
/// non-individual node (kilograms). Returns the sum set on `batch`.
///
/// A node gets no sum when one of its individuals has no weight, or when
/// the total is zero. Sums of weight-length estimates only are tagged with
/// the weight-length sum method, any other mix with the calculated method.
pub fn compute_weight_length_sum(batch: &mut Batch, settings: &EngineSettings) -> Option<WeightResult> {
    if batch.is_individual() && batch.children.is_empty() {
        return None;
    }
    roll_up(batch, settings)?;
    batch.children_weight.clone()
}

struct Rollup {
    total: Decimal,
    method_ids: Vec<Option<i32>>,
}

fn roll_up(batch: &mut Batch, settings: &EngineSettings) -> Option<Rollup> {
    batch.children_weight = None;
    let mut exhaustive = true;
    let mut total = Decimal::ZERO;
    let mut method_ids: Vec<Option<i32>> = Vec::new();

    for child in batch.children.iter_mut() {
        if !child.children.is_empty() {
            // Subtrees without a sum are left out.
            if let Some(sub) = roll_up(child, settings) {
                total = total.checked_add(sub.total)?;
                for id in sub.method_ids {
                    if !method_ids.contains(&id) {
                        method_ids.push(id);
                    }
                }
            }
        } else if child.is_individual() {
            let weight = child.weight.as_ref();
            match weight.and_then(|w| w.value_in(WeightUnit::Kg)) {
                Some(value) => {
                    total = total.checked_add(value)?;
                    let id = weight.and_then(|w| w.method_id);
                    if !method_ids.contains(&id) {
                        method_ids.push(id);
                    }
                }
                None => exhaustive = false,
            }
        }
    }

    if !exhaustive || total.is_zero() {
        return None;
    }
    let method_id = if method_ids == [Some(settings.calculated_weight_length_method_id)] {
        settings.calculated_weight_length_sum_method_id
    } else {
        settings.calculated_method_id
    };
    batch.children_weight = Some(WeightResult::calculated(
        round_half_up(total, settings.weight_sum_max_decimals),
        WeightUnit::Kg,
        method_id,
    ));
    Some(Rollup { total, method_ids })
}
