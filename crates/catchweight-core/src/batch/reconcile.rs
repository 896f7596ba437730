use super::tree::children_by_level;
use crate::model::{
    same_measurement, Batch, BatchGroup, MeasurementValue, Pmfm, SubBatch, ValueRepresentation,
    WeightResult, SAMPLING_BATCH_SUFFIX, SORTING_BATCH_INDIVIDUAL,
};
use std::sync::Arc;
use tracing::{debug, warn};

/// Structural identity of two groups: their ids when both are saved,
/// otherwise taxon group, taxon name and rank order.
pub fn same_group(a: &BatchGroup, b: &BatchGroup) -> bool {
    match (a.batch.id, b.batch.id) {
        (Some(x), Some(y)) => x == y,
        _ => a.batch.rank_order == b.batch.rank_order && same_species(a, b),
    }
}

fn same_species(a: &BatchGroup, b: &BatchGroup) -> bool {
    a.batch.taxon_group_id() == b.batch.taxon_group_id()
        && a.batch.taxon_name_id() == b.batch.taxon_name_id()
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LinkReport {
    pub linked: usize,
    /// Indexes of sub-batches left without parent.
    pub orphans: Vec<usize>,
}

/// Point every sub-batch at its group in a new list of available parents.
///
/// The group is found by identity, else by species. Sub-batches whose group
/// is gone lose their parent.
pub fn link_to_available_parents(
    sub_batches: &mut [SubBatch],
    parents: &[Arc<BatchGroup>],
) -> LinkReport {
    let mut report = LinkReport::default();
    for (i, sub) in sub_batches.iter_mut().enumerate() {
        let resolved = sub.parent_group.as_deref().and_then(|old| {
            parents
                .iter()
                .find(|p| same_group(p, old))
                .or_else(|| {
                    let has_species =
                        old.batch.taxon_group.is_some() || old.batch.taxon_name.is_some();
                    parents
                        .iter()
                        .find(|p| has_species && same_species(p, old))
                })
                .cloned()
        });
        match resolved {
            Some(parent) => {
                sub.parent_id = parent.batch.id;
                sub.parent_group = Some(parent);
                report.linked += 1;
            }
            None => {
                if let Some(old) = &sub.parent_group {
                    warn!(
                        "parent group {} of sub-batch {} is no longer available",
                        old.batch.label, sub.label
                    );
                }
                sub.parent_group = None;
                report.orphans.push(i);
            }
        }
    }
    report
}

/// Drop sub-batches without parent, except rows being edited.
pub fn delete_orphans(sub_batches: Vec<SubBatch>) -> Vec<SubBatch> {
    let before = sub_batches.len();
    let kept: Vec<SubBatch> = sub_batches
        .into_iter()
        .filter(|s| s.parent_group.is_some() || s.editing)
        .collect();
    if kept.len() < before {
        debug!("deleted {} orphan sub-batches", before - kept.len());
    }
    kept
}

/// Relink then delete orphans, as done when the parent list changes.
pub fn set_available_parents(
    mut sub_batches: Vec<SubBatch>,
    parents: &[Arc<BatchGroup>],
) -> (Vec<SubBatch>, LinkReport) {
    let report = link_to_available_parents(&mut sub_batches, parents);
    (delete_orphans(sub_batches), report)
}

/// Same parent, same taxon name and same value for every visible pmfm.
pub fn can_merge(a: &SubBatch, b: &SubBatch, pmfms: &[Pmfm]) -> bool {
    let same_parent = match (a.parent_group.as_deref(), b.parent_group.as_deref()) {
        (Some(x), Some(y)) => same_group(x, y),
        (None, None) => true,
        _ => false,
    };
    same_parent
        && a.taxon_name_id() == b.taxon_name_id()
        && pmfms.iter().filter(|p| !p.hidden).all(|p| {
            same_measurement(a.measurement_values.get(&p.id), b.measurement_values.get(&p.id))
        })
}

/// Fold a new record into an identical existing one by adding its individual
/// count. Returns the index of the row that absorbed it.
///
/// Counts below one count as one; the sum saturates at `i32::MAX`.
///
/// A weight computed for the previous count is cleared so it gets computed
/// again; a manual weight is kept.
pub fn merge_identical(new: &SubBatch, rows: &mut [SubBatch], pmfms: &[Pmfm]) -> Option<usize> {
    let index = rows.iter().position(|row| can_merge(new, row, pmfms))?;
    let row = &mut rows[index];
    row.individual_count = Some(counted(row.individual_count).saturating_add(counted(new.individual_count)));
    if let Some(unit) = row.weight.as_ref().filter(|w| w.computed).map(|w| w.unit) {
        row.weight = Some(WeightResult::cleared(unit));
    }
    debug!(
        "merged into sub-batch {} (now {:?} individuals)",
        row.label, row.individual_count
    );
    Some(index)
}

fn counted(count: Option<i32>) -> i32 {
    count.unwrap_or(1).max(1)
}

/// Add a record to a table, merging it with an identical row when `merge`
/// is set. New rows get the next rank order and its individual label.
pub fn add_sub_batch(rows: &mut Vec<SubBatch>, mut new: SubBatch, pmfms: &[Pmfm], merge: bool) -> usize {
    if new.individual_count.is_none() {
        new.individual_count = Some(1);
    }
    if merge {
        if let Some(index) = merge_identical(&new, rows, pmfms) {
            return index;
        }
    }
    let rank_order = rows.iter().map(|r| r.rank_order).max().unwrap_or(0) + 1;
    new.rank_order = rank_order;
    new.label = format!("{SORTING_BATCH_INDIVIDUAL}#{rank_order}");
    if let Some(parent) = &new.parent_group {
        new.parent_id = parent.batch.id;
    }
    rows.push(new);
    rows.len() - 1
}

/// Child of `batch` whose QV measurement equals `value`. Representations
/// are compared by their string form.
pub fn find_child_by_qv_value<'a>(
    batch: &'a Batch,
    value: &MeasurementValue,
    qv_pmfm: &Pmfm,
) -> Option<&'a Batch> {
    batch.children.iter().find(|child| {
        child
            .measurement_values
            .get(&qv_pmfm.id)
            .is_some_and(|v| v.loosely_equals(value))
    })
}

/// Flatten groups into one sub-batch per individual.
///
/// With a QV pmfm, each individual gets the value of the QV child it sits
/// under, in the requested representation.
pub fn explode_groups_to_sub_batches(
    groups: &[Arc<BatchGroup>],
    qv_pmfm: Option<&Pmfm>,
    representation: ValueRepresentation,
) -> Vec<SubBatch> {
    let mut sub_batches = Vec::new();
    for group in groups {
        match qv_pmfm {
            Some(qv) => {
                for qv_child in &group.batch.children {
                    let qv_value = qv_child.measurement_values.get(&qv.id);
                    for individual in children_by_level(qv_child, SORTING_BATCH_INDIVIDUAL) {
                        let mut sub = SubBatch::from_batch(individual, Some(Arc::clone(group)));
                        sub.parent_id = group.batch.id;
                        if let Some(value) = qv_value {
                            sub.measurement_values
                                .insert(qv.id, value.to_representation(representation, qv));
                        }
                        sub_batches.push(sub);
                    }
                }
            }
            None => {
                for individual in children_by_level(&group.batch, SORTING_BATCH_INDIVIDUAL) {
                    let mut sub = SubBatch::from_batch(individual, Some(Arc::clone(group)));
                    sub.parent_id = group.batch.id;
                    sub_batches.push(sub);
                }
            }
        }
    }
    sub_batches
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct FoldReport {
    pub assigned: usize,
    /// Records matching no group, or no QV child of their group.
    pub unmatched: Vec<SubBatch>,
}

/// Node receiving the individuals of `node`: its sampling child if any.
fn fold_target(node: &mut Batch) -> &mut Batch {
    let sampling_label = format!("{}{}", node.label, SAMPLING_BATCH_SUFFIX);
    match node.children.iter().position(|c| c.label == sampling_label) {
        Some(i) => &mut node.children[i],
        None => node,
    }
}

fn set_individuals(target: &mut Batch, sub_batches: Vec<SubBatch>, strip_pmfm: Option<i32>) -> usize {
    let count = sub_batches.len();
    target.children.retain(|c| !c.is_individual());
    for sub in sub_batches {
        let mut batch = sub.into_batch();
        batch.parent_id = target.id;
        if let Some(pmfm_id) = strip_pmfm {
            batch.measurement_values.remove(&pmfm_id);
        }
        target.children.push(batch);
    }
    count
}

/// Inverse of [`explode_groups_to_sub_batches`]: put each sub-batch back
/// under its group, or under the QV child matching its QV value.
///
/// Records that fit nowhere are returned in the report; the rest of the
/// fold still happens.
pub fn fold_sub_batches_into_parents(
    groups: &mut [BatchGroup],
    sub_batches: Vec<SubBatch>,
    qv_pmfm: Option<&Pmfm>,
) -> FoldReport {
    let mut report = FoldReport::default();
    let mut remaining = sub_batches;

    for group in groups.iter_mut() {
        let (mine, rest): (Vec<SubBatch>, Vec<SubBatch>) = remaining
            .into_iter()
            .partition(|s| s.parent_group.as_deref().is_some_and(|p| same_group(p, group)));
        remaining = rest;

        match qv_pmfm {
            Some(qv) => {
                let mut pending = mine;
                for qv_child in group.batch.children.iter_mut() {
                    let Some(qv_value) = qv_child.measurement_values.get(&qv.id).cloned() else {
                        continue;
                    };
                    let (matching, others): (Vec<SubBatch>, Vec<SubBatch>) =
                        pending.into_iter().partition(|s| {
                            s.measurement_values
                                .get(&qv.id)
                                .is_some_and(|v| v.loosely_equals(&qv_value))
                        });
                    pending = others;
                    report.assigned += set_individuals(fold_target(qv_child), matching, Some(qv.id));
                }
                if !pending.is_empty() {
                    warn!(
                        "{} sub-batches of {} match no {} value",
                        pending.len(),
                        group.batch.label,
                        qv.label
                    );
                    report.unmatched.extend(pending);
                }
            }
            None => {
                report.assigned += set_individuals(fold_target(&mut group.batch), mine, None);
            }
        }
        group.observed_individual_count = super::tree::observed_individual_count(&group.batch);
    }

    if !remaining.is_empty() {
        warn!("{} sub-batches have no parent group", remaining.len());
        report.unmatched.extend(remaining);
    }
    report
}
