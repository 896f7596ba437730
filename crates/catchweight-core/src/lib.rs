pub mod batch;
pub mod context;
pub mod conversion;
pub mod error;
pub mod estimate;
pub mod model;
pub mod recompute;
pub mod settings;
pub mod units;

use batch::{
    compute_individual_count, compute_rank_order, compute_weight_length_sum,
    explode_groups_to_sub_batches, fold_sub_batches_into_parents,
};
use context::{ContextOverrides, DataContext, MeasurementContext};
use conversion::ConversionLookup;
use error::CatchWeightError;
use estimate::{
    length_pmfms, weight_pmfm, DressingContext, EstimateInput, LengthMeasurement,
    WeightEstimationEngine,
};
use model::{Batch, BatchGroup, MeasurementValue, Pmfm, PmfmId, ValueRepresentation, WeightResult};
use recompute::{next_weight_update, WeightUpdate};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// A catch batch tree with the pmfms describing its measurements.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileRequest {
    pub catch_batch: Batch,
    #[serde(default)]
    pub pmfms: Vec<Pmfm>,
    /// Pmfm splitting each group into qualitative-value children.
    #[serde(default)]
    pub qv_pmfm_id: Option<PmfmId>,
    /// Restrict the length used to this pmfm.
    #[serde(default)]
    pub length_pmfm_id: Option<PmfmId>,
    #[serde(default)]
    pub data_context: DataContext,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReconcileReport {
    pub sub_batches: usize,
    pub estimated: usize,
    pub skipped: usize,
    pub kept_manual: usize,
    pub unmatched: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileResult {
    pub catch_batch: Batch,
    pub context: MeasurementContext,
    pub report: ReconcileReport,
}

/// Main API entry point: recompute every individual weight of a catch tree.
///
/// The tree is flattened into sub-batches, each weight is estimated and
/// written back under the same rules as interactive edition (manual weights
/// kept), then the records are folded back and the tree normalised: individual
/// counts, rank orders and weight-length sums.
pub async fn reconcile_catch<L>(
    request: &ReconcileRequest,
    engine: &WeightEstimationEngine<L>,
    overrides: &ContextOverrides,
) -> Result<ReconcileResult, CatchWeightError>
where
    L: ConversionLookup + ?Sized,
{
    let settings = engine.settings();
    let mut report = ReconcileReport::default();

    let context = request.data_context.resolve(overrides, settings);
    if !context.has_rectangle() {
        report.warnings.push(CatchWeightError::NoRectangle.message_key());
    }
    let qv_pmfm = match request.qv_pmfm_id {
        Some(id) => {
            let found = request.pmfms.iter().find(|p| p.id == id);
            if found.is_none() {
                report.warnings.push(format!("qualitative pmfm {id} is not described"));
            }
            found
        }
        None => None,
    };
    let lengths = length_pmfms(&request.pmfms, request.length_pmfm_id);
    if lengths.is_empty() {
        report.warnings.push(CatchWeightError::NoLengthPmfm.message_key());
    }
    let weight_pmfm = weight_pmfm(&request.pmfms, settings);

    let groups: Vec<Arc<BatchGroup>> = BatchGroup::from_catch_batch(&request.catch_batch)
        .into_iter()
        .map(Arc::new)
        .collect();
    let mut sub_batches =
        explode_groups_to_sub_batches(&groups, qv_pmfm, ValueRepresentation::Model);
    report.sub_batches = sub_batches.len();

    for sub in sub_batches.iter_mut() {
        let length = LengthMeasurement::first_filled(&lengths, |p| {
            sub.measurement_values
                .get(&p.id)
                .and_then(MeasurementValue::as_decimal)
        });
        let estimate = match length {
            Some(length) => {
                let qv_value = qv_pmfm.and_then(|q| sub.measurement_values.get(&q.id));
                let dressing = sub.parent_group.as_deref().and_then(|group| {
                    DressingContext::from_parent(group, qv_value, qv_pmfm, settings)
                });
                let input = EstimateInput {
                    sex_id: sub
                        .measurement_values
                        .get(&settings.sex_pmfm_id)
                        .and_then(MeasurementValue::qualitative_id),
                    individual_count: sub.individual_count,
                    target_unit: weight_pmfm.weight_unit(),
                    dressing,
                    max_decimals: weight_pmfm.maximum_number_decimals,
                    ..EstimateInput::new(
                        length,
                        sub.taxon_name.as_ref().and_then(|t| t.reference_taxon_id),
                        context.clone(),
                    )
                };
                match engine.estimate_weight(&input).await {
                    Ok(weight) => weight,
                    Err(e) => {
                        warn!("sub-batch {}: {e}", sub.label);
                        report.warnings.push(format!("{}: {}", sub.label, e.message_key()));
                        None
                    }
                }
            }
            None => None,
        };

        if estimate.is_some() {
            report.estimated += 1;
        } else {
            report.skipped += 1;
        }
        match next_weight_update(sub.weight.as_ref(), estimate.as_ref()) {
            WeightUpdate::Keep => {
                if sub.weight.as_ref().is_some_and(WeightResult::is_manual) {
                    report.kept_manual += 1;
                }
            }
            WeightUpdate::Write(weight) => {
                if let Some(value) = weight.value {
                    sub.measurement_values
                        .insert(weight_pmfm.id, MeasurementValue::numeric(value));
                }
                sub.weight = Some(weight);
            }
            WeightUpdate::Clear => {
                sub.measurement_values.remove(&weight_pmfm.id);
                sub.weight = Some(WeightResult::cleared(weight_pmfm.weight_unit()));
            }
        }
    }

    let mut folded: Vec<BatchGroup> = groups.iter().map(|g| (**g).clone()).collect();
    let fold = fold_sub_batches_into_parents(&mut folded, sub_batches, qv_pmfm);
    report.unmatched = fold.unmatched.len();
    for sub in &fold.unmatched {
        report
            .warnings
            .push(format!("{}: no parent batch to fold into", sub.label));
    }

    let mut catch_batch = request.catch_batch.clone();
    let mut folded = folded.into_iter();
    for child in catch_batch.children.iter_mut() {
        if child.is_sorting_group() {
            if let Some(group) = folded.next() {
                *child = group.batch;
            }
        }
    }
    compute_individual_count(&mut catch_batch);
    compute_rank_order(&mut catch_batch);
    compute_weight_length_sum(&mut catch_batch, settings);

    info!(
        "reconciled {} sub-batches: {} estimated, {} skipped",
        report.sub_batches, report.estimated, report.skipped
    );
    Ok(ReconcileResult {
        catch_batch,
        context,
        report,
    })
}
