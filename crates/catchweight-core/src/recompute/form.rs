use super::field::{Field, FieldWatcher};
use crate::model::{
    BatchGroup, MeasurementValue, Pmfm, PmfmId, ReferentialRef, SubBatch, TaxonNameRef,
    WeightResult,
};
use std::collections::BTreeMap;
use std::sync::Arc;

pub type MeasurementField = Arc<dyn FieldWatcher<Option<MeasurementValue>>>;

/// A sub-batch opened for edition: one field per editable value.
pub struct SubBatchForm {
    pub id: Option<i32>,
    pub label: String,
    pub rank_order: i32,
    pub taxon_group: Option<ReferentialRef>,
    pub comments: Option<String>,
    pub taxon_name: Arc<Field<Option<TaxonNameRef>>>,
    pub individual_count: Arc<Field<Option<i32>>>,
    pub parent_group: Arc<Field<Option<Arc<BatchGroup>>>>,
    pub weight: Arc<Field<Option<WeightResult>>>,
    measurements: BTreeMap<PmfmId, Arc<Field<Option<MeasurementValue>>>>,
}

impl SubBatchForm {
    /// One measurement field per pmfm, plus any value the record already holds.
    pub fn from_sub_batch(sub: &SubBatch, pmfms: &[Pmfm]) -> Self {
        let mut measurements: BTreeMap<PmfmId, Arc<Field<Option<MeasurementValue>>>> = pmfms
            .iter()
            .map(|p| (p.id, Arc::new(Field::new(None))))
            .collect();
        for (id, value) in &sub.measurement_values {
            measurements
                .entry(*id)
                .or_insert_with(|| Arc::new(Field::new(None)))
                .set_value(Some(value.clone()));
        }
        Self {
            id: sub.id,
            label: sub.label.clone(),
            rank_order: sub.rank_order,
            taxon_group: sub.taxon_group.clone(),
            comments: sub.comments.clone(),
            taxon_name: Arc::new(Field::new(sub.taxon_name.clone())),
            individual_count: Arc::new(Field::new(sub.individual_count)),
            parent_group: Arc::new(Field::new(sub.parent_group.clone())),
            weight: Arc::new(Field::new(sub.weight.clone())),
            measurements,
        }
    }

    pub fn measurement(&self, pmfm_id: PmfmId) -> Option<Arc<Field<Option<MeasurementValue>>>> {
        self.measurements.get(&pmfm_id).cloned()
    }

    /// Field of a pmfm, created empty when the form has none.
    pub fn measurement_or_insert(&mut self, pmfm_id: PmfmId) -> Arc<Field<Option<MeasurementValue>>> {
        Arc::clone(
            self.measurements
                .entry(pmfm_id)
                .or_insert_with(|| Arc::new(Field::new(None))),
        )
    }

    /// Fields the weight depends on, and the fields it is written to.
    ///
    /// `length_pmfms` are in priority order: the first one holding a value
    /// is used.
    pub fn watched_fields(
        &mut self,
        length_pmfms: &[Pmfm],
        sex_pmfm_id: Option<PmfmId>,
        qv_pmfm_id: Option<PmfmId>,
        weight_pmfm_id: Option<PmfmId>,
    ) -> WatchedFields {
        let lengths = length_pmfms
            .iter()
            .map(|p| {
                let field: MeasurementField = self.measurement_or_insert(p.id);
                (p.clone(), field)
            })
            .collect();
        let mut optional = |id: Option<PmfmId>| -> Option<MeasurementField> {
            id.map(|id| -> MeasurementField { self.measurement_or_insert(id) })
        };
        let sex = optional(sex_pmfm_id);
        let qv = optional(qv_pmfm_id);
        let weight_measurement = optional(weight_pmfm_id);
        let parent_group: Arc<dyn FieldWatcher<Option<Arc<BatchGroup>>>> = self.parent_group.clone();
        WatchedFields {
            lengths,
            taxon_name: self.taxon_name.clone(),
            individual_count: self.individual_count.clone(),
            sex,
            parent_group: Some(parent_group),
            qv,
            weight: self.weight.clone(),
            weight_measurement,
        }
    }

    /// Current state of the form, as a record.
    pub fn to_sub_batch(&self) -> SubBatch {
        SubBatch {
            id: self.id,
            label: self.label.clone(),
            rank_order: self.rank_order,
            parent_id: self
                .parent_group
                .current_value()
                .and_then(|g| g.batch.id),
            individual_count: self.individual_count.current_value(),
            taxon_group: self.taxon_group.clone(),
            taxon_name: self.taxon_name.current_value(),
            measurement_values: self
                .measurements
                .iter()
                .filter_map(|(id, f)| f.current_value().map(|v| (*id, v)))
                .collect(),
            weight: self.weight.current_value(),
            comments: self.comments.clone(),
            parent_group: self.parent_group.current_value(),
            editing: true,
        }
    }
}

/// Watchers the recomputation listens to, and the ones it writes.
pub struct WatchedFields {
    /// Priority order.
    pub lengths: Vec<(Pmfm, MeasurementField)>,
    pub taxon_name: Arc<dyn FieldWatcher<Option<TaxonNameRef>>>,
    pub individual_count: Arc<dyn FieldWatcher<Option<i32>>>,
    pub sex: Option<MeasurementField>,
    pub parent_group: Option<Arc<dyn FieldWatcher<Option<Arc<BatchGroup>>>>>,
    pub qv: Option<MeasurementField>,
    pub weight: Arc<dyn FieldWatcher<Option<WeightResult>>>,
    /// Measurement slot mirroring the weight value.
    pub weight_measurement: Option<MeasurementField>,
}
