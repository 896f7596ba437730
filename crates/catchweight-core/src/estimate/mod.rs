pub mod engine;
pub mod trace;

pub use engine::WeightEstimationEngine;
pub use trace::{Estimate, EstimateTrace, TraceStep, TraceStepType};

use crate::batch::find_child_by_qv_value;
use crate::context::MeasurementContext;
use crate::model::{BatchGroup, MeasurementValue, Pmfm, PmfmId};
use crate::settings::EngineSettings;
use crate::units::WeightUnit;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LengthMeasurement {
    pub pmfm_id: PmfmId,
    #[serde(default)]
    pub value: Option<Decimal>,
    /// Unit symbol, as declared by the length pmfm.
    pub unit: String,
    /// Smallest representable increment.
    pub precision: Decimal,
}

impl LengthMeasurement {
    /// A pmfm without declared precision is measured to the unit.
    pub fn from_pmfm(pmfm: &Pmfm, value: Option<Decimal>) -> Self {
        Self {
            pmfm_id: pmfm.id,
            value,
            unit: pmfm.unit_label.clone().unwrap_or_default(),
            precision: pmfm.precision.unwrap_or(Decimal::ONE),
        }
    }

    /// First length, in priority order, holding a value.
    pub fn first_filled<F>(length_pmfms: &[Pmfm], value_of: F) -> Option<Self>
    where
        F: Fn(&Pmfm) -> Option<Decimal>,
    {
        length_pmfms
            .iter()
            .find_map(|pmfm| value_of(pmfm).map(|v| Self::from_pmfm(pmfm, Some(v))))
    }
}

/// How the parent group was processed on board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DressingContext {
    pub taxon_group_id: i32,
    pub dressing_id: i32,
    /// Fresh when unset.
    #[serde(default)]
    pub preserving_id: Option<i32>,
}

impl DressingContext {
    /// Dressing of the node a sub-batch belongs to: the QV child selected by
    /// the sub-batch QV value, or the group itself.
    pub fn from_parent(
        group: &BatchGroup,
        qv_value: Option<&MeasurementValue>,
        qv_pmfm: Option<&Pmfm>,
        settings: &EngineSettings,
    ) -> Option<Self> {
        let taxon_group_id = group.batch.taxon_group_id()?;
        let node = match (qv_value, qv_pmfm) {
            (Some(value), Some(pmfm)) => {
                find_child_by_qv_value(&group.batch, value, pmfm).unwrap_or(&group.batch)
            }
            _ => &group.batch,
        };
        let dressing_id = node
            .measurement_values
            .get(&settings.dressing_pmfm_id)
            .and_then(MeasurementValue::qualitative_id)?;
        let preserving_id = node
            .measurement_values
            .get(&settings.preservation_pmfm_id)
            .and_then(MeasurementValue::qualitative_id);
        Some(Self {
            taxon_group_id,
            dressing_id,
            preserving_id,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimateInput {
    pub length: LengthMeasurement,
    #[serde(default)]
    pub reference_taxon_id: Option<i32>,
    pub context: MeasurementContext,
    #[serde(default)]
    pub sex_id: Option<i32>,
    /// One when unset.
    #[serde(default)]
    pub individual_count: Option<i32>,
    #[serde(default)]
    pub target_unit: WeightUnit,
    #[serde(default)]
    pub dressing: Option<DressingContext>,
    /// Settings default when unset.
    #[serde(default)]
    pub max_decimals: Option<u32>,
}

impl EstimateInput {
    pub fn new(
        length: LengthMeasurement,
        reference_taxon_id: Option<i32>,
        context: MeasurementContext,
    ) -> Self {
        Self {
            length,
            reference_taxon_id,
            context,
            sex_id: None,
            individual_count: None,
            target_unit: WeightUnit::Kg,
            dressing: None,
            max_decimals: None,
        }
    }
}

/// Length pmfms in priority order: the one explicitly asked for, or every
/// length pmfm in declaration order.
pub fn length_pmfms(pmfms: &[Pmfm], length_pmfm_id: Option<PmfmId>) -> Vec<Pmfm> {
    pmfms
        .iter()
        .filter(|p| match length_pmfm_id {
            Some(id) => p.id == id,
            None => p.is_length(),
        })
        .cloned()
        .collect()
}

/// Slot receiving computed weights: a weight pmfm computed by the
/// weight-length method, else the settings default.
pub fn weight_pmfm(pmfms: &[Pmfm], settings: &EngineSettings) -> Pmfm {
    pmfms
        .iter()
        .find(|p| {
            p.id == settings.calculated_weight_length_pmfm_id
                || (p.is_weight() && p.method_id == Some(settings.calculated_weight_length_method_id))
        })
        .cloned()
        .unwrap_or_else(|| settings.default_weight_pmfm())
}
