use crate::units::{convert_weight, is_length_unit_symbol, is_weight_unit_symbol, WeightUnit};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;

pub type PmfmId = i32;

/// Acquisition level of taxon-level batch groups.
pub const SORTING_BATCH: &str = "SORTING_BATCH";
/// Acquisition level of individual (sub-batch) measures.
pub const SORTING_BATCH_INDIVIDUAL: &str = "SORTING_BATCH_INDIVIDUAL";
/// Appended to a batch label to name its sampling child.
pub const SAMPLING_BATCH_SUFFIX: &str = ".%";

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReferentialRef {
    #[serde(default)]
    pub id: Option<i32>,
    #[serde(default)]
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ReferentialRef {
    pub fn new(id: i32, label: &str) -> Self {
        Self {
            id: Some(id),
            label: label.to_string(),
            name: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaxonNameRef {
    #[serde(default)]
    pub id: Option<i32>,
    #[serde(default)]
    pub label: String,
    /// Key used to look up conversion coefficients.
    #[serde(default)]
    pub reference_taxon_id: Option<i32>,
}

/// A measurement value, in one of its two qualitative representations
/// (object reference for editing, raw id for storage) or as a plain value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MeasurementValue {
    Form { reference: ReferentialRef },
    Model { id: i32 },
    Numeric { value: Decimal },
    Text { value: String },
}

impl MeasurementValue {
    pub fn numeric(value: Decimal) -> Self {
        MeasurementValue::Numeric { value }
    }

    /// Qualitative value id, whatever the representation.
    pub fn qualitative_id(&self) -> Option<i32> {
        match self {
            MeasurementValue::Form { reference } => reference.id,
            MeasurementValue::Model { id } => Some(*id),
            MeasurementValue::Numeric { value } => {
                if value.fract().is_zero() {
                    value.to_i32()
                } else {
                    None
                }
            }
            MeasurementValue::Text { value } => value.trim().parse().ok(),
        }
    }

    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            MeasurementValue::Numeric { value } => Some(*value),
            MeasurementValue::Text { value } => Decimal::from_str(value.trim()).ok(),
            MeasurementValue::Model { id } => Some(Decimal::from(*id)),
            MeasurementValue::Form { .. } => None,
        }
    }

    /// Storage representation: references collapse to their id.
    pub fn to_model(&self) -> MeasurementValue {
        match self {
            MeasurementValue::Form { reference } => match reference.id {
                Some(id) => MeasurementValue::Model { id },
                None => MeasurementValue::Text {
                    value: reference.label.clone(),
                },
            },
            other => other.clone(),
        }
    }

    /// Editing representation: ids expand to the qualitative value declared
    /// by the pmfm (or a bare reference when the pmfm does not list it).
    pub fn to_form(&self, pmfm: &Pmfm) -> MeasurementValue {
        match self {
            MeasurementValue::Form { .. } => self.clone(),
            other => match other.qualitative_id() {
                Some(id) if pmfm.is_qualitative() => MeasurementValue::Form {
                    reference: pmfm
                        .qualitative_value(id)
                        .cloned()
                        .unwrap_or_else(|| ReferentialRef::new(id, &id.to_string())),
                },
                _ => other.clone(),
            },
        }
    }

    pub fn to_representation(&self, representation: ValueRepresentation, pmfm: &Pmfm) -> Self {
        match representation {
            ValueRepresentation::Form => self.to_form(pmfm),
            ValueRepresentation::Model => self.to_model(),
        }
    }

    /// String form used to compare qualitative values across
    /// representations ("190", 190 and a reference with id 190 are equal).
    pub fn qv_key(&self) -> Option<String> {
        match self {
            MeasurementValue::Form { reference } => reference.id.map(|id| id.to_string()),
            MeasurementValue::Model { id } => Some(id.to_string()),
            MeasurementValue::Numeric { value } => Some(value.normalize().to_string()),
            MeasurementValue::Text { value } => {
                let trimmed = value.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            }
        }
    }

    pub fn loosely_equals(&self, other: &MeasurementValue) -> bool {
        match (self.qv_key(), other.qv_key()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }
}

/// Exact comparison of two optional values, once both are in storage form.
pub fn same_measurement(a: Option<&MeasurementValue>, b: Option<&MeasurementValue>) -> bool {
    a.map(MeasurementValue::to_model) == b.map(MeasurementValue::to_model)
}

pub type MeasurementValues = BTreeMap<PmfmId, MeasurementValue>;

/// Declared representation of a measurement map.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueRepresentation {
    Form,
    #[default]
    Model,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PmfmKind {
    #[default]
    Numeric,
    QualitativeValue,
    String,
    Boolean,
}

/// Parameter/matrix/fraction/method: describes one measurement slot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Pmfm {
    pub id: PmfmId,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub unit_label: Option<String>,
    /// Smallest representable increment of a numeric value.
    #[serde(default)]
    pub precision: Option<Decimal>,
    #[serde(default)]
    pub maximum_number_decimals: Option<u32>,
    #[serde(default)]
    pub method_id: Option<i32>,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub kind: PmfmKind,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub qualitative_values: Vec<ReferentialRef>,
}

impl Pmfm {
    pub fn is_length(&self) -> bool {
        self.kind == PmfmKind::Numeric
            && (self.unit_label.as_deref().is_some_and(is_length_unit_symbol)
                || self.label.to_uppercase().contains("LENGTH"))
    }

    pub fn is_weight(&self) -> bool {
        self.kind == PmfmKind::Numeric
            && (self.unit_label.as_deref().is_some_and(is_weight_unit_symbol)
                || self.label.to_uppercase().ends_with("WEIGHT"))
    }

    pub fn is_qualitative(&self) -> bool {
        self.kind == PmfmKind::QualitativeValue
    }

    pub fn qualitative_value(&self, id: i32) -> Option<&ReferentialRef> {
        self.qualitative_values.iter().find(|qv| qv.id == Some(id))
    }

    /// Declared weight unit, `kg` when absent or not a weight symbol.
    pub fn weight_unit(&self) -> WeightUnit {
        self.unit_label
            .as_deref()
            .and_then(|u| u.parse().ok())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeightResult {
    pub value: Option<Decimal>,
    #[serde(default)]
    pub unit: WeightUnit,
    #[serde(default)]
    pub method_id: Option<i32>,
    /// Derived by calculation (never typed by the user).
    #[serde(default)]
    pub computed: bool,
    #[serde(default)]
    pub estimated: bool,
}

impl WeightResult {
    pub fn calculated(value: Decimal, unit: WeightUnit, method_id: i32) -> Self {
        Self {
            value: Some(value),
            unit,
            method_id: Some(method_id),
            computed: true,
            estimated: false,
        }
    }

    pub fn manual(value: Decimal, unit: WeightUnit) -> Self {
        Self {
            value: Some(value),
            unit,
            method_id: None,
            computed: false,
            estimated: false,
        }
    }

    pub fn cleared(unit: WeightUnit) -> Self {
        Self {
            value: None,
            unit,
            method_id: None,
            computed: false,
            estimated: false,
        }
    }

    /// A value entered by hand; automatic computation must leave it alone.
    pub fn is_manual(&self) -> bool {
        !self.computed && self.value.is_some()
    }

    pub fn value_in(&self, unit: WeightUnit) -> Option<Decimal> {
        self.value.and_then(|v| convert_weight(v, self.unit, unit).ok())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityFlag {
    #[default]
    NotQualified,
    Good,
    Bad,
}

/// A node of the catch batch tree.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    #[serde(default)]
    pub id: Option<i32>,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub rank_order: i32,
    #[serde(default)]
    pub parent_id: Option<i32>,
    #[serde(default)]
    pub individual_count: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub taxon_group: Option<ReferentialRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub taxon_name: Option<TaxonNameRef>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub measurement_values: MeasurementValues,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<WeightResult>,
    /// Sum of the computed weights of the individual descendants.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children_weight: Option<WeightResult>,
    #[serde(default)]
    pub quality_flag: QualityFlag,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Batch>,
}

impl Batch {
    pub fn has_level(&self, acquisition_level: &str) -> bool {
        self.label
            .strip_prefix(acquisition_level)
            .is_some_and(|rest| rest.starts_with('#'))
    }

    pub fn is_individual(&self) -> bool {
        self.has_level(SORTING_BATCH_INDIVIDUAL)
    }

    pub fn is_sorting_group(&self) -> bool {
        self.has_level(SORTING_BATCH)
    }

    pub fn is_sampling(&self) -> bool {
        self.label.ends_with(SAMPLING_BATCH_SUFFIX)
    }

    pub fn sampling_label(&self) -> String {
        format!("{}{}", self.label, SAMPLING_BATCH_SUFFIX)
    }

    pub fn taxon_group_id(&self) -> Option<i32> {
        self.taxon_group.as_ref().and_then(|t| t.id)
    }

    pub fn taxon_name_id(&self) -> Option<i32> {
        self.taxon_name.as_ref().and_then(|t| t.id)
    }
}

/// A taxon-level node, optionally split into qualitative-value children.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchGroup {
    #[serde(flatten)]
    pub batch: Batch,
    #[serde(default)]
    pub observed_individual_count: Option<i32>,
}

impl BatchGroup {
    pub fn from_batch(batch: Batch) -> Self {
        let observed_individual_count = crate::batch::tree::observed_individual_count(&batch);
        Self {
            batch,
            observed_individual_count,
        }
    }

    /// Groups of a catch batch (children labelled `SORTING_BATCH#n`).
    pub fn from_catch_batch(catch_batch: &Batch) -> Vec<BatchGroup> {
        catch_batch
            .children
            .iter()
            .filter(|b| b.is_sorting_group())
            .cloned()
            .map(BatchGroup::from_batch)
            .collect()
    }
}

/// An individual-level catch record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubBatch {
    #[serde(default)]
    pub id: Option<i32>,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub rank_order: i32,
    #[serde(default)]
    pub parent_id: Option<i32>,
    #[serde(default)]
    pub individual_count: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub taxon_group: Option<ReferentialRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub taxon_name: Option<TaxonNameRef>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub measurement_values: MeasurementValues,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<WeightResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,
    /// Back-reference into the current set of available parents.
    #[serde(skip)]
    pub parent_group: Option<Arc<BatchGroup>>,
    /// Row currently open for edition.
    #[serde(skip)]
    pub editing: bool,
}

impl SubBatch {
    pub fn from_batch(batch: &Batch, parent_group: Option<Arc<BatchGroup>>) -> Self {
        Self {
            id: batch.id,
            label: batch.label.clone(),
            rank_order: batch.rank_order,
            parent_id: batch.parent_id,
            individual_count: batch.individual_count,
            taxon_group: batch.taxon_group.clone(),
            taxon_name: batch.taxon_name.clone(),
            measurement_values: batch.measurement_values.clone(),
            weight: batch.weight.clone(),
            comments: batch.comments.clone(),
            parent_group,
            editing: false,
        }
    }

    /// Tree node for this record. The parent back-reference is dropped.
    pub fn into_batch(self) -> Batch {
        Batch {
            id: self.id,
            label: self.label,
            rank_order: self.rank_order,
            parent_id: self.parent_id,
            individual_count: self.individual_count,
            taxon_group: self.taxon_group,
            taxon_name: self.taxon_name,
            measurement_values: self.measurement_values,
            weight: self.weight,
            comments: self.comments,
            ..Batch::default()
        }
    }

    pub fn taxon_name_id(&self) -> Option<i32> {
        self.taxon_name.as_ref().and_then(|t| t.id)
    }
}
