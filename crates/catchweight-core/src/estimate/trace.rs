use crate::model::WeightResult;
use serde::{Deserialize, Serialize};

pub const TRACE_SCHEMA_VERSION: &str = "1.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceStepType {
    ValidateInput,
    LengthConversion,
    WeightLength,
    RoundWeight,
    UnitConversion,
    Rounding,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceStep {
    pub step_type: TraceStepType,
    pub message: String,
}

/// Steps taken by one estimation, in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimateTrace {
    pub trace_schema_version: String,
    pub steps: Vec<TraceStep>,
    /// Why no weight was produced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skipped: Option<String>,
}

impl Default for EstimateTrace {
    fn default() -> Self {
        Self {
            trace_schema_version: TRACE_SCHEMA_VERSION.into(),
            steps: Vec::new(),
            skipped: None,
        }
    }
}

impl EstimateTrace {
    pub fn push(&mut self, step_type: TraceStepType, message: impl Into<String>) {
        self.steps.push(TraceStep {
            step_type,
            message: message.into(),
        });
    }

    pub fn skip(&mut self, step_type: TraceStepType, reason: impl Into<String>) {
        let reason = reason.into();
        self.push(step_type, reason.clone());
        self.skipped = Some(reason);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Estimate {
    pub weight: Option<WeightResult>,
    pub trace: EstimateTrace,
}

impl Estimate {
    pub(crate) fn skipped(trace: EstimateTrace) -> Self {
        Self {
            weight: None,
            trace,
        }
    }
}
