use crate::error::CatchWeightError;
use crate::model::{Pmfm, PmfmId, PmfmKind};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Referential ids and tuning knobs the engine depends on.
///
/// Every field has a default, so a settings file only lists what differs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Sex qualitative value used when the individual has no sex, and as the
    /// fallback of weight-length lookups.
    pub unsexed_sex_id: i32,
    pub fresh_preservation_id: i32,
    pub whole_dressing_id: i32,
    pub sex_pmfm_id: PmfmId,
    pub dressing_pmfm_id: PmfmId,
    pub preservation_pmfm_id: PmfmId,
    pub calculated_weight_length_pmfm_id: PmfmId,
    pub calculated_weight_length_method_id: i32,
    pub calculated_weight_length_sum_method_id: i32,
    /// Method of sums over weights of mixed origin.
    pub calculated_method_id: i32,
    pub default_max_decimals: u32,
    /// Decimals of rolled-up weights (grams).
    pub weight_sum_max_decimals: u32,
    pub lookup_timeout_ms: u64,
    /// Location levels holding statistical rectangles (ICES, GFCM).
    pub rectangle_location_level_ids: Vec<i32>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            unsexed_sex_id: 188,
            fresh_preservation_id: 332,
            whole_dressing_id: 381,
            sex_pmfm_id: 80,
            dressing_pmfm_id: 151,
            preservation_pmfm_id: 150,
            calculated_weight_length_pmfm_id: 122,
            calculated_weight_length_method_id: 47,
            calculated_weight_length_sum_method_id: 283,
            calculated_method_id: 4,
            default_max_decimals: 6,
            weight_sum_max_decimals: 3,
            lookup_timeout_ms: 10_000,
            rectangle_location_level_ids: vec![4, 5],
        }
    }
}

impl EngineSettings {
    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.lookup_timeout_ms)
    }

    /// Weight slot used when the caller's pmfms declare none.
    pub fn default_weight_pmfm(&self) -> Pmfm {
        Pmfm {
            id: self.calculated_weight_length_pmfm_id,
            label: "BATCH_CALCULATED_WEIGHT_LENGTH".into(),
            unit_label: Some("kg".into()),
            maximum_number_decimals: Some(self.default_max_decimals),
            method_id: Some(self.calculated_weight_length_method_id),
            kind: PmfmKind::Numeric,
            ..Pmfm::default()
        }
    }
}

/// Load settings from a JSON file. A missing file yields the defaults.
pub fn load_settings(path: &Path) -> Result<EngineSettings, CatchWeightError> {
    if !path.exists() {
        return Ok(EngineSettings::default());
    }
    let content = std::fs::read_to_string(path).map_err(|e| CatchWeightError::SettingsLoad {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    parse_settings_str(&content).map_err(|e| CatchWeightError::SettingsLoad {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

pub fn parse_settings_str(json: &str) -> Result<EngineSettings, CatchWeightError> {
    let settings: EngineSettings = serde_json::from_str(json)?;
    if settings.lookup_timeout_ms == 0 {
        return Err(CatchWeightError::SettingsInvalid(
            "lookup_timeout_ms must be greater than zero".into(),
        ));
    }
    Ok(settings)
}
