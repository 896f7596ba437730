use std::path::PathBuf;
use std::time::Duration;

pub const CODE_NO_RECTANGLE: &str = "WEIGHT_LENGTH_CONVERSION_NO_RECTANGLE";
pub const CODE_NO_LENGTH_PMFM: &str = "WEIGHT_LENGTH_CONVERSION_NO_LENGTH_PMFM";
pub const CODE_CONVERSION_FAILED: &str = "WEIGHT_LENGTH_CONVERSION_FAILED";
pub const CODE_TIMEOUT: &str = "WEIGHT_LENGTH_CONVERSION_TIMEOUT";
pub const CODE_UNSUPPORTED_UNIT: &str = "UNSUPPORTED_UNIT";
pub const CODE_INVALID_TABLES: &str = "INVALID_CONVERSION_TABLES";
pub const CODE_INVALID_SETTINGS: &str = "INVALID_SETTINGS";
pub const CODE_OVERFLOW: &str = "ARITHMETIC_OVERFLOW";

#[derive(Debug, thiserror::Error)]
pub enum CatchWeightError {
    #[error("unsupported unit '{0}'")]
    UnsupportedUnit(String),

    #[error("conversion lookup failed: {0}")]
    ConversionLookup(String),

    #[error("cannot enable weight-length conversion: no statistical rectangle in options or data context")]
    NoRectangle,

    #[error("cannot enable weight-length conversion: no length parameter found")]
    NoLengthPmfm,

    #[error("value out of range: {0}")]
    Overflow(String),

    #[error("conversion lookup did not answer within {0:?}")]
    Timeout(Duration),

    #[error("failed to load conversion tables from {path}: {reason}")]
    TableLoad { path: PathBuf, reason: String },

    #[error("invalid conversion tables: {0}")]
    TableInvalid(String),

    #[error("failed to load settings from {path}: {reason}")]
    SettingsLoad { path: PathBuf, reason: String },

    #[error("invalid settings: {0}")]
    SettingsInvalid(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CatchWeightError {
    /// Stable code, reported to hosts through `on_error`.
    pub fn code(&self) -> &'static str {
        match self {
            CatchWeightError::NoRectangle => CODE_NO_RECTANGLE,
            CatchWeightError::NoLengthPmfm => CODE_NO_LENGTH_PMFM,
            CatchWeightError::Timeout(_) => CODE_TIMEOUT,
            CatchWeightError::UnsupportedUnit(_) => CODE_UNSUPPORTED_UNIT,
            CatchWeightError::Overflow(_) => CODE_OVERFLOW,
            CatchWeightError::TableLoad { .. } | CatchWeightError::TableInvalid(_) => {
                CODE_INVALID_TABLES
            }
            CatchWeightError::SettingsLoad { .. } | CatchWeightError::SettingsInvalid(_) => {
                CODE_INVALID_SETTINGS
            }
            CatchWeightError::ConversionLookup(_)
            | CatchWeightError::Io(_)
            | CatchWeightError::Json(_) => CODE_CONVERSION_FAILED,
        }
    }

    /// Translatable message key shown next to the weight field.
    pub fn message_key(&self) -> String {
        format!("TRIP.SUB_BATCH.ERROR.{}", self.code())
    }
}
