//! Where and when a measure was taken.
//!
//! The statistical rectangle comes, in order, from an explicit option, from
//! the fishing areas of the operation, then from its vessel positions.

use crate::model::BatchGroup;
use crate::settings::EngineSettings;
use chrono::{Datelike, Local, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeasurementContext {
    pub date: NaiveDate,
    /// Blank when unknown; estimation is then skipped.
    #[serde(default)]
    pub rectangle_label: String,
    #[serde(default)]
    pub country_id: Option<i32>,
}

impl MeasurementContext {
    pub fn new(date: NaiveDate, rectangle_label: impl Into<String>, country_id: Option<i32>) -> Self {
        Self {
            date,
            rectangle_label: rectangle_label.into(),
            country_id,
        }
    }

    /// 1-12.
    pub fn month(&self) -> u32 {
        self.date.month()
    }

    pub fn year(&self) -> i32 {
        self.date.year()
    }

    pub fn has_rectangle(&self) -> bool {
        !self.rectangle_label.trim().is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Location {
    #[serde(default)]
    pub id: Option<i32>,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub level_id: Option<i32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FishingArea {
    #[serde(default)]
    pub location: Option<Location>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VesselPosition {
    #[serde(default)]
    pub date_time: Option<NaiveDateTime>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
}

impl VesselPosition {
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        let (lat, lon) = (self.latitude?, self.longitude?);
        let valid = lat.is_finite()
            && lon.is_finite()
            && (-90.0..=90.0).contains(&lat)
            && (-180.0..=180.0).contains(&lon);
        valid.then_some((lat, lon))
    }
}

/// Ambient state of the trip / operation being edited.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DataContext {
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub country_id: Option<i32>,
    #[serde(default)]
    pub fishing_areas: Vec<FishingArea>,
    /// Chronological order.
    #[serde(default)]
    pub vessel_positions: Vec<VesselPosition>,
    #[serde(skip)]
    pub parent_group: Option<Arc<BatchGroup>>,
}

/// Values given explicitly by the caller; they win over the data context.
#[derive(Debug, Clone, Default)]
pub struct ContextOverrides {
    pub date: Option<NaiveDate>,
    pub rectangle_label: Option<String>,
    pub country_id: Option<i32>,
    pub parent_group: Option<Arc<BatchGroup>>,
}

impl DataContext {
    pub fn resolve(&self, overrides: &ContextOverrides, settings: &EngineSettings) -> MeasurementContext {
        let date = overrides
            .date
            .or(self.date)
            .unwrap_or_else(|| Local::now().date_naive());
        let rectangle_label = overrides
            .rectangle_label
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(str::to_string)
            .or_else(|| self.statistical_rectangle(settings))
            .unwrap_or_default();
        MeasurementContext {
            date,
            rectangle_label,
            country_id: overrides.country_id.or(self.country_id),
        }
    }

    pub fn parent_group(&self, overrides: &ContextOverrides) -> Option<Arc<BatchGroup>> {
        overrides
            .parent_group
            .clone()
            .or_else(|| self.parent_group.clone())
    }

    pub fn statistical_rectangle(&self, settings: &EngineSettings) -> Option<String> {
        let from_area = self.fishing_areas.iter().find_map(|fa| {
            let location = fa.location.as_ref()?;
            let is_rectangle = location
                .level_id
                .map_or(true, |level| settings.rectangle_location_level_ids.contains(&level));
            let label = location.label.trim();
            (is_rectangle && !label.is_empty()).then(|| label.to_string())
        });
        if from_area.is_some() {
            return from_area;
        }

        let from_position = self
            .vessel_positions
            .iter()
            .rev()
            .filter_map(VesselPosition::coordinates)
            .find_map(|(lat, lon)| ices_rectangle_label(lat, lon));
        if let Some(label) = &from_position {
            debug!("statistical rectangle {label} derived from vessel positions");
        }
        from_position
    }
}

const ICES_COLUMN_LETTERS: [char; 11] = ['B', 'C', 'D', 'E', 'F', 'G', 'H', 'J', 'K', 'L', 'M'];

/// ICES statistical rectangle holding a position.
///
/// Rows are 30' of latitude numbered from 01 at 36°N, columns 1° of longitude:
/// A0-A3 from 44°W, then one letter per 10° from 40°W (I is skipped).
pub fn ices_rectangle_label(latitude: f64, longitude: f64) -> Option<String> {
    if !(36.0..85.5).contains(&latitude) || !(-44.0..69.0).contains(&longitude) {
        return None;
    }
    let row = ((latitude - 36.0) * 2.0).floor() as i32 + 1;
    let (letter, digit) = if longitude < -40.0 {
        ('A', (longitude + 44.0).floor() as i32)
    } else {
        let offset = (longitude + 40.0).floor() as usize;
        (*ICES_COLUMN_LETTERS.get(offset / 10)?, (offset % 10) as i32)
    };
    Some(format!("{row:02}{letter}{digit}"))
}
