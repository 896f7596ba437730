use super::trace::{Estimate, EstimateTrace, TraceStepType};
use super::EstimateInput;
use crate::conversion::schema::{LengthOptions, RoundWeightQuery, WeightLengthQuery};
use crate::conversion::ConversionLookup;
use crate::error::CatchWeightError;
use crate::model::WeightResult;
use crate::settings::EngineSettings;
use crate::units::{convert_weight, round_half_up, LengthUnit, WeightUnit};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Turns a length measurement into a weight, using weight-length and
/// round-weight coefficients from a [`ConversionLookup`].
pub struct WeightEstimationEngine<L: ?Sized> {
    lookup: Arc<L>,
    settings: EngineSettings,
}

impl<L: ConversionLookup + ?Sized> WeightEstimationEngine<L> {
    pub fn new(lookup: Arc<L>, settings: EngineSettings) -> Self {
        Self { lookup, settings }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn lookup(&self) -> &Arc<L> {
        &self.lookup
    }

    /// Estimated weight, `None` when inputs are insufficient or no
    /// coefficients apply. `Err` only when the lookup itself fails.
    pub async fn estimate_weight(
        &self,
        input: &EstimateInput,
    ) -> Result<Option<WeightResult>, CatchWeightError> {
        Ok(self.estimate(input).await?.weight)
    }

    /// Same as [`estimate_weight`](Self::estimate_weight), with the steps taken.
    pub async fn estimate(&self, input: &EstimateInput) -> Result<Estimate, CatchWeightError> {
        let mut trace = EstimateTrace::default();
        let ctx = &input.context;

        let Some(reference_taxon_id) = input.reference_taxon_id else {
            trace.skip(TraceStepType::ValidateInput, "no reference taxon");
            return Ok(Estimate::skipped(trace));
        };
        if !ctx.has_rectangle() {
            trace.skip(TraceStepType::ValidateInput, "no statistical rectangle");
            return Ok(Estimate::skipped(trace));
        }
        let length = match input.length.value {
            Some(v) if v > Decimal::ZERO => v,
            _ => {
                trace.skip(TraceStepType::ValidateInput, "no positive length");
                return Ok(Estimate::skipped(trace));
            }
        };
        let length_unit: LengthUnit = match input.length.unit.parse() {
            Ok(unit) => unit,
            Err(e) => {
                warn!("length pmfm {}: {e}", input.length.pmfm_id);
                trace.skip(TraceStepType::LengthConversion, e.to_string());
                return Ok(Estimate::skipped(trace));
            }
        };
        trace.push(
            TraceStepType::ValidateInput,
            format!(
                "length {length} {length_unit} (precision {}), rectangle {}, {}-{:02}",
                input.length.precision,
                ctx.rectangle_label.trim(),
                ctx.year(),
                ctx.month()
            ),
        );

        let query = WeightLengthQuery {
            reference_taxon_id,
            length_pmfm_id: input.length.pmfm_id,
            sex_id: input.sex_id.unwrap_or(self.settings.unsexed_sex_id),
            rectangle_label: ctx.rectangle_label.trim().to_string(),
            month: Some(ctx.month()),
            year: Some(ctx.year()),
        };
        let Some(conversion) = self.lookup.find_weight_length_conversion(&query).await? else {
            debug!(
                "no weight-length conversion for taxon {} in {}",
                reference_taxon_id, query.rectangle_label
            );
            trace.skip(TraceStepType::WeightLength, "no weight-length conversion");
            return Ok(Estimate::skipped(trace));
        };

        let options = LengthOptions {
            unit: length_unit,
            precision: input.length.precision,
            individual_count: input.individual_count.unwrap_or(1).max(1),
        };
        if length_unit != conversion.length_unit {
            trace.push(
                TraceStepType::LengthConversion,
                format!("{length_unit} -> {}", conversion.length_unit),
            );
        }
        let Some(live_weight) = conversion.compute_weight(length, &options) else {
            warn!(
                "weight-length conversion {:?} gave no finite weight",
                conversion.id
            );
            trace.skip(TraceStepType::WeightLength, "weight out of range");
            return Ok(Estimate::skipped(trace));
        };
        trace.push(
            TraceStepType::WeightLength,
            format!(
                "{} x L^{} x {} = {live_weight} kg",
                conversion.coefficient_a, conversion.coefficient_b, options.individual_count
            ),
        );

        let mut weight_kg = live_weight;
        if let Some(dressing) = &input.dressing {
            let preserving_id = dressing
                .preserving_id
                .unwrap_or(self.settings.fresh_preservation_id);
            if dressing.dressing_id == self.settings.whole_dressing_id
                && preserving_id == self.settings.fresh_preservation_id
            {
                trace.push(TraceStepType::RoundWeight, "whole and fresh: live weight kept");
            } else {
                let query = RoundWeightQuery {
                    date: ctx.date,
                    taxon_group_id: dressing.taxon_group_id,
                    dressing_id: dressing.dressing_id,
                    preserving_id,
                    country_id: ctx.country_id,
                };
                match self.lookup.find_round_weight_conversion(&query).await? {
                    Some(rw) => match rw.inverse_alive_weight(weight_kg) {
                        Some(dressed) => {
                            trace.push(
                                TraceStepType::RoundWeight,
                                format!("{weight_kg} / {} = {dressed} kg", rw.conversion_coefficient),
                            );
                            weight_kg = dressed;
                        }
                        None => {
                            warn!("round-weight conversion {:?} has an unusable coefficient", rw.id);
                            trace.push(TraceStepType::RoundWeight, "unusable coefficient: live weight kept");
                        }
                    },
                    None => {
                        debug!(
                            "no round-weight conversion for taxon group {}, dressing {}",
                            dressing.taxon_group_id, dressing.dressing_id
                        );
                        trace.push(TraceStepType::RoundWeight, "no round-weight conversion: live weight kept");
                    }
                }
            }
        }

        let value = match convert_weight(weight_kg, WeightUnit::Kg, input.target_unit) {
            Ok(value) => value,
            Err(e) => {
                warn!("{e}");
                trace.skip(TraceStepType::UnitConversion, e.to_string());
                return Ok(Estimate::skipped(trace));
            }
        };
        if input.target_unit != WeightUnit::Kg {
            trace.push(
                TraceStepType::UnitConversion,
                format!("{weight_kg} kg = {value} {}", input.target_unit),
            );
        }

        let max_decimals = input
            .max_decimals
            .unwrap_or(self.settings.default_max_decimals);
        let value = round_half_up(value, max_decimals);
        trace.push(
            TraceStepType::Rounding,
            format!("{value} {} ({max_decimals} decimals)", input.target_unit),
        );
        info!(
            "estimated weight {value} {} for length {length} {length_unit}",
            input.target_unit
        );

        Ok(Estimate {
            weight: Some(WeightResult::calculated(
                value,
                input.target_unit,
                self.settings.calculated_weight_length_method_id,
            )),
            trace,
        })
    }
}
