use super::schema::{
    ConversionTables, RoundWeightConversion, RoundWeightQuery, WeightLengthConversion,
    WeightLengthQuery,
};
use super::ConversionLookup;
use crate::error::CatchWeightError;
use async_trait::async_trait;
use tracing::debug;

impl ConversionTables {
    /// Best weight-length record for a query.
    ///
    /// Tries the exact period, then the same year in any month, then the
    /// same month in any year (latest year first). When a specific sex found
    /// nothing, the whole chain runs again for unsexed records.
    pub fn find_weight_length(&self, query: &WeightLengthQuery) -> Option<&WeightLengthConversion> {
        if let Some(found) = self.find_weight_length_in_period(query) {
            return Some(found);
        }
        if query.sex_id != self.unsexed_sex_id {
            debug!(
                "no weight-length record for sex {}, retrying unsexed",
                query.sex_id
            );
            let unsexed = WeightLengthQuery {
                sex_id: self.unsexed_sex_id,
                ..query.clone()
            };
            return self.find_weight_length_in_period(&unsexed);
        }
        None
    }

    fn find_weight_length_in_period(
        &self,
        query: &WeightLengthQuery,
    ) -> Option<&WeightLengthConversion> {
        if let Some(found) = self.best_weight_length(query) {
            return Some(found);
        }
        if query.month.is_none() || query.year.is_none() {
            return None;
        }

        let any_month = WeightLengthQuery {
            month: None,
            ..query.clone()
        };
        if let Some(found) = self.best_weight_length(&any_month) {
            debug!("weight-length record found ignoring month");
            return Some(found);
        }

        let any_year = WeightLengthQuery {
            year: None,
            ..query.clone()
        };
        let found = self.best_weight_length(&any_year);
        if found.is_some() {
            debug!("weight-length record found ignoring year");
        }
        found
    }

    /// First record with the highest year (when the year is open) or the
    /// latest start month (when it is fixed).
    fn best_weight_length(&self, query: &WeightLengthQuery) -> Option<&WeightLengthConversion> {
        let key = |c: &WeightLengthConversion| match query.year {
            None => c.year.unwrap_or(i32::MIN),
            Some(_) => c.start_month as i32,
        };
        self.weight_length
            .iter()
            .filter(|c| c.matches(query, self.unsexed_sex_id))
            .fold(None, |best: Option<&WeightLengthConversion>, c| match best {
                Some(b) if key(b) >= key(c) => Some(b),
                _ => Some(c),
            })
    }

    /// Round-weight record for a query: the country's own record when there is
    /// one, otherwise a record without country. Latest start date wins.
    pub fn find_round_weight(&self, query: &RoundWeightQuery) -> Option<&RoundWeightConversion> {
        let latest = |country: Option<i32>| {
            self.round_weight
                .iter()
                .filter(|c| c.matches(query) && c.location_id == country)
                .fold(None, |best: Option<&RoundWeightConversion>, c| match best {
                    Some(b) if b.start_date >= c.start_date => Some(b),
                    _ => Some(c),
                })
        };
        query
            .country_id
            .and_then(|country| latest(Some(country)))
            .or_else(|| latest(None))
    }
}

#[async_trait]
impl ConversionLookup for ConversionTables {
    async fn find_weight_length_conversion(
        &self,
        query: &WeightLengthQuery,
    ) -> Result<Option<WeightLengthConversion>, CatchWeightError> {
        Ok(self.find_weight_length(query).cloned())
    }

    async fn find_round_weight_conversion(
        &self,
        query: &RoundWeightQuery,
    ) -> Result<Option<RoundWeightConversion>, CatchWeightError> {
        Ok(self.find_round_weight(query).cloned())
    }
}
