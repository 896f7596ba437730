use super::schema::{
    RoundWeightConversion, RoundWeightQuery, WeightLengthConversion, WeightLengthQuery,
};
use super::ConversionLookup;
use crate::error::CatchWeightError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

type Memo<Q, R> = Mutex<HashMap<Q, Option<R>>>;

/// Memoises an inner lookup per query, "no record" answers included.
/// Errors are not cached.
pub struct CachedLookup<L> {
    inner: L,
    weight_length: Memo<WeightLengthQuery, WeightLengthConversion>,
    round_weight: Memo<RoundWeightQuery, RoundWeightConversion>,
}

fn lock<Q, R>(memo: &Memo<Q, R>) -> MutexGuard<'_, HashMap<Q, Option<R>>> {
    memo.lock().unwrap_or_else(PoisonError::into_inner)
}

fn cached<Q: Eq + Hash, R: Clone>(memo: &Memo<Q, R>, query: &Q) -> Option<Option<R>> {
    lock(memo).get(query).cloned()
}

impl<L: ConversionLookup> CachedLookup<L> {
    pub fn new(inner: L) -> Self {
        Self {
            inner,
            weight_length: Mutex::new(HashMap::new()),
            round_weight: Mutex::new(HashMap::new()),
        }
    }

    pub fn inner(&self) -> &L {
        &self.inner
    }

    pub fn len(&self) -> usize {
        lock(&self.weight_length).len() + lock(&self.round_weight).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        lock(&self.weight_length).clear();
        lock(&self.round_weight).clear();
    }
}

#[async_trait]
impl<L: ConversionLookup> ConversionLookup for CachedLookup<L> {
    async fn find_weight_length_conversion(
        &self,
        query: &WeightLengthQuery,
    ) -> Result<Option<WeightLengthConversion>, CatchWeightError> {
        if let Some(hit) = cached(&self.weight_length, query) {
            debug!("weight-length cache hit");
            return Ok(hit);
        }
        let found = self.inner.find_weight_length_conversion(query).await?;
        lock(&self.weight_length).insert(query.clone(), found.clone());
        Ok(found)
    }

    async fn find_round_weight_conversion(
        &self,
        query: &RoundWeightQuery,
    ) -> Result<Option<RoundWeightConversion>, CatchWeightError> {
        if let Some(hit) = cached(&self.round_weight, query) {
            debug!("round-weight cache hit");
            return Ok(hit);
        }
        let found = self.inner.find_round_weight_conversion(query).await?;
        lock(&self.round_weight).insert(query.clone(), found.clone());
        Ok(found)
    }
}
