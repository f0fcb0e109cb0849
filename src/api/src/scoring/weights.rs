//! Weight vector and its TTL cache.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Mutex;
use tracing::debug;

use super::Factor;
use crate::error::StoreResult;
use crate::store::{Record, RecordKey, SelectionStore, WeightRecord};

/// Learnable factor weights. Missing entries fall back to the defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WeightVector(BTreeMap<Factor, i64>);

impl Default for WeightVector {
    fn default() -> Self {
        Self::defaults()
    }
}

impl WeightVector {
    /// Compiled-in defaults.
    pub fn defaults() -> Self {
        Self(
            Factor::ALL
                .iter()
                .filter_map(|f| f.default_weight().map(|w| (*f, w)))
                .collect(),
        )
    }

    /// Build from a stored map, filling gaps with defaults.
    pub fn from_map(map: BTreeMap<Factor, i64>) -> Self {
        let mut weights = Self::defaults();
        for (factor, value) in map {
            if factor.default_weight().is_some() {
                weights.0.insert(factor, value);
            }
        }
        weights
    }

    pub fn raw(&self, factor: Factor) -> i64 {
        self.0.get(&factor).copied().unwrap_or(0)
    }

    /// Weight as points.
    pub fn get(&self, factor: Factor) -> f64 {
        self.raw(factor) as f64
    }

    pub fn set(&mut self, factor: Factor, value: i64) {
        if factor.default_weight().is_some() {
            self.0.insert(factor, value);
        }
    }

    pub fn as_map(&self) -> &BTreeMap<Factor, i64> {
        &self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = (Factor, i64)> + '_ {
        self.0.iter().map(|(f, w)| (*f, *w))
    }

    /// Clamp every weight into `[1, 2 * default]`.
    pub fn bound(&mut self) {
        for (factor, value) in self.0.iter_mut() {
            if let Some(default) = factor.default_weight() {
                *value = (*value).clamp(1, 2 * default);
            }
        }
    }
}

/// The persisted weight row, if any.
pub fn load_weight_record(store: &dyn SelectionStore) -> StoreResult<Option<WeightRecord>> {
    Ok(store
        .get_item(&RecordKey::weights())?
        .and_then(Record::into_weights))
}

/// Load the persisted weights, or the defaults if none are stored.
pub fn load_weights(store: &dyn SelectionStore) -> StoreResult<WeightVector> {
    Ok(load_weight_record(store)?
        .map(|r| WeightVector::from_map(r.weights))
        .unwrap_or_default())
}

/// Persist weights under the reserved key.
pub fn save_weights(
    store: &dyn SelectionStore,
    weights: &WeightVector,
    fingerprint: Option<String>,
    now: DateTime<Utc>,
) -> StoreResult<()> {
    store.put_item(&Record::WeightVector(WeightRecord {
        weights: weights.as_map().clone(),
        last_report_fingerprint: fingerprint,
        updated_at: now,
    }))
}

struct CachedWeights {
    weights: WeightVector,
    cached_at: DateTime<Utc>,
}

/// In-process weight cache with a bounded TTL.
pub struct WeightCache {
    ttl: Duration,
    entry: Mutex<Option<CachedWeights>>,
}

impl WeightCache {
    pub fn new(ttl_secs: i64) -> Self {
        Self {
            ttl: Duration::seconds(ttl_secs),
            entry: Mutex::new(None),
        }
    }

    pub fn get(&self, store: &dyn SelectionStore) -> StoreResult<WeightVector> {
        self.get_at(store, Utc::now())
    }

    /// Cached weights if fresh at `now`, otherwise reload from the store.
    pub fn get_at(&self, store: &dyn SelectionStore, now: DateTime<Utc>) -> StoreResult<WeightVector> {
        let mut entry = self.entry.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(cached) = entry.as_ref() {
            if now - cached.cached_at <= self.ttl {
                return Ok(cached.weights.clone());
            }
            debug!("Weight cache expired");
        }

        let weights = load_weights(store)?;
        *entry = Some(CachedWeights {
            weights: weights.clone(),
            cached_at: now,
        });
        Ok(weights)
    }

    /// Drop the cached entry so the next read hits the store.
    pub fn invalidate(&self) {
        *self.entry.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;

    #[test]
    fn test_defaults_match_factors() {
        let weights = WeightVector::defaults();
        assert_eq!(weights.raw(Factor::SweetSpot), 30);
        assert_eq!(weights.raw(Factor::RecentWin), 25);
        assert_eq!(weights.raw(Factor::ClaimingJockey), 0);
        assert_eq!(weights.as_map().len(), 18);
    }

    #[test]
    fn test_bound() {
        let mut weights = WeightVector::defaults();
        weights.set(Factor::SweetSpot, 100);
        weights.set(Factor::Consistency, 0);
        weights.bound();
        assert_eq!(weights.raw(Factor::SweetSpot), 60);
        assert_eq!(weights.raw(Factor::Consistency), 1);
    }

    #[test]
    fn test_load_missing_uses_defaults() {
        let store = SqliteStore::in_memory().unwrap();
        assert_eq!(load_weights(&store).unwrap(), WeightVector::defaults());
    }

    #[test]
    fn test_cache_ttl_and_invalidate() {
        let store = SqliteStore::in_memory().unwrap();
        let cache = WeightCache::new(300);
        let t0 = Utc::now();

        assert_eq!(cache.get_at(&store, t0).unwrap(), WeightVector::defaults());

        let mut updated = WeightVector::defaults();
        updated.set(Factor::SweetSpot, 21);
        save_weights(&store, &updated, None, t0).unwrap();

        // Still fresh: stale value served
        let stale = cache.get_at(&store, t0 + Duration::seconds(299)).unwrap();
        assert_eq!(stale.raw(Factor::SweetSpot), 30);

        // Expired: reloaded
        let fresh = cache.get_at(&store, t0 + Duration::seconds(301)).unwrap();
        assert_eq!(fresh.raw(Factor::SweetSpot), 21);

        updated.set(Factor::SweetSpot, 25);
        save_weights(&store, &updated, None, t0).unwrap();
        cache.invalidate();
        let after = cache.get_at(&store, t0 + Duration::seconds(302)).unwrap();
        assert_eq!(after.raw(Factor::SweetSpot), 25);
    }
}
