//! Short-lived memoization of calculation results, backed by `moka`.
//!
//! Entries expire a fixed time after insertion regardless of reads.

use crate::types::{CalculationRequest, CalculationResult};
use chrono::{DateTime, Utc};
use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;

/// Calculation results keyed by [`ResultCache::key`]
#[derive(Clone, Debug)]
pub struct ResultCache {
    cache: Cache<String, Arc<CalculationResult>>,
}

impl ResultCache {
    /// Cache holding up to `max_capacity` results, each for `time_to_live`
    pub fn new(max_capacity: u64, time_to_live: Duration) -> Self {
        Self { cache: Cache::builder().max_capacity(max_capacity).time_to_live(time_to_live).build() }
    }

    /// Canonical key: client, origin, destination, day, tramo, unit, requested
    /// method (or `auto`), pallets and weight.
    ///
    /// Requests that also carry variables, extras, cargo details or ask for a
    /// breakdown get a JSON suffix with those fields, so two requests share a
    /// key only when they would price the same.
    pub fn key(request: &CalculationRequest, date: DateTime<Utc>) -> String {
        let mut key = format!(
            "{}:{}:{}:{}:{}:{}:{}:{}:{}",
            request.client_id,
            request.origin_id,
            request.destination_id,
            date.format("%Y-%m-%d"),
            request.tramo_type,
            request.unit_type.as_deref().unwrap_or("-"),
            request.method_override.as_deref().unwrap_or("auto"),
            request.pallets.unwrap_or(0.0),
            request.weight.unwrap_or(0.0),
        );

        let detailed = !request.variables.is_empty()
            || !request.extras.is_empty()
            || request.include_breakdown
            || request.volume.is_some()
            || request.piece_count.is_some()
            || request.vehicles.is_some()
            || request.cargo_type.is_some()
            || request.urgency.is_some();
        if detailed {
            // Variables are a BTreeMap, so the encoding is stable
            let details = serde_json::json!({
                "volume": request.volume,
                "pieceCount": request.piece_count,
                "vehicles": request.vehicles,
                "cargoType": request.cargo_type,
                "urgency": request.urgency,
                "extras": request.extras,
                "variables": request.variables,
                "breakdown": request.include_breakdown,
            });
            key.push(':');
            key.push_str(&details.to_string());
        }
        key
    }

    /// Live result for `key`, if any
    pub async fn get(&self, key: &str) -> Option<Arc<CalculationResult>> {
        self.cache.get(key).await
    }

    /// Store a result; it expires after the configured time to live
    pub async fn insert(&self, key: String, result: CalculationResult) {
        self.cache.insert(key, Arc::new(result)).await;
    }

    /// Remove one entry
    pub async fn invalidate(&self, key: &str) {
        self.cache.invalidate(key).await;
    }

    /// Drop every entry, used when reference data changes
    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }

    /// Approximate number of live entries
    pub async fn entry_count(&self) -> u64 {
        self.cache.run_pending_tasks().await;
        self.cache.entry_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ExtraCharge;
    use chrono::TimeZone;
    use tarifa_types::FormulaValue;

    #[test]
    fn test_key_truncates_date_to_day() {
        let mut request = CalculationRequest::new("C1", "O1", "D1", "TRMC");
        request.pallets = Some(5.0);

        let morning = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap();
        let evening = Utc.with_ymd_and_hms(2024, 3, 1, 20, 0, 0).unwrap();

        assert_eq!(ResultCache::key(&request, morning), "C1:O1:D1:2024-03-01:TRMC:-:auto:5:0");
        assert_eq!(ResultCache::key(&request, morning), ResultCache::key(&request, evening));

        let auto = ResultCache::key(&request, morning);
        request.method_override = Some("KILOMETRO".into());
        assert_ne!(ResultCache::key(&request, morning), auto);
    }

    #[test]
    fn test_key_separates_fields_that_change_the_price() {
        let date = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap();
        let plain = CalculationRequest::new("C1", "O1", "D1", "TRMC");
        let plain_key = ResultCache::key(&plain, date);

        let mut with_valor = plain.clone();
        with_valor.variables.insert("Valor".into(), FormulaValue::Number(1.0));
        let mut with_extras = plain.clone();
        with_extras.extras.push(ExtraCharge { concept: "Espera".into(), amount: 50.0 });
        let mut urgent = plain.clone();
        urgent.urgency = Some("urgente".into());
        let mut with_breakdown = plain.clone();
        with_breakdown.include_breakdown = true;

        let keys = [
            plain_key.clone(),
            ResultCache::key(&with_valor, date),
            ResultCache::key(&with_extras, date),
            ResultCache::key(&urgent, date),
            ResultCache::key(&with_breakdown, date),
        ];
        for (i, a) in keys.iter().enumerate() {
            for b in &keys[i + 1..] {
                assert_ne!(a, b);
            }
        }

        let mut other_order = plain.clone();
        other_order.variables.insert("Peaje".into(), FormulaValue::Number(5.0));
        other_order.variables.insert("Valor".into(), FormulaValue::Number(1.0));
        let mut same = plain.clone();
        same.variables.insert("Valor".into(), FormulaValue::Number(1.0));
        same.variables.insert("Peaje".into(), FormulaValue::Number(5.0));
        assert_eq!(ResultCache::key(&other_order, date), ResultCache::key(&same, date));
        assert!(plain_key.ends_with(":auto:0:0"));
    }

    #[tokio::test]
    async fn test_insert_get_and_invalidate() {
        let cache = ResultCache::new(100, Duration::from_secs(300));
        let result = CalculationResult { total: 42.0, ..Default::default() };

        cache.insert("k".into(), result.clone()).await;
        assert_eq!(cache.get("k").await.map(|r| r.total), Some(42.0));
        assert_eq!(cache.entry_count().await, 1);

        cache.invalidate("k").await;
        assert!(cache.get("k").await.is_none());
    }

    #[tokio::test]
    async fn test_entries_expire_after_ttl() {
        let cache = ResultCache::new(100, Duration::from_millis(50));
        cache.insert("k".into(), CalculationResult::default()).await;
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(cache.get("k").await.is_none());
    }
}
