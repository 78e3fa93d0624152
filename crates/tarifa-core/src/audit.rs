//! Bounded in-memory audit trail
//!
//! One record per calculation attempt, successful or not. When the buffer is
//! full the oldest record is evicted.

use crate::types::{CalculationRequest, CalculationResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::RwLock;
use std::time::Duration;
use tarifa_types::FormulaContext;
use tracing::warn;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub request: CalculationRequest,
    /// Absent when the calculation failed before the context was built
    pub context: Option<FormulaContext>,
    pub result: Option<CalculationResult>,
    pub duration_ms: u64,
    pub errors: Vec<String>,
    pub slow: bool,
    pub cache_hit: bool,
}

impl AuditRecord {
    pub fn new(
        request: CalculationRequest,
        context: Option<FormulaContext>,
        result: Option<CalculationResult>,
        duration: Duration,
        errors: Vec<String>,
    ) -> Self {
        let cache_hit = result.as_ref().is_some_and(|r| r.cache_hit);
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            request,
            context,
            result,
            duration_ms: u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
            errors,
            slow: false,
            cache_hit,
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Query over audit records; unset fields match everything
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuditFilter {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub client_id: Option<String>,
    pub has_errors: Option<bool>,
    /// Return at most this many records, newest first
    pub limit: Option<usize>,
}

impl AuditFilter {
    fn matches(&self, record: &AuditRecord) -> bool {
        self.from.is_none_or(|from| record.timestamp >= from)
            && self.to.is_none_or(|to| record.timestamp <= to)
            && self.client_id.as_ref().is_none_or(|id| &record.request.client_id == id)
            && self.has_errors.is_none_or(|flag| record.has_errors() == flag)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditStats {
    pub total: usize,
    pub failures: usize,
    pub cache_hits: usize,
    pub slow: usize,
    pub average_duration_ms: f64,
}

#[derive(Debug)]
pub struct AuditLog {
    records: RwLock<VecDeque<AuditRecord>>,
    capacity: usize,
    slow_threshold: Duration,
}

impl AuditLog {
    pub fn new(capacity: usize, slow_threshold: Duration) -> Self {
        let capacity = capacity.max(1);
        Self { records: RwLock::new(VecDeque::with_capacity(capacity)), capacity, slow_threshold }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append a record, evicting the oldest beyond capacity. Never fails the caller.
    pub fn record(&self, mut record: AuditRecord) {
        let threshold_ms = u64::try_from(self.slow_threshold.as_millis()).unwrap_or(u64::MAX);
        if record.duration_ms > threshold_ms {
            record.slow = true;
            warn!(
                client_id = %record.request.client_id,
                duration_ms = record.duration_ms,
                threshold_ms,
                "Slow tariff calculation"
            );
        }

        let Ok(mut records) = self.records.write() else {
            warn!(record_id = %record.id, "Audit log lock poisoned, dropping record");
            return;
        };
        while records.len() >= self.capacity {
            records.pop_front();
        }
        records.push_back(record);
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Matching records, newest first
    pub fn query(&self, filter: &AuditFilter) -> Vec<AuditRecord> {
        let Ok(records) = self.records.read() else {
            return Vec::new();
        };
        records
            .iter()
            .rev()
            .filter(|r| filter.matches(r))
            .take(filter.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect()
    }

    pub fn stats(&self) -> AuditStats {
        let Ok(records) = self.records.read() else {
            return AuditStats::default();
        };
        let total = records.len();
        let total_ms: u64 = records.iter().map(|r| r.duration_ms).sum();
        AuditStats {
            total,
            failures: records.iter().filter(|r| r.has_errors()).count(),
            cache_hits: records.iter().filter(|r| r.cache_hit).count(),
            slow: records.iter().filter(|r| r.slow).count(),
            average_duration_ms: if total == 0 { 0.0 } else { total_ms as f64 / total as f64 },
        }
    }

    pub fn clear(&self) {
        if let Ok(mut records) = self.records.write() {
            records.clear();
        }
    }
}
