//! Engine configuration

use crate::constants::{audit, cache, formulas, methods};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tarifa_formula::EvaluatorLimits;

/// Tunables for a [`crate::TariffEngine`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub cache_ttl_seconds: u64,
    pub cache_max_capacity: u64,
    pub audit_capacity: usize,
    pub slow_calculation_ms: u64,
    pub default_method_code: String,
    pub max_expression_length: usize,
    pub max_nesting_depth: usize,
    /// Dates flagged as `EsFestivo`
    pub holidays: Vec<NaiveDate>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_ttl_seconds: cache::DEFAULT_TTL_SECONDS,
            cache_max_capacity: cache::DEFAULT_MAX_CAPACITY,
            audit_capacity: audit::DEFAULT_CAPACITY,
            slow_calculation_ms: audit::DEFAULT_SLOW_CALCULATION_MS,
            default_method_code: methods::DEFAULT_METHOD_CODE.to_string(),
            max_expression_length: formulas::MAX_EXPRESSION_LENGTH,
            max_nesting_depth: formulas::MAX_NESTING_DEPTH,
            holidays: Vec::new(),
        }
    }
}

impl EngineConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_seconds)
    }

    pub fn slow_threshold(&self) -> Duration {
        Duration::from_millis(self.slow_calculation_ms)
    }

    pub fn evaluator_limits(&self) -> EvaluatorLimits {
        EvaluatorLimits {
            max_expression_length: self.max_expression_length,
            max_nesting_depth: self.max_nesting_depth,
            ..EvaluatorLimits::default()
        }
    }
}
