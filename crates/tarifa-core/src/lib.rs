#![warn(clippy::all)]
//! Tariff calculation pipeline for logistics routes.
//!
//! A calculation flows through
//! context building → method & formula resolution → base tariff → rules,
//! with an optional result cache in front and an audit record for every
//! attempt. [`TariffEngine`] owns the cache and audit log; data comes from a
//! [`TariffRepository`].

/// Bounded audit trail of calculation attempts
pub mod audit;
/// Base tariff evaluation
pub mod base_calculator;
/// TTL result cache
pub mod cache;
/// Engine configuration
pub mod config;
/// Default values and limits
pub mod constants;
/// Formula context assembly
pub mod context_builder;
/// Calculation orchestrator
pub mod engine;
pub mod error;
/// Repository trait and in-memory implementation
pub mod repository;
/// Method and formula resolution
pub mod resolver;
/// Conditional surcharges and discounts
pub mod rule_engine;
/// Domain records, requests and results
pub mod types;

pub use audit::{AuditFilter, AuditLog, AuditRecord, AuditStats};
pub use cache::ResultCache;
pub use config::EngineConfig;
pub use engine::TariffEngine;
pub use error::{TariffError, TariffResult};
pub use repository::{Dataset, InMemoryRepository, TariffRepository};
pub use types::*;

/// Round a monetary amount to cents, half away from zero
pub(crate) fn round2(value: f64) -> f64 {
    tarifa_formula::round_to(value, 2)
}
