//! Data access for the calculation pipeline
//!
//! The pipeline only reads through [`TariffRepository`], except for the usage
//! counter of custom formulas. [`InMemoryRepository`] backs tests and the CLI.

use crate::types::{CalculationMethod, Client, CustomFormula, Route, Rule, Site, VehicleLimits};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tarifa_types::FormulaContext;
use tracing::debug;

/// Lookups the pipeline needs from the surrounding system
#[async_trait]
pub trait TariffRepository: Send + Sync {
    async fn find_client_by_id(&self, id: &str) -> Result<Option<Client>>;

    async fn find_site_by_id(&self, id: &str) -> Result<Option<Site>>;

    async fn find_route_by_client_origin_destination(
        &self,
        client_id: &str,
        origin_id: &str,
        destination_id: &str,
    ) -> Result<Option<Route>>;

    /// Active method with this code
    async fn find_active_method_by_code(&self, code: &str) -> Result<Option<CalculationMethod>>;

    /// Highest-priority active custom formula for the client and method whose
    /// validity window contains `date` and whose scope covers `unit_type`
    async fn find_active_custom_formula(
        &self,
        client_id: &str,
        method_code: &str,
        date: NaiveDate,
        unit_type: Option<&str>,
    ) -> Result<Option<CustomFormula>>;

    /// Rules that apply to the context on `date`, in any order
    async fn find_applicable_rules(
        &self,
        context: &FormulaContext,
        date: NaiveDate,
    ) -> Result<Vec<Rule>>;

    async fn find_vehicle_limits_by_unit_type(
        &self,
        unit_type: &str,
    ) -> Result<Option<VehicleLimits>>;

    /// Increment the usage counter of a custom formula
    async fn record_custom_formula_usage(&self, formula_id: &str) -> Result<()>;
}

/// Serializable snapshot of every record the repository serves
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Dataset {
    pub clients: Vec<Client>,
    pub sites: Vec<Site>,
    pub routes: Vec<Route>,
    pub methods: Vec<CalculationMethod>,
    pub custom_formulas: Vec<CustomFormula>,
    pub rules: Vec<Rule>,
    pub vehicle_limits: Vec<VehicleLimits>,
}

/// Concurrent in-memory repository
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    clients: DashMap<String, Client>,
    sites: DashMap<String, Site>,
    routes: DashMap<(String, String, String), Route>,
    methods: DashMap<String, CalculationMethod>,
    custom_formulas: DashMap<String, CustomFormula>,
    rules: DashMap<String, Rule>,
    vehicle_limits: DashMap<String, VehicleLimits>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_dataset(dataset: Dataset) -> Self {
        let repository = Self::new();
        for client in dataset.clients {
            repository.add_client(client);
        }
        for site in dataset.sites {
            repository.add_site(site);
        }
        for route in dataset.routes {
            repository.add_route(route);
        }
        for method in dataset.methods {
            repository.add_method(method);
        }
        for formula in dataset.custom_formulas {
            repository.add_custom_formula(formula);
        }
        for rule in dataset.rules {
            repository.add_rule(rule);
        }
        for limits in dataset.vehicle_limits {
            repository.add_vehicle_limits(limits);
        }
        repository
    }

    /// Load a JSON [`Dataset`] from disk
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading dataset {}", path.display()))?;
        let dataset: Dataset = serde_json::from_str(&text)
            .with_context(|| format!("parsing dataset {}", path.display()))?;
        debug!(
            clients = dataset.clients.len(),
            routes = dataset.routes.len(),
            rules = dataset.rules.len(),
            "Loaded dataset"
        );
        Ok(Self::from_dataset(dataset))
    }

    pub fn add_client(&self, client: Client) {
        self.clients.insert(client.id.clone(), client);
    }

    pub fn add_site(&self, site: Site) {
        self.sites.insert(site.id.clone(), site);
    }

    pub fn add_route(&self, route: Route) {
        let key =
            (route.client_id.clone(), route.origin_id.clone(), route.destination_id.clone());
        self.routes.insert(key, route);
    }

    pub fn add_method(&self, method: CalculationMethod) {
        self.methods.insert(method.code.to_uppercase(), method);
    }

    pub fn add_custom_formula(&self, formula: CustomFormula) {
        self.custom_formulas.insert(formula.id.clone(), formula);
    }

    pub fn add_rule(&self, rule: Rule) {
        self.rules.insert(rule.id.clone(), rule);
    }

    pub fn add_vehicle_limits(&self, limits: VehicleLimits) {
        self.vehicle_limits.insert(limits.unit_type.to_uppercase(), limits);
    }

    /// Current usage counter of a custom formula
    pub fn custom_formula_usage(&self, formula_id: &str) -> Option<u64> {
        self.custom_formulas.get(formula_id).map(|f| f.usage_count)
    }
}

#[async_trait]
impl TariffRepository for InMemoryRepository {
    async fn find_client_by_id(&self, id: &str) -> Result<Option<Client>> {
        Ok(self.clients.get(id).map(|c| c.value().clone()))
    }

    async fn find_site_by_id(&self, id: &str) -> Result<Option<Site>> {
        Ok(self.sites.get(id).map(|s| s.value().clone()))
    }

    async fn find_route_by_client_origin_destination(
        &self,
        client_id: &str,
        origin_id: &str,
        destination_id: &str,
    ) -> Result<Option<Route>> {
        let key = (client_id.to_string(), origin_id.to_string(), destination_id.to_string());
        Ok(self.routes.get(&key).map(|r| r.value().clone()))
    }

    async fn find_active_method_by_code(&self, code: &str) -> Result<Option<CalculationMethod>> {
        Ok(self
            .methods
            .get(&code.to_uppercase())
            .filter(|m| m.active)
            .map(|m| m.value().clone()))
    }

    async fn find_active_custom_formula(
        &self,
        client_id: &str,
        method_code: &str,
        date: NaiveDate,
        unit_type: Option<&str>,
    ) -> Result<Option<CustomFormula>> {
        // Ties on priority go to the most recently created formula, then the larger id
        let best = self
            .custom_formulas
            .iter()
            .filter(|f| f.applies(client_id, method_code, date, unit_type))
            .max_by(|a, b| {
                a.priority
                    .cmp(&b.priority)
                    .then(a.created_at.cmp(&b.created_at))
                    .then_with(|| a.id.cmp(&b.id))
            })
            .map(|f| f.value().clone());
        Ok(best)
    }

    async fn find_applicable_rules(
        &self,
        context: &FormulaContext,
        date: NaiveDate,
    ) -> Result<Vec<Rule>> {
        let mut rules: Vec<Rule> = self
            .rules
            .iter()
            .filter(|r| r.matches(context, date))
            .map(|r| r.value().clone())
            .collect();
        // Map iteration order is arbitrary; make results reproducible
        rules.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(rules)
    }

    async fn find_vehicle_limits_by_unit_type(
        &self,
        unit_type: &str,
    ) -> Result<Option<VehicleLimits>> {
        Ok(self.vehicle_limits.get(&unit_type.to_uppercase()).map(|v| v.value().clone()))
    }

    async fn record_custom_formula_usage(&self, formula_id: &str) -> Result<()> {
        let mut formula = self
            .custom_formulas
            .get_mut(formula_id)
            .with_context(|| format!("custom formula '{formula_id}' not found"))?;
        formula.usage_count += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::VehicleScope;
    use chrono::{TimeZone, Utc};

    fn formula(id: &str, priority: i32, from: &str, to: Option<&str>, created_day: u32) -> CustomFormula {
        CustomFormula {
            id: id.into(),
            client_id: "C1".into(),
            method_code: "PALET".into(),
            formula: format!("Valor * Palets * {priority}"),
            valid_from: from.parse().unwrap(),
            valid_to: to.map(|t| t.parse().unwrap()),
            vehicle_scope: VehicleScope::Any,
            priority,
            active: true,
            usage_count: 0,
            created_at: Utc.with_ymd_and_hms(2024, 1, created_day, 0, 0, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_custom_formula_priority_and_window() {
        let repository = InMemoryRepository::new();
        repository.add_custom_formula(formula("low", 1, "2024-01-01", None, 1));
        repository.add_custom_formula(formula("high", 5, "2024-01-01", None, 1));
        repository.add_custom_formula(formula("expired", 9, "2023-01-01", Some("2023-12-31"), 1));
        repository.add_custom_formula(formula("future", 9, "2025-01-01", None, 1));

        let date = "2024-06-01".parse().unwrap();
        let found = repository
            .find_active_custom_formula("C1", "PALET", date, None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, "high");

        let none = repository.find_active_custom_formula("C2", "PALET", date, None).await.unwrap();
        assert!(none.is_none());
    }

    #[tokio::test]
    async fn test_custom_formula_tie_prefers_newest() {
        let repository = InMemoryRepository::new();
        repository.add_custom_formula(formula("older", 3, "2024-01-01", None, 1));
        repository.add_custom_formula(formula("newer", 3, "2024-01-01", None, 15));

        let found = repository
            .find_active_custom_formula("C1", "palet", "2024-06-01".parse().unwrap(), Some("SEMI"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, "newer");
    }

    #[tokio::test]
    async fn test_usage_counter() {
        let repository = InMemoryRepository::new();
        repository.add_custom_formula(formula("f1", 1, "2024-01-01", None, 1));

        repository.record_custom_formula_usage("f1").await.unwrap();
        repository.record_custom_formula_usage("f1").await.unwrap();
        assert_eq!(repository.custom_formula_usage("f1"), Some(2));
        assert!(repository.record_custom_formula_usage("missing").await.is_err());
    }
}
