use crate::audit::{AuditLog, AuditRecord};
use crate::base_calculator::{BaseTariff, BaseTariffCalculator};
use crate::cache::ResultCache;
use crate::config::EngineConfig;
use crate::context_builder::ContextBuilder;
use crate::error::{TariffError, TariffResult};
use crate::repository::TariffRepository;
use crate::resolver::{MethodResolver, ResolvedFormula};
use crate::rule_engine::{RuleEngine, RuleOutcome};
use crate::types::{Breakdown, BreakdownStep, CalculationRequest, CalculationResult};
use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use std::sync::Arc;
use std::time::Instant;
use tarifa_formula::FormulaEvaluator;
use tarifa_types::FormulaContext;
use tracing::{debug, error, info, instrument, warn};

/// Tariff calculation pipeline.
///
/// Owns the result cache and the audit log; everything else is read through
/// the repository. Calculations are independent and may run concurrently.
pub struct TariffEngine {
    repository: Arc<dyn TariffRepository>,
    evaluator: Arc<FormulaEvaluator>,
    context_builder: ContextBuilder,
    resolver: MethodResolver,
    base_calculator: BaseTariffCalculator,
    rule_engine: RuleEngine,
    cache: ResultCache,
    audit: AuditLog,
    config: EngineConfig,
}

impl TariffEngine {
    /// Create an engine over a repository
    #[instrument(skip(repository))]
    pub fn new(repository: Arc<dyn TariffRepository>, config: EngineConfig) -> Self {
        info!(
            cache_ttl_seconds = config.cache_ttl_seconds,
            audit_capacity = config.audit_capacity,
            default_method = %config.default_method_code,
            "Creating tariff engine"
        );

        let evaluator = Arc::new(FormulaEvaluator::new(config.evaluator_limits()));

        Self {
            context_builder: ContextBuilder::new(Arc::clone(&repository), &config.holidays),
            resolver: MethodResolver::new(Arc::clone(&repository), config.default_method_code.clone()),
            base_calculator: BaseTariffCalculator::new(Arc::clone(&evaluator)),
            rule_engine: RuleEngine::new(Arc::clone(&repository), Arc::clone(&evaluator)),
            cache: ResultCache::new(config.cache_max_capacity, config.cache_ttl()),
            audit: AuditLog::new(config.audit_capacity, config.slow_threshold()),
            repository,
            evaluator,
            config,
        }
    }

    /// Price one request. Every attempt is audited, including cache hits and failures.
    #[instrument(skip(self, request), fields(client_id = %request.client_id, tramo = %request.tramo_type))]
    pub async fn calculate(&self, request: &CalculationRequest) -> TariffResult<CalculationResult> {
        let start = Instant::now();

        // Pin the date so the cache key, calendar facts and audit agree
        let mut request = request.clone();
        let date = request.effective_date();
        request.date = Some(date);

        let cache_key = request.use_cache.then(|| ResultCache::key(&request, date));
        if let Some(key) = &cache_key {
            if let Some(hit) = self.cache.get(key).await {
                let mut result = (*hit).clone();
                result.cache_hit = true;
                debug!(total = result.total, "Cache hit");
                self.audit.record(AuditRecord::new(
                    request,
                    None,
                    Some(result.clone()),
                    start.elapsed(),
                    Vec::new(),
                ));
                return Ok(result);
            }
        }

        match self.run(&request, date).await {
            Ok((result, context)) => {
                if let Some(key) = cache_key {
                    self.cache.insert(key, result.clone()).await;
                }
                let duration = start.elapsed();
                info!(
                    method = %result.method_used,
                    total = result.total,
                    rules = result.applied_rules.len(),
                    duration_ms = duration.as_millis() as u64,
                    cache_hit = false,
                    "Tariff calculated"
                );
                self.audit.record(AuditRecord::new(
                    request,
                    Some(context),
                    Some(result.clone()),
                    duration,
                    Vec::new(),
                ));
                Ok(result)
            }
            Err(e) => {
                error!(category = e.category(), error = %e, "Tariff calculation failed");
                self.audit.record(AuditRecord::new(
                    request,
                    None,
                    None,
                    start.elapsed(),
                    vec![e.to_string()],
                ));
                Err(e)
            }
        }
    }

    /// Price several requests concurrently; results keep the input order
    pub async fn calculate_many(
        &self,
        requests: &[CalculationRequest],
    ) -> Vec<TariffResult<CalculationResult>> {
        debug!(count = requests.len(), "Calculating batch");
        join_all(requests.iter().map(|request| self.calculate(request))).await
    }

    /// Increment the usage counter of a custom formula
    pub async fn record_usage(&self, formula_id: &str) -> TariffResult<()> {
        self.repository
            .record_custom_formula_usage(formula_id)
            .await
            .map_err(|e| TariffError::repository("record_custom_formula_usage", &e))
    }

    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    pub fn evaluator(&self) -> &FormulaEvaluator {
        &self.evaluator
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    async fn run(
        &self,
        request: &CalculationRequest,
        date: DateTime<Utc>,
    ) -> TariffResult<(CalculationResult, FormulaContext)> {
        let built = self.context_builder.build(request).await?;
        let day = date.date_naive();

        let method = self.resolver.resolve_method(request, built.route.as_ref(), day).await?;
        let formula = self
            .resolver
            .resolve_formula(&method, &request.client_id, day, request.unit_type.as_deref())
            .await?;
        debug!(method = method.code(), legacy = method.is_legacy(), formula = %formula.text, "Resolved formula");

        if let Some(formula_id) = &formula.custom_formula_id {
            if let Err(e) = self.record_usage(formula_id).await {
                warn!(formula_id = %formula_id, error = %e, "Failed to record custom formula usage");
            }
        }

        let tariff = built.route.as_ref().and_then(|r| r.tariff_for(day, &request.tramo_type));
        let base = self.base_calculator.calculate(request, &built.context, tariff, &method, &formula)?;
        let outcome = self.rule_engine.apply(&base, day).await?;

        validate_amount("tariffBase", outcome.tariff)?;
        validate_amount("toll", outcome.toll)?;

        let breakdown = request
            .include_breakdown
            .then(|| self.breakdown(request, &formula, &base, &outcome));

        let mut warnings = base.warnings.clone();
        warnings.extend(outcome.warnings.iter().cloned());

        let result = CalculationResult {
            tariff_base: outcome.tariff,
            toll: outcome.toll,
            extras: outcome.extras,
            total: outcome.total,
            method_used: method.code().to_string(),
            formula_used: formula.text.clone(),
            custom_formula_id: formula.custom_formula_id.clone(),
            applied_rules: outcome.applied,
            warnings,
            breakdown,
            cache_hit: false,
        };
        Ok((result, base.context))
    }

    fn breakdown(
        &self,
        request: &CalculationRequest,
        formula: &ResolvedFormula,
        base: &BaseTariff,
        outcome: &RuleOutcome,
    ) -> Breakdown {
        let mut steps = vec![
            BreakdownStep { label: "Base tariff".into(), amount: base.tariff },
            BreakdownStep { label: "Toll".into(), amount: base.toll },
        ];
        steps.extend(request.extras.iter().map(|extra| BreakdownStep {
            label: format!("Extra: {}", extra.concept),
            amount: crate::round2(extra.amount),
        }));
        steps.extend(outcome.applied.iter().map(|rule| BreakdownStep {
            label: format!("Rule {}: {}", rule.code, rule.name),
            amount: rule.delta,
        }));
        steps.push(BreakdownStep { label: "Total".into(), amount: outcome.total });

        let variables = self
            .evaluator
            .variables(&formula.text)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|name| base.context.get(&name).cloned().map(|value| (name, value)))
            .collect();

        Breakdown { steps, variables }
    }
}

fn validate_amount(field: &str, amount: f64) -> TariffResult<()> {
    if amount.is_nan() || amount < 0.0 {
        return Err(TariffError::validation(field, format!("{field} must be a non-negative number, got {amount}")));
    }
    Ok(())
}
