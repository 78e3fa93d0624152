//! Conditional surcharges and discounts
//!
//! Applicable rules are applied in descending priority to a running
//! `{tariff, toll, extras}` triple. Each applied rule records its net change
//! to the total. An applied `excludes_others` rule ends the pass.

use crate::base_calculator::BaseTariff;
use crate::error::{TariffError, TariffResult};
use crate::repository::TariffRepository;
use crate::round2;
use crate::types::{AppliedRule, ModifierKind, ModifierTarget, Rule};
use chrono::NaiveDate;
use std::sync::Arc;
use tarifa_formula::FormulaEvaluator;
use tarifa_types::{FormulaContext, keys};
use tracing::{debug, instrument, warn};

/// Figures after the rule stage
#[derive(Debug, Clone, PartialEq)]
pub struct RuleOutcome {
    pub tariff: f64,
    pub toll: f64,
    pub extras: f64,
    pub total: f64,
    pub applied: Vec<AppliedRule>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Copy)]
struct Running {
    tariff: f64,
    toll: f64,
    extras: f64,
}

impl Running {
    fn total(&self) -> f64 {
        round2(self.tariff + self.toll + self.extras)
    }

    fn amount(&self, target: ModifierTarget) -> f64 {
        match target {
            ModifierTarget::Tariff => self.tariff,
            ModifierTarget::Toll => self.toll,
            ModifierTarget::Extras => self.extras,
            ModifierTarget::Total => self.total(),
        }
    }

    fn set(&mut self, target: ModifierTarget, amount: f64) {
        let amount = round2(amount);
        match target {
            ModifierTarget::Tariff => self.tariff = amount,
            ModifierTarget::Toll => self.toll = amount,
            ModifierTarget::Extras => self.extras = amount,
            ModifierTarget::Total => self.extras = round2(self.extras + amount - self.total()),
        }
    }

    fn expose(&self, context: &mut FormulaContext) {
        context.set(keys::TARIFA, self.tariff);
        context.set(keys::PEAJE, self.toll);
        context.set(keys::EXTRAS, self.extras);
        context.set(keys::TOTAL, self.total());
    }
}

pub struct RuleEngine {
    repository: Arc<dyn TariffRepository>,
    evaluator: Arc<FormulaEvaluator>,
}

impl RuleEngine {
    pub fn new(repository: Arc<dyn TariffRepository>, evaluator: Arc<FormulaEvaluator>) -> Self {
        Self { repository, evaluator }
    }

    /// Load the rules that apply to the base result and apply them
    #[instrument(skip_all)]
    pub async fn apply(&self, base: &BaseTariff, date: NaiveDate) -> TariffResult<RuleOutcome> {
        let running = Running { tariff: base.tariff, toll: base.toll, extras: base.extras };
        let mut context = base.context.clone();
        running.expose(&mut context);

        let rules = self
            .repository
            .find_applicable_rules(&context, date)
            .await
            .map_err(|e| TariffError::repository("find_applicable_rules", &e))?;

        Ok(self.apply_rules(rules, running, context))
    }

    /// Apply already-selected rules in descending priority
    fn apply_rules(
        &self,
        mut rules: Vec<Rule>,
        mut running: Running,
        mut context: FormulaContext,
    ) -> RuleOutcome {
        let mut applied = Vec::new();
        let mut warnings = Vec::new();

        // Stable: equal priorities keep repository order
        rules.sort_by(|a, b| b.priority.cmp(&a.priority));

        for rule in &rules {
            let target = rule.modifier.apply_to;
            let current = running.amount(target);
            let before = running.total();

            let updated = match rule.modifier.kind {
                ModifierKind::Percentage => current + current * rule.modifier.value / 100.0,
                ModifierKind::Fixed => current + rule.modifier.value,
                ModifierKind::Multiplier => current * rule.modifier.value,
                ModifierKind::Formula => {
                    match self.evaluate_modifier(rule, current, &mut context) {
                        Ok(value) => value,
                        Err(message) => {
                            warn!(rule = %rule.code, %message, "Skipping rule with failing formula");
                            warnings.push(format!("Rule {} skipped: {message}", rule.code));
                            continue;
                        }
                    }
                }
            };

            running.set(target, updated);
            running.expose(&mut context);

            let delta = round2(running.total() - before);
            debug!(rule = %rule.code, %target, delta, "Applied rule");
            applied.push(AppliedRule { code: rule.code.clone(), name: rule.name.clone(), delta });

            if rule.excludes_others {
                debug!(rule = %rule.code, "Rule excludes others, stopping");
                break;
            }
        }

        RuleOutcome {
            tariff: round2(running.tariff),
            toll: round2(running.toll),
            extras: round2(running.extras),
            total: running.total(),
            applied,
            warnings,
        }
    }

    fn evaluate_modifier(
        &self,
        rule: &Rule,
        current: f64,
        context: &mut FormulaContext,
    ) -> Result<f64, String> {
        let formula = rule
            .modifier
            .formula
            .as_deref()
            .filter(|f| !f.trim().is_empty())
            .ok_or_else(|| "formula modifier has no formula".to_string())?;

        context.set(keys::MONTO, current);
        self.evaluator
            .evaluate_with_fallback(formula, context)
            .map(|evaluation| evaluation.value)
            .map_err(|e| e.to_string())
    }
}
