//! Base tariff computation
//!
//! Fills `Valor`/`Peaje` from the route tariff when the caller did not supply
//! them, evaluates the formula and splits the result into tariff and toll.
//! The formula result covers tariff plus toll; requested extras are added on
//! top.

use crate::error::{TariffError, TariffResult};
use crate::resolver::ResolvedFormula;
use crate::round2;
use crate::types::{CalculationRequest, ResolvedMethod, RouteTariff};
use std::sync::Arc;
use tarifa_formula::FormulaEvaluator;
use tarifa_types::{FormulaContext, keys};
use tracing::{debug, instrument};

/// Figures after the base stage, before rules
#[derive(Debug, Clone, PartialEq)]
pub struct BaseTariff {
    pub tariff: f64,
    pub toll: f64,
    pub extras: f64,
    pub total: f64,
    /// Context the formula was evaluated against, including `Valor`/`Peaje`
    pub context: FormulaContext,
    /// Formula text after preprocessing
    pub prepared_formula: String,
    pub used_fallback: bool,
    pub warnings: Vec<String>,
}

pub struct BaseTariffCalculator {
    evaluator: Arc<FormulaEvaluator>,
}

impl BaseTariffCalculator {
    pub fn new(evaluator: Arc<FormulaEvaluator>) -> Self {
        Self { evaluator }
    }

    #[instrument(skip_all, fields(method = method.code()))]
    pub fn calculate(
        &self,
        request: &CalculationRequest,
        context: &FormulaContext,
        tariff: Option<&RouteTariff>,
        method: &ResolvedMethod,
        formula: &ResolvedFormula,
    ) -> TariffResult<BaseTariff> {
        let mut context = context.clone();
        let mut warnings = Vec::new();

        if !context.contains(keys::VALOR) {
            let Some(tariff) = tariff else {
                return Err(TariffError::NoApplicableRoute {
                    client_id: request.client_id.clone(),
                    origin_id: request.origin_id.clone(),
                    destination_id: request.destination_id.clone(),
                });
            };
            let Some(rate) = tariff.rate else {
                return Err(TariffError::invalid_method(
                    method.code(),
                    format!("tariff for tramo '{}' has no rate", tariff.tramo_type),
                ));
            };
            context.set(keys::VALOR, rate);
        }
        if !context.contains(keys::PEAJE) {
            context.set(keys::PEAJE, tariff.map_or(0.0, |t| t.toll));
        }

        let evaluation = self
            .evaluator
            .evaluate_with_fallback(&formula.text, &context)
            .map_err(|e| TariffError::evaluation(&formula.text, e))?;
        if evaluation.used_fallback {
            warnings.push("Formula was evaluated with the restricted fallback evaluator".to_string());
        }

        let toll = round2(context.number(keys::PEAJE));
        let tariff_base = round2(round2(evaluation.value) - toll);
        let extras = round2(context.number(keys::EXTRAS));
        let total = round2(tariff_base + toll + extras);

        if total == 0.0 {
            warnings.push("Calculated total is zero".to_string());
        }
        if context.number(keys::VALOR) <= 0.0 {
            warnings.push("No positive rate (Valor) available for this calculation".to_string());
        }
        if method.requires_distance() && context.number(keys::DISTANCIA) <= 0.0 {
            warnings.push(format!("Method {} requires a distance but none is known", method.code()));
        }
        if method.requires_pallets() && context.number(keys::PALETS) <= 0.0 {
            warnings.push(format!("Method {} requires a pallet count but none was given", method.code()));
        }

        debug!(tariff_base, toll, extras, total, fallback = evaluation.used_fallback, "Base tariff calculated");

        Ok(BaseTariff {
            tariff: tariff_base,
            toll,
            extras,
            total,
            context,
            prepared_formula: evaluation.prepared,
            used_fallback: evaluation.used_fallback,
            warnings,
        })
    }
}
