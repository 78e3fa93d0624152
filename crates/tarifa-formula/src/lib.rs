#![warn(clippy::all)]
//! Formula language for tariff pricing.
//!
//! A formula is a short expression such as `SI(Palets > 10; Valor * 0,9; Valor) * Palets + Peaje`.
//! Evaluation happens in three steps:
//!
//! 1. [`preprocessor`] rewrites domain helpers (`SI`, `REDONDEAR`, `PROMEDIO`,
//!    calendar lookups, `TARIFAESCALONADA`) into plain operators and built-ins
//!    and normalises decimal commas.
//! 2. [`parser`] turns the prepared text into an [`ast::Expression`].
//! 3. [`evaluator`] reduces the tree against a [`FormulaContext`] to a finite
//!    number.
//!
//! When the primary path fails, [`FormulaEvaluator::evaluate_with_fallback`]
//! substitutes the context into the prepared text and retries with the
//! [`restricted`] evaluator, which only understands numbers, operators and the
//! ternary.

pub mod ast;
pub mod error;
pub mod evaluator;
pub mod functions;
pub mod parser;
pub mod preprocessor;
pub mod restricted;
pub mod substitution;

mod scan;

pub use error::{EvalResult, EvaluationError};
pub use functions::{FormulaFunction, FunctionRegistry, round_to};

use ast::Expression;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tarifa_types::FormulaContext;
use tracing::{debug, warn};

/// Compiled expressions kept before the cache is reset
const MAX_COMPILED_FORMULAS: usize = 1024;

/// Input caps applied before and during parsing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvaluatorLimits {
    /// Maximum formula length in characters, checked before and after preprocessing
    pub max_expression_length: usize,
    /// Maximum nesting of parentheses, unary operators, powers and conditionals
    pub max_nesting_depth: usize,
    /// Maximum height of a parsed tree, operator chains included. Bounds the
    /// recursion of the primary evaluator.
    pub max_tree_depth: usize,
    /// Nesting budget of the restricted fallback, which evaluates while it
    /// parses and keeps no tree
    pub max_fallback_depth: usize,
}

impl Default for EvaluatorLimits {
    fn default() -> Self {
        Self {
            max_expression_length: 4096,
            max_nesting_depth: 64,
            max_tree_depth: 512,
            max_fallback_depth: 256,
        }
    }
}

/// Outcome of [`FormulaEvaluator::evaluate_with_fallback`]
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    /// Finite result
    pub value: f64,
    /// Whether the restricted evaluator produced the value
    pub used_fallback: bool,
    /// Formula text after preprocessing
    pub prepared: String,
}

/// Thread-safe formula evaluator with a cache of parsed expressions
#[derive(Debug)]
pub struct FormulaEvaluator {
    functions: FunctionRegistry,
    limits: EvaluatorLimits,
    compiled: DashMap<String, Arc<Expression>>,
}

impl Default for FormulaEvaluator {
    fn default() -> Self {
        Self::new(EvaluatorLimits::default())
    }
}

impl FormulaEvaluator {
    /// Create an evaluator with the built-in functions
    pub fn new(limits: EvaluatorLimits) -> Self {
        Self { functions: FunctionRegistry::with_builtins(), limits, compiled: DashMap::new() }
    }

    /// Create an evaluator with a custom function registry
    pub fn with_functions(limits: EvaluatorLimits, functions: FunctionRegistry) -> Self {
        Self { functions, limits, compiled: DashMap::new() }
    }

    pub fn limits(&self) -> EvaluatorLimits {
        self.limits
    }

    /// Run the preprocessor, reading calendar facts from the context or the clock
    pub fn prepare(&self, formula: &str, context: &FormulaContext) -> EvalResult<String> {
        self.prepare_at(formula, context, Utc::now())
    }

    /// Run the preprocessor against an explicit clock
    pub fn prepare_at(
        &self,
        formula: &str,
        context: &FormulaContext,
        now: DateTime<Utc>,
    ) -> EvalResult<String> {
        self.check_length(formula)?;
        let prepared = preprocessor::preprocess_at(formula, context, now)?;
        self.check_length(&prepared)?;
        Ok(prepared)
    }

    /// Evaluate a formula with the primary evaluator
    pub fn evaluate(&self, formula: &str, context: &FormulaContext) -> EvalResult<f64> {
        let prepared = self.prepare(formula, context)?;
        self.evaluate_prepared(&prepared, context)
    }

    /// Evaluate already-prepared text with the primary evaluator
    pub fn evaluate_prepared(&self, prepared: &str, context: &FormulaContext) -> EvalResult<f64> {
        let expr = self.compile(prepared)?;
        evaluator::evaluate_expression(&expr, context, &self.functions)
    }

    /// Substitute the context into prepared text and evaluate it with the
    /// restricted grammar
    pub fn evaluate_restricted(&self, prepared: &str, context: &FormulaContext) -> EvalResult<f64> {
        let substituted = substitution::substitute_variables(prepared, context);
        self.check_length(&substituted)?;
        restricted::evaluate_restricted(&substituted, self.limits.max_fallback_depth)
    }

    /// Evaluate with the primary evaluator, retrying with the restricted one.
    ///
    /// When both fail the primary error is returned.
    pub fn evaluate_with_fallback(
        &self,
        formula: &str,
        context: &FormulaContext,
    ) -> EvalResult<Evaluation> {
        let prepared = self.prepare(formula, context)?;

        match self.evaluate_prepared(&prepared, context) {
            Ok(value) => Ok(Evaluation { value, used_fallback: false, prepared }),
            Err(primary) => match self.evaluate_restricted(&prepared, context) {
                Ok(value) => {
                    warn!(
                        formula = %formula,
                        error = %primary,
                        "Primary evaluation failed, restricted evaluator succeeded"
                    );
                    Ok(Evaluation { value, used_fallback: true, prepared })
                }
                Err(fallback) => {
                    debug!(
                        formula = %formula,
                        primary = %primary,
                        fallback = %fallback,
                        "Formula failed with both evaluators"
                    );
                    Err(primary)
                }
            },
        }
    }

    /// Check a formula without evaluating it.
    ///
    /// Returns one message per problem: syntax errors, unknown functions and
    /// variables that the context does not provide. An empty list means the
    /// formula is valid for this context.
    pub fn validate(&self, formula: &str, context: &FormulaContext) -> Vec<String> {
        let prepared = match self.prepare(formula, context) {
            Ok(prepared) => prepared,
            Err(e) => return vec![e.to_string()],
        };
        let expr = match self.compile(&prepared) {
            Ok(expr) => expr,
            Err(e) => return vec![e.to_string()],
        };

        let mut errors = Vec::new();
        for name in ast::extract_functions(&expr) {
            if !self.functions.contains(&name) {
                errors.push(EvaluationError::UnknownFunction { name }.to_string());
            }
        }
        for name in ast::extract_variables(&expr) {
            if !context.contains(&name) {
                errors.push(EvaluationError::UnknownIdentifier { name }.to_string());
            }
        }
        errors
    }

    /// Variables referenced by a formula, sorted
    pub fn variables(&self, formula: &str) -> EvalResult<Vec<String>> {
        let prepared = self.prepare(formula, &FormulaContext::new())?;
        let expr = self.compile(&prepared)?;
        Ok(ast::extract_variables(&expr))
    }

    /// Number of parsed expressions currently cached
    pub fn compiled_count(&self) -> usize {
        self.compiled.len()
    }

    fn check_length(&self, text: &str) -> EvalResult<()> {
        let length = text.chars().count();
        if length > self.limits.max_expression_length {
            return Err(EvaluationError::TooLong {
                length,
                limit: self.limits.max_expression_length,
            });
        }
        Ok(())
    }

    fn compile(&self, prepared: &str) -> EvalResult<Arc<Expression>> {
        if let Some(expr) = self.compiled.get(prepared) {
            return Ok(Arc::clone(expr.value()));
        }

        let expr = parser::parse_expression(prepared, self.limits.max_nesting_depth)?;
        if expr.depth() > self.limits.max_tree_depth {
            return Err(EvaluationError::TooDeep { limit: self.limits.max_tree_depth });
        }
        let expr = Arc::new(expr);
        if self.compiled.len() >= MAX_COMPILED_FORMULAS {
            debug!(entries = self.compiled.len(), "Compiled formula cache full, clearing");
            self.compiled.clear();
        }
        self.compiled.insert(prepared.to_string(), Arc::clone(&expr));
        Ok(expr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compiled_expressions_are_reused() {
        let evaluator = FormulaEvaluator::default();
        let context = FormulaContext::new().with("Valor", 2.0);

        assert_eq!(evaluator.evaluate("Valor * 3", &context).unwrap(), 6.0);
        assert_eq!(evaluator.evaluate("Valor * 3", &context.clone().with("Valor", 4.0)).unwrap(), 12.0);
        assert_eq!(evaluator.compiled_count(), 1);
    }

    #[test]
    fn test_length_limit() {
        let evaluator = FormulaEvaluator::new(EvaluatorLimits {
            max_expression_length: 10,
            ..EvaluatorLimits::default()
        });
        let err = evaluator.evaluate("1 + 2 + 3 + 4 + 5", &FormulaContext::new()).unwrap_err();
        assert_eq!(err, EvaluationError::TooLong { length: 17, limit: 10 });
    }

    #[test]
    fn test_long_chains_are_capped_by_tree_depth() {
        let evaluator = FormulaEvaluator::default();
        let sum = format!("{}1", "1+".repeat(600));

        let err = evaluator.evaluate(&sum, &FormulaContext::new()).unwrap_err();
        assert_eq!(err, EvaluationError::TooDeep { limit: 512 });

        let short = format!("{}1", "1+".repeat(99));
        assert_eq!(evaluator.evaluate(&short, &FormulaContext::new()).unwrap(), 100.0);
    }

    #[test]
    fn test_fallback_rescues_deep_nesting() {
        let evaluator = FormulaEvaluator::default();
        let context = FormulaContext::new().with("Valor", 7.0);
        let nested = format!("{}Valor * 2{}", "(".repeat(100), ")".repeat(100));

        assert_eq!(
            evaluator.evaluate(&nested, &context).unwrap_err(),
            EvaluationError::TooDeep { limit: 64 }
        );

        let evaluation = evaluator.evaluate_with_fallback(&nested, &context).unwrap();
        assert_eq!(evaluation.value, 14.0);
        assert!(evaluation.used_fallback);

        let chain = format!("{}1", "1+".repeat(600));
        let evaluation = evaluator.evaluate_with_fallback(&chain, &context).unwrap();
        assert_eq!(evaluation.value, 601.0);
        assert!(evaluation.used_fallback);
    }

    #[test]
    fn test_validate_reports_every_problem() {
        let evaluator = FormulaEvaluator::default();
        let context = FormulaContext::new().with("Valor", 1.0);

        assert!(evaluator.validate("Valor * 2", &context).is_empty());

        let errors = evaluator.validate("exec(Valor) + Falta", &context);
        assert_eq!(errors.len(), 2);
        assert!(errors[0].contains("exec"));
        assert!(errors[1].contains("Falta"));

        assert_eq!(evaluator.validate("(Valor", &context).len(), 1);
    }

    #[test]
    fn test_variables() {
        let evaluator = FormulaEvaluator::default();
        assert_eq!(
            evaluator.variables("SI(Palets > 0; Valor * Palets; Valor) + Peaje").unwrap(),
            vec!["Palets", "Peaje", "Valor"]
        );
    }
}
