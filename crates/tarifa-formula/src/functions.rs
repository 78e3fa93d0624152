//! Built-in functions for tariff formulas
//!
//! Every function takes and returns numbers. Names are matched
//! case-insensitively.

use crate::error::{EvalResult, EvaluationError};
use std::collections::HashMap;

/// Scaled values are nudged by this many ulps before rounding so that
/// decimal literals such as `1.005` round the way they are written.
const ROUNDING_ULPS: f64 = 8.0;

/// Trait for functions that can be called from formulas
pub trait FormulaFunction: Send + Sync {
    /// Call the function with the given arguments
    fn call(&self, args: &[f64]) -> EvalResult<f64>;

    /// Minimum and maximum number of arguments (`None` max for variadic)
    fn arity(&self) -> (usize, Option<usize>);

    /// Get a description of this function
    fn description(&self) -> &'static str;
}

/// Registry for formula functions
#[derive(Default)]
pub struct FunctionRegistry {
    functions: HashMap<String, Box<dyn FormulaFunction>>,
}

impl std::fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.functions.keys().collect();
        names.sort();
        f.debug_struct("FunctionRegistry").field("functions", &names).finish()
    }
}

impl FunctionRegistry {
    /// Create a new empty function registry
    pub fn new() -> Self {
        Self { functions: HashMap::new() }
    }

    /// Create a function registry with built-in functions
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();

        // Scalar functions
        registry.register("abs", Box::new(AbsFunction));
        registry.register("ceil", Box::new(CeilFunction));
        registry.register("floor", Box::new(FloorFunction));
        registry.register("round", Box::new(RoundFunction));
        registry.register("sqrt", Box::new(SqrtFunction));
        registry.register("pow", Box::new(PowerFunction));
        registry.register("power", Box::new(PowerFunction));
        registry.register("mod", Box::new(ModFunction));

        // Aggregates
        registry.register("min", Box::new(MinFunction));
        registry.register("max", Box::new(MaxFunction));
        registry.register("sum", Box::new(SumFunction));
        registry.register("mean", Box::new(MeanFunction));
        registry.register("median", Box::new(MedianFunction));
        registry.register("std", Box::new(StdFunction));

        // Lookups
        registry.register("tiered", Box::new(TieredFunction));

        registry
    }

    /// Register a new function
    pub fn register(&mut self, name: &str, function: Box<dyn FormulaFunction>) {
        self.functions.insert(name.to_lowercase(), function);
    }

    /// Whether a function is registered under this name
    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(&name.to_lowercase())
    }

    /// Call a function by name
    pub fn call(&self, name: &str, args: &[f64]) -> EvalResult<f64> {
        let function = self
            .functions
            .get(&name.to_lowercase())
            .ok_or_else(|| EvaluationError::UnknownFunction { name: name.to_string() })?;

        let (min, max) = function.arity();
        if args.len() < min || max.is_some_and(|max| args.len() > max) {
            let expected = match max {
                Some(max) if max == min => format!("{min}"),
                Some(max) => format!("{min} to {max}"),
                None => format!("at least {min}"),
            };
            return Err(EvaluationError::arguments(
                name,
                format!("expects {expected} arguments, got {}", args.len()),
            ));
        }

        function.call(args)
    }
}

/// Round half away from zero to `decimals` places.
///
/// The scaled value is nudged outward by a few ulps first, so binary
/// representation error (`1.005 * 100 == 100.49999999999999`) does not pull
/// a written half down. Results agree with decimal rounding within `1e-9`.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    if !value.is_finite() {
        return value;
    }
    let factor = 10f64.powi(decimals);
    let scaled = value * factor;
    if !scaled.is_finite() {
        return value;
    }
    round_half_away(scaled) / factor
}

fn round_half_away(value: f64) -> f64 {
    let nudged = value + value.signum() * value.abs() * f64::EPSILON * ROUNDING_ULPS;
    nudged.round()
}

struct AbsFunction;
impl FormulaFunction for AbsFunction {
    fn call(&self, args: &[f64]) -> EvalResult<f64> {
        Ok(args[0].abs())
    }

    fn arity(&self) -> (usize, Option<usize>) {
        (1, Some(1))
    }

    fn description(&self) -> &'static str {
        "Returns the absolute value of a number"
    }
}

struct CeilFunction;
impl FormulaFunction for CeilFunction {
    fn call(&self, args: &[f64]) -> EvalResult<f64> {
        Ok(args[0].ceil())
    }

    fn arity(&self) -> (usize, Option<usize>) {
        (1, Some(1))
    }

    fn description(&self) -> &'static str {
        "Rounds a number up to the nearest integer"
    }
}

struct FloorFunction;
impl FormulaFunction for FloorFunction {
    fn call(&self, args: &[f64]) -> EvalResult<f64> {
        Ok(args[0].floor())
    }

    fn arity(&self) -> (usize, Option<usize>) {
        (1, Some(1))
    }

    fn description(&self) -> &'static str {
        "Rounds a number down to the nearest integer"
    }
}

struct RoundFunction;
impl FormulaFunction for RoundFunction {
    fn call(&self, args: &[f64]) -> EvalResult<f64> {
        match args {
            [value] => Ok(round_half_away(*value)),
            [value, decimals] => {
                if decimals.fract() != 0.0 || !(0.0..=15.0).contains(decimals) {
                    return Err(EvaluationError::arguments(
                        "round",
                        format!("decimals must be an integer between 0 and 15, got {decimals}"),
                    ));
                }
                Ok(round_to(*value, *decimals as i32))
            }
            _ => Err(EvaluationError::arguments("round", "expects 1 or 2 arguments")),
        }
    }

    fn arity(&self) -> (usize, Option<usize>) {
        (1, Some(2))
    }

    fn description(&self) -> &'static str {
        "Rounds half away from zero, optionally to a number of decimals"
    }
}

struct SqrtFunction;
impl FormulaFunction for SqrtFunction {
    fn call(&self, args: &[f64]) -> EvalResult<f64> {
        if args[0] < 0.0 {
            return Err(EvaluationError::arguments(
                "sqrt",
                "cannot take the square root of a negative number",
            ));
        }
        Ok(args[0].sqrt())
    }

    fn arity(&self) -> (usize, Option<usize>) {
        (1, Some(1))
    }

    fn description(&self) -> &'static str {
        "Returns the square root of a number"
    }
}

struct PowerFunction;
impl FormulaFunction for PowerFunction {
    fn call(&self, args: &[f64]) -> EvalResult<f64> {
        Ok(args[0].powf(args[1]))
    }

    fn arity(&self) -> (usize, Option<usize>) {
        (2, Some(2))
    }

    fn description(&self) -> &'static str {
        "Raises a number to a power"
    }
}

struct ModFunction;
impl FormulaFunction for ModFunction {
    fn call(&self, args: &[f64]) -> EvalResult<f64> {
        if args[1] == 0.0 {
            return Err(EvaluationError::arguments("mod", "modulo by zero"));
        }
        Ok(floored_mod(args[0], args[1]))
    }

    fn arity(&self) -> (usize, Option<usize>) {
        (2, Some(2))
    }

    fn description(&self) -> &'static str {
        "Remainder of a division, with the sign of the divisor"
    }
}

/// Modulo whose result takes the sign of the divisor
pub(crate) fn floored_mod(dividend: f64, divisor: f64) -> f64 {
    dividend - divisor * (dividend / divisor).floor()
}

struct MinFunction;
impl FormulaFunction for MinFunction {
    fn call(&self, args: &[f64]) -> EvalResult<f64> {
        Ok(args.iter().copied().fold(f64::INFINITY, f64::min))
    }

    fn arity(&self) -> (usize, Option<usize>) {
        (1, None)
    }

    fn description(&self) -> &'static str {
        "Returns the minimum of the arguments"
    }
}

struct MaxFunction;
impl FormulaFunction for MaxFunction {
    fn call(&self, args: &[f64]) -> EvalResult<f64> {
        Ok(args.iter().copied().fold(f64::NEG_INFINITY, f64::max))
    }

    fn arity(&self) -> (usize, Option<usize>) {
        (1, None)
    }

    fn description(&self) -> &'static str {
        "Returns the maximum of the arguments"
    }
}

struct SumFunction;
impl FormulaFunction for SumFunction {
    fn call(&self, args: &[f64]) -> EvalResult<f64> {
        Ok(args.iter().sum())
    }

    fn arity(&self) -> (usize, Option<usize>) {
        (1, None)
    }

    fn description(&self) -> &'static str {
        "Returns the sum of the arguments"
    }
}

struct MeanFunction;
impl FormulaFunction for MeanFunction {
    fn call(&self, args: &[f64]) -> EvalResult<f64> {
        Ok(mean(args))
    }

    fn arity(&self) -> (usize, Option<usize>) {
        (1, None)
    }

    fn description(&self) -> &'static str {
        "Returns the arithmetic mean of the arguments"
    }
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

struct MedianFunction;
impl FormulaFunction for MedianFunction {
    fn call(&self, args: &[f64]) -> EvalResult<f64> {
        let mut sorted = args.to_vec();
        sorted.sort_by(f64::total_cmp);
        let mid = sorted.len() / 2;
        if sorted.len() % 2 == 0 {
            Ok((sorted[mid - 1] + sorted[mid]) / 2.0)
        } else {
            Ok(sorted[mid])
        }
    }

    fn arity(&self) -> (usize, Option<usize>) {
        (1, None)
    }

    fn description(&self) -> &'static str {
        "Returns the median of the arguments"
    }
}

struct StdFunction;
impl FormulaFunction for StdFunction {
    fn call(&self, args: &[f64]) -> EvalResult<f64> {
        if args.len() < 2 {
            return Ok(0.0);
        }
        let avg = mean(args);
        let variance =
            args.iter().map(|v| (v - avg).powi(2)).sum::<f64>() / (args.len() - 1) as f64;
        Ok(variance.sqrt())
    }

    fn arity(&self) -> (usize, Option<usize>) {
        (1, None)
    }

    fn description(&self) -> &'static str {
        "Returns the sample standard deviation of the arguments"
    }
}

/// `tiered(value; threshold1; rate1; ...; top_rate)`.
///
/// Thresholds are expected in ascending order. Returns the rate of the first
/// threshold the value does not exceed, else the top rate.
struct TieredFunction;
impl FormulaFunction for TieredFunction {
    fn call(&self, args: &[f64]) -> EvalResult<f64> {
        if args.len() % 2 != 0 {
            return Err(EvaluationError::arguments(
                "tiered",
                "expects a value, threshold/rate pairs and a top rate",
            ));
        }
        let value = args[0];
        let top_rate = args[args.len() - 1];
        let rate = args[1..args.len() - 1]
            .chunks_exact(2)
            .find(|tier| value <= tier[0])
            .map_or(top_rate, |tier| tier[1]);
        Ok(rate)
    }

    fn arity(&self) -> (usize, Option<usize>) {
        (2, None)
    }

    fn description(&self) -> &'static str {
        "Returns the rate of the first tier whose threshold is not below the value"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(name: &str, args: &[f64]) -> f64 {
        FunctionRegistry::with_builtins().call(name, args).unwrap()
    }

    #[test]
    fn test_round_half_away_from_zero() {
        assert!((round_to(1.005, 2) - 1.01).abs() < 1e-9);
        assert!((round_to(-1.005, 2) + 1.01).abs() < 1e-9);
        assert!((round_to(2.675, 2) - 2.68).abs() < 1e-9);
        assert_eq!(round_to(1234.5, 0), 1235.0);
        assert_eq!(call("round", &[2.5]), 3.0);
        assert_eq!(call("round", &[-2.5]), -3.0);
    }

    #[test]
    fn test_aggregates() {
        assert_eq!(call("min", &[3.0, 1.0, 2.0]), 1.0);
        assert_eq!(call("max", &[3.0, 1.0, 2.0]), 3.0);
        assert_eq!(call("sum", &[1.0, 2.0, 3.5]), 6.5);
        assert_eq!(call("mean", &[2.0, 4.0]), 3.0);
        assert_eq!(call("median", &[5.0, 1.0, 3.0]), 3.0);
        assert_eq!(call("median", &[4.0, 1.0, 3.0, 2.0]), 2.5);
        assert!((call("std", &[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]) - 2.138_089_935).abs() < 1e-6);
        assert_eq!(call("std", &[42.0]), 0.0);
    }

    #[test]
    fn test_tiered_lookup() {
        let tiers = [100.0, 10.0, 200.0, 20.0, 30.0];
        let lookup = |value: f64| {
            let mut args = vec![value];
            args.extend_from_slice(&tiers);
            call("tiered", &args)
        };

        assert_eq!(lookup(50.0), 10.0);
        assert_eq!(lookup(100.0), 10.0);
        assert_eq!(lookup(150.0), 20.0);
        assert_eq!(lookup(250.0), 30.0);
        assert_eq!(call("tiered", &[7.0, 99.0]), 99.0);

        let err = FunctionRegistry::with_builtins().call("tiered", &[1.0, 2.0, 3.0]).unwrap_err();
        assert!(matches!(err, EvaluationError::InvalidArguments { .. }));
    }

    #[test]
    fn test_mod_takes_sign_of_divisor() {
        assert_eq!(call("mod", &[7.0, 3.0]), 1.0);
        assert_eq!(call("mod", &[-7.0, 3.0]), 2.0);
    }

    #[test]
    fn test_names_are_case_insensitive() {
        assert_eq!(call("MAX", &[1.0, 2.0]), 2.0);
        assert_eq!(call("Power", &[2.0, 10.0]), 1024.0);
    }

    #[test]
    fn test_arity_is_checked() {
        let registry = FunctionRegistry::with_builtins();

        let err = registry.call("sqrt", &[1.0, 2.0]).unwrap_err();
        assert!(matches!(err, EvaluationError::InvalidArguments { .. }));

        let err = registry.call("max", &[]).unwrap_err();
        assert!(matches!(err, EvaluationError::InvalidArguments { .. }));

        let err = registry.call("exec", &[1.0]).unwrap_err();
        assert_eq!(err, EvaluationError::UnknownFunction { name: "exec".into() });
    }
}
