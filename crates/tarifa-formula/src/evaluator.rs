//! Expression evaluator for tariff formulas
//!
//! Evaluates a parsed AST against a [`FormulaContext`]. Every intermediate
//! value is either a number or a string; booleans surface as `1`/`0` and
//! dates as milliseconds since the epoch.

use crate::ast::{BinaryOperator, Expression, UnaryOperator};
use crate::error::{EvalResult, EvaluationError};
use crate::functions::{FunctionRegistry, floored_mod};
use tarifa_types::{FormulaContext, FormulaValue};

/// Intermediate value produced while walking the tree
#[derive(Debug, Clone, PartialEq)]
enum Value {
    Number(f64),
    Text(String),
}

impl Value {
    fn number(self, what: &str) -> EvalResult<f64> {
        match self {
            Value::Number(n) => Ok(n),
            Value::Text(s) => {
                Err(EvaluationError::type_error(format!("{what} expects a number, got \"{s}\"")))
            }
        }
    }

    fn is_truthy(&self) -> bool {
        match self {
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::Text(s) => !s.is_empty(),
        }
    }
}

fn flag(value: bool) -> Value {
    Value::Number(if value { 1.0 } else { 0.0 })
}

/// Evaluate an expression to a finite number
pub fn evaluate_expression(
    expr: &Expression,
    context: &FormulaContext,
    functions: &FunctionRegistry,
) -> EvalResult<f64> {
    match evaluate_to_value(expr, context, functions)? {
        Value::Number(n) if n.is_finite() => Ok(n),
        Value::Number(n) => Err(EvaluationError::NonFinite { value: n }),
        Value::Text(s) => Err(EvaluationError::type_error(format!(
            "formula evaluated to text \"{s}\" instead of a number"
        ))),
    }
}

fn evaluate_to_value(
    expr: &Expression,
    context: &FormulaContext,
    functions: &FunctionRegistry,
) -> EvalResult<Value> {
    match expr {
        Expression::Number(n) => Ok(Value::Number(*n)),

        Expression::Text(s) => Ok(Value::Text(s.clone())),

        Expression::Variable(name) => match context.get(name) {
            Some(FormulaValue::Text(s)) => Ok(Value::Text(s.clone())),
            Some(value) => value
                .as_number()
                .map(Value::Number)
                .ok_or_else(|| EvaluationError::UnknownIdentifier { name: name.clone() }),
            None => Err(EvaluationError::UnknownIdentifier { name: name.clone() }),
        },

        Expression::BinaryOp { left, operator, right } => match operator {
            BinaryOperator::And => {
                if !evaluate_to_value(left, context, functions)?.is_truthy() {
                    return Ok(flag(false));
                }
                Ok(flag(evaluate_to_value(right, context, functions)?.is_truthy()))
            }
            BinaryOperator::Or => {
                if evaluate_to_value(left, context, functions)?.is_truthy() {
                    return Ok(flag(true));
                }
                Ok(flag(evaluate_to_value(right, context, functions)?.is_truthy()))
            }
            _ => {
                let left_val = evaluate_to_value(left, context, functions)?;
                let right_val = evaluate_to_value(right, context, functions)?;
                evaluate_binary_op(left_val, *operator, right_val)
            }
        },

        Expression::UnaryOp { operator, operand } => {
            let operand_val = evaluate_to_value(operand, context, functions)?;
            match operator {
                UnaryOperator::Negate => Ok(Value::Number(-operand_val.number("negation")?)),
                UnaryOperator::Not => Ok(flag(!operand_val.is_truthy())),
            }
        }

        Expression::FunctionCall { name, args } => {
            let mut arg_values = Vec::with_capacity(args.len());
            for arg in args {
                arg_values.push(evaluate_to_value(arg, context, functions)?.number(name)?);
            }
            functions.call(name, &arg_values).map(Value::Number)
        }

        Expression::Conditional { condition, then_expr, else_expr } => {
            if evaluate_to_value(condition, context, functions)?.is_truthy() {
                evaluate_to_value(then_expr, context, functions)
            } else {
                evaluate_to_value(else_expr, context, functions)
            }
        }
    }
}

fn evaluate_binary_op(left: Value, operator: BinaryOperator, right: Value) -> EvalResult<Value> {
    use BinaryOperator::*;

    // Strings only support equality
    if let (Value::Text(a), Value::Text(b)) = (&left, &right) {
        return match operator {
            Equal => Ok(flag(a == b)),
            NotEqual => Ok(flag(a != b)),
            _ => Err(EvaluationError::type_error(format!(
                "operator '{}' is not defined for text",
                operator.symbol()
            ))),
        };
    }

    if matches!(operator, Equal | NotEqual)
        && (matches!(left, Value::Text(_)) || matches!(right, Value::Text(_)))
    {
        return Ok(flag(matches!(operator, NotEqual)));
    }

    let a = left.number(operator.symbol())?;
    let b = right.number(operator.symbol())?;

    let value = match operator {
        Add => Value::Number(a + b),
        Subtract => Value::Number(a - b),
        Multiply => Value::Number(a * b),
        Divide => Value::Number(a / b),
        Modulo => Value::Number(floored_mod(a, b)),
        Power => Value::Number(a.powf(b)),
        Equal => flag(a == b),
        NotEqual => flag(a != b),
        LessThan => flag(a < b),
        LessThanOrEqual => flag(a <= b),
        GreaterThan => flag(a > b),
        GreaterThanOrEqual => flag(a >= b),
        And => flag(a != 0.0 && b != 0.0),
        Or => flag(a != 0.0 || b != 0.0),
    };
    Ok(value)
}
