//! Abstract Syntax Tree for tariff formulas

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// AST node representing an expression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expression {
    /// Numeric literal (booleans are parsed as 1/0)
    Number(f64),

    /// Quoted string literal
    Text(String),

    /// Variable reference resolved against the formula context
    Variable(String),

    /// Binary operation (a + b, a > b, etc.)
    BinaryOp { left: Box<Expression>, operator: BinaryOperator, right: Box<Expression> },

    /// Unary operation (-a, !a)
    UnaryOp { operator: UnaryOperator, operand: Box<Expression> },

    /// Function call (max(a; b), round(x; 2))
    FunctionCall { name: String, args: Vec<Expression> },

    /// Ternary conditional (condition ? a : b)
    Conditional {
        condition: Box<Expression>,
        then_expr: Box<Expression>,
        else_expr: Box<Expression>,
    },
}

/// Binary operators supported by the formula language
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOperator {
    // Arithmetic
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Power,

    // Comparison
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,

    // Logical
    And,
    Or,
}

/// Unary operators supported by the formula language
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOperator {
    /// Numeric negation (-x)
    Negate,
    /// Logical negation (!x)
    Not,
}

impl Expression {
    /// Create a numeric literal
    pub fn number(value: f64) -> Self {
        Self::Number(value)
    }

    /// Create a variable reference
    pub fn var(name: &str) -> Self {
        Self::Variable(name.to_string())
    }

    /// Create a binary operation
    pub fn binary(left: Expression, op: BinaryOperator, right: Expression) -> Self {
        Self::BinaryOp { left: Box::new(left), operator: op, right: Box::new(right) }
    }

    /// Create a unary operation
    pub fn unary(op: UnaryOperator, operand: Expression) -> Self {
        Self::UnaryOp { operator: op, operand: Box::new(operand) }
    }

    /// Create a function call
    pub fn call(name: &str, args: Vec<Expression>) -> Self {
        Self::FunctionCall { name: name.to_string(), args }
    }

    /// Create a conditional expression
    pub fn conditional(
        condition: Expression,
        then_expr: Expression,
        else_expr: Expression,
    ) -> Self {
        Self::Conditional {
            condition: Box::new(condition),
            then_expr: Box::new(then_expr),
            else_expr: Box::new(else_expr),
        }
    }
}

impl Expression {
    /// Height of the tree, a lone literal being 1.
    ///
    /// Walks with an explicit stack so arbitrarily deep trees are measured
    /// without recursion.
    pub fn depth(&self) -> usize {
        let mut deepest = 0;
        let mut stack: Vec<(&Expression, usize)> = vec![(self, 1)];
        while let Some((expr, level)) = stack.pop() {
            deepest = deepest.max(level);
            match expr {
                Expression::BinaryOp { left, right, .. } => {
                    stack.push((left.as_ref(), level + 1));
                    stack.push((right.as_ref(), level + 1));
                }
                Expression::UnaryOp { operand, .. } => stack.push((operand.as_ref(), level + 1)),
                Expression::FunctionCall { args, .. } => {
                    stack.extend(args.iter().map(|arg| (arg, level + 1)));
                }
                Expression::Conditional { condition, then_expr, else_expr } => {
                    stack.push((condition.as_ref(), level + 1));
                    stack.push((then_expr.as_ref(), level + 1));
                    stack.push((else_expr.as_ref(), level + 1));
                }
                Expression::Number(_) | Expression::Text(_) | Expression::Variable(_) => {}
            }
        }
        deepest
    }
}

impl BinaryOperator {
    /// Source symbol, used in error messages
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOperator::Add => "+",
            BinaryOperator::Subtract => "-",
            BinaryOperator::Multiply => "*",
            BinaryOperator::Divide => "/",
            BinaryOperator::Modulo => "%",
            BinaryOperator::Power => "^",
            BinaryOperator::Equal => "==",
            BinaryOperator::NotEqual => "!=",
            BinaryOperator::LessThan => "<",
            BinaryOperator::LessThanOrEqual => "<=",
            BinaryOperator::GreaterThan => ">",
            BinaryOperator::GreaterThanOrEqual => ">=",
            BinaryOperator::And => "&&",
            BinaryOperator::Or => "||",
        }
    }
}

/// Extract all variable names referenced in an expression, sorted
pub fn extract_variables(expr: &Expression) -> Vec<String> {
    let mut variables = BTreeSet::new();
    extract_variables_recursive(expr, &mut variables);
    variables.into_iter().collect()
}

fn extract_variables_recursive(expr: &Expression, variables: &mut BTreeSet<String>) {
    match expr {
        Expression::Variable(name) => {
            variables.insert(name.clone());
        }
        Expression::BinaryOp { left, right, .. } => {
            extract_variables_recursive(left, variables);
            extract_variables_recursive(right, variables);
        }
        Expression::UnaryOp { operand, .. } => {
            extract_variables_recursive(operand, variables);
        }
        Expression::FunctionCall { args, .. } => {
            for arg in args {
                extract_variables_recursive(arg, variables);
            }
        }
        Expression::Conditional { condition, then_expr, else_expr } => {
            extract_variables_recursive(condition, variables);
            extract_variables_recursive(then_expr, variables);
            extract_variables_recursive(else_expr, variables);
        }
        Expression::Number(_) | Expression::Text(_) => {}
    }
}

/// Extract all function names called in an expression, sorted
pub fn extract_functions(expr: &Expression) -> Vec<String> {
    let mut functions = BTreeSet::new();
    extract_functions_recursive(expr, &mut functions);
    functions.into_iter().collect()
}

fn extract_functions_recursive(expr: &Expression, functions: &mut BTreeSet<String>) {
    match expr {
        Expression::FunctionCall { name, args } => {
            functions.insert(name.clone());
            for arg in args {
                extract_functions_recursive(arg, functions);
            }
        }
        Expression::BinaryOp { left, right, .. } => {
            extract_functions_recursive(left, functions);
            extract_functions_recursive(right, functions);
        }
        Expression::UnaryOp { operand, .. } => extract_functions_recursive(operand, functions),
        Expression::Conditional { condition, then_expr, else_expr } => {
            extract_functions_recursive(condition, functions);
            extract_functions_recursive(then_expr, functions);
            extract_functions_recursive(else_expr, functions);
        }
        Expression::Number(_) | Expression::Text(_) | Expression::Variable(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variable_extraction() {
        let expr = Expression::binary(
            Expression::var("Valor"),
            BinaryOperator::Multiply,
            Expression::binary(
                Expression::var("Palets"),
                BinaryOperator::Add,
                Expression::var("Peaje"),
            ),
        );

        assert_eq!(extract_variables(&expr), vec!["Palets", "Peaje", "Valor"]);
    }

    #[test]
    fn test_depth() {
        assert_eq!(Expression::number(1.0).depth(), 1);

        let expr = Expression::binary(
            Expression::binary(Expression::var("a"), BinaryOperator::Add, Expression::var("b")),
            BinaryOperator::Multiply,
            Expression::call("max", vec![Expression::unary(UnaryOperator::Negate, Expression::var("c"))]),
        );
        assert_eq!(expr.depth(), 4);
    }

    #[test]
    fn test_conditional_variables_are_deduplicated() {
        let expr = Expression::conditional(
            Expression::binary(
                Expression::var("Palets"),
                BinaryOperator::GreaterThan,
                Expression::number(10.0),
            ),
            Expression::call("max", vec![Expression::var("Palets"), Expression::number(1.0)]),
            Expression::number(0.0),
        );

        assert_eq!(extract_variables(&expr), vec!["Palets"]);
    }
}
