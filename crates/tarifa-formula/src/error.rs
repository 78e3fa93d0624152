//! Error type for formula preparation and evaluation

use thiserror::Error;

/// Why a formula could not be reduced to a finite number
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvaluationError {
    /// Tokenizer or parser rejected the input
    #[error("Syntax error at position {position}: {message}")]
    Syntax { message: String, position: usize },

    /// Identifier not present in the context
    #[error("Unknown identifier '{name}'")]
    UnknownIdentifier { name: String },

    /// Call to a function that is not registered
    #[error("Unknown function '{name}'")]
    UnknownFunction { name: String },

    /// Function called with an unusable argument list
    #[error("Invalid arguments for '{function}': {message}")]
    InvalidArguments { function: String, message: String },

    /// Operation applied to an operand of the wrong type
    #[error("Type error: {message}")]
    Type { message: String },

    /// Result was NaN or infinite
    #[error("Expression did not reduce to a finite number (got {value})")]
    NonFinite { value: f64 },

    /// Input longer than the configured cap
    #[error("Expression length {length} exceeds the maximum of {limit} characters")]
    TooLong { length: usize, limit: usize },

    /// Nesting deeper than the configured cap
    #[error("Expression nesting exceeds the maximum depth of {limit}")]
    TooDeep { limit: usize },

    /// Construct outside arithmetic/ternary reached the restricted evaluator
    #[error("Restricted evaluation rejected the expression: {message}")]
    Forbidden { message: String },
}

impl EvaluationError {
    /// Create a syntax error
    pub fn syntax(position: usize, message: impl Into<String>) -> Self {
        Self::Syntax { message: message.into(), position }
    }

    /// Create an invalid-arguments error
    pub fn arguments(function: &str, message: impl Into<String>) -> Self {
        Self::InvalidArguments { function: function.to_string(), message: message.into() }
    }

    /// Create a type error
    pub fn type_error(message: impl Into<String>) -> Self {
        Self::Type { message: message.into() }
    }

    /// Short category label for logging
    pub fn category(&self) -> &'static str {
        match self {
            Self::Syntax { .. } => "syntax",
            Self::UnknownIdentifier { .. } => "unknown_identifier",
            Self::UnknownFunction { .. } => "unknown_function",
            Self::InvalidArguments { .. } => "invalid_arguments",
            Self::Type { .. } => "type",
            Self::NonFinite { .. } => "non_finite",
            Self::TooLong { .. } => "too_long",
            Self::TooDeep { .. } => "too_deep",
            Self::Forbidden { .. } => "forbidden",
        }
    }
}

/// Result type alias for formula operations
pub type EvalResult<T> = Result<T, EvaluationError>;
