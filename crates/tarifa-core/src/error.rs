//! Error handling for the tariff calculation pipeline
//!
//! Every failure that aborts a calculation is a [`TariffError`]. Formula
//! failures keep their [`EvaluationError`] as the source so callers can tell a
//! syntax problem from a missing variable.

use tarifa_formula::EvaluationError;
use thiserror::Error;

/// Error type for tariff calculations
#[derive(Error, Debug, Clone)]
pub enum TariffError {
    /// A client, origin or destination referenced by the request does not exist
    #[error("{entity} '{id}' not found")]
    ReferenceNotFound { entity: &'static str, id: String },

    /// No route tariff applies and the request supplied no rate
    #[error("No applicable route for client '{client_id}' from '{origin_id}' to '{destination_id}'")]
    NoApplicableRoute { client_id: String, origin_id: String, destination_id: String },

    /// Stored data can not be turned into a formula
    #[error("Invalid formula data: {message}")]
    InvalidFormulaData { message: String, method: Option<String> },

    /// The formula failed with both evaluators
    #[error("Formula evaluation failed for '{formula}': {source}")]
    Evaluation {
        formula: String,
        #[source]
        source: EvaluationError,
    },

    /// The final figures are not a valid price
    #[error("Validation error: {message}")]
    Validation { message: String, field: Option<String> },

    /// A repository lookup failed
    #[error("Repository error during {operation}: {message}")]
    Repository { operation: &'static str, message: String },
}

impl TariffError {
    /// Short category label for logging and audit records
    pub fn category(&self) -> &'static str {
        match self {
            TariffError::ReferenceNotFound { .. } => "reference_not_found",
            TariffError::NoApplicableRoute { .. } => "no_applicable_route",
            TariffError::InvalidFormulaData { .. } => "invalid_formula_data",
            TariffError::Evaluation { .. } => "evaluation",
            TariffError::Validation { .. } => "validation",
            TariffError::Repository { .. } => "repository",
        }
    }

    /// Create a missing-reference error
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::ReferenceNotFound { entity, id: id.into() }
    }

    /// Create an invalid-formula-data error
    pub fn invalid_formula(message: impl Into<String>) -> Self {
        Self::InvalidFormulaData { message: message.into(), method: None }
    }

    /// Create an invalid-formula-data error for a named method
    pub fn invalid_method(method: &str, message: impl Into<String>) -> Self {
        Self::InvalidFormulaData { message: message.into(), method: Some(method.to_string()) }
    }

    /// Create an evaluation error
    pub fn evaluation(formula: &str, source: EvaluationError) -> Self {
        Self::Evaluation { formula: formula.to_string(), source }
    }

    /// Create a validation error on a result field
    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        Self::Validation { message: message.into(), field: Some(field.to_string()) }
    }

    /// Wrap a collaborator failure
    pub fn repository(operation: &'static str, error: &anyhow::Error) -> Self {
        Self::Repository { operation, message: format!("{error:#}") }
    }
}

/// Result type alias for tariff operations
pub type TariffResult<T> = Result<T, TariffError>;
