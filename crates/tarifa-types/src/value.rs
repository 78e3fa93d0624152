use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A typed scalar stored under a variable name in a [`crate::FormulaContext`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum FormulaValue {
    /// Numeric value; must be finite inside a context
    Number(f64),
    /// Boolean flag, exposed to formulas as `1`/`0`
    Boolean(bool),
    /// Calendar instant, exposed to formulas as milliseconds since the epoch
    Date(DateTime<Utc>),
    /// Free text, exposed to formulas as a quoted literal
    Text(String),
}

impl FormulaValue {
    /// Numeric view of this value as seen by the formula language.
    ///
    /// Booleans map to `1`/`0` and dates to their millisecond epoch. Text has
    /// no numeric view.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Boolean(b) => Some(if *b { 1.0 } else { 0.0 }),
            Self::Date(d) => Some(d.timestamp_millis() as f64),
            Self::Text(_) => None,
        }
    }

    /// Text view, only for `Text` values
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Check if this value is "truthy" for conditional logic
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Number(n) => *n != 0.0 && !n.is_nan(),
            Self::Boolean(b) => *b,
            Self::Date(_) => true,
            Self::Text(s) => !s.is_empty(),
        }
    }

    /// Type checking utility
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Number(_) => "number",
            Self::Boolean(_) => "boolean",
            Self::Date(_) => "date",
            Self::Text(_) => "string",
        }
    }

    /// `false` only for non-finite numbers
    #[must_use]
    pub fn is_finite(&self) -> bool {
        match self {
            Self::Number(n) => n.is_finite(),
            _ => true,
        }
    }
}

impl fmt::Display for FormulaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Boolean(b) => write!(f, "{}", u8::from(*b)),
            Self::Date(d) => write!(f, "{}", d.timestamp_millis()),
            Self::Text(s) => write!(f, "\"{s}\""),
        }
    }
}

impl From<f64> for FormulaValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<u32> for FormulaValue {
    fn from(value: u32) -> Self {
        Self::Number(f64::from(value))
    }
}

impl From<bool> for FormulaValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<String> for FormulaValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for FormulaValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<DateTime<Utc>> for FormulaValue {
    fn from(value: DateTime<Utc>) -> Self {
        Self::Date(value)
    }
}
