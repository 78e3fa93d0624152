use crate::value::FormulaValue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Named variables available to a formula.
///
/// Lookups of absent numeric keys yield `0` and absent flags yield `false`,
/// so evaluation never sees an undefined optional value.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct FormulaContext {
    values: BTreeMap<String, FormulaValue>,
}

impl FormulaContext {
    /// Create an empty context
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<FormulaValue>) -> Self {
        self.set(name, value);
        self
    }

    /// Insert or replace a variable
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<FormulaValue>) {
        self.values.insert(name.into(), value.into());
    }

    /// Raw lookup
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&FormulaValue> {
        self.values.get(name)
    }

    /// Whether the variable is present
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Numeric value of a variable, `0` when absent or not numeric
    #[must_use]
    pub fn number(&self, name: &str) -> f64 {
        self.values.get(name).and_then(FormulaValue::as_number).unwrap_or(0.0)
    }

    /// Flag value of a variable, `false` when absent
    #[must_use]
    pub fn flag(&self, name: &str) -> bool {
        self.values.get(name).is_some_and(FormulaValue::is_truthy)
    }

    /// Text value of a variable, when it is text
    #[must_use]
    pub fn text(&self, name: &str) -> Option<&str> {
        self.values.get(name).and_then(FormulaValue::as_text)
    }

    /// Iterate variables in name order
    pub fn variables(&self) -> impl Iterator<Item = (&str, &FormulaValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of variables
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the context holds no variables
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Copy every variable of `other` into this context, replacing duplicates
    pub fn extend(&mut self, other: &Self) {
        for (name, value) in &other.values {
            self.values.insert(name.clone(), value.clone());
        }
    }

    /// Name of the first non-finite numeric variable, if any
    #[must_use]
    pub fn first_non_finite(&self) -> Option<&str> {
        self.values
            .iter()
            .find(|(_, value)| !value.is_finite())
            .map(|(name, _)| name.as_str())
    }
}

impl<K, V> FromIterator<(K, V)> for FormulaContext
where
    K: Into<String>,
    V: Into<FormulaValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut context = Self::new();
        for (name, value) in iter {
            context.set(name, value);
        }
        context
    }
}
