//! Domain types for tariff calculation
//!
//! Records are serialized in camelCase so datasets and requests read the same
//! way the surrounding logistics system writes them.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tarifa_types::{FormulaContext, FormulaValue, keys};

/// A customer that routes and custom formulas belong to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Client {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub client_type: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    /// Discount percentage exposed to formulas as `DescuentoCliente`
    #[serde(default)]
    pub discount: f64,
}

/// Latitude/longitude in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

/// A pickup or delivery location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Site {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub coordinates: Option<Coordinates>,
}

/// Rate and toll for one tramo type over a validity window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteTariff {
    pub tramo_type: String,
    /// Historical method name (`Kilometro`, `Palet`, `Fijo`) or a method code
    #[serde(default)]
    pub calculation_method: Option<String>,
    /// Unit rate, exposed as `Valor`
    #[serde(default)]
    pub rate: Option<f64>,
    /// Toll, exposed as `Peaje`
    #[serde(default)]
    pub toll: f64,
    pub valid_from: NaiveDate,
    #[serde(default)]
    pub valid_to: Option<NaiveDate>,
}

impl RouteTariff {
    /// Whether `date` falls inside the validity window (both ends inclusive)
    pub fn is_valid_on(&self, date: NaiveDate) -> bool {
        within(date, Some(self.valid_from), self.valid_to)
    }
}

/// Priced route for a client between two sites
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    pub id: String,
    pub client_id: String,
    pub origin_id: String,
    pub destination_id: String,
    #[serde(default)]
    pub distance_km: f64,
    #[serde(default)]
    pub tariffs: Vec<RouteTariff>,
}

impl Route {
    /// Tariff for the tramo type valid on `date`.
    ///
    /// When several windows overlap, the one that started most recently wins.
    pub fn tariff_for(&self, date: NaiveDate, tramo_type: &str) -> Option<&RouteTariff> {
        self.tariffs
            .iter()
            .filter(|t| t.tramo_type.eq_ignore_ascii_case(tramo_type) && t.is_valid_on(date))
            .max_by_key(|t| t.valid_from)
    }
}

/// Capacity limits for a vehicle unit type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleLimits {
    pub unit_type: String,
    #[serde(default)]
    pub max_capacity: f64,
    #[serde(default)]
    pub max_weight: f64,
}

/// A configured calculation method
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculationMethod {
    pub code: String,
    pub name: String,
    pub formula: String,
    #[serde(default)]
    pub requires_distance: bool,
    #[serde(default)]
    pub requires_pallets: bool,
    #[serde(default)]
    pub allows_custom_formulas: bool,
    #[serde(default)]
    pub priority: i32,
    #[serde(default = "default_true")]
    pub active: bool,
}

/// Historical pricing methods that predate configurable methods
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LegacyMethod {
    Distance,
    Pallet,
    Fixed,
}

impl LegacyMethod {
    /// Map a historical method name, ignoring case
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "kilometro" | "kilómetro" | "km" | "distancia" => Some(Self::Distance),
            "palet" | "palets" | "pallet" => Some(Self::Pallet),
            "fijo" | "fixed" => Some(Self::Fixed),
            _ => None,
        }
    }

    /// Code the method is known by when configured
    pub fn code(self) -> &'static str {
        match self {
            Self::Distance => "KILOMETRO",
            Self::Pallet => "PALET",
            Self::Fixed => "FIJO",
        }
    }

    /// Fixed formula the method has always priced with
    pub fn formula(self) -> &'static str {
        match self {
            Self::Distance => "Valor * Distancia + Peaje",
            Self::Pallet => "Valor * Palets + Peaje",
            Self::Fixed => "Valor + Peaje",
        }
    }
}

/// Method chosen for a calculation
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedMethod {
    /// Active method from the repository
    Configured(CalculationMethod),
    /// Synthesised on the fly, never persisted
    Legacy(LegacyMethod),
}

impl ResolvedMethod {
    /// Code recorded as `methodUsed` and used to look up custom formulas
    pub fn code(&self) -> &str {
        match self {
            Self::Configured(method) => &method.code,
            Self::Legacy(legacy) => legacy.code(),
        }
    }

    /// Formula used when no custom formula applies
    pub fn base_formula(&self) -> &str {
        match self {
            Self::Configured(method) => &method.formula,
            Self::Legacy(legacy) => legacy.formula(),
        }
    }

    /// Whether a missing `Distancia` should be reported.
    ///
    /// Legacy distance pricing always needs one.
    pub fn requires_distance(&self) -> bool {
        match self {
            Self::Configured(method) => method.requires_distance,
            Self::Legacy(legacy) => *legacy == LegacyMethod::Distance,
        }
    }

    /// Whether a missing `Palets` should be reported
    pub fn requires_pallets(&self) -> bool {
        match self {
            Self::Configured(method) => method.requires_pallets,
            Self::Legacy(legacy) => *legacy == LegacyMethod::Pallet,
        }
    }

    /// Legacy methods accept client overrides registered under their code
    pub fn allows_custom_formulas(&self) -> bool {
        match self {
            Self::Configured(method) => method.allows_custom_formulas,
            Self::Legacy(_) => true,
        }
    }

    /// Whether the method was synthesised from a historical name
    pub fn is_legacy(&self) -> bool {
        matches!(self, Self::Legacy(_))
    }
}

/// Which vehicle types a custom formula covers
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum VehicleScope {
    #[default]
    Any,
    Unit(String),
}

impl VehicleScope {
    pub fn matches(&self, unit_type: Option<&str>) -> bool {
        match self {
            Self::Any => true,
            Self::Unit(scope) => unit_type.is_some_and(|unit| unit.eq_ignore_ascii_case(scope)),
        }
    }
}

impl From<String> for VehicleScope {
    fn from(value: String) -> Self {
        if value.is_empty() || value.eq_ignore_ascii_case("any") {
            Self::Any
        } else {
            Self::Unit(value)
        }
    }
}

impl From<VehicleScope> for String {
    fn from(value: VehicleScope) -> Self {
        match value {
            VehicleScope::Any => "any".to_string(),
            VehicleScope::Unit(unit) => unit,
        }
    }
}

/// Client-specific override of a method's formula
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomFormula {
    pub id: String,
    pub client_id: String,
    pub method_code: String,
    pub formula: String,
    pub valid_from: NaiveDate,
    #[serde(default)]
    pub valid_to: Option<NaiveDate>,
    #[serde(default)]
    pub vehicle_scope: VehicleScope,
    #[serde(default)]
    pub priority: i32,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub usage_count: u64,
    pub created_at: DateTime<Utc>,
}

impl CustomFormula {
    /// Whether this formula may be used for the given client, method, date and unit
    pub fn applies(
        &self,
        client_id: &str,
        method_code: &str,
        date: NaiveDate,
        unit_type: Option<&str>,
    ) -> bool {
        self.active
            && self.client_id == client_id
            && self.method_code.eq_ignore_ascii_case(method_code)
            && within(date, Some(self.valid_from), self.valid_to)
            && self.vehicle_scope.matches(unit_type)
    }
}

/// Comparison used by a rule condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConditionOperator {
    Equals,
    NotEquals,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    Between,
    In,
    NotIn,
}

/// How a rule combines its conditions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LogicalOperator {
    #[default]
    All,
    Any,
}

/// One test against a context variable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleCondition {
    pub field: String,
    pub operator: ConditionOperator,
    #[serde(default)]
    pub value: Option<FormulaValue>,
    /// Upper bound for `between`
    #[serde(default)]
    pub value_to: Option<f64>,
    /// Candidates for `in` / `notIn`
    #[serde(default)]
    pub values: Vec<FormulaValue>,
}

impl RuleCondition {
    /// Test the condition; absent variables read as `0`
    pub fn matches(&self, context: &FormulaContext) -> bool {
        let zero = FormulaValue::Number(0.0);
        let actual = context.get(&self.field).unwrap_or(&zero);

        match self.operator {
            ConditionOperator::Equals => self.value.as_ref().is_some_and(|v| same(actual, v)),
            ConditionOperator::NotEquals => !self.value.as_ref().is_some_and(|v| same(actual, v)),
            ConditionOperator::GreaterThan => self.compare(actual, |a, b| a > b),
            ConditionOperator::GreaterThanOrEqual => self.compare(actual, |a, b| a >= b),
            ConditionOperator::LessThan => self.compare(actual, |a, b| a < b),
            ConditionOperator::LessThanOrEqual => self.compare(actual, |a, b| a <= b),
            ConditionOperator::Between => {
                match (actual.as_number(), self.value.as_ref().and_then(FormulaValue::as_number)) {
                    (Some(a), Some(low)) => a >= low && self.value_to.is_none_or(|high| a <= high),
                    _ => false,
                }
            }
            ConditionOperator::In => self.values.iter().any(|v| same(actual, v)),
            ConditionOperator::NotIn => !self.values.iter().any(|v| same(actual, v)),
        }
    }

    fn compare(&self, actual: &FormulaValue, op: impl Fn(f64, f64) -> bool) -> bool {
        match (actual.as_number(), self.value.as_ref().and_then(FormulaValue::as_number)) {
            (Some(a), Some(b)) => op(a, b),
            _ => false,
        }
    }
}

/// Text compares case-insensitively, everything else by numeric view
fn same(actual: &FormulaValue, expected: &FormulaValue) -> bool {
    match (actual.as_text(), expected.as_text()) {
        (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
        (None, None) => match (actual.as_number(), expected.as_number()) {
            (Some(a), Some(b)) => (a - b).abs() < 1e-9,
            _ => false,
        },
        _ => false,
    }
}

/// How a rule changes its target amount
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ModifierKind {
    /// Add `value` percent of the target
    Percentage,
    /// Add `value`
    Fixed,
    /// Multiply the target by `value`
    Multiplier,
    /// Replace the target with the formula result; `Monto` holds the current amount
    Formula,
}

/// Component a rule modifies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ModifierTarget {
    Tariff,
    Toll,
    Extras,
    /// Booked into extras so the total stays the sum of its parts
    #[default]
    Total,
}

impl fmt::Display for ModifierTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Tariff => "tariff",
            Self::Toll => "toll",
            Self::Extras => "extras",
            Self::Total => "total",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleModifier {
    pub kind: ModifierKind,
    #[serde(default)]
    pub value: f64,
    #[serde(default)]
    pub formula: Option<String>,
    #[serde(default)]
    pub apply_to: ModifierTarget,
}

/// Conditional surcharge or discount
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    pub id: String,
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub priority: i32,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub valid_from: Option<NaiveDate>,
    #[serde(default)]
    pub valid_to: Option<NaiveDate>,
    /// Restrict to these clients; empty means every client
    #[serde(default)]
    pub client_ids: Vec<String>,
    /// Restrict to these tramo types; empty means every type
    #[serde(default)]
    pub tramo_types: Vec<String>,
    /// Restrict to these weekdays (0 = Sunday); empty means every day
    #[serde(default)]
    pub weekdays: Vec<u32>,
    #[serde(default)]
    pub conditions: Vec<RuleCondition>,
    #[serde(default)]
    pub logical_operator: LogicalOperator,
    pub modifier: RuleModifier,
    #[serde(default)]
    pub excludes_others: bool,
}

impl Rule {
    /// Whether the rule applies to this context on this date
    pub fn matches(&self, context: &FormulaContext, date: NaiveDate) -> bool {
        if !self.active || !within(date, self.valid_from, self.valid_to) {
            return false;
        }

        if !self.client_ids.is_empty() {
            let client = context.text(keys::CLIENTE_ID).unwrap_or_default();
            if !self.client_ids.iter().any(|id| id == client) {
                return false;
            }
        }

        if !self.tramo_types.is_empty() {
            let tramo = context.text(keys::TIPO_TRAMO).unwrap_or_default();
            if !self.tramo_types.iter().any(|t| t.eq_ignore_ascii_case(tramo)) {
                return false;
            }
        }

        if !self.weekdays.is_empty() {
            let weekday = context.number(keys::DIA_SEMANA) as u32;
            if !self.weekdays.contains(&weekday) {
                return false;
            }
        }

        match self.logical_operator {
            LogicalOperator::All => self.conditions.iter().all(|c| c.matches(context)),
            LogicalOperator::Any => {
                self.conditions.is_empty() || self.conditions.iter().any(|c| c.matches(context))
            }
        }
    }
}

/// Additional charge requested with the calculation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtraCharge {
    pub concept: String,
    pub amount: f64,
}

/// Parameters of one trip to price
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CalculationRequest {
    pub client_id: String,
    pub origin_id: String,
    pub destination_id: String,
    /// Calculation instant; the current time when absent
    pub date: Option<DateTime<Utc>>,
    pub tramo_type: String,
    pub unit_type: Option<String>,
    /// Method code used instead of the route's when it names an active
    /// configured method; ignored otherwise
    pub method_override: Option<String>,
    pub pallets: Option<f64>,
    pub weight: Option<f64>,
    pub volume: Option<f64>,
    pub piece_count: Option<f64>,
    pub vehicles: Option<u32>,
    pub cargo_type: Option<String>,
    pub urgency: Option<String>,
    pub extras: Vec<ExtraCharge>,
    /// Merged into the context last, overriding derived values
    pub variables: BTreeMap<String, FormulaValue>,
    /// Read and write the result cache
    pub use_cache: bool,
    pub include_breakdown: bool,
}

impl CalculationRequest {
    pub fn new(
        client_id: impl Into<String>,
        origin_id: impl Into<String>,
        destination_id: impl Into<String>,
        tramo_type: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            origin_id: origin_id.into(),
            destination_id: destination_id.into(),
            tramo_type: tramo_type.into(),
            ..Self::default()
        }
    }

    /// Instant the calculation is priced at
    pub fn effective_date(&self) -> DateTime<Utc> {
        self.date.unwrap_or_else(Utc::now)
    }

    /// Sum of requested extra charges
    pub fn extras_total(&self) -> f64 {
        self.extras.iter().map(|e| e.amount).sum()
    }
}

/// A rule that changed the result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedRule {
    pub code: String,
    pub name: String,
    /// Net change to the total, rounded to 2 decimals
    pub delta: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakdownStep {
    pub label: String,
    pub amount: f64,
}

/// Itemised explanation of a result
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Breakdown {
    pub steps: Vec<BreakdownStep>,
    /// Values of the variables the formula references
    pub variables: BTreeMap<String, FormulaValue>,
}

/// Priced result of a calculation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculationResult {
    pub tariff_base: f64,
    pub toll: f64,
    pub extras: f64,
    pub total: f64,
    pub method_used: String,
    pub formula_used: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_formula_id: Option<String>,
    pub applied_rules: Vec<AppliedRule>,
    pub warnings: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub breakdown: Option<Breakdown>,
    pub cache_hit: bool,
}

fn default_true() -> bool {
    true
}

/// Inclusive date window; `None` bounds are open
pub(crate) fn within(date: NaiveDate, from: Option<NaiveDate>, to: Option<NaiveDate>) -> bool {
    from.is_none_or(|from| date >= from) && to.is_none_or(|to| date <= to)
}
