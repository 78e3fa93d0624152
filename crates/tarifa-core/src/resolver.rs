//! Method and formula resolution

use crate::error::{TariffError, TariffResult};
use crate::repository::TariffRepository;
use crate::types::{CalculationMethod, CalculationRequest, LegacyMethod, ResolvedMethod, Route};
use chrono::NaiveDate;
use std::sync::Arc;
use tracing::debug;

/// Formula text chosen for a calculation
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedFormula {
    pub text: String,
    /// Set when a client override was selected
    pub custom_formula_id: Option<String>,
}

/// Decides which method and which formula price a request
pub struct MethodResolver {
    repository: Arc<dyn TariffRepository>,
    default_method_code: String,
}

impl MethodResolver {
    pub fn new(repository: Arc<dyn TariffRepository>, default_method_code: impl Into<String>) -> Self {
        Self { repository, default_method_code: default_method_code.into() }
    }

    /// Pick the method in order: the request's code when it names an active
    /// configured method, the route tariff's method, then the configured
    /// default.
    ///
    /// A tariff that applies on `date` but names no method is an error rather
    /// than a reason to use the default.
    pub async fn resolve_method(
        &self,
        request: &CalculationRequest,
        route: Option<&Route>,
        date: NaiveDate,
    ) -> TariffResult<ResolvedMethod> {
        if let Some(code) = request.method_override.as_deref() {
            match self.configured(code).await? {
                Some(method) => {
                    debug!(method = %method.code, "Using requested method");
                    return Ok(ResolvedMethod::Configured(method));
                }
                None => debug!(method = code, "Requested method is not configured, ignoring it"),
            }
        }

        if let Some(tariff) = route.and_then(|r| r.tariff_for(date, &request.tramo_type)) {
            let Some(name) = tariff.calculation_method.as_deref() else {
                return Err(TariffError::invalid_formula(format!(
                    "tariff for tramo '{}' valid from {} has no calculation method",
                    tariff.tramo_type, tariff.valid_from
                )));
            };
            debug!(method = name, "Using route tariff method");
            return self.by_name(name).await;
        }

        debug!(method = %self.default_method_code, "Using default method");
        self.by_name(&self.default_method_code).await
    }

    /// Active configured method for a code or historical name
    async fn configured(&self, name: &str) -> TariffResult<Option<CalculationMethod>> {
        let code = match LegacyMethod::from_name(name) {
            Some(legacy) => legacy.code(),
            None => name,
        };
        self.repository
            .find_active_method_by_code(code)
            .await
            .map_err(|e| TariffError::repository("find_active_method_by_code", &e))
    }

    /// Configured method for a code or historical name, else its legacy
    /// synthesis
    async fn by_name(&self, name: &str) -> TariffResult<ResolvedMethod> {
        if let Some(method) = self.configured(name).await? {
            return Ok(ResolvedMethod::Configured(method));
        }
        LegacyMethod::from_name(name).map(ResolvedMethod::Legacy).ok_or_else(|| {
            TariffError::invalid_method(
                name,
                format!("no active calculation method '{name}' and no legacy equivalent"),
            )
        })
    }

    /// Client override when the method allows one and a valid override
    /// exists, else the method's base formula
    pub async fn resolve_formula(
        &self,
        method: &ResolvedMethod,
        client_id: &str,
        date: NaiveDate,
        unit_type: Option<&str>,
    ) -> TariffResult<ResolvedFormula> {
        if method.allows_custom_formulas() {
            let custom = self
                .repository
                .find_active_custom_formula(client_id, method.code(), date, unit_type)
                .await
                .map_err(|e| TariffError::repository("find_active_custom_formula", &e))?;

            if let Some(custom) = custom {
                debug!(formula_id = %custom.id, priority = custom.priority, "Using custom formula");
                return non_empty(method, custom.formula, Some(custom.id));
            }
        }

        non_empty(method, method.base_formula().to_string(), None)
    }
}

fn non_empty(
    method: &ResolvedMethod,
    text: String,
    custom_formula_id: Option<String>,
) -> TariffResult<ResolvedFormula> {
    if text.trim().is_empty() {
        return Err(TariffError::invalid_method(method.code(), "formula is empty"));
    }
    Ok(ResolvedFormula { text, custom_formula_id })
}
