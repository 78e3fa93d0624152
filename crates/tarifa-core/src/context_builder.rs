//! Formula context assembly
//!
//! Collects every variable a formula may reference: distances, calendar
//! facts, vehicle limits, client attributes and cargo attributes. Optional
//! values that are absent are stored as `0`, `false` or `""` so evaluation
//! never meets an undefined optional variable.

use crate::error::{TariffError, TariffResult};
use crate::repository::TariffRepository;
use crate::types::{CalculationRequest, Client, Coordinates, Route};
use chrono::{DateTime, Datelike, NaiveDate, Timelike, Utc, Weekday};
use std::collections::HashSet;
use std::sync::Arc;
use tarifa_types::{FormulaContext, keys};
use tracing::{debug, instrument};

/// Mean Earth radius in kilometres
const EARTH_RADIUS_KM: f64 = 6371.0;

/// Context plus the records it was derived from
#[derive(Debug, Clone)]
pub struct BuiltContext {
    pub context: FormulaContext,
    pub client: Client,
    /// Missing routes are not an error at this stage
    pub route: Option<Route>,
    pub date: DateTime<Utc>,
}

/// Builds the [`FormulaContext`] for a request
pub struct ContextBuilder {
    repository: Arc<dyn TariffRepository>,
    holidays: HashSet<NaiveDate>,
}

impl ContextBuilder {
    pub fn new(repository: Arc<dyn TariffRepository>, holidays: &[NaiveDate]) -> Self {
        Self { repository, holidays: holidays.iter().copied().collect() }
    }

    /// Load the referenced records concurrently and assemble the context
    #[instrument(skip(self, request), fields(client_id = %request.client_id))]
    pub async fn build(&self, request: &CalculationRequest) -> TariffResult<BuiltContext> {
        let repo = &self.repository;
        let unit_type = request.unit_type.as_deref().unwrap_or_default();

        let (client, origin, destination, route, limits) = tokio::join!(
            repo.find_client_by_id(&request.client_id),
            repo.find_site_by_id(&request.origin_id),
            repo.find_site_by_id(&request.destination_id),
            repo.find_route_by_client_origin_destination(
                &request.client_id,
                &request.origin_id,
                &request.destination_id,
            ),
            repo.find_vehicle_limits_by_unit_type(unit_type),
        );

        let client = client
            .map_err(|e| TariffError::repository("find_client_by_id", &e))?
            .ok_or_else(|| TariffError::not_found("Client", &request.client_id))?;
        let origin = origin
            .map_err(|e| TariffError::repository("find_site_by_id", &e))?
            .ok_or_else(|| TariffError::not_found("Origin site", &request.origin_id))?;
        let destination = destination
            .map_err(|e| TariffError::repository("find_site_by_id", &e))?
            .ok_or_else(|| TariffError::not_found("Destination site", &request.destination_id))?;
        let route = route
            .map_err(|e| TariffError::repository("find_route_by_client_origin_destination", &e))?;
        let limits = if unit_type.is_empty() {
            None
        } else {
            limits.map_err(|e| TariffError::repository("find_vehicle_limits_by_unit_type", &e))?
        };

        let date = request.effective_date();
        let mut context = FormulaContext::new();

        // Distances
        let air_distance = match (origin.coordinates, destination.coordinates) {
            (Some(from), Some(to)) => haversine_km(from, to),
            _ => 0.0,
        };
        let route_distance = route.as_ref().map_or(0.0, |r| r.distance_km);
        let distance = if route_distance > 0.0 { route_distance } else { air_distance };
        context.set(keys::DISTANCIA_AEREA, air_distance);
        context.set(keys::DISTANCIA_REAL, route_distance);
        context.set(keys::DISTANCIA, distance);

        self.add_calendar(&mut context, date);

        // Vehicle
        context.set(keys::TIPO_UNIDAD, unit_type);
        context.set(keys::CAPACIDAD_MAXIMA, limits.as_ref().map_or(0.0, |l| l.max_capacity));
        context.set(keys::PESO_MAXIMO, limits.as_ref().map_or(0.0, |l| l.max_weight));
        context.set(keys::CANTIDAD_VEHICULOS, request.vehicles.unwrap_or(1));

        // Client
        context.set(keys::CLIENTE_ID, client.id.as_str());
        context.set(keys::TIPO_CLIENTE, client.client_type.as_deref().unwrap_or_default());
        context.set(keys::CATEGORIA_CLIENTE, client.category.as_deref().unwrap_or_default());
        context.set(keys::DESCUENTO_CLIENTE, client.discount);

        // Cargo
        let pallets = request.pallets.unwrap_or(0.0);
        context.set(keys::PALETS, pallets);
        context.set(keys::CANTIDAD, pallets);
        context.set(keys::PESO, request.weight.unwrap_or(0.0));
        context.set(keys::VOLUMEN, request.volume.unwrap_or(0.0));
        context.set(keys::CANTIDAD_BULTOS, request.piece_count.unwrap_or(0.0));
        context.set(keys::TIPO_CARGA, request.cargo_type.as_deref().unwrap_or_default());
        context.set(keys::URGENCIA, request.urgency.as_deref().unwrap_or_default());

        context.set(keys::TIPO_TRAMO, request.tramo_type.as_str());
        context.set(keys::EXTRAS, request.extras_total());

        for (name, value) in &request.variables {
            context.set(name.as_str(), value.clone());
        }

        if let Some(name) = context.first_non_finite() {
            return Err(TariffError::validation(name, format!("'{name}' must be a finite number")));
        }

        debug!(
            variables = context.len(),
            has_route = route.is_some(),
            distance,
            "Built formula context"
        );

        Ok(BuiltContext { context, client, route, date })
    }

    fn add_calendar(&self, context: &mut FormulaContext, date: DateTime<Utc>) {
        let weekday = date.weekday();
        let month = date.month();
        context.set(keys::DIA_SEMANA, weekday.num_days_from_sunday());
        context.set(keys::MES, month);
        context.set(keys::TRIMESTRE, (month - 1) / 3 + 1);
        context.set(keys::ES_FIN_DE_SEMANA, matches!(weekday, Weekday::Sat | Weekday::Sun));
        context.set(keys::ES_FESTIVO, self.holidays.contains(&date.date_naive()));
        context.set(keys::HORA, date.hour());
        context.set(keys::FECHA, date);
    }
}

/// Great-circle distance in kilometres
pub fn haversine_km(from: Coordinates, to: Coordinates) -> f64 {
    let dlat = (to.lat - from.lat).to_radians();
    let dlon = (to.lng - from.lng).to_radians();
    let a = (dlat / 2.0).sin().powi(2)
        + from.lat.to_radians().cos() * to.lat.to_radians().cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().atan2((1.0 - a).sqrt())
}
